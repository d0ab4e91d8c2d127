use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing::{Level, warn};
use tracing_subscriber::EnvFilter;

use tiktok_favvideo_downloader::app::{App, ConsoleSink, PlannedBatch, ProgressSink};
use tiktok_favvideo_downloader::config::{
    CookieSource, DEFAULT_EXPORT_FILE, DEFAULT_LIST_FILE, DEFAULT_REPORT_FILE, RunConfig,
    provisioned_tool_path,
};
use tiktok_favvideo_downloader::error::ArchiveError;
use tiktok_favvideo_downloader::output::{JsonOutput, OutputMode};
use tiktok_favvideo_downloader::progress::ProgressRenderer;
use tiktok_favvideo_downloader::report::{print_summary, write_report};
use tiktok_favvideo_downloader::runner::{CommandRunner, SystemRunner};
use tiktok_favvideo_downloader::tool::{GithubToolFetcher, ensure_tool};

#[derive(Parser)]
#[command(name = "tiktok-favvideo-downloader")]
#[command(about = "Download favorited and liked TikTok videos from your data export with yt-dlp")]
#[command(version)]
struct Cli {
    /// TikTok data export (JSON)
    #[arg(default_value = DEFAULT_EXPORT_FILE)]
    export: PathBuf,

    /// Put every video in the current directory instead of one directory per collection
    #[arg(long)]
    flat_structure: bool,

    #[arg(long)]
    include_liked: bool,

    #[arg(long)]
    no_thumbnails: bool,

    /// Rebuild index.html/index.json from existing metadata without downloading
    #[arg(long)]
    index_only: bool,

    /// Ignore the download archive and fetch everything again
    #[arg(long)]
    disable_resume: bool,

    #[arg(long)]
    no_progress_bar: bool,

    /// Netscape-format cookies.txt
    #[arg(long, value_name = "FILE")]
    cookies: Option<PathBuf>,

    #[arg(long, value_name = "BROWSER")]
    cookies_from_browser: Option<String>,

    /// Use this yt-dlp binary and skip fetching one
    #[arg(long = "yt-dlp", value_name = "PATH")]
    yt_dlp: Option<Utf8PathBuf>,

    #[arg(long, value_name = "FILE", default_value = DEFAULT_REPORT_FILE)]
    report: PathBuf,

    /// Print the session outcome as JSON
    #[arg(long)]
    json: bool,

    /// Answer yes to every prompt
    #[arg(long, short = 'y')]
    yes: bool,

    #[arg(long, short = 'v')]
    verbose: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<ArchiveError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &ArchiveError) -> u8 {
    match error {
        ArchiveError::ExportRead(_)
        | ArchiveError::ExportParse(_)
        | ArchiveError::InvalidCookieFile(_)
        | ArchiveError::UnsupportedBrowser(_)
        | ArchiveError::ConflictingCookies => 2,
        ArchiveError::ProcessSpawn { .. }
        | ArchiveError::ProcessExit { .. }
        | ArchiveError::ProcessIo(_)
        | ArchiveError::ToolHttp(_)
        | ArchiveError::ToolStatus { .. }
        | ArchiveError::ToolAssetMissing(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let output_mode = if cli.json {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };
    let interactive = matches!(output_mode, OutputMode::Interactive) && !cli.yes;

    if !cli.export.is_file() {
        return Err(ArchiveError::ExportRead(cli.export.clone()).into());
    }
    let cookies = CookieSource::from_flags(cli.cookies.clone(), cli.cookies_from_browser.clone())?;

    let work_dir = Utf8PathBuf::from(".");
    // The binary that gets fetched and aged is the one that gets run.
    let tool_path = cli
        .yt_dlp
        .clone()
        .unwrap_or_else(|| provisioned_tool_path(&work_dir));
    let mut config = RunConfig {
        export_file: cli.export.clone(),
        organize_by_collection: !cli.flat_structure,
        include_liked: cli.include_liked,
        skip_thumbnails: cli.no_thumbnails,
        index_only: cli.index_only,
        disable_resume: cli.disable_resume,
        disable_progress_bar: cli.no_progress_bar,
        cookies,
        flat_list_name: DEFAULT_LIST_FILE.to_string(),
        tool_path,
        report_path: cli.report.clone(),
        work_dir,
    };

    if !config.include_liked && interactive {
        config.include_liked = prompt_yes_no(
            "Would you like to include 'Liked' videos as well? (y/n, default is 'n'): ",
            false,
        );
    }

    match output_mode {
        OutputMode::Interactive => {
            let sink = ConsoleSink;
            if !config.index_only && cli.yt_dlp.is_none() {
                provision_tool(&config, interactive, &sink);
            }
            let runner = SystemRunner::new(config.disable_progress_bar);
            run_session(App::new(config, runner), output_mode, interactive, &sink)
        }
        OutputMode::NonInteractive => {
            // Keep stdout for the JSON document.
            config.disable_progress_bar = true;
            if !config.index_only && cli.yt_dlp.is_none() {
                provision_tool(&config, false, &JsonOutput);
            }
            let runner = SystemRunner::with_renderer(ProgressRenderer::new(io::stderr(), false));
            run_session(App::new(config, runner), output_mode, false, &JsonOutput)
        }
    }
}

fn run_session<R: CommandRunner>(
    mut app: App<R>,
    output_mode: OutputMode,
    interactive: bool,
    sink: &dyn ProgressSink,
) -> miette::Result<()> {
    let refs = app.load_references(sink)?;
    let batches = app.plan(&refs);

    if app.config().index_only {
        let written = app.rebuild_indexes(&batches, sink);
        if written < batches.len() {
            warn!("{} of {} indexes could not be written", batches.len() - written, batches.len());
        }
        return Ok(());
    }

    app.write_url_lists(&batches, sink)?;
    if interactive
        && !prompt_yes_no("Would you like me to run yt-dlp for you instead? (y/n): ", false)
    {
        print_manual_commands(app.config(), &batches);
        return Ok(());
    }

    let session = app.download(&batches, sink);
    let report_path = app.config().report_path.clone();
    if let Err(err) = write_report(&session, &report_path) {
        warn!("{err}");
    }

    match output_mode {
        OutputMode::Interactive => {
            let mut stdout = io::stdout().lock();
            print_summary(&session, &report_path, &mut stdout).into_diagnostic()?;
        }
        OutputMode::NonInteractive => {
            JsonOutput::print_session(&session).into_diagnostic()?;
        }
    }
    Ok(())
}

fn provision_tool(config: &RunConfig, interactive: bool, sink: &dyn ProgressSink) {
    let fetcher = match GithubToolFetcher::new() {
        Ok(fetcher) => fetcher,
        Err(err) => {
            warn!("{err}");
            return;
        }
    };
    let mut confirm = || {
        !interactive
            || prompt_yes_no(
                "A newer version of yt-dlp may be available. Would you like to download it? (Y/n, default is 'Y'): ",
                true,
            )
    };
    // Not fatal: the URL lists are still useful without yt-dlp.
    if let Err(err) = ensure_tool(&fetcher, config.tool_path.as_std_path(), &mut confirm, sink) {
        warn!("{err}");
    }
}

fn print_manual_commands(config: &RunConfig, batches: &[PlannedBatch]) {
    println!("[*] Done! You can now run yt-dlp like this:");
    for batch in batches {
        let args = batch
            .plan
            .arguments(config)
            .into_iter()
            .map(|arg| format!("\"{arg}\""))
            .collect::<Vec<_>>()
            .join(" ");
        println!("  {} {args}", config.tool_path);
    }
}

fn prompt_yes_no(question: &str, default: bool) -> bool {
    print!("[*] {question}");
    let _ = io::stdout().flush();
    let mut input = String::new();
    if io::stdin().lock().read_line(&mut input).is_err() {
        return default;
    }
    match input.trim().to_lowercase().as_str() {
        "" => default,
        "y" | "yes" => true,
        _ => false,
    }
}
