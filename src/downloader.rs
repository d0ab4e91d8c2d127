use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::config::{CookieSource, RunConfig};
use crate::domain::{BatchOutcome, ContentReference, FailureDetail};
use crate::error::ArchiveError;
use crate::export::url_list_file_name;
use crate::failure::{FailureCategory, FailureExtractor};
use crate::ledger::LEDGER_FILE_NAME;
use crate::progress::ProgressState;
use crate::runner::CommandRunner;
use crate::skip;

pub const OUTPUT_TEMPLATE: &str = "%(upload_date)s_%(id)s_%(title).50B.%(ext)s";
pub const FLAT_LABEL: &str = "videos";

/// Paths for one collection run, computed once. The skip check and the
/// yt-dlp argv both read `ledger_path` from here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    pub label: String,
    pub dir: Utf8PathBuf,
    pub list_path: Utf8PathBuf,
    pub output_template: String,
    pub ledger_path: Utf8PathBuf,
}

impl BatchPlan {
    /// One directory per collection under the working directory.
    pub fn organized(config: &RunConfig, collection: &str) -> Self {
        let dir = config.work_dir.join(collection);
        Self {
            label: collection.to_string(),
            list_path: dir.join(url_list_file_name(collection)),
            output_template: dir.join(OUTPUT_TEMPLATE).into_string(),
            ledger_path: dir.join(LEDGER_FILE_NAME),
            dir,
        }
    }

    /// Everything straight into the working directory.
    pub fn flat(config: &RunConfig) -> Self {
        let dir = config.work_dir.clone();
        Self {
            label: FLAT_LABEL.to_string(),
            list_path: dir.join(&config.flat_list_name),
            output_template: dir.join(OUTPUT_TEMPLATE).into_string(),
            ledger_path: dir.join(LEDGER_FILE_NAME),
            dir,
        }
    }

    pub fn for_collection(config: &RunConfig, collection: &str) -> Self {
        if config.organize_by_collection {
            Self::organized(config, collection)
        } else {
            Self::flat(config)
        }
    }

    pub fn arguments(&self, config: &RunConfig) -> Vec<String> {
        let mut args = vec![
            "-a".to_string(),
            self.list_path.to_string(),
            "--output".to_string(),
            self.output_template.clone(),
            "--write-info-json".to_string(),
        ];
        if !config.skip_thumbnails {
            args.push("--write-thumbnail".to_string());
        }
        match &config.cookies {
            Some(CookieSource::File(path)) => {
                args.push("--cookies".to_string());
                args.push(path.to_string_lossy().to_string());
            }
            Some(CookieSource::Browser(browser)) => {
                args.push("--cookies-from-browser".to_string());
                args.push(browser.clone());
            }
            None => {}
        }
        if !config.disable_resume {
            args.push("--download-archive".to_string());
            args.push(self.ledger_path.to_string());
            args.push("--no-overwrites".to_string());
            args.push("--continue".to_string());
        }
        args
    }

    pub fn ledger_path(&self) -> &Utf8Path {
        &self.ledger_path
    }
}

/// Runs collections through yt-dlp one at a time.
pub struct Downloader<R: CommandRunner> {
    runner: R,
    failures: FailureExtractor,
}

impl<R: CommandRunner> Downloader<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            failures: FailureExtractor::new(),
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn run_batch(
        &mut self,
        plan: &BatchPlan,
        batch: &[ContentReference],
        config: &RunConfig,
        sink: &dyn ProgressSink,
    ) -> BatchOutcome {
        if batch.is_empty() {
            sink.event(ProgressEvent {
                message: format!("Skipping {}: Empty collection", plan.label),
                elapsed: None,
            });
            return BatchOutcome::skipped(&plan.label, 0);
        }

        if !config.disable_resume {
            let decision = skip::evaluate(batch, plan.ledger_path().as_std_path());
            if let Some(err) = &decision.warning {
                warn!(collection = %plan.label, "{err}; running downloader anyway");
            }
            debug!(collection = %plan.label, skip = decision.skip, reason = %decision.reason);
            if decision.skip {
                sink.event(ProgressEvent {
                    message: format!("Skipping {}: {}", plan.label, decision.reason),
                    elapsed: None,
                });
                return BatchOutcome::skipped(&plan.label, batch.len());
            }
            sink.event(ProgressEvent {
                message: format!("{}: {}", plan.label, decision.reason),
                elapsed: None,
            });
        }

        info!(collection = %plan.label, videos = batch.len(), "starting download");
        let args = plan.arguments(config);
        let mut progress = ProgressState::new(&plan.label, batch.len());
        let output = self
            .runner
            .run(config.tool_path.as_str(), &args, &mut progress);

        let failures = match output.status {
            Err(err @ ArchiveError::ProcessSpawn { .. }) => {
                warn!(collection = %plan.label, "{err}");
                all_failed(batch, &err)
            }
            status => {
                let mut failures = self.failures.extract(output.captured.lines(), batch);
                if let Err(err) = status {
                    warn!(collection = %plan.label, "{err}");
                    if failures.is_empty() {
                        failures.push(unreported_exit(&err));
                    }
                }
                failures
            }
        };

        let outcome = BatchOutcome::from_failures(&plan.label, batch.len(), failures);
        info!(collection = %plan.label, "{outcome}");
        outcome
    }
}

fn all_failed(batch: &[ContentReference], err: &ArchiveError) -> Vec<FailureDetail> {
    let message = err.to_string();
    batch
        .iter()
        .map(|entry| FailureDetail {
            video_id: entry.video_id.clone(),
            video_url: entry.link.clone(),
            message: message.clone(),
            category: FailureCategory::Other,
        })
        .collect()
}

fn unreported_exit(err: &ArchiveError) -> FailureDetail {
    let status = match err {
        ArchiveError::ProcessExit { status, .. } => status.clone(),
        other => other.to_string(),
    };
    FailureDetail {
        video_id: String::new(),
        video_url: String::new(),
        message: format!("downloader exited with {status} without reporting per-item errors"),
        category: FailureCategory::Other,
    }
}
