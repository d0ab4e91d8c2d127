use std::io::{self, BufRead, BufReader, Stdout, Write};
use std::process::{Command, Stdio};
use std::thread;

use tracing::{debug, warn};

use crate::classify::OutputClassifier;
use crate::error::ArchiveError;
use crate::progress::{ProgressRenderer, ProgressState};

/// Every line the downloader printed, per stream, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl CapturedOutput {
    /// Stdout first, then stderr.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.stdout
            .iter()
            .chain(self.stderr.iter())
            .map(String::as_str)
    }
}

#[derive(Debug)]
pub struct RunOutput {
    pub captured: CapturedOutput,
    /// `ProcessSpawn` when the program never started, `ProcessExit` for a
    /// non-zero exit. The exit status is advisory; counts come from output.
    pub status: Result<(), ArchiveError>,
}

impl RunOutput {
    pub fn spawn_failed(err: ArchiveError) -> Self {
        Self {
            captured: CapturedOutput::default(),
            status: Err(err),
        }
    }
}

pub trait CommandRunner {
    fn run(&mut self, program: &str, args: &[String], progress: &mut ProgressState) -> RunOutput;
}

/// Runs the downloader as a child process, drives the live status line
/// from its stdout and mirrors its stderr.
pub struct SystemRunner<W: Write = Stdout> {
    renderer: ProgressRenderer<W>,
    classifier: OutputClassifier,
}

impl SystemRunner<Stdout> {
    pub fn new(disable_progress_bar: bool) -> Self {
        Self::with_renderer(ProgressRenderer::stdout(disable_progress_bar))
    }
}

impl<W: Write> SystemRunner<W> {
    pub fn with_renderer(renderer: ProgressRenderer<W>) -> Self {
        Self {
            renderer,
            classifier: OutputClassifier::new(),
        }
    }
}

impl<W: Write> CommandRunner for SystemRunner<W> {
    fn run(&mut self, program: &str, args: &[String], progress: &mut ProgressState) -> RunOutput {
        debug!(program, ?args, "spawning downloader");
        let mut child = match Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                return RunOutput::spawn_failed(ArchiveError::ProcessSpawn {
                    program: program.to_string(),
                    message: err.to_string(),
                });
            }
        };

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return RunOutput::spawn_failed(ArchiveError::ProcessIo(
                "child output pipes were not captured".to_string(),
            ));
        };

        let classifier = &self.classifier;
        let renderer = &mut self.renderer;
        let (stdout_lines, stderr_lines) = thread::scope(|scope| {
            let err_reader = scope.spawn(|| drain_stderr(BufReader::new(stderr), io::stderr()));
            let out_lines = pump_stdout(BufReader::new(stdout), classifier, progress, renderer);
            let err_lines = err_reader
                .join()
                .unwrap_or_else(|_| Err(ArchiveError::ProcessIo("stderr reader panicked".to_string())));
            (out_lines, err_lines)
        });

        let mut captured = CapturedOutput::default();
        let mut status = Ok(());
        match stdout_lines {
            Ok(lines) => captured.stdout = lines,
            Err(err) => status = Err(err),
        }
        match stderr_lines {
            Ok(lines) => captured.stderr = lines,
            Err(err) => status = status.and(Err(err)),
        }

        let exit = child
            .wait()
            .map_err(|err| ArchiveError::ProcessIo(err.to_string()));
        let _ = self.renderer.finish();

        match exit {
            Ok(code) if code.success() => {}
            Ok(code) => {
                status = status.and(Err(ArchiveError::ProcessExit {
                    program: program.to_string(),
                    status: code.to_string(),
                }));
            }
            Err(err) => status = status.and(Err(err)),
        }
        debug!(
            stdout = captured.stdout.len(),
            stderr = captured.stderr.len(),
            "downloader finished"
        );
        RunOutput { captured, status }
    }
}

/// Reads stdout line by line, folds each line into `state` and updates the
/// status line. Returns every line read, even after the console stops
/// accepting output.
pub fn pump_stdout<R, W>(
    mut reader: R,
    classifier: &OutputClassifier,
    state: &mut ProgressState,
    renderer: &mut ProgressRenderer<W>,
) -> Result<Vec<String>, ArchiveError>
where
    R: BufRead,
    W: Write,
{
    let mut lines = Vec::new();
    let mut console_ok = true;
    while let Some(line) = next_line(&mut reader)? {
        let action = classifier.apply(&line, state, renderer.is_enabled());
        if console_ok {
            let drawn = if action.echo {
                renderer.echo(&line, state)
            } else if action.render {
                renderer.render(state)
            } else {
                Ok(())
            };
            if let Err(err) = drawn {
                // Keep reading so the child never blocks on a full pipe.
                warn!("console output failed, hiding downloader output: {err}");
                renderer.disable();
                console_ok = false;
            }
        }
        lines.push(line);
    }
    Ok(lines)
}

/// Mirrors stderr to `echo` unchanged and keeps a copy of each line. A
/// failing `echo` stops the mirroring, not the capture.
pub fn drain_stderr<R, W>(mut reader: R, mut echo: W) -> Result<Vec<String>, ArchiveError>
where
    R: BufRead,
    W: Write,
{
    let mut lines = Vec::new();
    let mut echo_ok = true;
    while let Some(line) = next_line(&mut reader)? {
        if echo_ok {
            if let Err(err) = writeln!(echo, "{line}") {
                warn!("stderr mirror failed, capturing only: {err}");
                echo_ok = false;
            }
        }
        lines.push(line);
    }
    Ok(lines)
}

// Lossy so a stray non-UTF-8 title cannot end the read loop.
fn next_line<R: BufRead>(reader: &mut R) -> Result<Option<String>, ArchiveError> {
    let mut buf = Vec::new();
    let read = reader
        .read_until(b'\n', &mut buf)
        .map_err(|err| ArchiveError::ProcessIo(err.to_string()))?;
    if read == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(&buf);
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn pump_counts_and_captures_every_line() {
        let text = "[download] Downloading item 1 of 3\n\
                    [TikTok] 1: Downloading webpage\n\
                    [download] a.mp4 has already been downloaded\n\
                    ERROR: [TikTok] 2: Video not available\r\n\
                    plain line";
        let mut state = ProgressState::new("favorites", 3);
        let mut renderer = ProgressRenderer::new(Vec::new(), false);
        let lines = pump_stdout(
            Cursor::new(text),
            &OutputClassifier::new(),
            &mut state,
            &mut renderer,
        )
        .unwrap();

        assert_eq!(lines.len(), 5);
        assert_eq!(lines[3], "ERROR: [TikTok] 2: Video not available");
        assert_eq!((state.current, state.success, state.failed), (2, 1, 1));

        let echoed = String::from_utf8(renderer.into_inner()).unwrap();
        assert_eq!(echoed.lines().count(), 5);
    }

    #[test]
    fn pump_hides_noise_behind_active_bar() {
        let text = "[TikTok] 1: Downloading webpage\nERROR: [TikTok] 1: boom\n";
        let mut state = ProgressState::new("favorites", 1);
        let mut renderer = ProgressRenderer::new(Vec::new(), true);
        pump_stdout(
            Cursor::new(text),
            &OutputClassifier::new(),
            &mut state,
            &mut renderer,
        )
        .unwrap();
        let written = String::from_utf8(renderer.into_inner()).unwrap();
        assert!(!written.contains("Downloading webpage"));
        assert!(written.contains("ERROR: [TikTok] 1: boom\n"));
    }

    #[test]
    fn pump_survives_invalid_utf8() {
        let bytes = b"title \xff\xfe here\n".to_vec();
        let mut state = ProgressState::default();
        let mut renderer = ProgressRenderer::new(Vec::new(), false);
        let lines = pump_stdout(
            Cursor::new(bytes),
            &OutputClassifier::new(),
            &mut state,
            &mut renderer,
        )
        .unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("title "));
    }

    #[test]
    fn drain_echoes_verbatim() {
        let mut echo = Vec::new();
        let lines = drain_stderr(Cursor::new("WARNING: slow\nERROR: x\n"), &mut echo).unwrap();
        assert_eq!(lines, vec!["WARNING: slow", "ERROR: x"]);
        assert_eq!(String::from_utf8(echo).unwrap(), "WARNING: slow\nERROR: x\n");
    }

    #[test]
    fn captured_lines_are_stdout_then_stderr() {
        let captured = CapturedOutput {
            stdout: vec!["a".to_string()],
            stderr: vec!["b".to_string(), "c".to_string()],
        };
        assert_eq!(captured.lines().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    #[test]
    fn pump_keeps_every_line_when_console_is_gone() {
        let text = "ERROR: [TikTok] 1: Private video\n\
                    [download] Downloading item 2 of 2\n\
                    ERROR: [TikTok] 2: Private video\n";
        for bar in [false, true] {
            let mut state = ProgressState::new("favorites", 2);
            let mut renderer = ProgressRenderer::new(ClosedPipe, bar);
            let lines = pump_stdout(
                Cursor::new(text),
                &OutputClassifier::new(),
                &mut state,
                &mut renderer,
            )
            .unwrap();

            assert_eq!(lines.len(), 3);
            assert_eq!(lines[2], "ERROR: [TikTok] 2: Private video");
            assert_eq!((state.current, state.failed), (2, 2));
            assert!(!renderer.is_enabled());
            assert!(renderer.finish().is_ok());
        }
    }

    #[test]
    fn drain_keeps_every_line_when_echo_fails() {
        let lines = drain_stderr(
            Cursor::new("ERROR: [TikTok] 1: Private video\nERROR: [TikTok] 2: boom\n"),
            ClosedPipe,
        )
        .unwrap();
        assert_eq!(
            lines,
            vec!["ERROR: [TikTok] 1: Private video", "ERROR: [TikTok] 2: boom"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn child_streams_are_drained_together() {
        // Enough stderr to fill the pipe several times over before stdout
        // says anything.
        let script = r#"
            i=0
            while [ $i -lt 20000 ]; do echo "noise line $i" >&2; i=$((i + 1)); done
            echo '[download] Downloading item 1 of 2'
            echo '[download] a.mp4 has already been downloaded'
            echo 'ERROR: [TikTok] 2: Private video'
            echo 'ERROR: [TikTok] 2: Private video' >&2
            exit 1
        "#;
        let mut runner = SystemRunner::with_renderer(ProgressRenderer::new(Vec::new(), false));
        let mut state = ProgressState::new("favorites", 2);
        let output = runner.run("sh", &["-c".to_string(), script.to_string()], &mut state);

        assert_eq!(output.captured.stdout.len(), 3);
        assert_eq!(output.captured.stderr.len(), 20_001);
        assert_eq!(output.captured.stderr[0], "noise line 0");
        assert_eq!(
            output.captured.stderr.last().map(String::as_str),
            Some("ERROR: [TikTok] 2: Private video")
        );
        assert_eq!(
            (state.current, state.total, state.success, state.failed),
            (2, 2, 1, 1)
        );
        assert_matches!(
            output.status,
            Err(ArchiveError::ProcessExit { program, status }) if program == "sh" && status.contains('1')
        );
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let mut runner = SystemRunner::new(true);
        let mut state = ProgressState::default();
        let output = runner.run(
            "definitely-not-a-real-downloader-binary",
            &[],
            &mut state,
        );
        assert!(output.captured.stdout.is_empty());
        assert_matches!(output.status, Err(ArchiveError::ProcessSpawn { .. }));
    }
}
