use regex::Regex;

use crate::progress::ProgressState;

const SKIP_MARKERS: &[&str] = &[
    "has already been downloaded",
    "has already been recorded in the archive",
];

const ERROR_MARKER: &str = "ERROR: [TikTok]";

// Routine yt-dlp chatter hidden while the status line is up.
const VERBOSE_MARKERS: &[&str] = &[
    "[generic] Extracting URL:",
    "[generic] ",
    ": Downloading webpage",
    "[redirect] Following redirect to",
    "[TikTok] Extracting URL:",
    "[info] ",
    ": Downloading 1 format(s):",
    "Video thumbnail is already present",
    "Video metadata is already present",
    "[download] 100%",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Progress { current: usize, total: usize },
    Skip,
    Error,
    Verbose,
    Passthrough,
}

/// What the stdout pump should do with a line after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAction {
    pub kind: LineKind,
    pub render: bool,
    pub echo: bool,
}

/// Line classifier for yt-dlp stdout. Stateless; counters live in the
/// caller's [`ProgressState`].
#[derive(Debug, Clone)]
pub struct OutputClassifier {
    progress: Regex,
}

impl OutputClassifier {
    pub fn new() -> Self {
        Self {
            progress: Regex::new(r"\[download\] Downloading item (\d+) of (\d+)").unwrap(),
        }
    }

    pub fn classify(&self, line: &str) -> LineKind {
        // Checked first so an error is never swallowed as noise.
        if line.contains(ERROR_MARKER) {
            return LineKind::Error;
        }
        if let Some(caps) = self.progress.captures(line) {
            if let (Ok(current), Ok(total)) = (caps[1].parse(), caps[2].parse()) {
                return LineKind::Progress { current, total };
            }
        }
        if SKIP_MARKERS.iter().any(|marker| line.contains(marker)) {
            return LineKind::Skip;
        }
        if is_verbose(line) {
            return LineKind::Verbose;
        }
        LineKind::Passthrough
    }

    /// Classifies `line`, folds it into `state`, and decides whether it is
    /// echoed. Nothing is hidden unless the status line is active.
    pub fn apply(&self, line: &str, state: &mut ProgressState, bar_active: bool) -> LineAction {
        let kind = self.classify(line);
        let (render, suppress) = match kind {
            LineKind::Progress { current, total } => {
                state.current = current;
                state.total = total;
                (true, true)
            }
            LineKind::Skip => {
                state.current += 1;
                state.success += 1;
                (true, true)
            }
            LineKind::Error => {
                state.failed += 1;
                (true, false)
            }
            LineKind::Verbose => (false, true),
            LineKind::Passthrough => (false, false),
        };
        LineAction {
            kind,
            render,
            echo: !(bar_active && suppress),
        }
    }
}

impl Default for OutputClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn is_verbose(line: &str) -> bool {
    if line.contains("ERROR:") || line.contains("WARNING:") {
        return false;
    }
    VERBOSE_MARKERS.iter().any(|marker| line.contains(marker))
}
