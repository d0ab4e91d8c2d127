use std::io::{self, Stdout, Write};

use crossterm::style::Stylize;
use crossterm::tty::IsTty;

const BAR_WIDTH: usize = 20;

/// Live counters for the collection currently being downloaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressState {
    pub label: String,
    pub current: usize,
    pub total: usize,
    pub success: usize,
    pub failed: usize,
}

impl ProgressState {
    pub fn new(label: impl Into<String>, total: usize) -> Self {
        Self {
            label: label.into(),
            total,
            ..Self::default()
        }
    }

    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.current as f64 / self.total as f64 * 100.0
    }
}

/// Single overwriting status line, e.g.
/// `Downloading favorites (87/92) | ██████████████████░░ 94.6% | Success: 85 | Failed: 2`.
///
/// Every call is a no-op when the renderer is disabled.
pub struct ProgressRenderer<W: Write> {
    out: W,
    enabled: bool,
    last_width: usize,
}

impl ProgressRenderer<Stdout> {
    /// Enabled only when stdout is a terminal that understands ANSI and the
    /// user has not turned the bar off.
    pub fn stdout(disabled_by_user: bool) -> Self {
        Self::new(io::stdout(), !disabled_by_user && supports_ansi())
    }
}

impl<W: Write> ProgressRenderer<W> {
    pub fn new(out: W, enabled: bool) -> Self {
        Self {
            out,
            enabled,
            last_width: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Stops drawing the status line for good.
    pub fn disable(&mut self) {
        self.enabled = false;
        self.last_width = 0;
    }

    pub fn render(&mut self, state: &ProgressState) -> io::Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let percentage = state.percentage();
        let filled = ((BAR_WIDTH as f64 * percentage / 100.0) as usize).min(BAR_WIDTH);
        let bar = format!("{}{}", "█".repeat(filled), "░".repeat(BAR_WIDTH - filled));

        let mut line = format!(
            "Downloading {} ({}/{}) | {bar} {percentage:.1}% | {} | {}",
            state.label,
            state.current,
            state.total,
            format!("Success: {}", state.success).green(),
            format!("Failed: {}", state.failed).red(),
        );

        let width = visible_width(&line);
        if width < self.last_width {
            line.push_str(&" ".repeat(self.last_width - width));
        }
        self.last_width = width.max(self.last_width);

        write!(self.out, "\r{line}")?;
        self.out.flush()
    }

    pub fn clear(&mut self) -> io::Result<()> {
        if !self.enabled || self.last_width == 0 {
            return Ok(());
        }
        write!(self.out, "\r{}\r", " ".repeat(self.last_width))?;
        self.last_width = 0;
        self.out.flush()
    }

    /// Writes a regular output line. With the bar active the bar is erased
    /// first and redrawn underneath.
    pub fn echo(&mut self, line: &str, state: &ProgressState) -> io::Result<()> {
        self.clear()?;
        writeln!(self.out, "{line}")?;
        self.render(state)
    }

    /// Ends the status line so following output starts on a fresh row.
    pub fn finish(&mut self) -> io::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        self.clear()?;
        writeln!(self.out)?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

pub fn supports_ansi() -> bool {
    detect_ansi(io::stdout().is_tty(), |key| std::env::var(key).ok())
}

/// Conservative: anything not positively identified as an ANSI terminal is
/// treated as plain output.
pub fn detect_ansi<F>(is_tty: bool, env: F) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    if !is_tty {
        return false;
    }
    if let Some(term) = env("TERM") {
        if !term.is_empty() && term != "dumb" {
            return true;
        }
    }
    if env("WT_SESSION").is_some_and(|value| !value.is_empty()) {
        return true;
    }
    env("ConEmuANSI").as_deref() == Some("ON")
}

// Column count, ignoring CSI escape sequences.
fn visible_width(text: &str) -> usize {
    let mut width = 0;
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\x1b' && chars.peek() == Some(&'[') {
            chars.next();
            for next in chars.by_ref() {
                if ('@'..='~').contains(&next) {
                    break;
                }
            }
            continue;
        }
        width += 1;
    }
    width
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn output(renderer: ProgressRenderer<Vec<u8>>) -> String {
        String::from_utf8(renderer.into_inner()).unwrap()
    }

    fn strip(text: &str) -> String {
        let mut plain = String::new();
        let mut chars = text.chars().peekable();
        while let Some(ch) = chars.next() {
            if ch == '\x1b' && chars.peek() == Some(&'[') {
                chars.next();
                for next in chars.by_ref() {
                    if ('@'..='~').contains(&next) {
                        break;
                    }
                }
                continue;
            }
            plain.push(ch);
        }
        plain
    }

    #[test]
    fn render_formats_counts_and_bar() {
        let mut renderer = ProgressRenderer::new(Vec::new(), true);
        let state = ProgressState {
            label: "favorites".to_string(),
            current: 5,
            total: 10,
            success: 4,
            failed: 1,
        };
        renderer.render(&state).unwrap();
        let plain = strip(&output(renderer));
        assert_eq!(
            plain,
            "\rDownloading favorites (5/10) | ██████████░░░░░░░░░░ 50.0% | Success: 4 | Failed: 1"
        );
    }

    #[test]
    fn render_zero_total_and_overflow() {
        let mut renderer = ProgressRenderer::new(Vec::new(), true);
        renderer.render(&ProgressState::new("liked", 0)).unwrap();
        let mut over = ProgressState::new("liked", 2);
        over.current = 5;
        renderer.render(&over).unwrap();
        let plain = strip(&output(renderer));
        assert!(plain.contains("░░░░░░░░░░░░░░░░░░░░ 0.0%"));
        assert!(plain.contains("████████████████████ 250.0%"));
    }

    #[test]
    fn shorter_line_is_padded() {
        let mut renderer = ProgressRenderer::new(Vec::new(), true);
        let mut state = ProgressState::new("favorites", 100);
        state.current = 100;
        state.success = 1000;
        renderer.render(&state).unwrap();
        let first_width = renderer.last_width;
        state.current = 1;
        state.success = 1;
        renderer.render(&state).unwrap();
        assert_eq!(renderer.last_width, first_width);
        let plain = strip(&output(renderer));
        let second = plain.rsplit('\r').next().unwrap();
        assert_eq!(second.chars().count(), first_width);
        assert!(second.ends_with(' '));
    }

    #[test]
    fn clear_is_noop_before_render() {
        let mut renderer = ProgressRenderer::new(Vec::new(), true);
        renderer.clear().unwrap();
        assert!(output(renderer).is_empty());
    }

    #[test]
    fn clear_blanks_last_line() {
        let mut renderer = ProgressRenderer::new(Vec::new(), true);
        renderer.render(&ProgressState::new("x", 1)).unwrap();
        let width = renderer.last_width;
        renderer.clear().unwrap();
        assert_eq!(renderer.last_width, 0);
        let text = output(renderer);
        assert!(text.ends_with(&format!("\r{}\r", " ".repeat(width))));
    }

    #[test]
    fn disabled_renderer_writes_nothing() {
        let mut renderer = ProgressRenderer::new(Vec::new(), false);
        renderer.render(&ProgressState::new("x", 3)).unwrap();
        renderer.clear().unwrap();
        renderer.finish().unwrap();
        assert!(output(renderer).is_empty());
    }

    #[test]
    fn echo_passes_lines_through_when_disabled() {
        let mut renderer = ProgressRenderer::new(Vec::new(), false);
        renderer.echo("hello", &ProgressState::new("x", 3)).unwrap();
        assert_eq!(output(renderer), "hello\n");
    }

    #[test]
    fn echo_redraws_bar_after_line() {
        let mut renderer = ProgressRenderer::new(Vec::new(), true);
        let state = ProgressState::new("x", 3);
        renderer.render(&state).unwrap();
        renderer.echo("hello", &state).unwrap();
        let plain = strip(&output(renderer));
        let (_, after) = plain.split_once("hello\n").unwrap();
        assert!(after.starts_with("\rDownloading x (0/3)"));
    }

    #[test]
    fn detect_ansi_rules() {
        let env = |vars: &[(&str, &str)]| {
            let map = vars
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>();
            move |key: &str| map.get(key).cloned()
        };
        assert!(!detect_ansi(false, env(&[("TERM", "xterm-256color")])));
        assert!(detect_ansi(true, env(&[("TERM", "xterm-256color")])));
        assert!(!detect_ansi(true, env(&[("TERM", "dumb")])));
        assert!(detect_ansi(true, env(&[("WT_SESSION", "abc")])));
        assert!(detect_ansi(true, env(&[("ConEmuANSI", "ON")])));
        assert!(!detect_ansi(true, env(&[("ConEmuANSI", "OFF")])));
        assert!(!detect_ansi(true, env(&[])));
    }
}
