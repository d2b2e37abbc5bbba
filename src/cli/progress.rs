//! Terminal progress bar sink.

use std::io::{Stderr, Write};
use std::sync::Mutex;

use crate::progress::ProgressSink;
use crate::types::ProgressEvent;

const BAR_WIDTH: usize = 30;

/// `[█████░░░░░]  50% message` for one event.
pub fn render_bar(progress: f64, message: &str) -> String {
    let progress = progress.clamp(0.0, 1.0);
    let filled = ((BAR_WIDTH as f64) * progress) as usize;
    let bar: String = "█".repeat(filled) + &"░".repeat(BAR_WIDTH - filled);
    format!("[{bar}] {:3}% {message}", (progress * 100.0) as u32)
}

struct BarState<W> {
    out: W,
    last_percent: Option<u32>,
}

/// Redraws a single progress line; prints metadata too when verbose.
pub struct TerminalProgress<W = Stderr> {
    verbose: bool,
    state: Mutex<BarState<W>>,
}

impl TerminalProgress<Stderr> {
    pub fn stderr(verbose: bool) -> Self {
        Self::new(std::io::stderr(), verbose)
    }
}

impl<W: Write + Send> TerminalProgress<W> {
    pub fn new(out: W, verbose: bool) -> Self {
        Self {
            verbose,
            state: Mutex::new(BarState {
                out,
                last_percent: None,
            }),
        }
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        match self.state.into_inner() {
            Ok(state) => state.out,
            Err(poisoned) => poisoned.into_inner().out,
        }
    }
}

impl<W: Write + Send> ProgressSink for TerminalProgress<W> {
    fn report(&self, event: &ProgressEvent) {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let percent = (event.progress.clamp(0.0, 1.0) * 100.0) as u32;
        if !self.verbose && state.last_percent == Some(percent) {
            return;
        }
        state.last_percent = Some(percent);

        let mut line = format!("\r{}", render_bar(event.progress, &event.message));
        if event.progress >= 1.0 {
            line.push('\n');
        }
        if self.verbose && !event.metadata.is_empty() {
            if let Ok(metadata) = serde_json::to_string(&event.metadata) {
                line.push_str(&format!("\n  Metadata: {metadata}\n"));
            }
        }
        if let Err(e) = state.out.write_all(line.as_bytes()).and_then(|()| state.out.flush()) {
            tracing::debug!(error = %e, "Progress output failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_rendering() {
        assert_eq!(render_bar(0.0, "start"), format!("[{}]   0% start", "░".repeat(30)));
        assert_eq!(
            render_bar(0.5, "half"),
            format!("[{}{}]  50% half", "█".repeat(15), "░".repeat(15))
        );
        assert_eq!(render_bar(7.0, "done"), format!("[{}] 100% done", "█".repeat(30)));
    }

    #[test]
    fn repeated_percentages_are_skipped_unless_verbose() {
        let sink = TerminalProgress::new(Vec::new(), false);
        sink.report(&ProgressEvent::new("a", 0.2));
        sink.report(&ProgressEvent::new("b", 0.2));
        sink.report(&ProgressEvent::new("done", 1.0));
        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert!(out.contains(" a"));
        assert!(!out.contains(" b"));
        assert!(out.ends_with("done\n"));

        let sink = TerminalProgress::new(Vec::new(), true);
        sink.report(&ProgressEvent::new("a", 0.2).with("iteration", 1));
        sink.report(&ProgressEvent::new("b", 0.2));
        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert!(out.contains(" b"));
        assert!(out.contains("Metadata: {\"iteration\":1}"));
    }
}
