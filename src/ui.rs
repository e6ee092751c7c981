//! Startup stage display for the binaries.
//!
//! In a terminal each stage gets an `indicatif` spinner that resolves to a
//! check mark with its duration. Elsewhere (pipes, CI, `--ui plain`) stages are
//! printed as plain `==>` lines on stderr.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::time::{Duration, Instant};

use crate::session::SessionSnapshot;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum UiMode {
    #[default]
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        let pretty = match mode {
            UiMode::Pretty => is_tty,
            UiMode::Auto => is_tty && std::env::var_os("NO_COLOR").is_none(),
            UiMode::Plain => false,
        };
        Self { pretty }
    }

    /// Mode resolved against whether stderr is a terminal.
    pub fn detect(mode: UiMode) -> Self {
        Self::new(mode, std::io::stderr().is_terminal())
    }

    pub fn is_pretty(&self) -> bool {
        self.pretty
    }

    /// Start a stage; it is reported finished when the guard drops.
    pub fn stage(&self, name: &str) -> StageGuard {
        if !self.pretty {
            eprintln!("==> {}", name);
            return StageGuard::new(name, None);
        }
        let spinner = ProgressBar::new_spinner();
        spinner.set_draw_target(ProgressDrawTarget::stderr());
        spinner.enable_steady_tick(Duration::from_millis(120));
        let style = ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.set_message(format!("{name}…"));
        StageGuard::new(name, Some(spinner))
    }

    /// Print a one-line session summary on stderr.
    pub fn status(&self, snapshot: &SessionSnapshot) {
        eprintln!("{}", status_line(snapshot));
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
    failed: bool,
}

impl StageGuard {
    fn new(name: &str, spinner: Option<ProgressBar>) -> Self {
        Self {
            name: name.to_string(),
            start: Instant::now(),
            spinner,
            failed: false,
        }
    }

    /// Mark the stage as failed; the final line shows a cross instead.
    pub fn fail(mut self) {
        self.failed = true;
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let mark = if self.failed { "✘" } else { "✔" };
        let message = format!(
            "{} {} ({})",
            mark,
            self.name,
            format_duration(self.start.elapsed())
        );
        match &self.spinner {
            Some(spinner) => spinner.finish_with_message(message),
            None => eprintln!("{message}"),
        }
    }
}

pub fn status_line(snapshot: &SessionSnapshot) -> String {
    let state = if !snapshot.running {
        "stopped"
    } else if snapshot.paused {
        "paused"
    } else {
        "live"
    };
    let zone = match (&snapshot.zone.committed, snapshot.zone.in_progress.len()) {
        (Some(_), _) => "zone set".to_string(),
        (None, 0) => "no zone".to_string(),
        (None, n) => format!("zone {}/4", n),
    };
    let mut line = format!(
        "[{}] {} | {} box(es) | persons {} | violations {}",
        state,
        zone,
        snapshot.detections.len(),
        snapshot.summary.persons,
        snapshot.summary.violations
    );
    if snapshot.person_alert.visible {
        line.push_str(&format!(
            " | PERSON IN ZONE ({})",
            snapshot.person_alert.count
        ));
    }
    if snapshot.violation_alert.visible {
        line.push_str(&format!(
            " | PPE VIOLATION ({})",
            snapshot.violation_alert.count
        ));
    }
    if let Some(error) = &snapshot.error {
        line.push_str(&format!(" | error: {}", error));
    }
    line
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_mode_never_pretty() {
        assert!(!Ui::new(UiMode::Plain, true).is_pretty());
        assert!(!Ui::new(UiMode::Pretty, false).is_pretty());
        assert!(Ui::new(UiMode::Pretty, true).is_pretty());
    }

    #[test]
    fn durations_switch_units_at_one_second() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }
}
