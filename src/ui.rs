//! Terminal progress reporting and status-line formatting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::frame::FrameValidity;

/// Wait-phase status line for the daemon log.
pub fn status_line(
    waited: Duration,
    interval: Duration,
    uptime: Duration,
    validity: FrameValidity,
) -> String {
    let frame = match validity {
        FrameValidity::Valid => "valid",
        FrameValidity::Unknown => "unknown",
        FrameValidity::Invalid => "invalid",
    };
    format!(
        "waited {}s/{}s | uptime {} | frame {}",
        waited.as_secs(),
        interval.as_secs(),
        format_uptime(uptime),
        frame,
    )
}

fn format_uptime(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}h{:02}m{:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}

#[derive(Clone, Copy, Debug)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    pub fn from_flag(ui_flag: Option<&str>, is_tty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty)
    }

    fn use_pretty(&self) -> bool {
        match self.mode {
            UiMode::Pretty => true,
            UiMode::Auto => self.is_tty,
            UiMode::Plain => false,
        }
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Wait out an interval, one-second granularity, stopping early when
    /// the flag is raised. Shows a countdown bar on a TTY.
    pub fn countdown(&self, name: &str, total: Duration, stop: &AtomicBool) {
        let seconds = total.as_secs();
        let bar = if self.use_pretty() && seconds > 0 {
            let bar = ProgressBar::new(seconds);
            bar.set_draw_target(ProgressDrawTarget::stderr());
            let style = ProgressStyle::with_template("{msg} [{bar:30}] {pos}/{len}s")
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar.set_message(name.to_string());
            Some(bar)
        } else {
            eprintln!("==> {} ({}s)", name, seconds);
            None
        };

        let started = Instant::now();
        while started.elapsed() < total {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            std::thread::sleep(Duration::from_secs(1).min(total.saturating_sub(started.elapsed())));
            if let Some(bar) = &bar {
                bar.set_position(started.elapsed().as_secs().min(seconds));
            }
        }
        if let Some(bar) = bar {
            bar.finish_and_clear();
        }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
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
    fn plain_mode_never_uses_pretty() {
        let ui = Ui::from_flag(Some("plain"), true);
        assert!(!ui.use_pretty());
    }

    #[test]
    fn auto_mode_follows_tty() {
        assert!(Ui::from_flag(None, true).use_pretty());
        assert!(!Ui::from_flag(None, false).use_pretty());
    }

    #[test]
    fn status_line_reports_wait_uptime_and_validity() {
        let line = status_line(
            Duration::from_secs(42),
            Duration::from_secs(120),
            Duration::from_secs(3665),
            FrameValidity::Valid,
        );
        assert_eq!(line, "waited 42s/120s | uptime 1h01m05s | frame valid");

        let line = status_line(
            Duration::from_secs(0),
            Duration::from_secs(120),
            Duration::from_secs(5),
            FrameValidity::Invalid,
        );
        assert!(line.ends_with("frame invalid"));
    }

    #[test]
    fn countdown_honors_stop_flag() {
        let ui = Ui::new(UiMode::Plain, false);
        let stop = AtomicBool::new(true);
        let started = Instant::now();
        ui.countdown("wait", Duration::from_secs(5), &stop);
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
