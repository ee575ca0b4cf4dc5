use std::io::IsTerminal;
use std::time::{Duration, Instant};

use anstyle::{AnsiColor, Effects, Style};
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};

/// How human-facing output is decorated. Stdout is reserved for the CI
/// result line, so everything rendered here goes to stderr.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutputStyle {
    Plain,
    Rich,
}

pub fn resolve_output_style(ci_mode: bool, stderr_is_terminal: bool) -> OutputStyle {
    if ci_mode || !stderr_is_terminal {
        OutputStyle::Plain
    } else {
        OutputStyle::Rich
    }
}

pub fn current_output_style(ci_mode: bool) -> OutputStyle {
    resolve_output_style(ci_mode, std::io::stderr().is_terminal())
}

pub fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => {
            let badge = match status {
                "ok" => "[OK]",
                "warn" => "[WARN]",
                "error" => "[ERR]",
                _ => "[..]",
            };
            format!("{badge} {message}")
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct TerminalRenderer {
    style: OutputStyle,
}

pub struct TerminalProgress {
    style: OutputStyle,
    label: String,
    total: Option<u64>,
    current: u64,
    progress_bar: Option<ProgressBar>,
    started_at: Instant,
}

impl TerminalRenderer {
    pub fn from_style(style: OutputStyle) -> Self {
        Self { style }
    }

    pub fn print_status(self, status: &str, message: &str) {
        eprintln!("{}", render_status_line(self.style, status, message));
    }

    /// Byte progress for a transfer whose size may not be known up front.
    pub fn start_progress(self, label: &str) -> TerminalProgress {
        let progress_bar = if self.style == OutputStyle::Rich {
            let progress_bar = ProgressBar::new(1);
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.cyan.bold} {msg:<12} [{bar:20.cyan/blue}] {bytes:>10}/{total_bytes:10} {bytes_per_sec} {eta}",
            ) {
                progress_bar.set_style(
                    style
                        .tick_chars(progress_tick_chars(label))
                        .progress_chars("=>-"),
                );
            }
            progress_bar.set_message(label.to_string());
            progress_bar.enable_steady_tick(Duration::from_millis(80));
            Some(progress_bar)
        } else {
            None
        };

        TerminalProgress {
            style: self.style,
            label: label.to_string(),
            total: None,
            current: 0,
            progress_bar,
            started_at: Instant::now(),
        }
    }
}

impl TerminalProgress {
    pub fn set(&mut self, current: u64, total: Option<u64>) {
        self.current = current;
        if total.is_some() {
            self.total = total;
        }

        let Some(progress_bar) = &self.progress_bar else {
            return;
        };

        let length = self.total.unwrap_or(self.current).max(1);
        progress_bar.set_length(length);
        progress_bar.set_position(self.current.min(length));
    }

    pub fn finish_success(mut self) {
        let Some(progress_bar) = self.progress_bar.take() else {
            return;
        };

        progress_bar.finish_and_clear();
        if let Some(line) = render_progress_line(
            self.style,
            &self.label,
            self.current,
            self.total.unwrap_or(self.current),
            Some(self.started_at.elapsed()),
        ) {
            eprintln!("{line}");
        }
    }

    pub fn finish_abandon(mut self) {
        if let Some(progress_bar) = self.progress_bar.take() {
            progress_bar.finish_and_clear();
        }
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let millis = elapsed.subsec_millis();
    format!("{secs}.{millis:03}s")
}

fn progress_tick_chars(label: &str) -> &'static str {
    match label {
        "package" => ".oO@* ",
        "language" => "<^>v ",
        _ => "|/-\\ ",
    }
}

fn progress_label_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightCyan.into()))
        .effects(Effects::BOLD)
}

fn progress_bar_style() -> Style {
    Style::new().fg_color(Some(AnsiColor::BrightBlue.into()))
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

pub fn render_progress_line(
    style: OutputStyle,
    label: &str,
    current: u64,
    total: u64,
    elapsed: Option<Duration>,
) -> Option<String> {
    if style == OutputStyle::Plain {
        return None;
    }

    let width = 18_usize;
    let safe_total = total.max(1);
    let bounded_current = current.min(safe_total);
    let filled = ((bounded_current * width as u64) / safe_total) as usize;
    let bar = format!(
        "{}{}",
        "=".repeat(filled),
        "-".repeat(width.saturating_sub(filled))
    );
    let percent = (bounded_current * 100) / safe_total;
    let counts = format!("{}/{}", HumanBytes(current), HumanBytes(total));
    let suffix = elapsed
        .map(|value| format!(" complete in {}", format_elapsed(value)))
        .unwrap_or_default();

    Some(format!(
        "{} [{}] {:>3}% {}{}",
        colorize(progress_label_style(), label),
        colorize(progress_bar_style(), &bar),
        percent,
        counts,
        suffix
    ))
}
