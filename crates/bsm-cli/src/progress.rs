//! Terminal rendering of download progress.
//!
//! Uses an indicatif bar on a terminal and throttled single-line updates
//! otherwise. Steam progress arrives in percent, Oculus downloads in bytes and
//! Oculus verification in files, so the printer is told which unit it shows.

use std::io::{self, IsTerminal, Write};
use std::time::{Duration, Instant};

use indicatif::{HumanBytes, ProgressBar, ProgressDrawTarget, ProgressState, ProgressStyle};

/// Resolution used to show a percentage on an integer bar.
const PERCENT_SCALE: u64 = 10_000;

/// Minimum delay between two plain-mode lines.
const PLAIN_INTERVAL: Duration = Duration::from_millis(500);

const MAX_LABEL: usize = 40;

/// What the progress numbers count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressUnit {
    Bytes,
    Files,
    Percent,
}

/// Progress display that picks terminal or plain output.
pub struct CliProgressPrinter {
    unit: ProgressUnit,
    render: Render,
}

enum Render {
    Bar(BarProgress),
    Plain(PlainProgress),
}

impl CliProgressPrinter {
    pub fn new(unit: ProgressUnit) -> Self {
        let render = if io::stderr().is_terminal() {
            Render::Bar(BarProgress::new(unit))
        } else {
            Render::Plain(PlainProgress::new())
        };
        Self { unit, render }
    }

    /// Show `current` of `total` in the printer's unit.
    pub fn update(&mut self, label: Option<&str>, current: u64, total: u64) {
        let unit = self.unit;
        match &mut self.render {
            Render::Bar(bar) => bar.update(label, current, total),
            Render::Plain(plain) => plain.update(unit, label, current, total),
        }
    }

    /// Show a percentage in `[0, 100]`.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn update_percent(&mut self, percent: f64) {
        let scaled = (percent.clamp(0.0, 100.0) / 100.0 * PERCENT_SCALE as f64).round() as u64;
        self.update(None, scaled, PERCENT_SCALE);
    }

    /// Print a line without tearing the bar.
    pub fn println(&self, line: impl AsRef<str>) {
        match &self.render {
            Render::Bar(bar) => bar.bar.println(line.as_ref()),
            Render::Plain(_) => eprintln!("{}", line.as_ref()),
        }
    }

    /// Hide the bar while `f` runs, e.g. to read a prompt.
    pub fn suspend<R>(&self, f: impl FnOnce() -> R) -> R {
        match &self.render {
            Render::Bar(bar) => bar.bar.suspend(f),
            Render::Plain(_) => f(),
        }
    }

    pub fn finish(&mut self) {
        match &mut self.render {
            Render::Bar(bar) => bar.bar.finish_and_clear(),
            Render::Plain(plain) => plain.finish(),
        }
    }
}

// ============================================================================
// Terminal bar
// ============================================================================

struct BarProgress {
    bar: ProgressBar,
    unit: ProgressUnit,
    has_length: bool,
    last_label: Option<String>,
}

impl BarProgress {
    fn new(unit: ProgressUnit) -> Self {
        let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
        bar.set_style(spinner_style());
        bar.set_message("Starting");
        bar.enable_steady_tick(Duration::from_millis(120));
        Self {
            bar,
            unit,
            has_length: false,
            last_label: None,
        }
    }

    fn update(&mut self, label: Option<&str>, current: u64, total: u64) {
        if total == 0 {
            self.bar.tick();
            return;
        }
        if let Some(label) = label.filter(|l| !l.is_empty())
            && self.last_label.as_deref() != Some(label)
        {
            self.bar.set_message(format_label(label));
            self.last_label = Some(label.to_string());
        }
        if !self.has_length {
            self.bar.set_style(bar_style(self.unit));
            if self.last_label.is_none() {
                self.bar.set_message(String::new());
            }
            self.has_length = true;
        }
        if self.bar.length() != Some(total) {
            self.bar.set_length(total);
        }
        self.bar.set_position(current.min(total));
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn bar_style(unit: ProgressUnit) -> ProgressStyle {
    let template = match unit {
        ProgressUnit::Bytes => {
            "{bar:28.cyan/blue} {human_pos:>9} / {human_len:>9} ({percent:>3}%) @ {binary_bytes_per_sec} ETA {eta} {msg}"
        }
        ProgressUnit::Files => "{bar:28.cyan/blue} {pos}/{len} files {msg}",
        ProgressUnit::Percent => "{bar:28.cyan/blue} {scaled_percent:>6}% ETA {eta} {msg}",
    };
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .with_key("human_pos", |state: &ProgressState, w: &mut dyn std::fmt::Write| {
            let _ = write!(w, "{}", HumanBytes(state.pos()));
        })
        .with_key("human_len", |state: &ProgressState, w: &mut dyn std::fmt::Write| {
            let value = state
                .len()
                .map_or_else(|| "?".to_string(), |len| HumanBytes(len).to_string());
            let _ = write!(w, "{value}");
        })
        .with_key("scaled_percent", |state: &ProgressState, w: &mut dyn std::fmt::Write| {
            let _ = write!(w, "{:.1}", state.fraction() * 100.0);
        })
}

fn format_label(raw: &str) -> String {
    if raw.chars().count() <= MAX_LABEL {
        return raw.to_string();
    }
    // Keep the tail: file names are more telling than their directories
    let skip = raw.chars().count() - (MAX_LABEL - 1);
    let mut buf = String::from('…');
    buf.extend(raw.chars().skip(skip));
    buf
}

// ============================================================================
// Plain output
// ============================================================================

struct PlainProgress {
    last_emit: Option<Instant>,
    last_percent: Option<u64>,
}

impl PlainProgress {
    const fn new() -> Self {
        Self {
            last_emit: None,
            last_percent: None,
        }
    }

    fn update(&mut self, unit: ProgressUnit, label: Option<&str>, current: u64, total: u64) {
        let now = Instant::now();
        let done = total > 0 && current >= total;
        if !done && self.last_emit.is_some_and(|at| now.duration_since(at) < PLAIN_INTERVAL) {
            return;
        }
        let percent = whole_percent(current, total);
        if self.last_percent == Some(percent) {
            return;
        }
        self.last_emit = Some(now);
        self.last_percent = Some(percent);

        let line = plain_line(unit, label, current, total);
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "{line}");
    }

    fn finish(&mut self) {
        self.last_emit = None;
        self.last_percent = None;
    }
}

fn whole_percent(current: u64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    current.min(total).saturating_mul(100) / total
}

fn plain_line(unit: ProgressUnit, label: Option<&str>, current: u64, total: u64) -> String {
    let percent = whole_percent(current, total);
    let mut line = match unit {
        ProgressUnit::Bytes => format!(
            "{} / {} ({percent}%)",
            HumanBytes(current),
            HumanBytes(total)
        ),
        ProgressUnit::Files => format!("{current}/{total} files ({percent}%)"),
        ProgressUnit::Percent => format!("{percent}%"),
    };
    if let Some(label) = label.filter(|l| !l.is_empty()) {
        line.push_str(" [");
        line.push_str(&format_label(label));
        line.push(']');
    }
    line
}
