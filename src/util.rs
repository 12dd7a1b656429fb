use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use owo_colors::OwoColorize;
use std::sync::Arc;

/// Try to enable ANSI escape sequence support on Windows consoles.
/// Returns true if enabling succeeded (or platform likely already supports ANSI), false otherwise.
#[cfg(windows)]
pub fn try_enable_ansi_on_windows() -> bool {
    enable_ansi_support::enable_ansi_support().is_ok()
}

#[cfg(not(windows))]
pub fn try_enable_ansi_on_windows() -> bool {
    true
}

/// Convert a byte count into a human readable string using IEC units (KiB/MiB/GiB).
pub fn human_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    let b = bytes as f64;
    if b >= GB {
        format!("{:.2} GiB", b / GB)
    } else if b >= MB {
        format!("{:.2} MiB", b / MB)
    } else if b >= KB {
        format!("{:.2} KiB", b / KB)
    } else {
        format!("{} B", bytes)
    }
}

/// MultiProgress for per-transfer bars; hidden when `quiet`.
pub fn init_multi_progress(quiet: bool) -> Arc<MultiProgress> {
    let _ = try_enable_ansi_on_windows();
    Arc::new(if quiet {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    } else {
        MultiProgress::new()
    })
}

/// Bar for one token. Length is 100 because progress events carry percentages.
pub fn add_transfer_bar(mp: &MultiProgress, label: &str) -> ProgressBar {
    let pb = mp.add(ProgressBar::new(100));
    let style = ProgressStyle::with_template("{prefix:>8} [{bar:40.cyan/blue}] {pos:>3}% {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    pb.set_style(style);
    pb.set_prefix(label.to_string());
    pb
}

/// Outcome column for the summary: colored when the terminal supports it.
pub fn outcome_badge(label: &str) -> String {
    if !try_enable_ansi_on_windows() {
        return label.to_string();
    }
    match label {
        "completed" => label.green().to_string(),
        "cancelled" => label.yellow().to_string(),
        _ => label.red().to_string(),
    }
}

/// Print a concise summary line for a finished run.
pub fn print_summary(total_bytes: u64, elapsed_secs: f64, completed: usize, failed: usize, cancelled: usize) {
    let rate = if elapsed_secs > 0.0 {
        format!("{}/s", human_bytes((total_bytes as f64 / elapsed_secs) as u64))
    } else {
        "-".to_string()
    };
    println!(
        "{} completed, {} failed, {} cancelled | {} in {:.2}s ({})",
        completed,
        failed,
        cancelled,
        human_bytes(total_bytes),
        elapsed_secs,
        rate
    );
}
