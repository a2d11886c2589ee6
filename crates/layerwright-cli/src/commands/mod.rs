pub mod build;
pub mod catalog;
pub mod completions;
pub mod inspect;

use indicatif::{ProgressBar, ProgressStyle};
use layerwright_core::CoreError;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CATALOG_ERROR: u8 = 2;
pub const EXIT_STORE_ERROR: u8 = 3;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

/// Render a core error with the prefix `main` uses to choose an exit code.
pub fn describe(err: &CoreError) -> String {
    match err {
        CoreError::Catalog(e) => format!("catalog error: {e}"),
        CoreError::Plan(e) => format!("plan error: {e}"),
        CoreError::Store(e) => format!("store error: {e}"),
        other => other.to_string(),
    }
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    pb.set_style(style);
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn finish(pb: &ProgressBar, msg: String) {
    if let Ok(style) = ProgressStyle::with_template("{msg}") {
        pb.set_style(style);
    }
    pb.finish_with_message(msg);
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    finish(pb, format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    finish(pb, format!("✗ {msg}"));
}

/// `yes` in green or `no` dimmed.
pub fn colorize_flag(on: bool) -> String {
    use console::Style;
    if on {
        Style::new().green().apply_to("yes").to_string()
    } else {
        Style::new().dim().apply_to("no").to_string()
    }
}
