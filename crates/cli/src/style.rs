//! Shared styling utilities for CLI output.

use console::Style;

use docsync_core::DocumentState;

/// Create a success-styled string (green with checkmark).
pub fn success(msg: &str) -> String {
    let style = Style::new().green();
    format!("{} {}", style.apply_to("✓"), msg)
}

/// Create an error-styled string (red with cross).
pub fn error(msg: &str) -> String {
    let style = Style::new().red();
    format!("{} {}", style.apply_to("✗"), msg)
}

/// Create a warning-styled string (yellow).
pub fn warn(msg: &str) -> String {
    let style = Style::new().yellow();
    format!("{} {}", style.apply_to("⚠"), msg)
}

pub fn header(msg: &str) -> String {
    Style::new().bold().apply_to(msg).to_string()
}

pub fn dim(msg: &str) -> String {
    Style::new().dim().apply_to(msg).to_string()
}

/// Colored label for a document state.
pub fn state(state: DocumentState) -> String {
    let style = match state {
        DocumentState::Conflict | DocumentState::TwoWayConflict => Style::new().red().bold(),
        DocumentState::Modified => Style::new().yellow(),
        DocumentState::Read | DocumentState::Saved => Style::new().green(),
        _ => Style::new().dim(),
    };
    style.apply_to(state.to_string()).to_string()
}
