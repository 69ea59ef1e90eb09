// src/status/description.rs

use std::error::Error;

/// Human-readable summary of a run's failures.
///
/// Task errors render as `"<task> failed: <message>"`; entries are joined
/// with `"; "` and the first character is upper-cased.
pub fn format_last_err_description(causes: &[&(dyn Error + 'static)]) -> String {
    let joined = causes
        .iter()
        .map(|err| err.to_string())
        .collect::<Vec<_>>()
        .join("; ");
    capitalize(&joined)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
