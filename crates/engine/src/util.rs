//! Internal helpers for input normalization.
//!
//! These utilities are **not** part of the public API.

use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

use crate::{EngineError, ResultEngine};

/// Trim a required display name and collapse inner whitespace.
pub(crate) fn normalize_required_name(value: &str, label: &str) -> ResultEngine<String> {
    let display = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if display.is_empty() {
        return Err(EngineError::InvalidName(format!(
            "{label} name must not be empty"
        )));
    }
    Ok(display)
}

pub(crate) fn normalize_optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// Build the lookup key for a name: accents and case are dropped and any run
/// of non alphanumeric characters becomes a single space.
pub(crate) fn normalize_name_key(value: &str) -> ResultEngine<String> {
    let mut out = String::new();
    let mut prev_space = false;
    for ch in value.trim().nfkd() {
        if is_combining_mark(ch) {
            continue;
        }
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
            prev_space = false;
        } else if !out.is_empty() && !prev_space {
            out.push(' ');
            prev_space = true;
        }
    }
    let normalized = out.trim_end();
    if normalized.is_empty() {
        return Err(EngineError::InvalidName(format!(
            "'{value}' has no usable characters"
        )));
    }
    Ok(normalized.to_string())
}
