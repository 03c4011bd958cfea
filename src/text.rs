use once_cell::sync::Lazy;
use regex::Regex;
use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

static COLOR_CODES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\x1b\[[0-9;]*m").unwrap());

/// Removes terminal color escape sequences from yt-dlp error output.
pub fn strip_color_codes(text: &str) -> String {
    COLOR_CODES.replace_all(text, "").into_owned()
}

/// Turns a playlist title into something usable as a single folder name.
/// Returns `None` when nothing printable is left.
pub fn folder_safe_name(title: &str) -> Option<String> {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_end_matches(['.', ' ']);
    match cleaned {
        "" | "." | ".." => None,
        name => Some(name.to_string()),
    }
}

/// Name used when the playlist title cannot be resolved.
///
/// Prefers the `list=` id so the same playlist maps to the same folder across
/// runs. Anything else falls back to a non-cryptographic hash of the locator.
pub fn fallback_playlist_name(locator: &str) -> String {
    if let Some(id) = list_id(locator) {
        return format!("Playlist_{id}");
    }
    let mut hasher = DefaultHasher::new();
    locator.hash(&mut hasher);
    format!("Playlist_{:016x}", hasher.finish())
}

/// Extracts the value of the `list=` query parameter.
pub fn list_id(locator: &str) -> Option<&str> {
    let start = locator.find("list=")? + "list=".len();
    let id = locator[start..].split(['&', '#']).next()?;
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then_some(id)
}
