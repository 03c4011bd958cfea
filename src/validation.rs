use crate::{
    error::ValidationError,
    model::{DownloadFormat, DownloadRequest},
};
use std::path::PathBuf;

/// Locator lines split into the ones that will be downloaded and the ones
/// that do not look like playlists.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LocatorBatch {
    pub accepted: Vec<String>,
    pub rejected: Vec<String>,
}

pub fn is_playlist_locator(line: &str) -> bool {
    line.contains("playlist?list=") || line.contains("list=")
}

/// Splits free text into trimmed, non-blank lines and sorts them by validity.
pub fn parse_locators(text: &str) -> LocatorBatch {
    let mut batch = LocatorBatch::default();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if is_playlist_locator(line) {
            batch.accepted.push(line.to_string());
        } else {
            batch.rejected.push(line.to_string());
        }
    }
    batch
}

impl DownloadRequest {
    /// Builds a request from already-parsed locators and the raw folder field.
    pub fn new(
        locators: Vec<String>,
        format: DownloadFormat,
        destination: &str,
    ) -> Result<Self, ValidationError> {
        if locators.is_empty() {
            return Err(ValidationError::NoValidLocators);
        }
        let destination = destination.trim();
        if destination.is_empty() {
            return Err(ValidationError::MissingDestination);
        }
        Ok(Self {
            locators,
            format,
            destination: PathBuf::from(destination),
        })
    }
}
