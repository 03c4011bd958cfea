use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while running a batch download.
#[derive(Debug, Error)]
pub enum DownloaderError {
    #[error("failed to create folder {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The external binary could not be started at all.
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The external binary ran but reported a failure.
    #[error("{0}")]
    Extractor(String),

    #[error("could not parse yt-dlp output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Reasons a submission is refused before any work starts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please enter at least one YouTube playlist URL")]
    NoLocators,
    #[error("Please enter valid YouTube playlist URLs")]
    NoValidLocators,
    #[error("Please select an output folder")]
    MissingDestination,
}
