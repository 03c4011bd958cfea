use std::{fmt, path::PathBuf};

/// Output format picked in the format combo
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadFormat {
    /// Best video + audio merged into an mp4 container
    #[default]
    Mp4,
    /// Audio only, transcoded to mp3 when ffmpeg is available
    Mp3,
}

impl DownloadFormat {
    pub const ALL: [DownloadFormat; 2] = [DownloadFormat::Mp4, DownloadFormat::Mp3];

    pub fn is_audio(self) -> bool {
        matches!(self, DownloadFormat::Mp3)
    }
}

impl fmt::Display for DownloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DownloadFormat::Mp4 => "mp4",
            DownloadFormat::Mp3 => "mp3",
        })
    }
}

/// A validated batch submitted from the UI. Never mutated once built.
#[derive(Clone, Debug)]
pub struct DownloadRequest {
    /// Playlist locators in the order they were entered
    pub locators: Vec<String>,
    pub format: DownloadFormat,
    /// Root folder; every playlist gets its own subfolder below it
    pub destination: PathBuf,
}

/// Who a log line belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogTarget {
    /// Not tied to any playlist
    System,
    /// Display name of a playlist run
    Playlist(String),
}

/// Progress after a video attempt starts
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// 1-based index of the video being attempted
    pub current: usize,
    pub total: usize,
    pub percent: u8,
    pub playlist: String,
}

/// Final outcome of a whole run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunOutcome {
    pub success: bool,
    pub message: String,
}

/// Messages streamed from the background download task to the UI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DownloaderEvent {
    PlaylistStarted {
        name: String,
        total: usize,
        thumbnail: Option<String>,
    },
    Progress(ProgressUpdate),
    Log { message: String, target: LogTarget },
    /// Always the last event of a run
    Finished(RunOutcome),
}

/// Result of the startup ffmpeg check
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TranscoderStatus {
    Found(PathBuf),
    Missing,
}
