use crate::{error::DownloaderError, model::DownloadFormat};
use async_trait::async_trait;
use serde::Deserialize;
use std::{
    path::{Path, PathBuf},
    process::Stdio,
    sync::Mutex,
};
use tokio::{io::AsyncReadExt, process::Command};

/// Everything the downloader needs from a playlist enumeration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlaylistListing {
    pub title: Option<String>,
    /// Video URLs in playlist order
    pub entries: Vec<String>,
    pub thumbnail: Option<String>,
}

/// How a single video should be fetched and post-processed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetrievalOptions {
    /// yt-dlp format selector
    pub format: String,
    /// Output template, `%(title)s.%(ext)s` inside the playlist folder
    pub output: PathBuf,
    pub post: PostProcess,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PostProcess {
    /// Keep whatever container/codec the site serves
    None,
    /// Transcode the audio stream with ffmpeg
    ExtractAudio {
        codec: &'static str,
        bitrate_kbps: u32,
        ffmpeg_dir: PathBuf,
    },
    /// Merge separate video and audio streams into one container
    Merge { container: &'static str },
}

impl RetrievalOptions {
    pub fn for_format(
        format: DownloadFormat,
        transcoder: Option<&Path>,
        playlist_dir: &Path,
        bitrate_kbps: u32,
    ) -> Self {
        let output = playlist_dir.join("%(title)s.%(ext)s");
        match format {
            DownloadFormat::Mp3 => {
                let post = match transcoder {
                    Some(ffmpeg) => PostProcess::ExtractAudio {
                        codec: "mp3",
                        bitrate_kbps,
                        ffmpeg_dir: ffmpeg
                            .parent()
                            .map(Path::to_path_buf)
                            .unwrap_or_default(),
                    },
                    None => PostProcess::None,
                };
                Self {
                    format: "bestaudio/best".to_string(),
                    output,
                    post,
                }
            }
            DownloadFormat::Mp4 => Self {
                format: "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best".to_string(),
                output,
                post: PostProcess::Merge { container: "mp4" },
            },
        }
    }

    fn to_args(&self) -> Vec<String> {
        let mut args = vec!["-f".to_owned(), self.format.clone()];
        match &self.post {
            PostProcess::None => {}
            PostProcess::ExtractAudio {
                codec,
                bitrate_kbps,
                ffmpeg_dir,
            } => {
                args.push("-x".to_owned());
                args.push("--audio-format".to_owned());
                args.push((*codec).to_owned());
                args.push("--audio-quality".to_owned());
                args.push(format!("{bitrate_kbps}K"));
                if !ffmpeg_dir.as_os_str().is_empty() {
                    args.push("--ffmpeg-location".to_owned());
                    args.push(ffmpeg_dir.display().to_string());
                }
            }
            PostProcess::Merge { container } => {
                args.push("--merge-output-format".to_owned());
                args.push((*container).to_owned());
            }
        }
        args.push("-o".to_owned());
        args.push(self.output.display().to_string());
        args
    }
}

/// A video that made it to disk
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadedVideo {
    pub title: String,
}

/// Playlist metadata and retrieval, backed by an external extractor.
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Human-readable playlist title.
    async fn playlist_title(&self, locator: &str) -> Result<String, DownloaderError>;

    /// Flat list of the playlist's videos.
    async fn playlist_entries(&self, locator: &str) -> Result<PlaylistListing, DownloaderError>;

    /// Downloads one video, blocking until it is fully written.
    async fn download(
        &self,
        video_url: &str,
        options: &RetrievalOptions,
    ) -> Result<DownloadedVideo, DownloaderError>;
}

#[derive(Deserialize)]
struct FlatPlaylist {
    title: Option<String>,
    #[serde(default)]
    entries: Vec<Option<FlatEntry>>,
    #[serde(default)]
    thumbnails: Vec<Thumbnail>,
}

#[derive(Deserialize)]
struct FlatEntry {
    url: Option<String>,
}

#[derive(Deserialize)]
struct Thumbnail {
    url: String,
}

impl From<FlatPlaylist> for PlaylistListing {
    fn from(flat: FlatPlaylist) -> Self {
        Self {
            title: flat.title,
            entries: flat
                .entries
                .into_iter()
                .flatten()
                .filter_map(|entry| entry.url)
                .collect(),
            // yt-dlp lists thumbnails from worst to best
            thumbnail: flat.thumbnails.into_iter().last().map(|t| t.url),
        }
    }
}

pub fn parse_flat_playlist(json: &str) -> Result<PlaylistListing, DownloaderError> {
    let flat: FlatPlaylist = serde_json::from_str(json)?;
    Ok(flat.into())
}

/// yt-dlp driven through its command line.
pub struct YtDlp {
    bin: PathBuf,
    /// Last successful enumeration, so a title lookup followed by an
    /// enumeration of the same locator costs a single process run.
    last_listing: Mutex<Option<(String, PlaylistListing)>>,
}

impl YtDlp {
    pub fn new(bin: PathBuf) -> Self {
        Self {
            bin,
            last_listing: Mutex::new(None),
        }
    }

    fn program(&self) -> String {
        self.bin.display().to_string()
    }

    fn cached(&self, locator: &str) -> Option<PlaylistListing> {
        let guard = self.last_listing.lock().ok()?;
        guard
            .as_ref()
            .filter(|(cached, _)| cached == locator)
            .map(|(_, listing)| listing.clone())
    }

    async fn enumerate(&self, locator: &str) -> Result<PlaylistListing, DownloaderError> {
        if let Some(listing) = self.cached(locator) {
            return Ok(listing);
        }
        let output = Command::new(&self.bin)
            .args([
                "--flat-playlist",
                "-J",
                "--no-warnings",
                "--encoding",
                "utf-8",
                locator,
            ])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| DownloaderError::Spawn {
                program: self.program(),
                source,
            })?;
        if !output.status.success() {
            return Err(failure_from_stderr(&output.stderr, output.status.code()));
        }
        let listing = parse_flat_playlist(&String::from_utf8_lossy(&output.stdout))?;
        if let Ok(mut guard) = self.last_listing.lock() {
            *guard = Some((locator.to_string(), listing.clone()));
        }
        Ok(listing)
    }
}

#[async_trait]
impl MediaExtractor for YtDlp {
    async fn playlist_title(&self, locator: &str) -> Result<String, DownloaderError> {
        self.enumerate(locator)
            .await?
            .title
            .ok_or_else(|| DownloaderError::Extractor("playlist has no title".to_string()))
    }

    async fn playlist_entries(&self, locator: &str) -> Result<PlaylistListing, DownloaderError> {
        self.enumerate(locator).await
    }

    async fn download(
        &self,
        video_url: &str,
        options: &RetrievalOptions,
    ) -> Result<DownloadedVideo, DownloaderError> {
        let mut args = vec![
            "--no-playlist".to_owned(),
            "--no-warnings".to_owned(),
            "--encoding".to_owned(),
            "utf-8".to_owned(),
        ];
        args.extend(options.to_args());
        args.push("--print".to_owned());
        args.push("after_move:title".to_owned());
        args.push(video_url.to_owned());
        tracing::debug!("{} {}", self.program(), args.join(" "));

        let mut child = Command::new(&self.bin)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DownloaderError::Spawn {
                program: self.program(),
                source,
            })?;

        let mut stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| DownloaderError::Extractor("stderr not captured".to_string()))?;
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr_pipe.read_to_end(&mut buf).await;
            buf
        });

        // Titles are not guaranteed to be UTF-8.
        let mut out = child
            .stdout
            .take()
            .ok_or_else(|| DownloaderError::Extractor("stdout not captured".to_string()))?;
        let mut stdout = Vec::new();
        out.read_to_end(&mut stdout).await?;

        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();
        if !status.success() {
            return Err(failure_from_stderr(&stderr, status.code()));
        }
        Ok(DownloadedVideo {
            title: last_printed_line(&stdout).unwrap_or_else(|| "Unknown".to_string()),
        })
    }
}

/// Last non-blank stdout line, which is what `--print after_move:title` wrote.
fn last_printed_line(stdout: &[u8]) -> Option<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .map(str::to_string)
}

/// Picks the most useful line out of yt-dlp's stderr.
fn failure_from_stderr(stderr: &[u8], code: Option<i32>) -> DownloaderError {
    let text = String::from_utf8_lossy(stderr);
    let message = text
        .lines()
        .rev()
        .find(|line| line.contains("ERROR"))
        .or_else(|| text.lines().rev().find(|line| !line.trim().is_empty()))
        .map(|line| line.trim().to_string())
        .unwrap_or_else(|| match code {
            Some(code) => format!("yt-dlp exited with status {code}"),
            None => "yt-dlp was terminated".to_string(),
        });
    DownloaderError::Extractor(message)
}
