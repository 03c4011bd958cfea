//! Sequential batch download of playlists.
//!
//! Playlists run one after another and so do the videos inside each playlist.
//! The cancel flag is polled before every playlist and every video; a video
//! already being fetched is always allowed to finish.

use crate::{
    error::DownloaderError,
    model::{DownloadRequest, DownloaderEvent, LogTarget, ProgressUpdate, RunOutcome},
    progress::percent_complete,
    text::{fallback_playlist_name, folder_safe_name, strip_color_codes},
    transcoder::TranscoderLocator,
    ytdlp::{MediaExtractor, RetrievalOptions},
};
use std::{
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::sync::mpsc::UnboundedSender;

/// Emits events to the UI. A closed receiver only means nobody is watching.
#[derive(Clone)]
pub struct EventSink {
    tx: UnboundedSender<DownloaderEvent>,
    on_send: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl EventSink {
    pub fn new(tx: UnboundedSender<DownloaderEvent>) -> Self {
        Self { tx, on_send: None }
    }

    /// Runs `wake` after every event, e.g. to ask the UI for a repaint.
    pub fn with_wake(mut self, wake: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_send = Some(Arc::new(wake));
        self
    }

    fn send(&self, event: DownloaderEvent) {
        let _ = self.tx.send(event);
        if let Some(wake) = &self.on_send {
            wake();
        }
    }

    fn log(&self, message: impl Into<String>, target: &LogTarget) {
        self.send(DownloaderEvent::Log {
            message: message.into(),
            target: target.clone(),
        });
    }
}

/// Totals of one finished playlist
struct PlaylistTally {
    downloaded: usize,
    total: usize,
}

pub struct Downloader<E> {
    extractor: E,
    transcoder: TranscoderLocator,
    audio_bitrate_kbps: u32,
}

impl<E: MediaExtractor> Downloader<E> {
    pub fn new(extractor: E, transcoder: TranscoderLocator, audio_bitrate_kbps: u32) -> Self {
        Self {
            extractor,
            transcoder,
            audio_bitrate_kbps,
        }
    }

    /// Processes the whole request and returns the terminal outcome, which is
    /// also sent as the last event.
    pub async fn run(
        &self,
        request: &DownloadRequest,
        events: &EventSink,
        cancel: &AtomicBool,
    ) -> RunOutcome {
        let outcome = match self.run_batch(request, events, cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Download run aborted: {e}");
                RunOutcome {
                    success: false,
                    message: format!("Error: {e}"),
                }
            }
        };
        events.send(DownloaderEvent::Finished(outcome.clone()));
        outcome
    }

    async fn run_batch(
        &self,
        request: &DownloadRequest,
        events: &EventSink,
        cancel: &AtomicBool,
    ) -> Result<RunOutcome, DownloaderError> {
        let ffmpeg = if request.format.is_audio() {
            let found = self.transcoder.probe().await;
            match &found {
                Some(path) => events.log(
                    format!("✅ Using FFmpeg at: {}", path.display()),
                    &LogTarget::System,
                ),
                None => events.log(
                    "⚠️ FFmpeg not found. Audio files will be downloaded in original format.",
                    &LogTarget::System,
                ),
            }
            found
        } else {
            None
        };

        create_dir(&request.destination)?;

        let mut downloaded = 0;
        let mut attempted = 0;
        for locator in &request.locators {
            if cancel.load(Ordering::SeqCst) {
                break;
            }
            let tally = self
                .run_playlist(request, locator, ffmpeg.as_deref(), events, cancel)
                .await?;
            downloaded += tally.downloaded;
            attempted += tally.total;
        }

        if cancel.load(Ordering::SeqCst) {
            tracing::info!("Run cancelled after {downloaded}/{attempted} videos");
            return Ok(RunOutcome {
                success: false,
                message: "Download cancelled by user.".to_string(),
            });
        }
        tracing::info!("Run finished: {downloaded}/{attempted} videos");
        Ok(RunOutcome {
            success: true,
            message: format!(
                "All downloads completed! {downloaded}/{attempted} videos downloaded successfully across {} playlists.",
                request.locators.len()
            ),
        })
    }

    async fn run_playlist(
        &self,
        request: &DownloadRequest,
        locator: &str,
        ffmpeg: Option<&Path>,
        events: &EventSink,
        cancel: &AtomicBool,
    ) -> Result<PlaylistTally, DownloaderError> {
        // Resolved once; the UI keys its widgets by this name.
        let name = self.display_name(locator).await;
        let target = LogTarget::Playlist(name.clone());
        let playlist_dir = request.destination.join(&name);
        create_dir(&playlist_dir)?;

        events.log("Getting playlist information...", &target);
        let listing = match self.extractor.playlist_entries(locator).await {
            Ok(listing) => listing,
            Err(e) => {
                tracing::warn!("Enumerating {locator} failed: {e}");
                events.log(
                    format!(
                        "Error getting playlist info: {}",
                        strip_color_codes(&e.to_string())
                    ),
                    &target,
                );
                events.log("Could not retrieve playlist information.", &target);
                return Ok(PlaylistTally {
                    downloaded: 0,
                    total: 0,
                });
            }
        };

        let total = listing.entries.len();
        if total == 0 {
            events.log("No videos found in the playlist.", &target);
            return Ok(PlaylistTally {
                downloaded: 0,
                total: 0,
            });
        }

        events.send(DownloaderEvent::PlaylistStarted {
            name: name.clone(),
            total,
            thumbnail: listing.thumbnail.clone(),
        });
        events.log(format!("Found {total} videos in the playlist"), &target);

        let options = RetrievalOptions::for_format(
            request.format,
            ffmpeg,
            &playlist_dir,
            self.audio_bitrate_kbps,
        );
        let mut downloaded = 0;
        for (index, video_url) in listing.entries.iter().enumerate() {
            if cancel.load(Ordering::SeqCst) {
                break;
            }
            let current = index + 1;
            events.send(DownloaderEvent::Progress(ProgressUpdate {
                current,
                total,
                percent: percent_complete(current, total),
                playlist: name.clone(),
            }));

            match self.extractor.download(video_url, &options).await {
                Ok(video) => {
                    downloaded += 1;
                    events.log(format!("✓ Downloaded: {}", video.title), &target);
                }
                Err(e) => {
                    tracing::warn!("Downloading {video_url} failed: {e}");
                    events.log(
                        format!(
                            "✗ Error downloading video: {}",
                            strip_color_codes(&e.to_string())
                        ),
                        &target,
                    );
                }
            }
        }

        events.log(
            format!("Playlist completed: {downloaded}/{total} videos downloaded"),
            &target,
        );
        Ok(PlaylistTally { downloaded, total })
    }

    async fn display_name(&self, locator: &str) -> String {
        match self.extractor.playlist_title(locator).await {
            Ok(title) => folder_safe_name(&title).unwrap_or_else(|| fallback_playlist_name(locator)),
            Err(e) => {
                tracing::debug!("No title for {locator}: {e}");
                fallback_playlist_name(locator)
            }
        }
    }
}

fn create_dir(path: &Path) -> Result<(), DownloaderError> {
    std::fs::create_dir_all(path).map_err(|source| DownloaderError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::DownloadFormat,
        ytdlp::{DownloadedVideo, PlaylistListing, PostProcess},
    };
    use async_trait::async_trait;
    use std::{
        collections::{HashMap, HashSet},
        sync::{Mutex, atomic::AtomicUsize},
        time::Duration,
    };
    use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

    const PL_A: &str = "https://www.youtube.com/playlist?list=PLA";
    const PL_B: &str = "https://www.youtube.com/playlist?list=PLB";

    #[derive(Default)]
    struct FakeExtractor {
        titles: HashMap<String, String>,
        playlists: HashMap<String, Vec<String>>,
        failing_videos: HashSet<String>,
        /// Sets `cancel` once this many downloads have been attempted
        cancel_after: Option<(usize, Arc<AtomicBool>)>,
        attempts: AtomicUsize,
        seen_options: Mutex<Vec<RetrievalOptions>>,
    }

    impl FakeExtractor {
        fn playlist(mut self, locator: &str, title: Option<&str>, videos: usize) -> Self {
            if let Some(title) = title {
                self.titles.insert(locator.to_string(), title.to_string());
            }
            let urls = (1..=videos).map(|i| format!("{locator}#v{i}")).collect();
            self.playlists.insert(locator.to_string(), urls);
            self
        }

        fn failing(mut self, url: String) -> Self {
            self.failing_videos.insert(url);
            self
        }
    }

    #[async_trait]
    impl MediaExtractor for FakeExtractor {
        async fn playlist_title(&self, locator: &str) -> Result<String, DownloaderError> {
            self.titles
                .get(locator)
                .cloned()
                .ok_or_else(|| DownloaderError::Extractor("no title".into()))
        }

        async fn playlist_entries(
            &self,
            locator: &str,
        ) -> Result<PlaylistListing, DownloaderError> {
            let entries = self.playlists.get(locator).cloned().ok_or_else(|| {
                DownloaderError::Extractor("\x1b[0;31mERROR:\x1b[0m unavailable".into())
            })?;
            Ok(PlaylistListing {
                title: self.titles.get(locator).cloned(),
                entries,
                thumbnail: None,
            })
        }

        async fn download(
            &self,
            video_url: &str,
            options: &RetrievalOptions,
        ) -> Result<DownloadedVideo, DownloaderError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            self.seen_options.lock().unwrap().push(options.clone());
            if let Some((after, flag)) = &self.cancel_after {
                if attempt == *after {
                    flag.store(true, Ordering::SeqCst);
                }
            }
            if self.failing_videos.contains(video_url) {
                return Err(DownloaderError::Extractor(
                    "\x1b[0;31mERROR:\x1b[0m Private video".into(),
                ));
            }
            Ok(DownloadedVideo {
                title: format!("title of {video_url}"),
            })
        }
    }

    fn no_transcoder() -> TranscoderLocator {
        TranscoderLocator::with_search_path(None, Vec::new(), Duration::from_secs(1))
    }

    fn request(dest: &Path, format: DownloadFormat, locators: &[&str]) -> DownloadRequest {
        DownloadRequest {
            locators: locators.iter().map(|l| l.to_string()).collect(),
            format,
            destination: dest.to_path_buf(),
        }
    }

    fn drain(rx: &mut UnboundedReceiver<DownloaderEvent>) -> Vec<DownloaderEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn logs_for<'a>(events: &'a [DownloaderEvent], target: &LogTarget) -> Vec<&'a str> {
        events
            .iter()
            .filter_map(|event| match event {
                DownloaderEvent::Log { message, target: t } if t == target => {
                    Some(message.as_str())
                }
                _ => None,
            })
            .collect()
    }

    fn progress_for<'a>(events: &'a [DownloaderEvent], name: &str) -> Vec<&'a ProgressUpdate> {
        events
            .iter()
            .filter_map(|event| match event {
                DownloaderEvent::Progress(p) if p.playlist == name => Some(p),
                _ => None,
            })
            .collect()
    }

    async fn run(
        extractor: FakeExtractor,
        request: &DownloadRequest,
        cancel: &AtomicBool,
    ) -> (RunOutcome, Vec<DownloaderEvent>, FakeExtractor) {
        let (tx, mut rx) = unbounded_channel();
        let downloader = Downloader::new(extractor, no_transcoder(), 192);
        let outcome = downloader.run(request, &EventSink::new(tx), cancel).await;
        (outcome, drain(&mut rx), downloader.extractor)
    }

    #[tokio::test]
    async fn failed_videos_are_skipped_and_counted() {
        let dest = tempfile::tempdir().unwrap();
        let extractor = FakeExtractor::default()
            .playlist(PL_A, Some("Mix"), 5)
            .failing(format!("{PL_A}#v2"))
            .failing(format!("{PL_A}#v4"));
        let req = request(dest.path(), DownloadFormat::Mp4, &[PL_A]);

        let (outcome, events, _) = run(extractor, &req, &AtomicBool::new(false)).await;

        let mix = LogTarget::Playlist("Mix".into());
        let logs = logs_for(&events, &mix);
        assert_eq!(logs.last(), Some(&"Playlist completed: 3/5 videos downloaded"));
        assert!(logs.contains(&"✗ Error downloading video: ERROR: Private video"));
        assert_eq!(logs.iter().filter(|l| l.starts_with("✓ Downloaded")).count(), 3);
        assert_eq!(
            outcome,
            RunOutcome {
                success: true,
                message: "All downloads completed! 3/5 videos downloaded successfully across 1 playlists."
                    .into(),
            }
        );
        assert!(dest.path().join("Mix").is_dir());
    }

    #[tokio::test]
    async fn totals_add_up_across_playlists() {
        let dest = tempfile::tempdir().unwrap();
        let extractor = FakeExtractor::default()
            .playlist(PL_A, Some("First"), 3)
            .playlist(PL_B, Some("Second"), 4)
            .failing(format!("{PL_B}#v1"));
        let req = request(dest.path(), DownloadFormat::Mp4, &[PL_A, PL_B]);

        let (outcome, events, _) = run(extractor, &req, &AtomicBool::new(false)).await;

        assert!(outcome.success);
        assert!(outcome.message.contains("6/7 videos"));
        assert!(outcome.message.contains("across 2 playlists"));
        assert_eq!(events.last(), Some(&DownloaderEvent::Finished(outcome.clone())));

        let started: Vec<(&str, usize)> = events
            .iter()
            .filter_map(|event| match event {
                DownloaderEvent::PlaylistStarted { name, total, .. } => Some((name.as_str(), *total)),
                _ => None,
            })
            .collect();
        assert_eq!(started, vec![("First", 3), ("Second", 4)]);
    }

    #[tokio::test]
    async fn playlist_events_are_ordered() {
        let dest = tempfile::tempdir().unwrap();
        let extractor = FakeExtractor::default().playlist(PL_A, Some("Mix"), 2);
        let req = request(dest.path(), DownloadFormat::Mp4, &[PL_A]);

        let (_, events, _) = run(extractor, &req, &AtomicBool::new(false)).await;

        let start = events
            .iter()
            .position(|e| matches!(e, DownloaderEvent::PlaylistStarted { .. }))
            .unwrap();
        let first_progress = events
            .iter()
            .position(|e| matches!(e, DownloaderEvent::Progress(_)))
            .unwrap();
        let summary = events
            .iter()
            .position(|e| {
                matches!(e, DownloaderEvent::Log { message, .. } if message.starts_with("Playlist completed"))
            })
            .unwrap();
        assert!(start < first_progress);
        assert!(first_progress < summary);
        assert!(matches!(events.last(), Some(DownloaderEvent::Finished(_))));
    }

    #[tokio::test]
    async fn percent_reaches_100_on_last_video() {
        let dest = tempfile::tempdir().unwrap();
        let extractor = FakeExtractor::default().playlist(PL_A, Some("Mix"), 3);
        let req = request(dest.path(), DownloadFormat::Mp4, &[PL_A]);

        let (_, events, _) = run(extractor, &req, &AtomicBool::new(false)).await;

        let percents: Vec<(usize, u8)> = progress_for(&events, "Mix")
            .iter()
            .map(|p| (p.current, p.percent))
            .collect();
        assert_eq!(percents, vec![(1, 33), (2, 66), (3, 100)]);
    }

    #[tokio::test]
    async fn cancellation_stops_between_videos() {
        let dest = tempfile::tempdir().unwrap();
        let cancel = Arc::new(AtomicBool::new(false));
        let mut extractor = FakeExtractor::default()
            .playlist(PL_A, Some("Long"), 10)
            .playlist(PL_B, Some("Never"), 2);
        extractor.cancel_after = Some((2, cancel.clone()));
        let req = request(dest.path(), DownloadFormat::Mp4, &[PL_A, PL_B]);

        let (outcome, events, extractor) = run(extractor, &req, &cancel).await;

        let progress = progress_for(&events, "Long");
        assert_eq!(progress.len(), 2);
        assert_eq!(progress.last().unwrap().current, 2);
        assert!(progress_for(&events, "Never").is_empty());
        assert_eq!(extractor.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(
            logs_for(&events, &LogTarget::Playlist("Long".into())).last(),
            Some(&"Playlist completed: 2/10 videos downloaded")
        );
        assert_eq!(
            outcome,
            RunOutcome {
                success: false,
                message: "Download cancelled by user.".into(),
            }
        );
        assert_eq!(events.last(), Some(&DownloaderEvent::Finished(outcome)));
    }

    #[tokio::test]
    async fn unreadable_playlist_is_skipped() {
        let dest = tempfile::tempdir().unwrap();
        let broken = "https://www.youtube.com/playlist?list=PLgone";
        let extractor = FakeExtractor::default().playlist(PL_A, Some("Mix"), 2);
        let req = request(dest.path(), DownloadFormat::Mp4, &[broken, PL_A]);

        let (outcome, events, _) = run(extractor, &req, &AtomicBool::new(false)).await;

        let fallback = LogTarget::Playlist("Playlist_PLgone".into());
        assert_eq!(
            logs_for(&events, &fallback),
            vec![
                "Getting playlist information...",
                "Error getting playlist info: ERROR: unavailable",
                "Could not retrieve playlist information.",
            ]
        );
        assert!(progress_for(&events, "Playlist_PLgone").is_empty());
        assert!(outcome.success);
        assert!(outcome.message.contains("2/2 videos"));
        assert!(outcome.message.contains("across 2 playlists"));
    }

    #[tokio::test]
    async fn empty_playlist_contributes_nothing() {
        let dest = tempfile::tempdir().unwrap();
        let extractor = FakeExtractor::default().playlist(PL_A, Some("Empty"), 0);
        let req = request(dest.path(), DownloadFormat::Mp4, &[PL_A]);

        let (outcome, events, _) = run(extractor, &req, &AtomicBool::new(false)).await;

        assert!(
            logs_for(&events, &LogTarget::Playlist("Empty".into()))
                .contains(&"No videos found in the playlist.")
        );
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, DownloaderEvent::PlaylistStarted { .. }))
        );
        assert!(outcome.message.contains("0/0 videos"));
    }

    #[tokio::test]
    async fn missing_ffmpeg_degrades_once_per_run() {
        let dest = tempfile::tempdir().unwrap();
        let extractor = FakeExtractor::default()
            .playlist(PL_A, Some("One"), 3)
            .playlist(PL_B, Some("Two"), 2);
        let req = request(dest.path(), DownloadFormat::Mp3, &[PL_A, PL_B]);

        let (outcome, events, extractor) = run(extractor, &req, &AtomicBool::new(false)).await;

        let degradation: Vec<&DownloaderEvent> = events
            .iter()
            .filter(|e| matches!(e, DownloaderEvent::Log { message, .. } if message.contains("FFmpeg not found")))
            .collect();
        assert_eq!(degradation.len(), 1);
        assert!(matches!(
            degradation[0],
            DownloaderEvent::Log { target: LogTarget::System, .. }
        ));

        let options = extractor.seen_options.lock().unwrap();
        assert_eq!(options.len(), 5);
        assert!(options.iter().all(|o| o.post == PostProcess::None && o.format == "bestaudio/best"));
        assert!(outcome.success);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn found_ffmpeg_is_used_for_mp3() {
        // Any binary that exits 0 on `-version` passes the probe.
        let ffmpeg = Path::new("/bin/true");
        if !ffmpeg.is_file() {
            return;
        }
        let dest = tempfile::tempdir().unwrap();
        let locator = TranscoderLocator::with_search_path(
            None,
            vec![ffmpeg.to_string_lossy().into_owned()],
            Duration::from_secs(5),
        );

        let (tx, mut rx) = unbounded_channel();
        let downloader = Downloader::new(
            FakeExtractor::default().playlist(PL_A, Some("Mix"), 1),
            locator,
            320,
        );
        let req = request(dest.path(), DownloadFormat::Mp3, &[PL_A]);
        downloader
            .run(&req, &EventSink::new(tx), &AtomicBool::new(false))
            .await;

        let events = drain(&mut rx);
        let system = logs_for(&events, &LogTarget::System);
        assert_eq!(system, vec!["✅ Using FFmpeg at: /bin/true"]);
        let options = downloader.extractor.seen_options.lock().unwrap();
        assert_eq!(
            options[0].post,
            PostProcess::ExtractAudio {
                codec: "mp3",
                bitrate_kbps: 320,
                ffmpeg_dir: Path::new("/bin").to_path_buf(),
            }
        );
        assert_eq!(
            options[0].output,
            dest.path().join("Mix").join("%(title)s.%(ext)s")
        );
    }

    #[tokio::test]
    async fn untitled_playlist_gets_a_stable_fallback_name() {
        let dest = tempfile::tempdir().unwrap();
        let extractor = FakeExtractor::default().playlist(PL_A, None, 1);
        let req = request(dest.path(), DownloadFormat::Mp4, &[PL_A]);

        let (_, events, _) = run(extractor, &req, &AtomicBool::new(false)).await;

        assert!(dest.path().join("Playlist_PLA").is_dir());
        assert_eq!(progress_for(&events, "Playlist_PLA").len(), 1);
    }

    #[tokio::test]
    async fn unwritable_destination_aborts_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("occupied");
        std::fs::write(&file, b"not a folder").unwrap();
        let extractor = FakeExtractor::default().playlist(PL_A, Some("Mix"), 1);
        let req = request(&file.join("sub"), DownloadFormat::Mp4, &[PL_A]);

        let (outcome, events, _) = run(extractor, &req, &AtomicBool::new(false)).await;

        assert!(!outcome.success);
        assert!(outcome.message.starts_with("Error: failed to create folder"));
        assert_eq!(events.len(), 1);
    }
}
