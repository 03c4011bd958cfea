//! egui front end: inputs, per-playlist progress and the run log.

use crate::{
    config::AppConfig,
    downloader::{Downloader, EventSink},
    error::ValidationError,
    model::{DownloadFormat, DownloadRequest, DownloaderEvent, LogTarget, RunOutcome, TranscoderStatus},
    progress::ProgressBoard,
    thumbnail,
    transcoder::TranscoderLocator,
    validation::parse_locators,
    ytdlp::YtDlp,
};
use eframe::{App, Frame, egui};
use egui::{Color32, ColorImage, RichText, TextureOptions};
use rfd::{FileDialog, MessageButtons, MessageDialog, MessageLevel};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::{
    runtime::Handle,
    sync::{
        mpsc::{UnboundedReceiver, unbounded_channel},
        oneshot,
    },
    task::JoinHandle,
};

const LOCATOR_HINT: &str = "https://www.youtube.com/playlist?list=...\n\
                            https://www.youtube.com/playlist?list=...\n\
                            https://www.youtube.com/playlist?list=...";

/// Background download in flight
struct ActiveRun {
    events: UnboundedReceiver<DownloaderEvent>,
    /// Written only by the UI, polled by the download task
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<RunOutcome>,
    cancelling: bool,
}

pub struct PlaylistApp {
    rt: Handle,
    config: AppConfig,
    /// One playlist locator per line
    locators_input: String,
    output_dir: String,
    format: DownloadFormat,
    /// `None` while the startup check is still running
    transcoder: Option<TranscoderStatus>,
    transcoder_rx: Option<oneshot::Receiver<TranscoderStatus>>,
    board: ProgressBoard,
    log: Vec<String>,
    run: Option<ActiveRun>,
    /// Playlist thumbnails keyed by display name
    thumbnails: HashMap<String, egui::TextureHandle>,
    thumbnail_results: Arc<Mutex<Vec<(String, ColorImage)>>>,
    /// Shown as a modal once the current frame is drawn
    pending_notice: Option<RunOutcome>,
}

impl PlaylistApp {
    pub fn new(ctx: &egui::Context, rt: Handle, config: AppConfig) -> Self {
        let transcoder_rx = spawn_transcoder_check(ctx, &rt, &config);
        Self {
            rt,
            locators_input: String::new(),
            output_dir: config.output_dir.display().to_string(),
            format: config.default_format,
            config,
            transcoder: None,
            transcoder_rx: Some(transcoder_rx),
            board: ProgressBoard::default(),
            log: Vec::new(),
            run: None,
            thumbnails: HashMap::new(),
            thumbnail_results: Arc::new(Mutex::new(Vec::new())),
            pending_notice: None,
        }
    }

    fn poll_transcoder_check(&mut self) {
        let Some(rx) = &mut self.transcoder_rx else {
            return;
        };
        match rx.try_recv() {
            Ok(status) => {
                self.transcoder = Some(status);
                self.transcoder_rx = None;
            }
            Err(oneshot::error::TryRecvError::Empty) => {}
            Err(oneshot::error::TryRecvError::Closed) => {
                self.transcoder = Some(TranscoderStatus::Missing);
                self.transcoder_rx = None;
            }
        }
    }

    fn poll_run(&mut self, ctx: &egui::Context) {
        let Some(run) = &mut self.run else {
            return;
        };
        // Checked before draining so a terminal event sent right before the
        // task exits is never mistaken for a crash.
        let task_done = run.handle.is_finished();
        let mut received = Vec::new();
        while let Ok(event) = run.events.try_recv() {
            received.push(event);
        }

        let mut finished = false;
        for event in received {
            finished |= matches!(event, DownloaderEvent::Finished(_));
            self.apply_event(ctx, event);
        }
        if task_done && !finished && self.run.is_some() {
            tracing::error!("Download task ended without reporting a result");
            self.finish_run(RunOutcome {
                success: false,
                message: "Error: download task stopped unexpectedly".to_string(),
            });
        }
    }

    fn apply_event(&mut self, ctx: &egui::Context, event: DownloaderEvent) {
        match event {
            DownloaderEvent::PlaylistStarted {
                name,
                total,
                thumbnail,
            } => {
                self.thumbnails.remove(&name);
                if let Some(url) = &thumbnail {
                    self.spawn_thumbnail_fetch(ctx, &name, url);
                }
                self.board.start(&name, total);
            }
            DownloaderEvent::Progress(update) => {
                self.board
                    .update(&update.playlist, update.current, update.total, update.percent);
            }
            DownloaderEvent::Log { message, target } => {
                self.log.push(format_log_line(&message, &target));
            }
            DownloaderEvent::Finished(outcome) => self.finish_run(outcome),
        }
    }

    fn finish_run(&mut self, outcome: RunOutcome) {
        let mark = if outcome.success { "✅" } else { "❌" };
        self.log.push(format!("{mark} {}", outcome.message));
        self.run = None;
        self.pending_notice = Some(outcome);
    }

    fn spawn_thumbnail_fetch(&self, ctx: &egui::Context, name: &str, url: &str) {
        let name = name.to_string();
        let url = url.to_string();
        let results = Arc::clone(&self.thumbnail_results);
        let ctx = ctx.clone();
        self.rt.spawn_blocking(move || {
            if let Some(img) = thumbnail::fetch_thumbnail(&url) {
                if let Ok(mut pending) = results.lock() {
                    pending.push((name, img));
                }
                ctx.request_repaint();
            }
        });
    }

    fn collect_thumbnails(&mut self, ctx: &egui::Context) {
        let Ok(mut pending) = self.thumbnail_results.lock() else {
            return;
        };
        for (name, img) in pending.drain(..) {
            let tex = ctx.load_texture(&name, img, TextureOptions::default());
            self.thumbnails.insert(name, tex);
        }
    }

    fn start_download(&mut self, ctx: &egui::Context) {
        if self.locators_input.trim().is_empty() {
            warn_dialog("Input Error", &ValidationError::NoLocators.to_string());
            return;
        }
        let batch = parse_locators(&self.locators_input);
        let rejected = rejection_lines(&batch.rejected);

        let request = match DownloadRequest::new(batch.accepted, self.format, &self.output_dir) {
            Ok(request) => request,
            Err(e) => {
                record_submission(&mut self.log, rejected, false);
                warn_dialog("Input Error", &e.to_string());
                return;
            }
        };

        if request.format.is_audio()
            && !confirm_dialog(
                "FFmpeg Check",
                "MP3 conversion requires FFmpeg.\n\nDo you want to continue?",
            )
        {
            record_submission(&mut self.log, rejected, false);
            return;
        }

        self.board.clear();
        self.thumbnails.clear();
        record_submission(&mut self.log, rejected, true);
        tracing::info!(
            "Starting {} playlist(s) as {} into {}",
            request.locators.len(),
            request.format,
            request.destination.display()
        );

        let (tx, rx) = unbounded_channel();
        let repaint = ctx.clone();
        let sink = EventSink::new(tx).with_wake(move || repaint.request_repaint());
        let cancel = Arc::new(AtomicBool::new(false));
        let downloader = Downloader::new(
            YtDlp::new(self.config.ytdlp_path.clone()),
            TranscoderLocator::new(
                self.config.transcoder_candidates.clone(),
                self.config.probe_timeout(),
            ),
            self.config.audio_bitrate_kbps,
        );
        let flag = Arc::clone(&cancel);
        let handle = self
            .rt
            .spawn(async move { downloader.run(&request, &sink, &flag).await });

        self.run = Some(ActiveRun {
            events: rx,
            cancel,
            handle,
            cancelling: false,
        });
    }

    fn cancel_download(&mut self) {
        if let Some(run) = &mut self.run {
            if !run.cancelling {
                run.cancel.store(true, Ordering::SeqCst);
                run.cancelling = true;
                self.log.push("⏹️ Download cancelled by user".to_string());
            }
        }
    }

    /// Lets a window close go ahead only once any running download has stopped.
    fn handle_close_request(&mut self, ctx: &egui::Context) {
        if !ctx.input(|i| i.viewport().close_requested()) {
            return;
        }
        let Some(run) = self.run.take() else {
            return;
        };
        if confirm_dialog(
            "Download in Progress",
            "A download is in progress. Are you sure you want to quit?",
        ) {
            run.cancel.store(true, Ordering::SeqCst);
            if let Err(e) = self.rt.block_on(run.handle) {
                tracing::warn!("Download task did not shut down cleanly: {e}");
            }
        } else {
            self.run = Some(run);
            ctx.send_viewport_cmd(egui::ViewportCommand::CancelClose);
        }
    }

    fn transcoder_line(&self, ui: &mut egui::Ui) {
        match &self.transcoder {
            None => ui.colored_label(Color32::from_rgb(255, 165, 0), "Checking FFmpeg..."),
            Some(TranscoderStatus::Found(path)) => ui.colored_label(
                Color32::GREEN,
                format!("FFmpeg: ✅ Installed at {}", path.display()),
            ),
            Some(TranscoderStatus::Missing) => ui.colored_label(
                Color32::RED,
                "FFmpeg: ❌ Not found (MP3 conversion will not work)",
            ),
        };
    }

    fn inputs(&mut self, ui: &mut egui::Ui) {
        ui.group(|ui| {
            ui.label(RichText::new("Playlist URLs (one per line):").strong());
            ui.add(
                egui::TextEdit::multiline(&mut self.locators_input)
                    .hint_text(LOCATOR_HINT)
                    .desired_rows(4)
                    .desired_width(f32::INFINITY),
            );
        });

        ui.horizontal(|ui| {
            ui.vertical(|ui| {
                ui.label(RichText::new("Format:").strong());
                egui::ComboBox::from_id_source("format")
                    .selected_text(self.format.to_string())
                    .show_ui(ui, |ui| {
                        for format in DownloadFormat::ALL {
                            ui.selectable_value(&mut self.format, format, format.to_string());
                        }
                    });
            });
            ui.vertical(|ui| {
                ui.label(RichText::new("Output Folder:").strong());
                ui.horizontal(|ui| {
                    ui.text_edit_singleline(&mut self.output_dir);
                    if ui.button("Browse").clicked() {
                        if let Some(folder) = FileDialog::new()
                            .set_directory(&self.output_dir)
                            .pick_folder()
                        {
                            self.output_dir = folder.display().to_string();
                        }
                    }
                });
            });
        });
    }

    fn progress_section(&self, ui: &mut egui::Ui) {
        ui.group(|ui| {
            ui.vertical_centered(|ui| {
                ui.label(RichText::new("Download Progress").strong().size(14.0));
            });
            for row in self.board.rows() {
                ui.horizontal(|ui| {
                    if let Some(tex) = self.thumbnails.get(&row.name) {
                        ui.add(egui::Image::new(tex).max_height(54.0));
                    }
                    ui.vertical(|ui| {
                        ui.label(RichText::new(row.label()).strong());
                        ui.add(
                            egui::ProgressBar::new(row.fraction())
                                .text(format!("{} - {}%", row.name, row.percent)),
                        );
                    });
                });
            }
        });
    }

    fn buttons(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        let running = self.run.is_some();
        let cancelling = self.run.as_ref().is_some_and(|run| run.cancelling);
        ui.horizontal(|ui| {
            let download = egui::Button::new(
                RichText::new("Download All Playlists")
                    .strong()
                    .color(Color32::WHITE),
            )
            .fill(Color32::from_rgb(0x4C, 0xAF, 0x50));
            if ui.add_enabled(!running, download).clicked() {
                self.start_download(ctx);
            }

            let cancel = egui::Button::new(RichText::new("Cancel All").strong().color(Color32::WHITE))
                .fill(Color32::from_rgb(0xF4, 0x43, 0x36));
            if ui.add_enabled(running && !cancelling, cancel).clicked() {
                self.cancel_download();
            }
            if cancelling {
                ui.spinner();
                ui.label("Waiting for the current video to finish...");
            }
        });
    }

    fn log_area(&self, ui: &mut egui::Ui) {
        ui.label(RichText::new("Download Log:").strong());
        egui::Frame::group(ui.style()).show(ui, |ui| {
            egui::ScrollArea::vertical()
                .id_source("log")
                .auto_shrink([false; 2])
                .stick_to_bottom(true)
                .min_scrolled_height(200.0)
                .show(ui, |ui| {
                    for line in &self.log {
                        ui.label(line);
                    }
                });
        });
    }

    fn show_pending_notice(&mut self) {
        if let Some(outcome) = self.pending_notice.take() {
            let (level, title) = if outcome.success {
                (MessageLevel::Info, "Success")
            } else {
                (MessageLevel::Warning, "Download Status")
            };
            MessageDialog::new()
                .set_level(level)
                .set_title(title)
                .set_description(&outcome.message)
                .set_buttons(MessageButtons::Ok)
                .show();
        }
    }
}

impl App for PlaylistApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        self.poll_transcoder_check();
        self.poll_run(ctx);
        self.collect_thumbnails(ctx);
        self.handle_close_request(ctx);

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical()
                .id_source("page")
                .show(ui, |ui| {
                    ui.vertical_centered(|ui| {
                        ui.heading(RichText::new("YouTube Multi-Playlist Downloader").size(18.0).strong());
                        self.transcoder_line(ui);
                    });
                    ui.add_space(8.0);

                    let idle = self.run.is_none();
                    ui.add_enabled_ui(idle, |ui| self.inputs(ui));
                    ui.add_space(8.0);
                    self.progress_section(ui);
                    ui.add_space(8.0);
                    self.buttons(ui, ctx);
                    ui.add_space(8.0);
                    self.log_area(ui);
                });
        });

        self.show_pending_notice();

        if self.run.is_some() {
            ctx.request_repaint_after(std::time::Duration::from_millis(100));
        }
    }
}

/// Probes ffmpeg once at startup on its own task.
fn spawn_transcoder_check(
    ctx: &egui::Context,
    rt: &Handle,
    config: &AppConfig,
) -> oneshot::Receiver<TranscoderStatus> {
    let (tx, rx) = oneshot::channel();
    let locator = TranscoderLocator::new(config.transcoder_candidates.clone(), config.probe_timeout());
    let ctx = ctx.clone();
    rt.spawn(async move {
        let status = match locator.probe().await {
            Some(path) => TranscoderStatus::Found(path),
            None => TranscoderStatus::Missing,
        };
        let _ = tx.send(status);
        ctx.request_repaint();
    });
    rx
}

/// Log lines carry their playlist name unless they are system-wide.
pub fn format_log_line(message: &str, target: &LogTarget) -> String {
    match target {
        LogTarget::System => message.to_string(),
        LogTarget::Playlist(name) => format!("[{name}] {message}"),
    }
}

fn warn_dialog(title: &str, message: &str) {
    MessageDialog::new()
        .set_level(MessageLevel::Warning)
        .set_title(title)
        .set_description(message)
        .set_buttons(MessageButtons::Ok)
        .show();
}

fn confirm_dialog(title: &str, message: &str) -> bool {
    MessageDialog::new()
        .set_level(MessageLevel::Warning)
        .set_title(title)
        .set_description(message)
        .set_buttons(MessageButtons::YesNo)
        .show()
}

fn rejection_lines(rejected: &[String]) -> Vec<String> {
    rejected
        .iter()
        .map(|line| format!("❌ Invalid playlist URL: {line}"))
        .collect()
}

/// Rejected locators always reach the log. A started run replaces the
/// previous log; a submission that goes nowhere appends to it.
fn record_submission(log: &mut Vec<String>, rejected: Vec<String>, started: bool) {
    if started {
        log.clear();
    }
    log.extend(rejected);
    if started {
        log.push("🚀 Starting download of multiple playlists...".to_string());
    }
}
