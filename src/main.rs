//! Desktop app that batch-downloads whole YouTube playlists with yt-dlp

// egui front end
mod app;
// Optional config.json
mod config;
// Sequential playlist download loop
mod downloader;
mod error;
// Requests, formats and events exchanged with the UI
mod model;
// Per-playlist progress bookkeeping
mod progress;
mod text;
// Playlist thumbnails for the progress cards
mod thumbnail;
// ffmpeg discovery
mod transcoder;
mod validation;
// yt-dlp process backend
mod ytdlp;

use app::PlaylistApp;
use config::AppConfig;
use eframe::egui::{self, Visuals};
use once_cell::sync::OnceCell;
use tokio::runtime::Runtime;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

// Global Tokio runtime stored in a OnceCell for lazy init
static RUNTIME: OnceCell<Runtime> = OnceCell::new();

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Program entry point: initializes logging and the runtime, then launches the GUI
fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_logging();

    let rt = RUNTIME.get_or_try_init(Runtime::new)?;
    let handle = rt.handle().clone();
    let config = AppConfig::load();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([800.0, 700.0])
            .with_title("YouTube Multi-Playlist Downloader"),
        ..Default::default()
    };
    eframe::run_native(
        "YouTube Multi-Playlist Downloader",
        options,
        Box::new(move |cc| {
            cc.egui_ctx.set_visuals(Visuals::dark());
            Box::new(PlaylistApp::new(&cc.egui_ctx, handle, config))
        }),
    )?;
    Ok(())
}
