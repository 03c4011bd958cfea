//! Optional user configuration read from `config.json`.

use crate::model::DownloadFormat;
use serde::Deserialize;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

const APP_DIR: &str = "multi-playlist-downloader";
const CONFIG_FILE: &str = "config.json";

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// yt-dlp executable; a bare name is looked up on PATH
    pub ytdlp_path: PathBuf,
    /// Initial value of the output folder field
    pub output_dir: PathBuf,
    pub default_format: DownloadFormat,
    /// Constant bitrate for mp3 output
    pub audio_bitrate_kbps: u32,
    /// Well-known ffmpeg locations tried after PATH, `*` allowed per segment
    pub transcoder_candidates: Vec<String>,
    pub probe_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: PathBuf::from("yt-dlp"),
            output_dir: default_output_dir(),
            default_format: DownloadFormat::Mp4,
            audio_bitrate_kbps: 192,
            transcoder_candidates: default_transcoder_candidates(),
            probe_timeout_secs: 10,
        }
    }
}

impl AppConfig {
    /// Loads the config from the platform config dir, falling back to defaults.
    pub fn load() -> Self {
        match dirs::config_dir() {
            Some(dir) => Self::load_from(&dir.join(APP_DIR).join(CONFIG_FILE)),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                tracing::warn!("Could not read {}: {e}", path.display());
                return Self::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(config) => {
                tracing::info!("Loaded configuration from {}", path.display());
                config
            }
            Err(e) => {
                tracing::warn!("Ignoring malformed {}: {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

fn default_output_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Downloads")
        .join("YouTube_Playlists")
}

#[cfg(windows)]
fn default_transcoder_candidates() -> Vec<String> {
    let env = |key: &str| std::env::var(key).unwrap_or_default();
    let home = dirs::home_dir().unwrap_or_default();
    vec![
        format!(
            r"{}\Microsoft\WinGet\Packages\Gyan.FFmpeg.Essentials_*\bin\ffmpeg.exe",
            env("LOCALAPPDATA")
        ),
        format!(r"{}\ffmpeg\bin\ffmpeg.exe", env("PROGRAMFILES")),
        format!(r"{}\ffmpeg\bin\ffmpeg.exe", env("PROGRAMFILES(X86)")),
        r"C:\ffmpeg\bin\ffmpeg.exe".to_string(),
        format!(r"{}\ffmpeg\bin\ffmpeg.exe", home.display()),
    ]
}

#[cfg(not(windows))]
fn default_transcoder_candidates() -> Vec<String> {
    [
        "/opt/homebrew/bin/ffmpeg",
        "/usr/local/bin/ffmpeg",
        "/usr/bin/ffmpeg",
        "/opt/local/bin/ffmpeg",
        "/snap/bin/ffmpeg",
    ]
    .map(String::from)
    .to_vec()
}
