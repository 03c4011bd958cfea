//! Locating ffmpeg on the host.
//!
//! Lookup order is the process search path first, then a list of well-known
//! install locations where any path segment may contain `*` wildcards. A
//! located binary only counts once `ffmpeg -version` succeeds.

use regex::Regex;
use std::{
    ffi::OsString,
    path::{Component, Path, PathBuf},
    process::Stdio,
    time::Duration,
};
use tokio::{process::Command, time::timeout};

#[cfg(windows)]
const FFMPEG_BIN: &str = "ffmpeg.exe";
#[cfg(not(windows))]
const FFMPEG_BIN: &str = "ffmpeg";

#[derive(Clone, Debug)]
pub struct TranscoderLocator {
    /// Value of the search path variable, split with `std::env::split_paths`
    search_path: Option<OsString>,
    candidates: Vec<String>,
    probe_timeout: Duration,
}

impl TranscoderLocator {
    pub fn new(candidates: Vec<String>, probe_timeout: Duration) -> Self {
        Self::with_search_path(std::env::var_os("PATH"), candidates, probe_timeout)
    }

    /// Same as `new` but with an explicit search path instead of `$PATH`.
    pub fn with_search_path(
        search_path: Option<OsString>,
        candidates: Vec<String>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            search_path,
            candidates,
            probe_timeout,
        }
    }

    /// First existing ffmpeg binary, without running it.
    pub fn locate(&self) -> Option<PathBuf> {
        if let Some(found) = self
            .search_path
            .as_deref()
            .and_then(|paths| find_in_search_path(paths, FFMPEG_BIN))
        {
            return Some(found);
        }
        self.candidates
            .iter()
            .flat_map(|pattern| expand_wildcards(pattern))
            .find(|path| path.is_file())
    }

    /// Locates ffmpeg and checks that it actually runs.
    pub async fn probe(&self) -> Option<PathBuf> {
        let path = self.locate()?;
        if runs_ok(&path, self.probe_timeout).await {
            tracing::info!("ffmpeg available at {}", path.display());
            Some(path)
        } else {
            tracing::warn!("ffmpeg at {} did not answer -version", path.display());
            None
        }
    }
}

fn find_in_search_path(paths: &std::ffi::OsStr, binary: &str) -> Option<PathBuf> {
    std::env::split_paths(paths)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}

async fn runs_ok(path: &Path, limit: Duration) -> bool {
    let status = Command::new(path)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status();
    matches!(timeout(limit, status).await, Ok(Ok(status)) if status.success())
}

/// Expands `*` inside path segments against the filesystem. Patterns without
/// wildcards come back unchanged whether or not they exist.
pub fn expand_wildcards(pattern: &str) -> Vec<PathBuf> {
    let pattern = Path::new(pattern);
    let mut bases = vec![PathBuf::new()];
    for component in pattern.components() {
        let segment = component.as_os_str().to_string_lossy();
        let wildcard = matches!(component, Component::Normal(_)) && segment.contains('*');
        if !wildcard {
            for base in &mut bases {
                base.push(component.as_os_str());
            }
            continue;
        }
        let Some(matcher) = segment_matcher(&segment) else {
            return Vec::new();
        };
        let mut next = Vec::new();
        for base in &bases {
            let dir = if base.as_os_str().is_empty() {
                Path::new(".")
            } else {
                base.as_path()
            };
            let Ok(entries) = std::fs::read_dir(dir) else {
                continue;
            };
            let mut names: Vec<OsString> = entries
                .filter_map(Result::ok)
                .map(|entry| entry.file_name())
                .filter(|name| matcher.is_match(&name.to_string_lossy()))
                .collect();
            names.sort();
            next.extend(names.into_iter().map(|name| base.join(name)));
        }
        bases = next;
    }
    bases
}

fn segment_matcher(segment: &str) -> Option<Regex> {
    let body = segment
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{body}$")).ok()
}
