//! Turning user references (paths, URLs, search queries) into playable
//! sources.
//!
//! Resolution is asynchronous because it may download. Every failure is a
//! [`DownloadError`]; opening the resolved file is the decoder's job.

use futures::future::BoxFuture;
use gridcast_core::DownloadError;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::probe::last_line;
use crate::source::VideoSource;

/// Default `yt-dlp` format selector: MP4 up to 1080p.
pub const DEFAULT_FORMAT: &str = "bestvideo[ext=mp4][height<=1080]/best[ext=mp4]/best";

/// Resolves a reference to a local, playable source.
pub trait SourceResolver: Send + Sync {
    fn resolve<'a>(&'a self, reference: &'a str) -> BoxFuture<'a, Result<VideoSource, DownloadError>>;
}

/// Accepts every reference as an already-resolved path.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughResolver;

impl SourceResolver for PassthroughResolver {
    fn resolve<'a>(&'a self, reference: &'a str) -> BoxFuture<'a, Result<VideoSource, DownloadError>> {
        Box::pin(async move { Ok(VideoSource::new(reference, reference)) })
    }
}

/// Resolves existing files, optionally relative to a media directory.
#[derive(Debug, Clone, Default)]
pub struct LocalFileResolver {
    base_dir: Option<PathBuf>,
}

impl LocalFileResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also look for relative references inside `dir`.
    pub fn with_base_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(dir.into()),
        }
    }

    fn candidates(&self, reference: &str) -> Vec<PathBuf> {
        let path = Path::new(reference);
        let mut candidates = vec![path.to_path_buf()];
        if let (Some(base), true) = (&self.base_dir, path.is_relative()) {
            candidates.push(base.join(path));
        }
        candidates
    }
}

impl SourceResolver for LocalFileResolver {
    fn resolve<'a>(&'a self, reference: &'a str) -> BoxFuture<'a, Result<VideoSource, DownloadError>> {
        Box::pin(async move {
            for candidate in self.candidates(reference) {
                if let Ok(meta) = tokio::fs::metadata(&candidate).await {
                    if meta.is_file() {
                        debug!(reference, path = %candidate.display(), "Resolved local file");
                        return Ok(VideoSource::new(reference, candidate));
                    }
                }
            }
            Err(DownloadError::NotFound(reference.to_string()))
        })
    }
}

/// Downloads through an external `yt-dlp` binary.
#[derive(Debug, Clone)]
pub struct YtDlpResolver {
    binary: PathBuf,
    download_dir: PathBuf,
    format: String,
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<PathBuf>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            download_dir: download_dir.into(),
            format: DEFAULT_FORMAT.to_string(),
        }
    }

    /// Find `yt-dlp` on `PATH`.
    pub fn locate(download_dir: impl Into<PathBuf>) -> Result<Self, DownloadError> {
        let binary = which::which("yt-dlp")
            .map_err(|e| DownloadError::Unavailable(format!("yt-dlp: {e}")))?;
        info!(binary = %binary.display(), "Found yt-dlp");
        Ok(Self::new(binary, download_dir))
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    /// URLs are downloaded as-is; anything else is a search query.
    pub fn target(reference: &str) -> String {
        if reference.contains("://") {
            reference.to_string()
        } else {
            format!("ytsearch1:{reference}")
        }
    }

    fn args(&self, reference: &str) -> Vec<String> {
        let template = self.download_dir.join("%(id)s.%(ext)s");
        vec![
            "-f".into(),
            self.format.clone(),
            "--merge-output-format".into(),
            "mp4".into(),
            "-o".into(),
            template.to_string_lossy().into_owned(),
            "--no-playlist".into(),
            "--no-progress".into(),
            "--quiet".into(),
            "--print".into(),
            "after_move:filepath".into(),
            Self::target(reference),
        ]
    }
}

impl SourceResolver for YtDlpResolver {
    fn resolve<'a>(&'a self, reference: &'a str) -> BoxFuture<'a, Result<VideoSource, DownloadError>> {
        Box::pin(async move {
            tokio::fs::create_dir_all(&self.download_dir)
                .await
                .map_err(|e| DownloadError::Failed {
                    reference: reference.to_string(),
                    reason: format!("cannot create {}: {e}", self.download_dir.display()),
                })?;

            info!(reference, "Downloading video");
            let output = Command::new(&self.binary)
                .args(self.args(reference))
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|e| DownloadError::Unavailable(e.to_string()))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let reason = last_line(&stderr).unwrap_or("yt-dlp failed").to_string();
                warn!(reference, %reason, "Download failed");
                return Err(DownloadError::Failed {
                    reference: reference.to_string(),
                    reason,
                });
            }

            let stdout = String::from_utf8_lossy(&output.stdout);
            let path = last_line(&stdout)
                .map(PathBuf::from)
                .ok_or_else(|| DownloadError::NotFound(reference.to_string()))?;
            info!(reference, path = %path.display(), "Download complete");
            Ok(VideoSource::new(reference, path))
        })
    }
}

/// Tries resolvers in order; the first success wins, otherwise the last
/// error is returned.
#[derive(Default)]
pub struct ChainResolver {
    resolvers: Vec<Box<dyn SourceResolver>>,
}

impl ChainResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, resolver: impl SourceResolver + 'static) -> Self {
        self.resolvers.push(Box::new(resolver));
        self
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

impl SourceResolver for ChainResolver {
    fn resolve<'a>(&'a self, reference: &'a str) -> BoxFuture<'a, Result<VideoSource, DownloadError>> {
        Box::pin(async move {
            let mut last = DownloadError::NotFound(reference.to_string());
            for resolver in &self.resolvers {
                match resolver.resolve(reference).await {
                    Ok(source) => return Ok(source),
                    Err(e) => {
                        debug!(reference, error = %e, "Resolver declined");
                        last = e;
                    }
                }
            }
            Err(last)
        })
    }
}
