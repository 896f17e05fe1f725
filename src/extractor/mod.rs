pub mod ytdlp;

use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

use crate::config::DownloadConfig;

/// Container the engine merges separate video/audio streams into
pub const MERGE_FORMAT: &str = "mp4";

/// Output naming template: truncated title plus the video id
pub const OUTPUT_TEMPLATE: &str = "%(title).200B-%(id)s.%(ext)s";

/// What the extraction engine tells us about a finished download
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct MediaInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// Final filename after post-processing
    #[serde(default)]
    pub filename: Option<PathBuf>,
    /// Filename derived from the output template before merging
    #[serde(default, rename = "_filename")]
    pub template_filename: Option<PathBuf>,
    /// Present when the engine resolved a playlist; unavailable items are null
    #[serde(default)]
    pub entries: Option<Vec<Option<MediaInfo>>>,
}

impl MediaInfo {
    /// Collapse a playlist to its first entry. Single items pass through.
    pub fn into_single(self) -> Option<MediaInfo> {
        match self.entries {
            Some(entries) => entries.into_iter().flatten().next(),
            None => Some(self),
        }
    }

    pub fn reported_filename(&self) -> Option<&PathBuf> {
        self.template_filename.as_ref().or(self.filename.as_ref())
    }
}

/// Fixed per-process engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractOptions {
    pub output_dir: PathBuf,
    pub format: String,
    pub merge_format: String,
    pub cookies_file: Option<PathBuf>,
    pub user_agent: String,
    pub accept_language: String,
}

impl ExtractOptions {
    pub fn from_config(config: &DownloadConfig) -> Self {
        let cookies_file = match &config.cookies_file {
            Some(path) if path.exists() => Some(path.clone()),
            Some(path) => {
                tracing::warn!("Cookies file {} not found, ignoring", path.display());
                None
            }
            None => None,
        };

        Self {
            output_dir: config.directory.clone(),
            format: format_selector(config.max_height),
            merge_format: MERGE_FORMAT.to_string(),
            cookies_file,
            user_agent: config.user_agent.clone(),
            accept_language: config.accept_language.clone(),
        }
    }

    pub fn output_template(&self) -> PathBuf {
        self.output_dir.join(OUTPUT_TEMPLATE)
    }
}

/// Best stream at or under `max_height` with audio, falling back step by
/// step to anything that has both video and audio.
pub fn format_selector(max_height: u32) -> String {
    let h = max_height;
    format!(
        "bv*[height<={h}][ext=mp4]+ba[ext=m4a]/b[height<={h}][ext=mp4]/\
         bv*[height<={h}]+ba/b[height<={h}]/bv*+ba/b"
    )
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExtractError {
    #[error("engine returned no information")]
    NoInfo,
    #[error("engine failed: {0}")]
    Engine(String),
}

/// The external extraction engine. Implementations block; callers run them
/// on a blocking-friendly thread.
pub trait Extractor: Send + Sync {
    fn extract(&self, url: &str, options: &ExtractOptions) -> Result<MediaInfo, ExtractError>;
}
