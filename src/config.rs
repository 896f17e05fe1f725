use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,
    #[serde(default = "default_pool_timeout")]
    pub pool_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DownloadConfig {
    #[serde(default = "default_download_dir")]
    pub directory: PathBuf,
    /// Netscape-format cookies.txt handed to yt-dlp
    #[serde(default)]
    pub cookies_file: Option<PathBuf>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_accept_language")]
    pub accept_language: String,
    /// Upper bound on the preferred video height
    #[serde(default = "default_max_height")]
    pub max_height: u32,
    #[serde(default = "default_ytdlp_path")]
    pub ytdlp_path: String,
    /// How many directory entries the id scan may look at
    #[serde(default = "default_scan_limit")]
    pub scan_limit: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeliveryConfig {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_backoff_base")]
    pub backoff_base: f64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
    #[serde(default = "default_other_backoff")]
    pub other_backoff_secs: u64,
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    60
}

fn default_write_timeout() -> u64 {
    120
}

fn default_pool_timeout() -> u64 {
    30
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/127.0.0.0 Safari/537.36"
        .to_string()
}

fn default_accept_language() -> String {
    "en-US,en;q=0.9".to_string()
}

fn default_max_height() -> u32 {
    720
}

fn default_ytdlp_path() -> String {
    "yt-dlp".to_string()
}

fn default_scan_limit() -> usize {
    512
}

fn default_attempts() -> u32 {
    3
}

fn default_backoff_base() -> f64 {
    2.0
}

fn default_max_backoff() -> u64 {
    20
}

fn default_other_backoff() -> u64 {
    1
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            write_timeout_secs: default_write_timeout(),
            pool_timeout_secs: default_pool_timeout(),
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            directory: default_download_dir(),
            cookies_file: None,
            user_agent: default_user_agent(),
            accept_language: default_accept_language(),
            max_height: default_max_height(),
            ytdlp_path: default_ytdlp_path(),
            scan_limit: default_scan_limit(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            backoff_base: default_backoff_base(),
            max_backoff_secs: default_max_backoff(),
            other_backoff_secs: default_other_backoff(),
        }
    }
}

impl TelegramConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Whole-request timeout. Uploads are bounded by the write timeout,
    /// long polls by the read timeout, so the larger of the two wins.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs.max(self.write_timeout_secs))
    }

    pub fn pool_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_timeout_secs)
    }
}

impl Config {
    /// Load the config file (if present), apply environment overrides,
    /// validate, and make sure the download directory exists.
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// `load` with the override source supplied by the caller
    pub fn load_with(path: &Path, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_toml_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::from_toml_str("")?
        };

        config.apply_overrides(lookup)?;
        config.validate()?;

        if !config.download.directory.exists() {
            std::fs::create_dir_all(&config.download.directory).with_context(|| {
                format!(
                    "Failed to create download directory: {}",
                    config.download.directory.display()
                )
            })?;
        }

        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid TOML")
    }

    /// Environment variables win over the file. `lookup` is injected so
    /// tests don't have to touch the process environment.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(token) = get("BOT_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Some(dir) = get("DOWNLOAD_DIR") {
            self.download.directory = PathBuf::from(dir);
        }
        if let Some(cookies) = get("YTDLP_COOKIES") {
            self.download.cookies_file = Some(PathBuf::from(cookies));
        }
        if let Some(ua) = get("YTDLP_UA") {
            self.download.user_agent = ua;
        }
        if let Some(bin) = get("YTDLP_PATH") {
            self.download.ytdlp_path = bin;
        }
        if let Some(attempts) = get("SEND_RETRIES") {
            self.delivery.attempts = attempts
                .parse()
                .with_context(|| format!("SEND_RETRIES is not a number: {}", attempts))?;
        }
        if let Some(base) = get("SEND_BACKOFF_BASE") {
            self.delivery.backoff_base = base
                .parse()
                .with_context(|| format!("SEND_BACKOFF_BASE is not a number: {}", base))?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            anyhow::bail!("Bot token is not set (BOT_TOKEN or [telegram] bot_token)");
        }
        if self.delivery.attempts == 0 {
            anyhow::bail!("[delivery] attempts must be at least 1");
        }
        if !(self.delivery.backoff_base.is_finite() && self.delivery.backoff_base >= 1.0) {
            anyhow::bail!(
                "[delivery] backoff_base must be >= 1.0, got {}",
                self.delivery.backoff_base
            );
        }
        Ok(())
    }
}
