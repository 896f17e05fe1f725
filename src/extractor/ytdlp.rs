use std::process::Command;

use tracing::debug;

use super::{ExtractError, ExtractOptions, Extractor, MediaInfo};

/// Extraction engine backed by the `yt-dlp` binary.
///
/// Runs the download to completion and reads the info JSON yt-dlp prints
/// for the finished item.
pub struct YtDlp {
    binary: String,
}

impl YtDlp {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn build_args(url: &str, options: &ExtractOptions) -> Vec<String> {
        let mut args = vec![
            "--no-simulate".to_string(),
            "--dump-json".to_string(),
            "--no-playlist".to_string(),
            "--playlist-items".to_string(),
            "1".to_string(),
            "--quiet".to_string(),
            "--no-warnings".to_string(),
            "--no-progress".to_string(),
            "-f".to_string(),
            options.format.clone(),
            "--merge-output-format".to_string(),
            options.merge_format.clone(),
            "-o".to_string(),
            options.output_template().to_string_lossy().into_owned(),
            "--user-agent".to_string(),
            options.user_agent.clone(),
            "--add-header".to_string(),
            format!("Accept-Language:{}", options.accept_language),
            "--extractor-args".to_string(),
            "youtube:player_client=android".to_string(),
        ];

        if let Some(cookies) = &options.cookies_file {
            args.push("--cookies".to_string());
            args.push(cookies.to_string_lossy().into_owned());
        }

        args.push("--".to_string());
        args.push(url.to_string());
        args
    }
}

impl Extractor for YtDlp {
    fn extract(&self, url: &str, options: &ExtractOptions) -> Result<MediaInfo, ExtractError> {
        let args = Self::build_args(url, options);
        debug!("Running {} {}", self.binary, args.join(" "));

        let output = Command::new(&self.binary)
            .args(&args)
            .output()
            .map_err(|e| ExtractError::Engine(format!("failed to start {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("no error output")
                .trim()
                .to_string();
            return Err(ExtractError::Engine(format!(
                "{} exited with {}: {}",
                self.binary, output.status, reason
            )));
        }

        parse_info(&String::from_utf8_lossy(&output.stdout))
    }
}

/// yt-dlp prints one JSON object per downloaded item. Only the first item
/// is ever requested, so the first line is the one we want.
fn parse_info(stdout: &str) -> Result<MediaInfo, ExtractError> {
    let line = stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or(ExtractError::NoInfo)?;

    let info: Option<MediaInfo> = serde_json::from_str(line)
        .map_err(|e| ExtractError::Engine(format!("unreadable info JSON: {}", e)))?;
    info.ok_or(ExtractError::NoInfo)
}
