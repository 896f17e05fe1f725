use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::artifact::Artifact;
use crate::extractor::{ExtractError, ExtractOptions, Extractor, MediaInfo};

/// A finished download. `path` lies inside `artifact`'s directory, so
/// whoever holds this owns the file and everything else the engine wrote.
#[derive(Debug)]
pub struct FetchedVideo {
    pub path: PathBuf,
    pub title: Option<String>,
    pub artifact: Artifact,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),
    #[error("downloaded file not found: {0}")]
    FileMissing(String),
    #[error("extraction engine error: {0}")]
    EngineError(String),
}

pub type FetchResult = Result<FetchedVideo, FetchError>;

/// Runs the blocking extraction engine on tokio's blocking pool and turns
/// its output into a located file.
///
/// Every fetch gets its own directory under the configured download
/// directory. On failure that directory is removed before `fetch` returns.
pub struct FetchExecutor {
    extractor: Arc<dyn Extractor>,
    options: ExtractOptions,
    scan_limit: usize,
}

impl FetchExecutor {
    pub fn new(extractor: Arc<dyn Extractor>, options: ExtractOptions, scan_limit: usize) -> Self {
        Self {
            extractor,
            options,
            scan_limit,
        }
    }

    pub async fn fetch(&self, url: &str) -> FetchResult {
        info!("Fetching {}", url);

        let artifact = Artifact::create_in(&self.options.output_dir).map_err(|e| {
            FetchError::EngineError(format!(
                "could not create work dir in {}: {}",
                self.options.output_dir.display(),
                e
            ))
        })?;

        let extractor = Arc::clone(&self.extractor);
        let options = ExtractOptions {
            output_dir: artifact.dir().to_path_buf(),
            ..self.options.clone()
        };
        let scan_limit = self.scan_limit;
        let url_owned = url.to_string();

        let joined = tokio::task::spawn_blocking(move || {
            let info = extractor.extract(&url_owned, &options);
            resolve(info, &options, scan_limit)
        })
        .await;

        let located = match joined {
            Ok(result) => result,
            Err(e) => Err(FetchError::EngineError(format!("fetch worker died: {}", e))),
        };

        // On error the guard drops here and takes any partial output with it.
        match located {
            Ok((path, title)) => {
                info!("Fetched {} -> {}", url, path.display());
                Ok(FetchedVideo {
                    path,
                    title,
                    artifact,
                })
            }
            Err(e) => {
                warn!("Fetch of {} failed: {}", url, e);
                Err(e)
            }
        }
    }
}

fn resolve(
    info: Result<MediaInfo, ExtractError>,
    options: &ExtractOptions,
    scan_limit: usize,
) -> Result<(PathBuf, Option<String>), FetchError> {
    let info = match info {
        Ok(info) => info,
        Err(ExtractError::NoInfo) => {
            return Err(FetchError::ExtractionFailed(
                "engine returned no information".to_string(),
            ))
        }
        Err(ExtractError::Engine(detail)) => return Err(FetchError::EngineError(detail)),
    };

    let info = info
        .into_single()
        .ok_or_else(|| FetchError::ExtractionFailed("playlist has no entries".to_string()))?;

    let title = info.title.clone().filter(|t| !t.trim().is_empty());

    if let Some(path) = expected_path(&info, &options.merge_format) {
        if path.is_file() {
            return Ok((path, title));
        }
        debug!("Expected file {} is absent, scanning by id", path.display());
    }

    let id = info
        .id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| FetchError::FileMissing("engine reported no id".to_string()))?;

    match scan_for_id(&options.output_dir, id, scan_limit) {
        Some(path) => Ok((path, title)),
        None => Err(FetchError::FileMissing(format!(
            "no file for id {} in {}",
            id,
            options.output_dir.display()
        ))),
    }
}

/// The engine's filename with the merge container's extension
fn expected_path(info: &MediaInfo, merge_format: &str) -> Option<PathBuf> {
    info.reported_filename()
        .map(|name| name.with_extension(merge_format))
}

/// First regular file in `dir` whose name contains `id`, looking at no more
/// than `limit` entries. Leftover `.part` files are skipped.
fn scan_for_id(dir: &Path, id: &str, limit: usize) -> Option<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to scan {}: {}", dir.display(), e);
            return None;
        }
    };

    entries
        .take(limit)
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .find(|path| {
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name,
                None => return false,
            };
            name.contains(id) && !name.ends_with(".part") && path.is_file()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Writes files into the request's work dir, then reports the given
    /// info with filenames placed in that dir
    struct FakeEngine {
        writes: Vec<&'static str>,
        reply: Result<MediaInfo, ExtractError>,
    }

    impl Extractor for FakeEngine {
        fn extract(&self, _url: &str, options: &ExtractOptions) -> Result<MediaInfo, ExtractError> {
            for name in &self.writes {
                std::fs::write(options.output_dir.join(name), b"video").unwrap();
            }
            self.reply.clone().map(|info| in_dir(info, &options.output_dir))
        }
    }

    fn in_dir(mut info: MediaInfo, dir: &Path) -> MediaInfo {
        info.template_filename = info.template_filename.map(|name| dir.join(name));
        info.entries = info.entries.map(|entries| {
            entries
                .into_iter()
                .map(|entry| entry.map(|e| in_dir(e, dir)))
                .collect()
        });
        info
    }

    struct PanickingEngine;

    impl Extractor for PanickingEngine {
        fn extract(&self, _url: &str, options: &ExtractOptions) -> Result<MediaInfo, ExtractError> {
            std::fs::write(options.output_dir.join("Clip-abc.f137.mp4"), b"v").unwrap();
            panic!("engine crashed");
        }
    }

    fn options(dir: &Path) -> ExtractOptions {
        ExtractOptions {
            output_dir: dir.to_path_buf(),
            format: "b".to_string(),
            merge_format: "mp4".to_string(),
            cookies_file: None,
            user_agent: "test".to_string(),
            accept_language: "en".to_string(),
        }
    }

    fn info(id: &str, title: Option<&str>, filename: &str) -> MediaInfo {
        MediaInfo {
            id: Some(id.to_string()),
            title: title.map(str::to_string),
            template_filename: Some(PathBuf::from(filename)),
            ..MediaInfo::default()
        }
    }

    fn executor(dir: &Path, engine: impl Extractor + 'static) -> FetchExecutor {
        FetchExecutor::new(Arc::new(engine), options(dir), 64)
    }

    fn dir_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_expected_path_hit() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = FakeEngine {
            writes: vec!["Clip-xyz.mp4"],
            reply: Ok(info("xyz", Some("Clip"), "Clip-xyz.webm")),
        };
        let video = executor(tmp.path(), engine).fetch("https://youtu.be/xyz").await.unwrap();
        assert_eq!(video.path, video.artifact.dir().join("Clip-xyz.mp4"));
        assert_eq!(video.artifact.dir().parent(), Some(tmp.path()));
        assert_eq!(video.title.as_deref(), Some("Clip"));

        video.artifact.cleanup();
        assert!(dir_is_empty(tmp.path()));
    }

    #[tokio::test]
    async fn test_falls_back_to_id_scan() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = FakeEngine {
            writes: vec!["My Clip-abc123.mkv"],
            reply: Ok(info("abc123", Some("My Clip"), "My Clip-abc123.mp4")),
        };
        let video = executor(tmp.path(), engine).fetch("https://youtu.be/abc123").await.unwrap();
        assert_eq!(video.path, video.artifact.dir().join("My Clip-abc123.mkv"));
        assert_eq!(video.title.as_deref(), Some("My Clip"));
    }

    #[tokio::test]
    async fn test_scan_skips_partial_downloads() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = FakeEngine {
            writes: vec!["Clip-abc123.mp4.part"],
            reply: Ok(info("abc123", None, "Clip-abc123.mp4")),
        };
        let err = executor(tmp.path(), engine).fetch("https://youtu.be/abc123").await.unwrap_err();
        assert!(matches!(err, FetchError::FileMissing(_)));
        assert!(dir_is_empty(tmp.path()));
    }

    #[tokio::test]
    async fn test_scan_ignores_files_outside_the_request() {
        let tmp = tempfile::tempdir().unwrap();
        // left behind by something else sharing the download directory
        std::fs::write(tmp.path().join("Old-abc123.f137.mp4"), b"stale").unwrap();
        let engine = FakeEngine {
            writes: vec![],
            reply: Ok(info("abc123", None, "Clip-abc123.mp4")),
        };
        let err = executor(tmp.path(), engine).fetch("https://youtu.be/abc123").await.unwrap_err();
        assert!(matches!(err, FetchError::FileMissing(_)));
        assert!(tmp.path().join("Old-abc123.f137.mp4").exists());
    }

    #[tokio::test]
    async fn test_engine_failure_removes_partial_output() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = FakeEngine {
            writes: vec!["Clip-abc.f137.mp4", "Clip-abc.f140.m4a"],
            reply: Err(ExtractError::Engine("ffmpeg not found".to_string())),
        };
        let err = executor(tmp.path(), engine).fetch("https://youtu.be/abc").await.unwrap_err();
        assert_eq!(err, FetchError::EngineError("ffmpeg not found".to_string()));
        assert!(dir_is_empty(tmp.path()));
    }

    #[tokio::test]
    async fn test_playlist_uses_first_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let playlist = MediaInfo {
            id: Some("PL".to_string()),
            entries: Some(vec![None, Some(info("first", Some("One"), "One-first.mp4"))]),
            ..MediaInfo::default()
        };
        let engine = FakeEngine {
            writes: vec!["One-first.mp4"],
            reply: Ok(playlist),
        };
        let video = executor(tmp.path(), engine)
            .fetch("https://youtube.com/playlist?list=PL")
            .await
            .unwrap();
        assert_eq!(video.title.as_deref(), Some("One"));
        assert_eq!(video.path, video.artifact.dir().join("One-first.mp4"));
    }

    #[tokio::test]
    async fn test_failure_kinds() {
        let tmp = tempfile::tempdir().unwrap();

        let no_info = FakeEngine {
            writes: vec![],
            reply: Err(ExtractError::NoInfo),
        };
        assert!(matches!(
            executor(tmp.path(), no_info).fetch("u").await,
            Err(FetchError::ExtractionFailed(_))
        ));

        let engine_err = FakeEngine {
            writes: vec![],
            reply: Err(ExtractError::Engine("HTTP Error 403".to_string())),
        };
        assert!(matches!(
            executor(tmp.path(), engine_err).fetch("u").await,
            Err(FetchError::EngineError(detail)) if detail == "HTTP Error 403"
        ));

        let empty_playlist = FakeEngine {
            writes: vec![],
            reply: Ok(MediaInfo {
                entries: Some(vec![None]),
                ..MediaInfo::default()
            }),
        };
        assert!(matches!(
            executor(tmp.path(), empty_playlist).fetch("u").await,
            Err(FetchError::ExtractionFailed(_))
        ));
        assert!(dir_is_empty(tmp.path()));
    }

    #[tokio::test]
    async fn test_unusable_download_dir_is_engine_error() {
        let tmp = tempfile::tempdir().unwrap();
        let not_a_dir = tmp.path().join("file");
        std::fs::write(&not_a_dir, b"x").unwrap();
        let engine = FakeEngine {
            writes: vec![],
            reply: Err(ExtractError::NoInfo),
        };
        let err = executor(&not_a_dir, engine).fetch("u").await.unwrap_err();
        assert!(matches!(err, FetchError::EngineError(_)));
    }

    #[tokio::test]
    async fn test_engine_panic_is_contained() {
        let tmp = tempfile::tempdir().unwrap();
        let err = executor(tmp.path(), PanickingEngine).fetch("u").await.unwrap_err();
        assert!(matches!(err, FetchError::EngineError(_)));
        assert!(dir_is_empty(tmp.path()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_engine_does_not_stall_runtime() {
        struct SlowEngine;
        impl Extractor for SlowEngine {
            fn extract(&self, _url: &str, _o: &ExtractOptions) -> Result<MediaInfo, ExtractError> {
                std::thread::sleep(std::time::Duration::from_millis(300));
                Err(ExtractError::NoInfo)
            }
        }

        let tmp = tempfile::tempdir().unwrap();
        let exec = Arc::new(executor(tmp.path(), SlowEngine));
        let slow = tokio::spawn({
            let exec = Arc::clone(&exec);
            async move { exec.fetch("u").await }
        });

        // other work keeps flowing while the engine blocks
        let started = std::time::Instant::now();
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(started.elapsed() < std::time::Duration::from_millis(250));

        assert!(slow.await.unwrap().is_err());
    }

    #[test]
    fn test_scan_respects_limit() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("x-id42.mp4"), b"v").unwrap();
        assert!(scan_for_id(tmp.path(), "id42", 0).is_none());
        assert_eq!(
            scan_for_id(tmp.path(), "id42", 8),
            Some(tmp.path().join("x-id42.mp4"))
        );
        assert!(scan_for_id(&tmp.path().join("missing"), "id42", 8).is_none());
    }
}
