//! Resolving a job's media source to a local file.

use std::path::{Path, PathBuf};

use reqwest::Url;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::core::StageError;

const COLLABORATOR: &str = "media source";

/// Resolve `source` to a local path.
///
/// Local paths are used as-is and must exist. `http(s)` sources are
/// streamed to `{scratch_dir}/{job_id}{ext}`, where `ext` comes from the
/// URL path.
pub async fn resolve_source(source: &str, scratch_dir: &Path, job_id: &str) -> Result<PathBuf, StageError> {
    if source.starts_with("http://") || source.starts_with("https://") {
        return download(source, scratch_dir, job_id).await;
    }

    let path = PathBuf::from(source);
    if !fs::try_exists(&path).await? {
        return Err(StageError::collaborator(
            COLLABORATOR,
            format!("media file not found: {}", path.display()),
        ));
    }
    Ok(path)
}

fn extension_of(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default()
}

async fn download(source: &str, scratch_dir: &Path, job_id: &str) -> Result<PathBuf, StageError> {
    let url = Url::parse(source)
        .map_err(|e| StageError::collaborator(COLLABORATOR, format!("invalid URL '{}': {}", source, e)))?;
    let stem: String = job_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_') { c } else { '_' })
        .collect();
    let destination = scratch_dir.join(format!("{}{}", stem, extension_of(&url)));

    debug!(url = %url, destination = %destination.display(), "Downloading media");

    let mut response = reqwest::get(url.clone())
        .await
        .map_err(|e| StageError::from_http(COLLABORATOR, "download", e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(StageError::from_status(COLLABORATOR, "download", status, ""));
    }

    let mut file = fs::File::create(&destination).await?;
    let mut bytes = 0u64;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| StageError::from_http(COLLABORATOR, "download", e))?
    {
        file.write_all(&chunk).await?;
        bytes += chunk.len() as u64;
    }
    file.flush().await?;

    info!(bytes, destination = %destination.display(), "Media downloaded");
    Ok(destination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_path_used_as_is() {
        let temp = TempDir::new().unwrap();
        let media = temp.path().join("talk.mp4");
        std::fs::write(&media, b"fake").unwrap();

        let resolved = resolve_source(media.to_str().unwrap(), temp.path(), "job")
            .await
            .unwrap();
        assert_eq!(resolved, media);
    }

    #[tokio::test]
    async fn test_missing_local_file() {
        let temp = TempDir::new().unwrap();
        let err = resolve_source("/definitely/not/here.mp4", temp.path(), "job")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_extension_from_url() {
        let url = Url::parse("https://cdn.example.com/v/lecture.MP4?sig=abc").unwrap();
        assert_eq!(extension_of(&url), ".MP4");

        let url = Url::parse("https://cdn.example.com/stream").unwrap();
        assert_eq!(extension_of(&url), "");
    }
}
