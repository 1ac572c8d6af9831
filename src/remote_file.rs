//! Remote file fetching
//! Reqwest-backed implementation of the remote-file service

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::services::{FileRecord, RemoteFileFetcher, RemoteFileRequest};
use crate::error::FetchError;

/// Downloads files over HTTP and persists them under a target directory.
/// Responses with a 404 status map to [`FetchError::NotFound`]; every other
/// failure is the generic class and will abort the record being processed.
pub struct HttpRemoteFileFetcher {
    client: reqwest::Client,
    target_dir: PathBuf,
}

impl HttpRemoteFileFetcher {
    pub fn new(target_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            target_dir: target_dir.into(),
        })
    }
}

#[async_trait]
impl RemoteFileFetcher for HttpRemoteFileFetcher {
    async fn fetch(&self, request: RemoteFileRequest<'_>) -> Result<FileRecord, FetchError> {
        tracing::debug!(
            "Remote file: downloading {} for {}",
            request.url,
            request.parent_record_id
        );

        let response = self
            .client
            .get(request.url)
            .header("User-Agent", "wphtml-rewriter/1.0")
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("request to {} failed: {}", request.url, e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(request.url.to_string()));
        }
        if !response.status().is_success() {
            return Err(FetchError::Other(anyhow::anyhow!(
                "HTTP {}: {}",
                response.status(),
                request.url
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| anyhow::anyhow!("failed to read bytes from {}: {}", request.url, e))?;

        tracing::debug!(
            "Remote file: downloaded {} bytes from {}",
            bytes.len(),
            request.url
        );

        let filename = generate_filename(request.url);
        let mut record = FileRecord {
            id: format!("file:{}", filename),
            url: request.url.to_string(),
            absolute_path: None,
        };

        if request.create_file_record {
            let path = self.target_dir.join(&filename);
            tokio::fs::create_dir_all(&self.target_dir)
                .await
                .map_err(|e| anyhow::anyhow!("could not create {:?}: {}", self.target_dir, e))?;
            tokio::fs::write(&path, &bytes)
                .await
                .map_err(|e| anyhow::anyhow!("could not write {:?}: {}", path, e))?;
            record.absolute_path = Some(path.to_string_lossy().into_owned());
        }

        Ok(record)
    }
}

/// Hash-based filename so repeated downloads of one URL land on one file.
fn generate_filename(url: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    url.hash(&mut hasher);
    let hash = hasher.finish();

    let extension = url
        .rsplit('.')
        .next()
        .filter(|ext| ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("bin");

    format!("{:x}.{}", hash, extension)
}
