//! Avatar download and file storage.

use std::path::PathBuf;

use async_trait::async_trait;

/// Fetches remote images and stores files under a path namespace.
#[async_trait]
pub trait FileService: Send + Sync {
    /// Download an image. `Ok(None)` means the remote answered without a
    /// usable body.
    async fn download_image(&self, url: &str) -> anyhow::Result<Option<Vec<u8>>>;

    /// Store `bytes` at `path`, returning the stored path.
    async fn upload_file(
        &self,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> anyhow::Result<String>;
}

/// [`FileService`] backed by reqwest and the local filesystem.
pub struct LocalFileService {
    client: reqwest::Client,
    root: PathBuf,
}

impl LocalFileService {
    pub fn new(client: reqwest::Client, root: PathBuf) -> Self {
        Self { client, root }
    }
}

#[async_trait]
impl FileService for LocalFileService {
    async fn download_image(&self, url: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("image download returned HTTP {}", resp.status());
        }
        let bytes = resp.bytes().await?;
        Ok((!bytes.is_empty()).then(|| bytes.to_vec()))
    }

    async fn upload_file(
        &self,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> anyhow::Result<String> {
        if path.split('/').any(|part| part.is_empty() || part == "..") {
            anyhow::bail!("invalid storage path: {path}");
        }
        let target = self.root.join(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &bytes).await?;
        tracing::debug!(path, content_type, size = bytes.len(), "stored file");
        Ok(path.to_string())
    }
}
