//! A file store on the local file system, used in place of Google Drive during development.

use super::Drive;
use anyhow::{Context, Error};
use async_std::fs;
use async_trait::async_trait;
use std::path::PathBuf;
use surf::Url;

/// A file store on the local file system.
///
/// Each upload is written to `{root}/{id}/{name}` for a fresh random `id`, and published as
/// `{base_url}{id}/{name}`. Serving the files under `base_url` is up to the caller.
#[derive(Clone, Debug)]
pub struct LocalDrive {
    root: PathBuf,
    base_url: Url,
}

impl LocalDrive {
    /// Open a local file store rooted at `root`, creating the directory if necessary.
    pub fn open(root: PathBuf, mut base_url: Url) -> Result<Self, Error> {
        std::fs::create_dir_all(&root)
            .with_context(|| format!("unable to create directory {}", root.display()))?;
        // Without a trailing slash, `Url::join` would replace the last path segment.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { root, base_url })
    }
}

#[async_trait]
impl Drive for LocalDrive {
    async fn upload(&self, name: &str, png: Vec<u8>) -> Result<String, Error> {
        let id = format!("{:016x}", rand::random::<u64>());
        let dir = self.root.join(&id);
        fs::create_dir_all(&dir).await?;
        let path = dir.join(name);
        fs::write(&path, png)
            .await
            .with_context(|| format!("unable to write {}", path.display()))?;
        tracing::debug!("stored {}", path.display());
        Ok(self.base_url.join(&format!("{id}/{name}"))?.to_string())
    }
}
