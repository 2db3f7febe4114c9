//! Publishing rendered pages.

use anyhow::Error;
use async_trait::async_trait;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use surf::Url;

mod google;
mod local;
#[cfg(any(test, feature = "testing"))]
mod memory;

pub use google::{GoogleDrive, ServiceAccount};
pub use local::LocalDrive;
#[cfg(any(test, feature = "testing"))]
pub use memory::{MemoryDrive, Upload};

/// A file store which can publish images.
#[async_trait]
pub trait Drive: Send + Sync {
    /// Store the PNG image `png` under the file name `name`.
    ///
    /// Returns a link where anyone can read the stored image.
    async fn upload(&self, name: &str, png: Vec<u8>) -> Result<String, Error>;
}

/// Options selecting and configuring the file store.
///
/// Images are stored in Google Drive unless a local directory is configured.
#[derive(Clone, Debug, Args)]
pub struct Options {
    /// JSON credentials of the Google service account used to upload images.
    #[clap(long, env = "SERVICE_ACCOUNT_INFO", hide_env_values = true)]
    pub service_account_info: Option<String>,

    /// ID of the Google Drive folder (shared with the service account) to upload images to.
    #[clap(long, env = "GDRIVE_FOLDER_ID")]
    pub gdrive_folder_id: Option<String>,

    /// Base URL of the Google Drive API.
    #[clap(
        long,
        env = "GDRIVE_API_URL",
        default_value = "https://www.googleapis.com/"
    )]
    pub gdrive_api_url: Url,

    /// Store images in DIR on the local file system instead of Google Drive.
    #[clap(long, env = "LOCAL_DRIVE_DIR", value_name = "DIR")]
    pub local_drive_dir: Option<PathBuf>,

    /// Public URL under which the contents of the local drive directory are served.
    #[clap(
        long,
        env = "LOCAL_DRIVE_URL",
        default_value = "http://localhost:8000/files/"
    )]
    pub local_drive_url: Url,
}

impl Options {
    /// Connect to the configured file store.
    pub fn connect(&self) -> Result<Arc<dyn Drive>, Error> {
        if let Some(dir) = &self.local_drive_dir {
            tracing::info!("storing images in {}", dir.display());
            return Ok(Arc::new(LocalDrive::open(
                dir.clone(),
                self.local_drive_url.clone(),
            )?));
        }

        let info = self.service_account_info.as_deref().ok_or_else(|| {
            Error::msg("service account info not found in environment variables")
        })?;
        if self.gdrive_folder_id.is_none() {
            tracing::warn!("no Google Drive folder configured, uploading to the service account's root");
        }
        Ok(Arc::new(GoogleDrive::new(
            info,
            self.gdrive_folder_id.clone(),
            self.gdrive_api_url.clone(),
        )?))
    }
}
