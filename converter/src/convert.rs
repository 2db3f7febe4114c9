//! The conversion pipeline: download a PDF, render its pages, and publish the images.

use crate::{
    download::{self, Downloader},
    drive::Drive,
    error::Error,
    render::Rasterizer,
    usage::ResourceMonitor,
};
use clap::Args;
use futures::{stream, StreamExt, TryStreamExt};
use std::num::ParseIntError;
use std::sync::Arc;
use std::time::Duration;

/// Limits and tuning for conversions.
#[derive(Clone, Debug, Args)]
pub struct Options {
    /// Largest PDF, in bytes, that will be downloaded.
    #[clap(long, env = "PDF_MAX_SIZE", default_value = "10485760")]
    pub max_pdf_size: usize,

    /// Largest number of pages a PDF may have.
    #[clap(long, env = "PDF_MAX_PAGES", default_value = "300")]
    pub max_pages: usize,

    /// Resolution at which pages are rendered.
    #[clap(long, env = "PDF_DPI", default_value = "100")]
    pub dpi: u16,

    /// Timeout, in seconds, for downloading a PDF.
    #[clap(
        long,
        env = "PDF_DOWNLOAD_TIMEOUT",
        default_value = "60",
        value_name = "SECONDS",
        value_parser = parse_seconds
    )]
    pub download_timeout: Duration,

    /// Largest number of images uploaded at the same time.
    #[clap(long, env = "UPLOAD_CONCURRENCY", default_value = "8")]
    pub upload_concurrency: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_pdf_size: 10 * 1024 * 1024,
            max_pages: 300,
            dpi: 100,
            download_timeout: Duration::from_secs(60),
            upload_concurrency: 8,
        }
    }
}

fn parse_seconds(s: &str) -> Result<Duration, ParseIntError> {
    Ok(Duration::from_secs(s.parse()?))
}

/// Converts PDF documents into published page images.
pub struct Converter {
    downloader: Downloader,
    rasterizer: Arc<dyn Rasterizer>,
    drive: Arc<dyn Drive>,
    monitor: ResourceMonitor,
    options: Options,
}

impl Converter {
    pub fn new(options: Options, rasterizer: Arc<dyn Rasterizer>, drive: Arc<dyn Drive>) -> Self {
        Self {
            downloader: Downloader::new(options.max_pdf_size, options.download_timeout),
            rasterizer,
            drive,
            monitor: ResourceMonitor::new(),
            options,
        }
    }

    /// Convert the PDF at `url`.
    ///
    /// Returns a public link to the image of each page, in page order.
    pub async fn convert(&self, url: &str) -> Result<Vec<String>, Error> {
        let url = download::parse_url(url)?;
        tracing::info!("converting {url}");
        let pdf = self.downloader.download(&url).await?;
        self.convert_pdf(pdf).await
    }

    /// Convert a PDF which has already been loaded.
    pub async fn convert_pdf(&self, pdf: Vec<u8>) -> Result<Vec<String>, Error> {
        self.monitor.log("Before Conversion");
        let pages = self
            .rasterizer
            .render(pdf, self.options.dpi, self.options.max_pages)
            .await?;
        self.monitor.log("After Conversion");

        let links = self.upload(pages).await?;
        if links.is_empty() {
            return Err(Error::NoImages {});
        }
        Ok(links)
    }

    async fn upload(&self, pages: Vec<Vec<u8>>) -> Result<Vec<String>, Error> {
        let drive = &self.drive;
        // `buffered` keeps the results in page order however the uploads finish.
        stream::iter(pages.into_iter().enumerate())
            .map(|(index, png)| async move {
                let name = format!("page{}.png", index + 1);
                drive.upload(&name, png).await.map_err(|err| {
                    tracing::error!("Error uploading image {name}: {err:#}");
                    Error::Upload {}
                })
            })
            .buffered(self.options.upload_concurrency.max(1))
            .try_collect()
            .await
    }
}
