//! Rasterizing PDF pages to PNG images.

use crate::error::Error;
use anyhow::Context;
use async_trait::async_trait;
use clap::Args;
use image::{ImageFormat, RgbaImage};
use std::io::Cursor;
use std::path::PathBuf;

#[cfg(any(test, feature = "testing"))]
mod fake;
mod pdfium;

#[cfg(any(test, feature = "testing"))]
pub use fake::FakeRasterizer;
pub use pdfium::PdfiumRasterizer;

/// Renders the pages of a PDF document.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Render each page of `pdf`, in order, to a PNG image at `dpi` dots per inch.
    ///
    /// Documents with more than `max_pages` pages are rejected before any page is rendered.
    async fn render(&self, pdf: Vec<u8>, dpi: u16, max_pages: usize) -> Result<Vec<Vec<u8>>, Error>;
}

/// Options for locating the PDF rendering library.
#[derive(Clone, Debug, Args)]
pub struct Options {
    /// Path to the PDFium shared library.
    ///
    /// If not given, the library is looked up in the system library search path.
    #[clap(long, env = "PDFIUM_LIBRARY", value_name = "LIB")]
    pub pdfium_library: Option<PathBuf>,
}

impl Options {
    /// Load the rendering library.
    pub fn rasterizer(&self) -> Result<PdfiumRasterizer, anyhow::Error> {
        PdfiumRasterizer::bind(self.pdfium_library.as_deref())
    }
}

/// Enforce the page limit.
fn check_page_count(pages: usize, max: usize) -> Result<(), Error> {
    tracing::info!("PDF has {pages} pages.");
    if pages > max {
        Err(Error::TooManyPages { pages, max })
    } else {
        Ok(())
    }
}

/// Encode a raw RGBA buffer as PNG.
fn encode_png(width: u32, height: u32, rgba: Vec<u8>) -> Result<Vec<u8>, anyhow::Error> {
    let image = RgbaImage::from_raw(width, height, rgba)
        .with_context(|| format!("pixel buffer does not match a {width}x{height} image"))?;
    let mut png = Cursor::new(Vec::new());
    image.write_to(&mut png, ImageFormat::Png)?;
    Ok(png.into_inner())
}

/// Log a rendering failure and convert it to the error reported to callers.
fn render_error(err: impl std::fmt::Display) -> Error {
    tracing::error!("Error converting PDF to images: {err}");
    Error::Render {}
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_check_page_count() {
        assert_eq!(check_page_count(0, 3), Ok(()));
        assert_eq!(check_page_count(3, 3), Ok(()));
        assert_eq!(
            check_page_count(4, 3),
            Err(Error::TooManyPages { pages: 4, max: 3 })
        );
    }

    #[test]
    fn test_encode_png() {
        let png = encode_png(2, 1, vec![255, 0, 0, 255, 0, 0, 255, 255]).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");

        let decoded = image::load_from_memory_with_format(&png, ImageFormat::Png)
            .unwrap()
            .into_rgba8();
        assert_eq!(decoded.dimensions(), (2, 1));
        assert_eq!(decoded.get_pixel(1, 0).0, [0, 0, 255, 255]);
    }

    #[test]
    fn test_encode_png_short_buffer() {
        assert!(encode_png(2, 2, vec![0; 4]).is_err());
    }
}
