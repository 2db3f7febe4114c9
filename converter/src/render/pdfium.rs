//! A rasterizer backed by the PDFium library.

use super::{check_page_count, encode_png, render_error, Rasterizer};
use crate::error::Error;
use async_std::task::spawn_blocking;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::Path;
use std::sync::Arc;

/// Points per inch in PDF user space.
const POINTS_PER_INCH: f32 = 72.0;

/// A rasterizer backed by the PDFium library.
///
/// PDFium is loaded once and shared. Rendering is CPU bound, so it runs on the blocking thread
/// pool rather than on the async executor.
#[derive(Clone)]
pub struct PdfiumRasterizer {
    pdfium: Arc<Pdfium>,
}

impl PdfiumRasterizer {
    /// Load PDFium, from `library` if given, or else from the system library search path.
    pub fn bind(library: Option<&Path>) -> Result<Self, anyhow::Error> {
        let bindings = match library {
            Some(path) => {
                let path = path.to_string_lossy().to_string();
                tracing::info!("loading PDFium from {path}");
                Pdfium::bind_to_library(&path)?
            }
            None => Pdfium::bind_to_system_library()?,
        };
        Ok(Self {
            pdfium: Arc::new(Pdfium::new(bindings)),
        })
    }
}

#[async_trait]
impl Rasterizer for PdfiumRasterizer {
    async fn render(&self, pdf: Vec<u8>, dpi: u16, max_pages: usize) -> Result<Vec<Vec<u8>>, Error> {
        let pdfium = self.pdfium.clone();
        spawn_blocking(move || render_pages(&pdfium, &pdf, dpi, max_pages)).await
    }
}

fn render_pages(
    pdfium: &Pdfium,
    pdf: &[u8],
    dpi: u16,
    max_pages: usize,
) -> Result<Vec<Vec<u8>>, Error> {
    let document = pdfium
        .load_pdf_from_byte_slice(pdf, None)
        .map_err(render_error)?;
    let pages = document.pages();
    check_page_count(pages.len() as usize, max_pages)?;

    let config = PdfRenderConfig::new().scale_page_by_factor(f32::from(dpi) / POINTS_PER_INCH);
    pages
        .iter()
        .enumerate()
        .map(|(index, page)| {
            let bitmap = page.render_with_config(&config).map_err(render_error)?;
            let (width, height) = (bitmap.width() as u32, bitmap.height() as u32);
            tracing::debug!("rendered page {} at {width}x{height}", index + 1);
            encode_png(width, height, bitmap.as_rgba_bytes()).map_err(render_error)
        })
        .collect()
}
