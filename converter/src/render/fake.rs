//! A rasterizer which does not need the PDFium library.
//!
//! It understands just enough of the PDF format to count pages, and renders every page as a
//! blank image. This is useful for testing the rest of the pipeline in isolation.

use super::{check_page_count, encode_png, render_error, Rasterizer};
use crate::error::Error;
use async_trait::async_trait;

/// A rasterizer which renders every page of a PDF as a 1x1 white image.
#[derive(Clone, Copy, Debug, Default)]
pub struct FakeRasterizer;

#[async_trait]
impl Rasterizer for FakeRasterizer {
    async fn render(&self, pdf: Vec<u8>, _dpi: u16, max_pages: usize) -> Result<Vec<Vec<u8>>, Error> {
        if !pdf.starts_with(b"%PDF-") {
            return Err(render_error("missing PDF header"));
        }
        let pages = count_pages(&pdf);
        check_page_count(pages, max_pages)?;
        (0..pages)
            .map(|_| encode_png(1, 1, vec![255; 4]).map_err(render_error))
            .collect()
    }
}

/// Count the page objects (`/Type /Page`, but not `/Type /Pages`) in a PDF.
fn count_pages(pdf: &[u8]) -> usize {
    let text = String::from_utf8_lossy(pdf);
    text.match_indices("/Type")
        .filter(|(i, ty)| {
            let rest = text[i + ty.len()..].trim_start();
            rest.starts_with("/Page") && !rest["/Page".len()..].starts_with('s')
        })
        .count()
}
