//! Errors reported by the conversion pipeline.
//!
//! The [`Display`](std::fmt::Display) form of each error is the message returned to API callers,
//! so it never includes the underlying cause. Causes are logged where the error is created.

use snafu::Snafu;

/// A failed conversion.
#[derive(Clone, Debug, PartialEq, Eq, Snafu)]
pub enum Error {
    /// The requested URL is not an absolute HTTP(S) URL.
    #[snafu(display("Invalid URL: {reason}"))]
    InvalidUrl { reason: String },

    /// The PDF server responded with something other than `200 OK`.
    #[snafu(display("Failed to download PDF. Status code: {status}"))]
    DownloadStatus { status: u16 },

    /// The downloaded resource does not claim to be a PDF.
    #[snafu(display("URL does not point to a PDF file. Content-Type: {content_type}"))]
    NotPdf { content_type: String },

    #[snafu(display("PDF file is too large."))]
    TooLarge {},

    /// The PDF could not be fetched at all (connection, TLS, timeout, redirects...).
    #[snafu(display("Client error occurred while downloading PDF."))]
    Transport {},

    #[snafu(display("PDF has too many pages ({pages}). Maximum allowed is {max}."))]
    TooManyPages { pages: usize, max: usize },

    #[snafu(display("Error converting PDF to images."))]
    Render {},

    #[snafu(display("Error uploading images."))]
    Upload {},

    #[snafu(display("No images were generated."))]
    NoImages {},
}

impl Error {
    /// The HTTP status code describing this error.
    ///
    /// Problems with the requested document, including one with too many pages, are the
    /// client's fault and map to 400 rather than to a generic server error.
    pub fn status(&self) -> u16 {
        match self {
            Self::InvalidUrl { .. } => 422,
            Self::DownloadStatus { .. }
            | Self::NotPdf { .. }
            | Self::TooLarge {}
            | Self::Transport {}
            | Self::TooManyPages { .. } => 400,
            Self::Render {} | Self::Upload {} | Self::NoImages {} => 500,
        }
    }
}
