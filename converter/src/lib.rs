//! Convert PDF documents into per-page PNG images published to a file store.

pub mod convert;
pub mod download;
pub mod drive;
pub mod error;
pub mod render;
pub mod usage;

pub use convert::Converter;
pub use error::Error;

/// Install the global `tracing` subscriber.
///
/// The filter defaults to `info` and can be overridden with `RUST_LOG`. Records emitted through
/// the `log` facade (for example by tide's request logger) are forwarded to the same subscriber.
/// Calling this more than once is harmless.
pub fn init_logging() {
    use std::sync::Once;
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        // Tests may have installed a subscriber already; keep it.
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init();
    });
}
