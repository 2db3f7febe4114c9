//! Fetching PDF documents over HTTP.

use crate::error::Error;
use futures::AsyncReadExt;
use std::time::Duration;
use surf::{
    http::{
        headers::{CONTENT_TYPE, LOCATION},
        StatusCode,
    },
    Url,
};

/// Some servers refuse requests without a browser-like user agent.
const USER_AGENT: &str = "Mozilla/5.0";

const MAX_REDIRECTS: u8 = 10;

/// Parse a user-supplied PDF location.
///
/// Only absolute `http` and `https` URLs with a host are accepted.
pub fn parse_url(url: &str) -> Result<Url, Error> {
    let parsed = Url::parse(url).map_err(|err| Error::InvalidUrl {
        reason: err.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::InvalidUrl {
            reason: "URL scheme should be 'http' or 'https'".into(),
        });
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(Error::InvalidUrl {
            reason: "URL has no host".into(),
        });
    }
    Ok(parsed)
}

/// Downloads PDF documents, enforcing a size limit and a timeout.
#[derive(Clone, Debug)]
pub struct Downloader {
    client: surf::Client,
    max_size: usize,
    timeout: Duration,
}

impl Downloader {
    /// Create a downloader accepting documents of at most `max_size` bytes.
    pub fn new(max_size: usize, timeout: Duration) -> Self {
        Self {
            client: surf::client(),
            max_size,
            timeout,
        }
    }

    /// Download the PDF at `url`.
    pub async fn download(&self, url: &Url) -> Result<Vec<u8>, Error> {
        match async_std::future::timeout(self.timeout, self.fetch(url)).await {
            Ok(res) => res,
            Err(_) => {
                tracing::error!("Client error: timed out after {:?} downloading {url}", self.timeout);
                Err(Error::Transport {})
            }
        }
    }

    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, Error> {
        let mut url = url.clone();
        for _ in 0..=MAX_REDIRECTS {
            let res = self
                .client
                .get(url.as_str())
                .header("User-Agent", USER_AGENT)
                .send()
                .await
                .map_err(|err| {
                    tracing::error!("Client error: {err}");
                    Error::Transport {}
                })?;
            match redirect_target(&url, &res)? {
                Some(next) => {
                    tracing::info!("Redirected ({}) to {next}", res.status());
                    url = next;
                }
                None => return self.read(res).await,
            }
        }
        tracing::error!("Client error: more than {MAX_REDIRECTS} redirects");
        Err(Error::Transport {})
    }

    async fn read(&self, mut res: surf::Response) -> Result<Vec<u8>, Error> {
        tracing::info!("Response status: {}", res.status());
        tracing::info!(
            "Response headers: {:?}",
            res.iter()
                .map(|(name, values)| format!("{name}: {}", values.last().as_str()))
                .collect::<Vec<_>>()
        );
        if res.status() != StatusCode::Ok {
            return Err(Error::DownloadStatus {
                status: res.status() as u16,
            });
        }

        let content_type = res
            .header(CONTENT_TYPE)
            .map(|values| values.last().as_str().to_string())
            .unwrap_or_default();
        tracing::info!("Content-Type: {content_type}");
        if !content_type.to_lowercase().contains("pdf") {
            return Err(Error::NotPdf { content_type });
        }

        if let Some(len) = res.len() {
            if len > self.max_size {
                tracing::warn!("declared Content-Length {len} exceeds {}", self.max_size);
                return Err(Error::TooLarge {});
            }
        }

        // Read at most one byte past the limit, so oversized bodies are detected without buffering
        // them completely.
        let mut pdf = Vec::new();
        res.take_body()
            .take(self.max_size as u64 + 1)
            .read_to_end(&mut pdf)
            .await
            .map_err(|err| {
                tracing::error!("Client error: unable to read response body: {err}");
                Error::Transport {}
            })?;
        if pdf.len() > self.max_size {
            return Err(Error::TooLarge {});
        }
        Ok(pdf)
    }
}

/// The location `res` redirects to, resolved against the `url` it was fetched from.
///
/// Redirect statuses without a `Location` are not followed.
fn redirect_target(url: &Url, res: &surf::Response) -> Result<Option<Url>, Error> {
    if !res.status().is_redirection() {
        return Ok(None);
    }
    let Some(location) = res.header(LOCATION) else {
        return Ok(None);
    };
    url.join(location.last().as_str()).map(Some).map_err(|err| {
        tracing::error!("Client error: bad redirect location {}: {err}", location.last());
        Error::Transport {}
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use async_std::{
        io::Cursor,
        sync::Arc,
        task::{sleep, spawn},
    };
    use portpicker::pick_unused_port;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tide::{Body, Request, Response};

    const LIMIT: usize = 1024;

    #[test]
    fn test_parse_url() {
        assert!(parse_url("https://example.com/doc.pdf").is_ok());
        assert!(parse_url("http://127.0.0.1:8080/a?b=c").is_ok());
        assert_eq!(
            parse_url("ftp://example.com/doc.pdf"),
            Err(Error::InvalidUrl {
                reason: "URL scheme should be 'http' or 'https'".into()
            })
        );
        assert!(matches!(
            parse_url("example.com/doc.pdf"),
            Err(Error::InvalidUrl { .. })
        ));
        assert!(matches!(parse_url(""), Err(Error::InvalidUrl { .. })));
    }

    /// Serve a handful of canned responses on a free local port.
    ///
    /// Returns the base URL and a counter of requests for `/pdf/:size`.
    async fn fixtures() -> (Url, Arc<AtomicUsize>) {
        let port = pick_unused_port().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let mut app = tide::with_state(hits.clone());
        app.at("/pdf/:size")
            .get(|req: Request<Arc<AtomicUsize>>| async move {
                req.state().fetch_add(1, Ordering::SeqCst);
                let size: usize = req.param("size")?.parse()?;
                Ok(Response::builder(200)
                    .body(vec![b'%'; size])
                    .header("Content-Type", "Application/PDF")
                    .build())
            });
        // Same as `/pdf/:size`, but streamed without a Content-Length.
        app.at("/chunked/:size")
            .get(|req: Request<Arc<AtomicUsize>>| async move {
                let size: usize = req.param("size")?.parse()?;
                let body = Body::from_reader(Cursor::new(vec![b'%'; size]), None);
                Ok(Response::builder(200)
                    .body(body)
                    .header("Content-Type", "application/pdf")
                    .build())
            });
        app.at("/slow").get(|_| async {
            sleep(Duration::from_secs(5)).await;
            Ok(Response::builder(200)
                .body("%PDF-")
                .header("Content-Type", "application/pdf")
                .build())
        });
        app.at("/html").get(|_| async {
            Ok(Response::builder(200)
                .body("<html></html>")
                .header("Content-Type", "text/html")
                .build())
        });
        app.at("/missing")
            .get(|_| async { Ok(Response::new(404)) });
        app.at("/moved")
            .get(|_| async { Ok(tide::Redirect::new("/pdf/16")) });
        app.at("/moved-relative/here")
            .get(|_| async { Ok(tide::Redirect::new("../moved")) });
        app.at("/loop")
            .get(|_| async { Ok(tide::Redirect::new("/loop")) });
        spawn(app.listen(format!("127.0.0.1:{port}")));

        let base: Url = format!("http://127.0.0.1:{port}/").parse().unwrap();
        for _ in 0..60 {
            if surf::get(base.as_str()).await.is_ok() {
                break;
            }
            sleep(Duration::from_millis(100)).await;
        }
        (base, hits)
    }

    fn downloader() -> Downloader {
        Downloader::new(LIMIT, Duration::from_secs(10))
    }

    #[async_std::test]
    async fn test_download() {
        let (base, hits) = fixtures().await;
        let client = downloader();

        let pdf = client.download(&base.join("pdf/16").unwrap()).await.unwrap();
        assert_eq!(pdf.len(), 16);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // Redirects are followed, and the target is only requested once.
        let pdf = client.download(&base.join("moved").unwrap()).await.unwrap();
        assert_eq!(pdf.len(), 16);
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        // Relative locations are resolved against the redirecting URL.
        let pdf = client
            .download(&base.join("moved-relative/here").unwrap())
            .await
            .unwrap();
        assert_eq!(pdf.len(), 16);
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        // Exactly at the limit is fine, one byte more is not.
        let pdf = client
            .download(&base.join(&format!("pdf/{LIMIT}")).unwrap())
            .await
            .unwrap();
        assert_eq!(pdf.len(), LIMIT);
        assert_eq!(
            client
                .download(&base.join(&format!("pdf/{}", LIMIT + 1)).unwrap())
                .await,
            Err(Error::TooLarge {})
        );
    }

    #[async_std::test]
    async fn test_download_rejected() {
        let (base, _) = fixtures().await;
        let client = downloader();

        assert_eq!(
            client.download(&base.join("missing").unwrap()).await,
            Err(Error::DownloadStatus { status: 404 })
        );
        assert_eq!(
            client.download(&base.join("html").unwrap()).await,
            Err(Error::NotPdf {
                content_type: "text/html".into()
            })
        );

        let port = pick_unused_port().unwrap();
        let unreachable: Url = format!("http://127.0.0.1:{port}/doc.pdf").parse().unwrap();
        assert_eq!(
            client.download(&unreachable).await,
            Err(Error::Transport {})
        );
    }

    #[async_std::test]
    async fn test_redirect_loop() {
        let (base, _) = fixtures().await;
        assert_eq!(
            downloader().download(&base.join("loop").unwrap()).await,
            Err(Error::Transport {})
        );
    }

    #[async_std::test]
    async fn test_body_limit_without_length() {
        let (base, _) = fixtures().await;
        let client = downloader();

        let pdf = client
            .download(&base.join(&format!("chunked/{LIMIT}")).unwrap())
            .await
            .unwrap();
        assert_eq!(pdf.len(), LIMIT);
        assert_eq!(
            client
                .download(&base.join(&format!("chunked/{}", 4 * LIMIT)).unwrap())
                .await,
            Err(Error::TooLarge {})
        );
    }

    #[async_std::test]
    async fn test_timeout() {
        let (base, _) = fixtures().await;
        let client = Downloader::new(LIMIT, Duration::from_millis(200));
        assert_eq!(
            client.download(&base.join("slow").unwrap()).await,
            Err(Error::Transport {})
        );
    }
}
