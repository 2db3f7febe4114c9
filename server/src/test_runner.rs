#![cfg(test)]

//! This module runs test cases defined in `server/test/cases`.
//!
//! Each test case is a file `<name>.json` of the form
//! ```json
//! {
//!     "request": { "url": "{fixtures}/pdf/one-page.pdf" },
//!     "status": 200,
//!     "response": { "images": ["memory://drive/page1.png"] }
//! }
//! ```
//! `"request"` is posted to `/convert-pdf` and the status of the response is compared with
//! `"status"`. If `"response"` is present, the response body must match it exactly.
//!
//! This runner starts a server backed by an in-memory drive and a rasterizer which does not need
//! PDFium, plus a fixture server which serves the PDFs in `server/test/fixtures` along with a few
//! misbehaving endpoints. Occurrences of `{fixtures}` in a test case are replaced with the base URL
//! of the fixture server.
//!
//! These tests need no external services; run them with `cargo test -p server`.

use super::{app, State};
use ansi_term::Color;
use anyhow::Error;
use async_std::task::{sleep, spawn};
use converter::{convert, drive::MemoryDrive, render::FakeRasterizer, Converter};
use futures::future::join_all;
use portpicker::pick_unused_port;
use serde::Deserialize;
use serde_json::{json, Value};
use std::ffi::OsString;
use std::fmt::{self, Display, Formatter};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use surf::{http::StatusCode, Client};
use tide::{Redirect, Request, Response};

/// Limits enforced by the server under test, small enough for the fixtures to exceed them.
const MAX_PDF_SIZE: usize = 64 * 1024;
const MAX_PAGES: usize = 3;

#[async_std::test]
async fn api_test_cases() -> Result<(), Error> {
    converter::init_logging();

    // Discover test cases.
    let fixtures = start_fixture_server().await?;
    let test_cases = manifest_dir()
        .join("test/cases")
        .read_dir()?
        .filter_map(|dirent| {
            let path = dirent.unwrap().path();
            if path.extension()?.to_str().unwrap() == "json" {
                Some(TestCase::new(&path, &fixtures).unwrap())
            } else {
                None
            }
        })
        .collect::<Vec<_>>();
    assert!(!test_cases.is_empty(), "no test cases found");

    // Start a server and connect a client.
    let client = start_server().await?;

    let results = join_all(test_cases.into_iter().map(|test| test.run(client.clone()))).await;
    for result in &results {
        println!("{}", result);
    }
    if results.iter().any(TestResult::failed) {
        Err(Error::msg(format!("{}", Color::Red.paint("tests failed"))))
    } else {
        println!("All test cases passed.");
        Ok(())
    }
}

#[async_std::test]
async fn health() {
    converter::init_logging();
    let client = start_server().await.unwrap();

    let mut res = client.get("/health").await.unwrap();
    assert_eq!(res.status(), StatusCode::Ok);
    assert_eq!(
        res.body_json::<Value>().await.unwrap(),
        json!({ "status": "ok" })
    );
}

#[async_std::test]
async fn malformed_requests() {
    converter::init_logging();
    let client = start_server().await.unwrap();

    let mut res = client
        .post("/convert-pdf")
        .body_string("{\"url\": ".into())
        .content_type("application/json")
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UnprocessableEntity);
    let body: Value = res.body_json().await.unwrap();
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .starts_with("invalid request body"));

    let mut res = client.get("/convert-pdf/nowhere").await.unwrap();
    assert_eq!(res.status(), StatusCode::NotFound);
    assert_eq!(
        res.body_json::<Value>().await.unwrap(),
        json!({ "detail": "Not Found" })
    );
}

#[async_std::test]
async fn requests_are_logged() {
    let logs = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer({
            let logs = logs.clone();
            move || logs.clone()
        })
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    // Drive the app in the current task, so its events reach the subscriber above.
    let server = app(test_converter());
    let req = tide::http::Request::new(
        tide::http::Method::Get,
        tide::http::Url::parse("http://localhost/health").unwrap(),
    );
    let res: tide::http::Response = server.respond(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::Ok);

    let logs = logs.contents();
    let line = logs
        .lines()
        .find(|line| line.contains("request handled"))
        .unwrap_or_else(|| panic!("no request log in:\n{logs}"));
    for field in ["method=GET", "path=/health", "status=200", "elapsed="] {
        assert!(line.contains(field), "{field} missing from {line}");
    }
}

/// Log output captured in memory.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct TestCase {
    name: OsString,
    request: Value,
    status: u16,
    response: Option<Value>,
}

#[derive(Deserialize)]
struct TestCaseFile {
    request: Value,
    status: u16,
    #[serde(default)]
    response: Option<Value>,
}

impl TestCase {
    fn new(path: impl AsRef<Path>, fixtures: &str) -> Result<Self, Error> {
        let path = path.as_ref();
        let name = path.file_stem().unwrap();
        let text = fs::read_to_string(path)?.replace("{fixtures}", fixtures);
        let TestCaseFile {
            request,
            status,
            response,
        } = serde_json::from_str(&text)?;
        Ok(Self {
            name: name.into(),
            request,
            status,
            response,
        })
    }

    async fn run(self, client: Client) -> TestResult {
        TestResult {
            name: self.name.clone(),
            failure: self.do_test(client).await.err(),
        }
    }

    async fn do_test(self, client: Client) -> Result<(), Error> {
        let mut res = client
            .post("/convert-pdf")
            .body_json(&self.request)
            .map_err(Error::msg)?
            .send()
            .await
            .map_err(Error::msg)?;
        let body = res
            .body_string()
            .await
            .map_err(|err| Error::msg(format!("cannot read response body: {err}")))?;

        if res.status() as u16 != self.status {
            return Err(Error::msg(format!(
                "expected status {}, got {}: {body}",
                self.status,
                res.status()
            )));
        }
        let Some(expected) = self.response else {
            return Ok(());
        };
        let actual: Value = serde_json::from_str(&body)
            .map_err(|err| Error::msg(format!("cannot parse response body as JSON: {err}")))?;
        if actual != expected {
            Err(Error::msg(format!(
                "expected response:\n{expected}\nactual response:\n{actual}"
            )))
        } else {
            Ok(())
        }
    }
}

struct TestResult {
    name: OsString,
    failure: Option<anyhow::Error>,
}

impl TestResult {
    fn failed(&self) -> bool {
        self.failure.is_some()
    }
}

impl Display for TestResult {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}...", self.name.to_string_lossy())?;
        if let Some(err) = &self.failure {
            writeln!(f, "{}", Color::Red.paint("FAILED"))?;
            write!(f, "{err}")?;
        } else {
            write!(f, "{}", Color::Green.paint("OK"))?;
        }
        Ok(())
    }
}

fn manifest_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).into()
}

/// A converter backed by an in-memory drive, which needs neither PDFium nor network access.
fn test_converter() -> Converter {
    let options = convert::Options {
        max_pdf_size: MAX_PDF_SIZE,
        max_pages: MAX_PAGES,
        download_timeout: Duration::from_secs(10),
        ..Default::default()
    };
    Converter::new(
        options,
        Arc::new(FakeRasterizer),
        Arc::new(MemoryDrive::new()),
    )
}

/// Start a conversion server on a free port, returning a client connected to it.
async fn start_server() -> Result<Client, Error> {
    let port = pick_unused_port().unwrap();
    let server: tide::Server<State> = app(test_converter());
    spawn(async move {
        server.listen(format!("127.0.0.1:{port}")).await.unwrap();
        tracing::warn!("server exited");
    });

    let client: Client = surf::Config::default()
        .set_base_url(format!("http://localhost:{port}").parse().unwrap())
        .try_into()
        .unwrap();
    wait_for_server(&client).await?;
    Ok(client)
}

/// Start a server for the fixtures PDFs are downloaded from, returning its base URL.
async fn start_fixture_server() -> Result<String, Error> {
    let port = pick_unused_port().unwrap();
    let mut app = tide::with_state(manifest_dir().join("test/fixtures"));

    // A fixture served as a PDF.
    app.at("/pdf/:name")
        .get(|req: Request<PathBuf>| async move {
            let pdf = async_std::fs::read(req.state().join(req.param("name")?)).await?;
            Ok(Response::builder(200)
                .body(pdf)
                .header("Content-Type", "application/pdf")
                .build())
        });
    // A fixture served as a PDF, with unusual capitalization of the content type.
    app.at("/pdf-mixed-case/:name")
        .get(|req: Request<PathBuf>| async move {
            let pdf = async_std::fs::read(req.state().join(req.param("name")?)).await?;
            Ok(Response::builder(200)
                .body(pdf)
                .header("Content-Type", "Application/PDF")
                .build())
        });
    // A one-page PDF padded with trailing whitespace to exactly `size` bytes.
    app.at("/padded/:size")
        .get(|req: Request<PathBuf>| async move {
            let size: usize = req.param("size")?.parse()?;
            let mut pdf = async_std::fs::read(req.state().join("one-page.pdf")).await?;
            pdf.resize(size, b' ');
            Ok(Response::builder(200)
                .body(pdf)
                .header("Content-Type", "application/pdf")
                .build())
        });
    app.at("/redirect/:name")
        .get(|req: Request<PathBuf>| async move {
            Ok(Redirect::new(format!("/pdf/{}", req.param("name")?)))
        });
    app.at("/status/:code")
        .get(|req: Request<PathBuf>| async move {
            let code: u16 = req.param("code")?.parse()?;
            Ok(Response::new(code))
        });
    app.at("/html").get(|_| async {
        Ok(Response::builder(200)
            .body("<html><body>not a PDF</body></html>")
            .header("Content-Type", "text/html")
            .build())
    });
    spawn(app.listen(format!("127.0.0.1:{port}")));

    let base = format!("http://127.0.0.1:{port}");
    let client: Client = surf::Config::default()
        .set_base_url(format!("{base}/").parse().unwrap())
        .try_into()
        .unwrap();
    wait_for_server(&client).await?;
    Ok(base)
}

async fn wait_for_server(client: &Client) -> Result<(), Error> {
    const MAX_CONNECT_RETRIES: usize = 60;

    for _ in 0..MAX_CONNECT_RETRIES {
        match client.get("/").await {
            Ok(_) => return Ok(()),
            Err(err) => {
                tracing::warn!("waiting for server to start: {err}");
                sleep(Duration::from_secs(1)).await;
            }
        }
    }

    Err(Error::msg("timed out waiting for server"))
}
