use clap::Parser;
use converter::{convert, drive, render, Converter};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tide::{utils::After, Middleware, Next, Request, Response, StatusCode};

mod test_runner;

/// Start the PDF conversion server.
#[derive(Clone, Debug, Parser)]
struct Options {
    /// The interface on which the app should be served.
    #[clap(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// The port where the app should be served.
    #[clap(short, long, env = "PORT", default_value = "8000")]
    port: u16,

    #[clap(flatten)]
    convert: convert::Options,

    #[clap(flatten)]
    drive: drive::Options,

    #[clap(flatten)]
    render: render::Options,
}

impl Options {
    async fn serve(&self) -> Result<(), anyhow::Error> {
        let rasterizer = Arc::new(self.render.rasterizer()?);
        let drive = self.drive.connect()?;
        let mut app = app(Converter::new(self.convert.clone(), rasterizer, drive));
        if let Some(dir) = &self.drive.local_drive_dir {
            app.at("/files").serve_dir(dir)?;
        }
        app.listen(format!("{}:{}", self.host, self.port)).await?;
        Ok(())
    }
}

type State = Arc<Converter>;

/// Body of a conversion request.
#[derive(Clone, Debug, Deserialize)]
struct PdfUrl {
    url: String,
}

/// Build the HTTP API around `converter`.
fn app(converter: Converter) -> tide::Server<State> {
    let mut app = tide::with_state(Arc::new(converter));
    app.with(RequestLogger);

    // Report every error as `{"detail": message}`.
    app.with(After(|mut res: Response| async move {
        let detail = match res.error() {
            Some(err) => Some(err.to_string()),
            None if res.status() == StatusCode::NotFound => Some("Not Found".to_string()),
            None => None,
        };
        if let Some(detail) = detail {
            res.set_body(json!({ "detail": detail }));
        }
        Ok(res)
    }));

    app.at("/convert-pdf").post(convert_pdf);
    app.at("/health").get(health);
    app
}

/// Logs the method, path, status and duration of every request.
struct RequestLogger;

#[tide::utils::async_trait]
impl Middleware<State> for RequestLogger {
    async fn handle(&self, req: Request<State>, next: Next<'_, State>) -> tide::Result {
        let method = req.method();
        let path = req.url().path().to_string();
        let start = Instant::now();
        let res = next.run(req).await;
        tracing::info!(
            %method,
            %path,
            status = res.status() as u16,
            elapsed = ?start.elapsed(),
            "request handled"
        );
        Ok(res)
    }
}

async fn convert_pdf(mut req: Request<State>) -> tide::Result {
    let PdfUrl { url } = req.body_json().await.map_err(|err| {
        tide::Error::from_str(
            StatusCode::UnprocessableEntity,
            format!("invalid request body: {err}"),
        )
    })?;
    let images = req
        .state()
        .convert(&url)
        .await
        .map_err(|err| tide::Error::from_str(err.status(), err.to_string()))?;
    Ok(Response::builder(StatusCode::Ok)
        .body(json!({ "images": images }))
        .build())
}

async fn health(_req: Request<State>) -> tide::Result {
    Ok(Response::builder(StatusCode::Ok)
        .body(json!({ "status": "ok" }))
        .build())
}

#[async_std::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenvy::dotenv().ok();
    converter::init_logging();
    Options::parse().serve().await
}
