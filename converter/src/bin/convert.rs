use clap::Parser;
use converter::{convert, drive, init_logging, render, Converter};
use std::path::PathBuf;
use std::sync::Arc;

/// Render the pages of a PDF to images and publish them, printing one link per page.
#[derive(Parser)]
enum Command {
    /// Download a PDF from URL and publish its pages.
    Url {
        /// The location of the PDF.
        url: String,

        #[clap(flatten)]
        convert: convert::Options,

        #[clap(flatten)]
        drive: drive::Options,

        #[clap(flatten)]
        render: render::Options,
    },
    /// Publish the pages of a PDF stored in the local file system.
    File {
        /// The path to the PDF.
        path: PathBuf,

        #[clap(flatten)]
        convert: convert::Options,

        #[clap(flatten)]
        drive: drive::Options,

        #[clap(flatten)]
        render: render::Options,
    },
}

#[async_std::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenvy::dotenv().ok();
    init_logging();

    let links = match Command::parse() {
        Command::Url {
            url,
            convert,
            drive,
            render,
        } => {
            let converter = Converter::new(convert, Arc::new(render.rasterizer()?), drive.connect()?);
            converter.convert(&url).await?
        }
        Command::File {
            path,
            convert,
            drive,
            render,
        } => {
            let pdf = async_std::fs::read(&path).await?;
            tracing::info!("read {} bytes from {}", pdf.len(), path.display());
            if pdf.len() > convert.max_pdf_size {
                return Err(converter::Error::TooLarge {}.into());
            }
            let converter = Converter::new(convert, Arc::new(render.rasterizer()?), drive.connect()?);
            converter.convert_pdf(pdf).await?
        }
    };

    for link in links {
        println!("{link}");
    }
    Ok(())
}
