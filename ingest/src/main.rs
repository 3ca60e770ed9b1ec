use anyhow::{Context, Result};
use chunker::{Config, DetectDocumentTextResponse, DocumentPipeline, TextReconstructor, UploadedFile};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "ingest", about = "Turn scanned documents into structured, queryable chunks")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run OCR, chunk extraction and assembly on one file and print the document as JSON.
    Process {
        file: PathBuf,
        /// MIME type; guessed from the extension when omitted.
        #[arg(long)]
        mime_type: Option<String>,
        #[arg(long)]
        pretty: bool,
    },
    /// Rebuild reading-order text from a saved DetectDocumentText response.
    Reconstruct {
        blocks: PathBuf,
        #[arg(long)]
        line_threshold: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Process {
            file,
            mime_type,
            pretty,
        } => process(&file, mime_type, pretty).await,
        Command::Reconstruct {
            blocks,
            line_threshold,
        } => reconstruct(&blocks, line_threshold).await,
    }
}

async fn process(file: &Path, mime_type: Option<String>, pretty: bool) -> Result<()> {
    let config = Config::from_env()?;
    let pipeline = DocumentPipeline::from_config(&config)?;

    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let file_name = file
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| file.display().to_string());
    let mime_type = mime_type.unwrap_or_else(|| guess_mime_type(file).to_string());

    let upload = UploadedFile {
        bytes,
        file_name,
        mime_type,
    };

    // Ctrl-C drops the pipeline future, which aborts the in-flight request.
    let assembly = tokio::select! {
        result = pipeline.process(upload) => result?,
        _ = tokio::signal::ctrl_c() => anyhow::bail!("cancelled before the pipeline finished"),
    };

    for warning in &assembly.warnings {
        log::warn!(
            "chunk {} ({}) located by fallback at {}..{}",
            warning.chunk_index,
            warning.chunk_id,
            warning.fallback_start,
            warning.fallback_end
        );
    }

    let json = if pretty {
        serde_json::to_string_pretty(&assembly.document)?
    } else {
        serde_json::to_string(&assembly.document)?
    };
    println!("{}", json);
    Ok(())
}

async fn reconstruct(path: &Path, line_threshold: Option<f64>) -> Result<()> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let response: DetectDocumentTextResponse =
        serde_json::from_str(&raw).context("not a DetectDocumentText response")?;

    let threshold = match line_threshold {
        Some(threshold) => {
            anyhow::ensure!(
                threshold.is_finite() && threshold >= 0.0,
                "--line-threshold must be a finite, non-negative number, got {threshold}"
            );
            threshold
        }
        None => Config::from_env()?.line_threshold,
    };
    let reconstructed = TextReconstructor::new(threshold).reconstruct(&response.blocks);
    log::info!("{} pages reconstructed", reconstructed.page_count);

    println!("{}", reconstructed.text);
    Ok(())
}

fn guess_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}
