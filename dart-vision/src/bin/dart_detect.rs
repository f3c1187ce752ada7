//! Runs the dart detector on one image and prints the JSON response.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use dart_vision::{DartPipeline, DetectorConfig, OrtBackend};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// ONNX model file
    #[arg(long, value_name = "FILE")]
    model: PathBuf,

    /// Image to run detection on
    #[arg(long, value_name = "FILE")]
    image: PathBuf,

    /// JSON detector config; missing fields use defaults
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Overrides confidence_threshold (0.0 - 1.0, exclusive)
    #[arg(long, value_name = "THRESHOLD")]
    threshold: Option<f64>,

    /// Overrides image_size
    #[arg(long, value_name = "PIXELS")]
    image_size: Option<u32>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

fn load_config(args: &Args) -> Result<DetectorConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            DetectorConfig::from_json_str(&text)?
        }
        None => DetectorConfig::default(),
    };

    if let Some(t) = args.threshold {
        config.confidence_threshold = t;
    }
    if let Some(size) = args.image_size {
        config.image_size = size;
    }

    Ok(config)
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let pipeline = DartPipeline::new(load_config(&args)?)?;
    let backend = OrtBackend::from_file(&args.model)
        .with_context(|| format!("loading model {}", args.model.display()))?;
    let image = std::fs::read(&args.image)
        .with_context(|| format!("reading image {}", args.image.display()))?;

    let response = pipeline.respond(Some(&backend), &image);

    let json = if args.pretty {
        serde_json::to_string_pretty(&response)?
    } else {
        serde_json::to_string(&response)?
    };
    println!("{json}");

    Ok(if response.is_error() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
