//! Synchronous extraction from the command line, without the HTTP server.
//! Run with: cargo run --release --bin ocr_extract -- [--mode high_accuracy] [--lang ja] <image>...

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use ocr_workflow::{
    core::{Config, ProcessingOptions},
    orchestration::{task_runner::FILE_ERROR_PREFIX, ExtractionOrchestrator},
    services::{EngineRegistry, Preprocessor},
    utils::Metrics,
};

const USAGE: &str = "usage: ocr_extract [--mode normal|high_accuracy] [--lang xx]... <image>...";

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("ocr_workflow=info")
        .with_target(false)
        .init();

    let config = Config::new().context("Failed to load configuration")?;

    let mut mode: Option<String> = None;
    let mut languages: Vec<String> = Vec::new();
    let mut paths: Vec<String> = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--mode" => mode = Some(args.next().context(USAGE)?),
            "--lang" => languages.push(args.next().context(USAGE)?),
            "-h" | "--help" => {
                println!("{}", USAGE);
                return Ok(());
            }
            _ => paths.push(arg),
        }
    }
    if paths.is_empty() {
        bail!(USAGE);
    }

    let options = ProcessingOptions::parse(mode.as_deref(), &languages, config.max_languages())?;

    info!("Initializing OCR engines...");
    let registry = Arc::new(EngineRegistry::initialize(&config.engines));
    let orchestrator =
        ExtractionOrchestrator::new(registry, config.min_confidence(), Metrics::new());
    let preprocessor = Preprocessor::new(config.max_image_dimension());

    for (i, path) in paths.iter().enumerate() {
        println!("\n=== File {}: {} ===", i + 1, path);

        let text = match std::fs::read(Path::new(path)) {
            Ok(bytes) => match preprocessor.preprocess(&bytes) {
                Ok(image) => orchestrator.extract(&image, &options),
                Err(e) => format!("{}{}", FILE_ERROR_PREFIX, e),
            },
            Err(e) => format!("{}{}", FILE_ERROR_PREFIX, e),
        };

        if text.is_empty() {
            println!("  (empty)");
        } else {
            for line in text.lines() {
                println!("  {}", line);
            }
        }
    }

    Ok(())
}
