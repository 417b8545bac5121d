// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Three commands are supported:
//   1. `train`   — two-stage fine-tuning with checkpoint resume
//   2. `predict` — classifies one local file and prints JSON
//   3. `serve`   — starts the HTTP prediction server

// Declare the commands submodule
pub mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use commands::{Commands, ModelArgs, PredictArgs, ServeArgs, TrainArgs};
use std::sync::Arc;

use crate::application::predict_use_case::PredictUseCase;
use crate::domain::prediction::ScanUpload;
use crate::ml::inferencer::InferBackend;

/// The main CLI struct
#[derive(Parser, Debug)]
#[command(
    name = "alz-scan",
    version,
    about = "Fine-tune a VGG16 classifier on brain scans, then serve dementia-severity predictions."
)]
pub struct Cli {
    /// The subcommand to run (train, predict or serve)
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)   => run_train(args),
            Commands::Predict(args) => run_predict(args),
            Commands::Serve(args)   => run_serve(args),
        }
    }
}

/// Handles the `train` subcommand.
fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training on scans in: {}", args.train_dir);

    let use_case = TrainUseCase::new(args.into());
    let report   = use_case.execute()?;

    match report.resumed_from {
        Some(epoch) => println!(
            "Training complete ({} epochs run, resumed after epoch {}).",
            report.epochs_run, epoch
        ),
        None => println!("Training complete ({} epochs run).", report.epochs_run),
    }
    println!("Final model saved to {}", report.final_model.display());
    Ok(())
}

/// Handles the `predict` subcommand.
fn run_predict(args: PredictArgs) -> Result<()> {
    let use_case = load_model(&args.model)?;

    let bytes = std::fs::read(&args.file)
        .with_context(|| format!("Cannot read '{}'", args.file.display()))?;
    let filename = args
        .file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned());

    let prediction = use_case.predict(&ScanUpload::new(filename, bytes))?;
    println!("{}", serde_json::to_string_pretty(&prediction)?);
    Ok(())
}

/// Handles the `serve` subcommand.
/// The model is loaded before the runtime starts so a missing
/// checkpoint fails fast instead of on the first request.
fn run_serve(args: ServeArgs) -> Result<()> {
    let config   = crate::server::ServerConfig::from(&args);
    let use_case = Arc::new(load_model(&args.model)?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Cannot start the async runtime")?;

    runtime.block_on(crate::server::start(use_case, config))
}

fn load_model(args: &ModelArgs) -> Result<PredictUseCase<InferBackend>> {
    let device = burn::backend::wgpu::WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);

    PredictUseCase::new(
        &args.checkpoint_dir,
        args.model.clone(),
        args.model_url.clone(),
        device,
    )
}
