use std::path::{Path, PathBuf};
use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use vt_core::{GarmentCategory, ReconstructionModality};
use vt_app::backend;
use vt_app::bridge::PipelineBridge;
use vt_app::config::{BridgeConfig, ServiceConfig};

#[derive(Parser)]
#[command(author, version, about = "Two-stage virtual try-on: garment swap, then 3D reconstruction")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the garment swap stage over HTTP
    ServeSwap,
    /// Serve the 3D reconstruction stage over HTTP
    ServeReconstruct,
    /// Swap a garment onto a person, then optionally reconstruct the result in 3D
    TryOn {
        /// Photo of the person
        #[arg(long)]
        person: PathBuf,
        /// Photo of the garment
        #[arg(long)]
        garment: PathBuf,
        #[arg(long, default_value = "upper")]
        category: GarmentCategory,
        /// Region to regenerate; segmented automatically when omitted
        #[arg(long)]
        mask: Option<PathBuf>,
        /// Also reconstruct the swap result as gaussian, radiance_field, mesh or glb
        #[arg(long)]
        modality: Option<ReconstructionModality>,
    },
    /// Reconstruct an existing swap result
    Reconstruct {
        /// Path or `dir/file` reference of the image
        #[arg(long)]
        artifact: String,
        #[arg(long)]
        modality: ReconstructionModality,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::ServeSwap => backend::serve_swap(ServiceConfig::load()?).await?,
        Commands::ServeReconstruct => backend::serve_reconstruct(ServiceConfig::load()?).await?,
        Commands::TryOn {
            person,
            garment,
            category,
            mask,
            modality,
        } => try_on(person, garment, category, mask, modality).await?,
        Commands::Reconstruct { artifact, modality } => {
            let mut bridge = PipelineBridge::new(BridgeConfig::load());
            bridge.adopt(&artifact)?;
            let reference = bridge.run_reconstruction(modality).await?;
            info!(path = %bridge.local_path(&reference).display(), "3D output ready");
        }
    }

    Ok(())
}

async fn try_on(
    person: PathBuf,
    garment: PathBuf,
    category: GarmentCategory,
    mask: Option<PathBuf>,
    modality: Option<ReconstructionModality>,
) -> anyhow::Result<()> {
    let person = read(&person).await?;
    let garment = read(&garment).await?;
    let mask = match mask {
        Some(path) => Some(read(&path).await?),
        None => None,
    };

    let mut bridge = PipelineBridge::new(BridgeConfig::load());
    let swapped = bridge.run_garment_swap(person, garment, category, mask).await?;
    info!(path = %bridge.local_path(&swapped).display(), "Try-on image ready");

    if let Some(modality) = modality {
        bridge.run_reconstruction(modality).await?;
        if let Some(output) = bridge.session().last_reconstruction() {
            info!(path = %bridge.local_path(output).display(), "3D output ready");
        }
    }

    Ok(())
}

async fn read(path: &Path) -> anyhow::Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}
