mod script;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pixtile_config::EditorConfig;
use pixtile_core::{CanvasDocument, DocumentRecord};

/// Headless driver for the pixtile document core.
#[derive(Parser, Debug)]
#[command(name = "pixtile", version, about)]
struct Cli {
    /// Config file to use instead of the default location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay an edit script and print the resulting history.
    Run {
        /// JSON array of edit steps.
        script: PathBuf,

        /// Start from a saved document record instead of a blank canvas.
        #[arg(long)]
        input: Option<PathBuf>,

        /// Write the composite to a PNG file.
        #[arg(long)]
        export: Option<PathBuf>,

        /// Write the final document record as JSON.
        #[arg(long)]
        record: Option<PathBuf>,
    },
    /// Print the effective configuration and where it was loaded from.
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = cli.config.unwrap_or_else(EditorConfig::config_path);
    let config = EditorConfig::load_or_create(&config_path);

    match cli.command {
        Command::Run {
            script,
            input,
            export,
            record,
        } => run(&config, &script, input.as_deref(), export.as_deref(), record.as_deref()),
        Command::Config => {
            println!("# {}", config_path.display());
            println!(
                "{}",
                serde_json::to_string_pretty(&config).context("Failed to serialize config")?
            );
            Ok(())
        }
    }
}

fn run(
    config: &EditorConfig,
    script_path: &Path,
    input: Option<&Path>,
    export: Option<&Path>,
    record: Option<&Path>,
) -> Result<()> {
    tracing::info!("Running {}", script_path.display());
    let steps = script::load(script_path)?;

    let mut doc = match input {
        Some(path) => load_record(path)?,
        None => CanvasDocument::from_config(config)?,
    };
    script::run(&mut doc, &steps)?;

    for (depth, entry) in doc.timeline().iter().enumerate() {
        let marker = if entry.applied { ' ' } else { '~' };
        println!("{marker}{:>4}  {:<20} [{}]", depth + 1, entry.description, entry.icon);
    }
    println!(
        "{} layers, {} tiles, {}",
        doc.flattened().len(),
        doc.tiles().len(),
        if doc.is_dirty() { "modified" } else { "saved" }
    );

    if let Some(path) = export {
        export_png(&mut doc, path)?;
        tracing::info!("Exported composite to {}", path.display());
    }
    if let Some(path) = record {
        let json = serde_json::to_string(&doc.to_record()).context("Failed to serialize document")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write record: {}", path.display()))?;
    }
    Ok(())
}

fn load_record(path: &Path) -> Result<CanvasDocument> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read record: {}", path.display()))?;
    let record: DocumentRecord = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse record: {}", path.display()))?;
    CanvasDocument::from_record(&record)
        .with_context(|| format!("Invalid document record: {}", path.display()))
}

/// Writes the document composite as an RGBA PNG.
fn export_png(doc: &mut CanvasDocument, path: &Path) -> Result<()> {
    let composite = doc.composite();
    let (width, height) = (composite.width(), composite.height());
    let rgba: Vec<u8> = composite
        .bytes()
        .chunks_exact(4)
        .flat_map(|px| [px[2], px[1], px[0], px[3]])
        .collect();
    let buffer = image::RgbaImage::from_raw(width, height, rgba)
        .context("Composite buffer does not match its size")?;
    buffer
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("Failed to write PNG: {}", path.display()))
}
