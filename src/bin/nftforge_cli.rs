//! NFTForge CLI - Collection Generator
//!
//! Commands: run, generate, publish, dna
//! Reports JSON to stdout, logs to stderr
//! Exit 1 on fatal failure, 2 when only the metadata publish was degraded

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use nftforge_core::{
    derive_dna, service_for,
    config::{BackendKind, CollectionConfig, Credentials},
    layers::Attribute,
    pipeline::{rng_for, CollectionPipeline},
    publisher::{PublishMode, Publisher},
};

#[derive(Parser)]
#[command(name = "nftforge-cli")]
#[command(about = "NFTForge CLI - layered collection generator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to collection config (JSON). Defaults are used when absent.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate, publish images, build and publish metadata
    Run {
        /// Override item count
        #[arg(short = 'n', long)]
        count: Option<u32>,

        /// Override sampling seed
        #[arg(short, long)]
        seed: Option<u64>,

        /// Override backend
        #[arg(short, long, value_enum)]
        backend: Option<BackendKind>,
    },

    /// Generate images only
    Generate {
        #[arg(short = 'n', long)]
        count: Option<u32>,

        #[arg(short, long)]
        seed: Option<u64>,
    },

    /// Upload one folder
    Publish {
        /// Folder to upload
        dir: PathBuf,

        /// Upload only *.json, through the document path
        #[arg(long)]
        documents: bool,

        #[arg(short, long, value_enum)]
        backend: Option<BackendKind>,
    },

    /// Print the DNA for attribute values
    Dna {
        values: Vec<String>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<CollectionConfig, String> {
    match path {
        Some(p) => CollectionConfig::load(p).map_err(|e| e.to_string()),
        None => Ok(CollectionConfig::default()),
    }
}

fn fail(message: impl std::fmt::Display) -> ExitCode {
    let output = serde_json::json!({
        "success": false,
        "error": message.to_string(),
    });
    println!("{}", output);
    ExitCode::FAILURE
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install logger: {}", e);
    }

    let mut config = match load_config(cli.config.as_ref()) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    match cli.command {
        Commands::Run { count, seed, backend } => {
            if let Some(n) = count {
                config.total_items = n;
            }
            if seed.is_some() {
                config.seed = seed;
            }
            if let Some(b) = backend {
                config.backend = b;
            }
            if let Err(e) = config.validate() {
                return fail(e);
            }

            let timeout = Duration::from_secs(config.upload_timeout_secs);
            let service = match service_for(config.backend, &Credentials::from_env(), timeout) {
                Ok(s) => s,
                Err(e) => return fail(e),
            };

            let pipeline = CollectionPipeline::new(config);
            match pipeline.run(service.as_ref()) {
                Ok(report) => {
                    let degraded = report.is_degraded();
                    let output = serde_json::json!({
                        "success": true,
                        "degraded": degraded,
                        "report": report,
                    });
                    println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
                    if degraded { ExitCode::from(2) } else { ExitCode::SUCCESS }
                }
                Err(e) => {
                    let output = serde_json::json!({
                        "success": false,
                        "stage": e.stage().to_string(),
                        "error": e.to_string(),
                    });
                    println!("{}", output);
                    ExitCode::FAILURE
                }
            }
        }

        Commands::Generate { count, seed } => {
            if let Some(n) = count {
                config.total_items = n;
            }
            if seed.is_some() {
                config.seed = seed;
            }
            if let Err(e) = config.validate() {
                return fail(e);
            }

            let mut rng = rng_for(config.seed);
            let pipeline = CollectionPipeline::new(config);
            match pipeline.generate(&mut rng) {
                Ok(collection) => {
                    let items: Vec<_> = collection
                        .items
                        .iter()
                        .map(|item| serde_json::json!({
                            "id": item.id,
                            "dna": item.dna,
                            "attributes": item.attributes,
                            "emptyLayers": item.empty_layers,
                        }))
                        .collect();
                    let output = serde_json::json!({
                        "success": true,
                        "imagesDir": pipeline.config().layout().images_dir(),
                        "duplicates": collection.duplicates(),
                        "items": items,
                    });
                    println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
                    ExitCode::SUCCESS
                }
                Err(e) => fail(e),
            }
        }

        Commands::Publish { dir, documents, backend } => {
            let kind = backend.unwrap_or(config.backend);
            let timeout = Duration::from_secs(config.upload_timeout_secs);
            let service = match service_for(kind, &Credentials::from_env(), timeout) {
                Ok(s) => s,
                Err(e) => return fail(e),
            };
            let mode = if documents { PublishMode::Documents } else { PublishMode::Files };

            match Publisher::new(service.as_ref()).publish_folder(&dir, mode) {
                Ok(result) => {
                    let output = serde_json::json!({
                        "success": !result.is_empty(),
                        "uploaded": result.ratio(),
                        "result": result,
                    });
                    println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
                    if result.is_empty() { ExitCode::FAILURE } else { ExitCode::SUCCESS }
                }
                Err(e) => fail(e),
            }
        }

        Commands::Dna { values } => {
            let attributes: Vec<Attribute> = values
                .iter()
                .map(|v| Attribute::new("", v.as_str()))
                .collect();
            println!("{}", derive_dna(&attributes));
            ExitCode::SUCCESS
        }
    }
}
