mod checkpoint;
mod config;
mod external;
mod pipeline;
mod streams;

use std::io;
use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;
use library::Library;
use tracing::info;

use checkpoint::{AutoConfirm, Checkpoint, Interactive};
use config::{config_path, load_or_create_config};
use external::ProcessRunner;
use pipeline::{Halt, Pipeline, PipelineOptions};

/// Sync newly dropped tracks into the string table and race playlists.
#[derive(Debug, Parser)]
#[command(name = "mcsync", version)]
struct Cli {
    /// Config file (defaults to $MCSYNC_CONFIG or ./mcsync.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the game directory from the config
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Answer yes to every checkpoint
    #[arg(long, short = 'y')]
    yes: bool,

    /// Leave audio untouched instead of building stream files
    #[arg(long)]
    skip_streams: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config_path = config_path(cli.config);
    let (config, created) = load_or_create_config(&config_path)?;
    if created {
        info!("Created default config at {:?}", config_path);
    } else {
        info!("Loaded config from {:?}", config_path);
    }

    let paths = config.resolve(&config_path, cli.base_dir.as_deref());
    let library = Library::new(
        paths.layout(),
        config.namespace.clone(),
        config.manifests.clone(),
        config.text_table.clone(),
    );
    let checkpoint: Box<dyn Checkpoint> = if cli.yes {
        Box::new(AutoConfirm)
    } else {
        Box::new(Interactive::new(io::stdin().lock(), io::stdout()))
    };
    let options = PipelineOptions {
        build_streams: !cli.skip_streams,
    };

    let summary = Pipeline::new(paths, library, ProcessRunner, checkpoint, options).run()?;
    match summary.halt {
        Halt::Completed { archives_encoded } => {
            let message = if archives_encoded {
                "Done. Archives rebuilt."
            } else {
                "Done. Archives left decoded."
            };
            println!("\n{}", message.green());
        }
        Halt::Declined(gate) => {
            println!("\n{}", format!("Stopped at: {}", gate.question()).yellow());
        }
        Halt::MissingLayout(missing) => {
            println!(
                "\n{}",
                "Nothing to change: STREAMS and ASSETS are needed, decoded or as .DAT archives."
                    .red()
            );
            for path in missing {
                println!("  missing {}", path.display());
            }
        }
    }
    Ok(())
}
