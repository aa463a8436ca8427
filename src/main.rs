//! Command-line entry point: create and inspect MLP checkpoints.

use clap::{Parser, Subcommand};
use modelkit::activation::ActivationRegistry;
use modelkit::model::{ConfigDocument, Model};
use modelkit::nn::{Mlp, MlpConfig};
use modelkit::seed::RandomContext;
use modelkit::serialization::{tensor_info, CheckpointStore};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Аргументы командной строки
#[derive(Parser, Debug)]
#[command(author, version, about = "modelkit: seeded MLP checkpoints", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a randomly initialised MLP and save it as a checkpoint
    Init {
        /// Checkpoint directory (created if missing)
        dir: PathBuf,
        /// Checkpoint name
        name: String,
        #[arg(long)]
        input_size: usize,
        #[arg(long)]
        num_classes: usize,
        /// Comma-separated hidden layer sizes
        #[arg(long, value_delimiter = ',')]
        hidden: Vec<usize>,
        /// Activation name, looked up case-insensitively
        #[arg(long, default_value = "relu")]
        act: String,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Write the config with indentation
        #[arg(long)]
        pretty: bool,
    },
    /// Print the config and tensor table of a checkpoint and check it loads
    Inspect {
        dir: PathBuf,
        name: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();
    let registry = ActivationRegistry::standard();

    match cli.command {
        Commands::Init {
            dir,
            name,
            input_size,
            num_classes,
            hidden,
            act,
            seed,
            pretty,
        } => {
            let activation = registry.build(&act, &ConfigDocument::new())?;
            let mut rng = RandomContext::new(seed);
            let config = MlpConfig::new(input_size, num_classes).with_hidden_sizes(&hidden);
            let net = Mlp::new(config, activation, &mut rng);

            let store = CheckpointStore::new()
                .with_pretty_json(pretty)
                .with_metadata("seed", &seed.to_string());
            store.save(&net, &dir, &name)?;
            println!("{}", store.config_path(&dir, &name).display());
            println!("{}", store.model_path(&dir, &name).display());
        }
        Commands::Inspect { dir, name } => {
            let store = CheckpointStore::new();
            let mut rng = RandomContext::new(0);
            let net: Mlp = store.load(
                &dir,
                &name,
                &registry,
                |act, cfg| Mlp::from_document(act, cfg, &mut rng),
                None,
            )?;

            println!("{}", serde_json::to_string_pretty(&net.config())?);
            let mut total = 0usize;
            for info in tensor_info(store.model_path(&dir, &name))? {
                let numel: usize = info.shape.iter().product();
                total += numel;
                println!("{:<24} {:<6} {:?}", info.name, info.dtype, info.shape);
            }
            println!("parameters: {}", total);
        }
    }

    Ok(())
}
