mod common;
mod run_train;

use crate::run_train::*;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "LUPIN",
    long_about = "Learning Unobserved Pixels via Inference on Neural processes\n\
		  Train a conditional neural process that completes\n\
		  partially observed images from random pixel contexts."
)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train the neural process on an MNIST-style dataset
    Train(TrainArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.commands {
        Commands::Train(args) => {
            run_train(args)?;
        }
    }

    Ok(())
}
