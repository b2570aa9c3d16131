use anyhow::Result;
use clap::{Parser, Subcommand};
use harrier::bench;
use harrier::output::join;

#[derive(Parser)]
#[command(name = "harrier")]
#[command(version = "0.1.0")]
#[command(about = "High-throughput seed-and-extend sequence search pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline over a synthetic seed-hit set
    Bench(bench::BenchArgs),

    /// Merge per-shard temporary outputs into the final report
    Join(join::JoinArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Bench(args) => {
            bench::run(args)?;
        }
        Commands::Join(args) => {
            join::run(args)?;
        }
    }
    Ok(())
}
