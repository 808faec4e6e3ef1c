//! vce - hardware encode pipeline CLI
//!
//! Probes device capabilities and encodes raw video through the pipeline
//! driver. Only the simulated backend is built in.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

mod commands;

#[derive(Parser)]
#[command(name = "vce")]
#[command(author, version, about = "Hardware video encode pipeline")]
#[command(long_about = "
Drives a hardware encode pipeline: device binding, capability validation,
frame submission and bitstream output.

Examples:
  vce caps                                   # Capability report of device 0
  vce caps --interop d3d9                    # Probe with legacy graphics interop
  vce encode -i in.yuv -o out.264 --set width=1280 --set height=720
  vce encode -i in.yuv -o out.265 -c encode.json --set codec=hevc
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the device's codec capabilities
    Caps(CapsArgs),

    /// Encode a raw video file
    #[command(visible_alias = "e")]
    Encode(EncodeArgs),
}

#[derive(Args)]
pub struct DeviceArgs {
    /// Adapter ordinal
    #[arg(short, long, default_value = "0")]
    pub device: u32,

    /// Graphics interop: none, d3d9 or d3d11
    #[arg(long, default_value = "none")]
    pub interop: String,

    /// Compute platform vendor
    #[arg(long, default_value = "AMD")]
    pub vendor: String,
}

#[derive(Args)]
pub struct CapsArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
}

#[derive(Args)]
pub struct EncodeArgs {
    /// Raw input file, frames back to back
    #[arg(short, long)]
    pub input: PathBuf,

    /// Encoded elementary stream output
    #[arg(short, long)]
    pub output: PathBuf,

    /// JSON pipeline config
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Parameter override as key=value (repeatable)
    #[arg(short, long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// Frames buffered by a reader thread (0 = read inline)
    #[arg(long, default_value = "0")]
    pub queue_depth: usize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let directive = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("vce_cli={}", directive).parse()?)
                .add_directive(format!("pipeline={}", directive).parse()?)
                .add_directive(format!("encoder={}", directive).parse()?)
                .add_directive(format!("device={}", directive).parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Caps(args) => {
            let probe = commands::caps(&args)?;
            println!("{}\n", probe.name);
            print!("{}", probe.report);
        }
        Commands::Encode(args) => {
            let stats = commands::encode(&args)?;
            info!(output = %args.output.display(), "Encode complete");
            println!("{}", stats);
        }
    }
    Ok(())
}
