use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Play videos onto palette grids
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Increase logging verbosity (default: info, -v: debug, -vv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,

    /// Engine config file (defaults to the platform config directory)
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show container and stream metadata of a video file
    Probe {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Play a file, URL or search query on a headless screen and log stats
    Play {
        #[arg(value_name = "REF")]
        reference: String,

        /// Screen width in cells
        #[arg(long, default_value_t = 128)]
        width: u32,

        /// Screen height in cells
        #[arg(long, default_value_t = 128)]
        height: u32,

        /// Size the screen from an aspect ratio preset (e.g. 16:9) instead
        #[arg(long, value_name = "RATIO")]
        aspect: Option<String>,

        /// Tile budget used with --aspect
        #[arg(long, default_value_t = 4)]
        tiles: u32,

        /// Cap on frames sent per second
        #[arg(long)]
        fps: Option<u32>,

        /// Restart at end of stream
        #[arg(short = 'l', long = "loop")]
        looping: bool,

        /// Stop after this many seconds
        #[arg(long, value_name = "SECONDS")]
        limit: Option<u64>,
    },

    /// Print the palette as JSON
    Palette {
        /// Custom palette file instead of the configured one
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Write the effective config to the config path
    InitConfig,
}
