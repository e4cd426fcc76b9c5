//! CLI argument definitions for chartconv.

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "chartconv")]
#[command(about = "Rhythm-game chart format converter", version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Convert a chart to another format
    Convert {
        /// Input chart file (format is detected automatically)
        input: String,
        /// Target format
        #[arg(short, long, value_enum)]
        to: Target,
        /// Output file path (defaults to the input with a new extension)
        #[arg(short, long)]
        output: Option<String>,
        /// Write the entity graph uncompressed
        #[arg(long)]
        plain: bool,
        /// Skip overlap resolution for discretized targets
        #[arg(long)]
        no_resolve: bool,
    },
    /// Identify the format of a chart file
    Detect {
        /// Input chart file
        input: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Target {
    /// Line-oriented text format
    Sus,
    /// Compact JSON note list
    Usc,
    /// Entity-graph JSON (gzip by default)
    LevelData,
    /// Binary, base editor revision
    Mmws,
    /// Binary, extended fork
    Ccmmws,
    /// Binary, extended fork with dummy notes
    Ucmmws,
}

impl Target {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Sus => "sus",
            Self::Usc => "usc",
            Self::LevelData => "json.gz",
            Self::Mmws => "mmws",
            Self::Ccmmws => "ccmmws",
            Self::Ucmmws => "ucmmws",
        }
    }
}
