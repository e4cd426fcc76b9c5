mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Args, Command};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("chartconv_cli=warn,chartconv_core=warn"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match args.command {
        Command::Convert {
            input,
            to,
            output,
            plain,
            no_resolve,
        } => commands::convert::run(&input, to, output.as_deref(), plain, no_resolve),
        Command::Detect { input } => commands::detect::run(&input),
    }
}
