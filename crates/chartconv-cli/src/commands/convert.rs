//! Chart conversion: sniff the input, lift it into the model, resolve
//! overlaps for discretized targets, lower to the requested format.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use chartconv_core::level_data::WriteOptions;
use chartconv_core::{
    Flavor, Format, ResolvePolicy, Score, detect, level_data, mmws, resolve_overlaps, sus, usc,
};

use crate::cli::Target;

pub fn run(
    input: &str,
    to: Target,
    output: Option<&str>,
    plain: bool,
    no_resolve: bool,
) -> Result<()> {
    let bytes = fs::read(input).with_context(|| format!("reading {input}"))?;
    let format = detect(&bytes).with_context(|| format!("identifying {input}"))?;
    info!(?format, "detected input format");

    let mut score = load(&bytes, format)?;

    // Grid-based targets cannot represent two notes on one cell.
    let discretized = matches!(
        to,
        Target::Sus | Target::Mmws | Target::Ccmmws | Target::Ucmmws
    );
    if discretized && !no_resolve {
        resolve_overlaps(&mut score, &ResolvePolicy::default())
            .context("resolving overlapping notes")?;
    }

    let out_bytes = export(&score, to, plain)?;
    let out_path = match output {
        Some(path) => path.to_string(),
        None => default_output(input, to),
    };
    fs::write(&out_path, out_bytes).with_context(|| format!("writing {out_path}"))?;
    println!("{out_path}");
    Ok(())
}

fn load(bytes: &[u8], format: Format) -> Result<Score> {
    let score = match format {
        Format::Sus => sus::load(bytes)?,
        Format::Usc => usc::load(bytes)?,
        Format::LevelData { .. } => level_data::load(bytes)?,
        Format::Mmws(_) => mmws::load(bytes)?,
    };
    Ok(score)
}

fn export(score: &Score, to: Target, plain: bool) -> Result<Vec<u8>> {
    let bytes = match to {
        Target::Sus => sus::export(score)?.into_bytes(),
        Target::Usc => usc::export(score)?,
        Target::LevelData => level_data::export(score, &WriteOptions { compress: !plain })?,
        Target::Mmws => mmws::export(score, Flavor::Base)?,
        Target::Ccmmws => mmws::export(score, Flavor::ChartCyanvas)?,
        Target::Ucmmws => mmws::export(score, Flavor::UntitledChart)?,
    };
    Ok(bytes)
}

fn default_output(input: &str, to: Target) -> String {
    let path = Path::new(input);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("chart");
    let name = format!("{stem}.{}", to.extension());
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(name).display().to_string(),
        _ => name,
    }
}
