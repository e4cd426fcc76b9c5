//! Identify the format of a chart file.

use std::fs;

use anyhow::{Context, Result};

use chartconv_core::{Format, detect};

pub fn run(input: &str) -> Result<()> {
    let bytes = fs::read(input).with_context(|| format!("reading {input}"))?;
    let format = detect(&bytes).with_context(|| format!("identifying {input}"))?;
    println!("{}", describe(format));
    Ok(())
}

fn describe(format: Format) -> String {
    match format {
        Format::Sus => "sus".to_string(),
        Format::Usc => "usc".to_string(),
        Format::LevelData {
            compressed,
            extended,
        } => {
            let mut name = String::from("level-data");
            if extended {
                name.push_str(" (extended)");
            }
            if compressed {
                name.push_str(" (gzip)");
            }
            name
        }
        Format::Mmws(flavor) => format!("mmws ({})", flavor.signature()),
    }
}
