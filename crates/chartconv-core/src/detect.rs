//! Format sniffing for an unlabelled byte buffer.
//!
//! Checks the cheap signatures first (binary magic, gzip magic), then falls
//! back to parsing: a JSON object is classified by its top-level key, and a
//! text document qualifies as the line-oriented format when it carries both
//! metadata lines and header-colon score lines.

use std::io::Read;

use flate2::read::GzDecoder;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::level_data::GZIP_MAGIC;
use crate::mmws::Flavor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Line-oriented text format.
    Sus,
    /// Compact JSON note list.
    Usc,
    /// Entity-graph JSON; `extended` means it uses speed-timeline records.
    LevelData { compressed: bool, extended: bool },
    /// Versioned binary format.
    Mmws(Flavor),
}

/// Classifies a byte buffer, or fails with [`Error::UnknownFormat`].
pub fn detect(bytes: &[u8]) -> Result<Format> {
    for flavor in [Flavor::ChartCyanvas, Flavor::UntitledChart, Flavor::Base] {
        if bytes.starts_with(flavor.signature().as_bytes()) {
            return Ok(Format::Mmws(flavor));
        }
    }

    if bytes.starts_with(&GZIP_MAGIC) {
        let mut decoded = Vec::new();
        let mut gz = GzDecoder::new(bytes);
        if gz.read_to_end(&mut decoded).is_err() {
            return Err(Error::UnknownFormat);
        }
        return match serde_json::from_slice::<Value>(&decoded) {
            Ok(doc) if doc.get("entities").is_some() => Ok(Format::LevelData {
                compressed: true,
                extended: uses_speed_timelines(&doc),
            }),
            _ => Err(Error::UnknownFormat),
        };
    }

    if let Ok(doc) = serde_json::from_slice::<Value>(bytes) {
        if doc.get("usc").is_some() {
            return Ok(Format::Usc);
        }
        if doc.get("entities").is_some() {
            return Ok(Format::LevelData {
                compressed: false,
                extended: uses_speed_timelines(&doc),
            });
        }
        debug!("JSON document with no recognized top-level key");
        return Err(Error::UnknownFormat);
    }

    if let Ok(text) = std::str::from_utf8(bytes)
        && looks_like_text_chart(text)
    {
        return Ok(Format::Sus);
    }
    Err(Error::UnknownFormat)
}

fn uses_speed_timelines(doc: &Value) -> bool {
    doc.get("entities")
        .and_then(Value::as_array)
        .is_some_and(|entities| {
            entities
                .iter()
                .any(|e| e.get("archetype").and_then(Value::as_str) == Some("TimeScaleGroup"))
        })
}

fn looks_like_text_chart(text: &str) -> bool {
    let mut metadata = false;
    let mut scoredata = false;
    for line in text.lines() {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('#') else {
            continue;
        };
        if rest.contains(':') {
            scoredata = true;
        } else {
            metadata = true;
        }
        if metadata && scoredata {
            return true;
        }
    }
    false
}
