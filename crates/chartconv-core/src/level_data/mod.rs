//! Entity-graph chart documents.
//!
//! The wire format is a flat JSON list of named, typed records linked by
//! string references, optionally gzip-compressed. [`read`] reconstructs a
//! [`Score`](crate::score::Score) from the graph; [`write`] lowers a score
//! back into it. Presentation-only records (simultaneous-note markers) are
//! recomputed on write, never trusted on read.

use std::io::{Read as _, Write as _};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};

use crate::error::Result;

mod arena;
mod archetype;
mod reader;
mod writer;

pub use archetype::{Archetype, classify};
pub use reader::read;
pub use writer::{WriteOptions, write};

/// Parses raw (possibly gzipped) bytes straight into a score.
pub fn load(bytes: &[u8]) -> Result<crate::score::Score> {
    read(&from_slice(bytes)?)
}

/// Lowers a score and serializes it in one step.
pub fn export(score: &crate::score::Score, options: &WriteOptions) -> Result<Vec<u8>> {
    to_vec(&write(score)?, options.compress)
}

/// Field names the engine treats specially.
pub(crate) const BEAT: &str = "#BEAT";
pub(crate) const BPM: &str = "#BPM";
pub(crate) const BPM_CHANGE: &str = "#BPM_CHANGE";

/// One key of a record: either a scalar value or a reference to another
/// record by name, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityField {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl EntityField {
    pub fn value(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value: Some(value),
            reference: None,
        }
    }

    pub fn reference(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            reference: Some(target.into()),
        }
    }
}

/// A single typed record in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelDataEntity {
    pub archetype: String,
    #[serde(default)]
    pub data: Vec<EntityField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Top-level document: audio offset plus the flat record list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelData {
    #[serde(rename = "bgmOffset", default)]
    pub bgm_offset: f64,
    pub entities: Vec<LevelDataEntity>,
}

pub(crate) const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Parses a document from raw bytes, transparently inflating gzip input.
pub fn from_slice(bytes: &[u8]) -> Result<LevelData> {
    if bytes.starts_with(&GZIP_MAGIC) {
        let mut decoder = GzDecoder::new(bytes);
        let mut inflated = Vec::new();
        decoder.read_to_end(&mut inflated)?;
        Ok(serde_json::from_slice(&inflated)?)
    } else {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Serializes a document, gzip-compressing when `compress` is set.
pub fn to_vec(data: &LevelData, compress: bool) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(data)?;
    if compress {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json)?;
        Ok(encoder.finish()?)
    } else {
        Ok(json)
    }
}
