use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Malformed entity graph at record `{record}`: {reason}")]
    MalformedGraph { record: String, reason: String },

    #[error("No wire representation for note shape: {0}")]
    UnsupportedNoteShape(String),

    #[error("Overlap resolution exhausted at beat {beat}, lane {lane}")]
    ResolutionExhausted { beat: f64, lane: f64 },

    #[error("Invalid chart data: {0}")]
    InvalidChart(String),

    #[error("Unrecognized input format")]
    UnknownFormat,

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn graph(record: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::MalformedGraph {
            record: record.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
