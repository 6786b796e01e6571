use std::io;

use thiserror::Error;

/// Shape or type mismatch reported by a [`FieldView`](crate::field::FieldView).
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("expected a sequence, got {0}")]
    NotASequence(String),
    #[error("expected a number, got {0}")]
    NotANumber(String),
    #[error("expected a non-negative integer, got {0}")]
    NotAnIndex(String),
    #[error("element {index} is out of bounds for a field of length {len}")]
    OutOfBounds { index: usize, len: usize },
}

/// Error raised while decoding one record field into a slot buffer.
///
/// Any of these aborts the whole batch: no slot is ever partially filled.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("slot {slot}: {source}")]
    Field {
        slot: usize,
        #[source]
        source: FieldError,
    },
    #[error("slot {slot}: dense field has {found} values but header dim is {dim}")]
    DenseArity { slot: usize, dim: usize, found: usize },
    #[error("slot {slot}: index {index} is out of range for dim {dim}")]
    IndexOutOfRange { slot: usize, index: u64, dim: usize },
    #[error("slot {slot}: sparse value element must be a (column, value) pair, got {found} items")]
    NotAPair { slot: usize, found: usize },
    #[error("record is not a sequence of fields: {0}")]
    Record(#[source] FieldError),
    #[error("record has {found} fields but {expected} slots are declared")]
    MissingFields { expected: usize, found: usize },
}

/// Fatal provider errors.
///
/// None of these are retried. They indicate a contract violation between the
/// record source, the declared slot headers, and the caller's use of the
/// lifecycle API. Pass exhaustion is *not* an error; it is an empty batch.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid slot header #{slot}: {reason}")]
    InvalidHeader { slot: usize, reason: String },
    #[error("unsupported {what} code {code}")]
    UnsupportedCode { what: &'static str, code: i64 },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("cannot open record stream for '{file}'")]
    SourceOpen {
        file: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("record source failed while reading '{file}'")]
    SourceRead {
        file: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("weight function returned an invalid weight: {0}")]
    InvalidWeight(String),
    #[error("record weight {weight} can never fit a pool of capacity {capacity}")]
    WeightExceedsCapacity { weight: usize, capacity: usize },
    #[error("inconsistent cache state: {0}")]
    CacheState(String),
    #[error("batch decoding failed at record {record}")]
    Scan {
        record: usize,
        #[source]
        source: ScanError,
    },
    #[error("get_next_batch called before reset()")]
    NotStarted,
    #[error("failed to spawn the loader thread")]
    LoaderSpawn(#[source] io::Error),
    #[error("loader thread exited before signalling startup")]
    LoaderDisconnected,
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ProviderError>;
