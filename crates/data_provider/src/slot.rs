//! Slot headers: the static description of every output slot of a batch.
//!
//! Headers are read once when the provider is built and never change
//! afterwards. Their order is the order of the fields inside each record and
//! the order of the [`SlotData`](crate::batch::SlotData) buffers in a batch.

use crate::errors::{ProviderError, Result};
use serde::Deserialize;
use std::fmt;

/// How the values of one slot are packed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    /// `dim` floats per row, packed row-major.
    Dense,
    /// One integer id per element.
    IndexList,
    /// A list of column ids per row (CSR without values).
    SparseNoValue,
    /// A list of `(column, value)` pairs per row (CSR with values).
    SparseValue,
}

/// Sequence nesting of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nesting {
    #[default]
    None,
    /// Each record field is a sequence of elements.
    Sequence,
    /// Each record field is a sequence of sub-sequences of elements.
    SubSequence,
}

impl SlotKind {
    /// Decodes the integer slot type codes used by existing slot descriptions.
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(SlotKind::Dense),
            1 => Ok(SlotKind::SparseNoValue),
            2 => Ok(SlotKind::SparseValue),
            3 => Ok(SlotKind::IndexList),
            _ => Err(ProviderError::UnsupportedCode {
                what: "slot type",
                code,
            }),
        }
    }
}

impl Nesting {
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Nesting::None),
            1 => Ok(Nesting::Sequence),
            2 => Ok(Nesting::SubSequence),
            _ => Err(ProviderError::UnsupportedCode {
                what: "sequence type",
                code,
            }),
        }
    }

    /// Number of sequence levels wrapped around the leaf values.
    pub fn depth(self) -> usize {
        match self {
            Nesting::None => 0,
            Nesting::Sequence => 1,
            Nesting::SubSequence => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SlotHeader {
    pub dim: usize,
    pub kind: SlotKind,
    #[serde(default)]
    pub nesting: Nesting,
}

impl SlotHeader {
    pub fn new(dim: usize, kind: SlotKind, nesting: Nesting) -> Self {
        Self { dim, kind, nesting }
    }

    pub fn dense(dim: usize) -> Self {
        Self::new(dim, SlotKind::Dense, Nesting::None)
    }

    pub fn index(dim: usize) -> Self {
        Self::new(dim, SlotKind::IndexList, Nesting::None)
    }

    pub fn sparse(dim: usize) -> Self {
        Self::new(dim, SlotKind::SparseNoValue, Nesting::None)
    }

    pub fn sparse_value(dim: usize) -> Self {
        Self::new(dim, SlotKind::SparseValue, Nesting::None)
    }

    /// Returns the same header with the given nesting.
    pub fn with_nesting(mut self, nesting: Nesting) -> Self {
        self.nesting = nesting;
        self
    }

    /// Builds a header from the `(dim, type, seq_type)` integer triple.
    pub fn from_codes(dim: i64, kind: i64, nesting: i64) -> Result<Self> {
        let dim = usize::try_from(dim).map_err(|_| ProviderError::UnsupportedCode {
            what: "slot dim",
            code: dim,
        })?;
        Ok(Self::new(
            dim,
            SlotKind::from_code(kind)?,
            Nesting::from_code(nesting)?,
        ))
    }
}

impl fmt::Display for SlotHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dim = {} kind = {:?} nesting = {:?}",
            self.dim, self.kind, self.nesting
        )
    }
}

/// Validates the header list once, at provider construction.
///
/// A zero `dim` can never describe a usable slot: dense rows would be empty
/// and every id or column would be out of range.
pub fn validate_headers(headers: &[SlotHeader]) -> Result<()> {
    if headers.is_empty() {
        return Err(ProviderError::Config(
            "at least one slot header is required".to_string(),
        ));
    }
    for (slot, header) in headers.iter().enumerate() {
        if header.dim == 0 {
            return Err(ProviderError::InvalidHeader {
                slot,
                reason: format!("dim must be > 0 ({})", header),
            });
        }
        if header.kind != SlotKind::Dense && u32::try_from(header.dim - 1).is_err() {
            return Err(ProviderError::InvalidHeader {
                slot,
                reason: format!("dim {} does not fit 32-bit ids", header.dim),
            });
        }
    }
    Ok(())
}
