//! Field scanners: two-phase converters from record fields to slot buffers.
//!
//! Every batch creates one scanner per slot and drives it through the same
//! protocol, slot by slot, over the whole set of drawn records:
//!
//! ```text
//! start_prepare ─► prepare(field) × records ─► finish_prepare   (sizing pass)
//! start_fill    ─► fill(field)    × records ─► finish_fill      (copy pass)
//! ```
//!
//! The sizing pass only counts rows, elements, and non-zeros; `finish_prepare`
//! then allocates every buffer at its exact final size, so the copy pass never
//! grows a buffer.
//!
//! Leaf scanners ([`DenseScanner`], [`IndexScanner`], [`SparseScanner`]) decode
//! one value per call. [`SequenceScanner`] wraps any scanner, including another
//! `SequenceScanner`, and feeds it the elements of a sequence field while
//! recording start positions. The wrapper is told how many sequence levels sit
//! below it, so it never has to inspect the concrete type of its inner scanner.

mod dense;
mod index;
mod sequence;
mod sparse;

pub use dense::DenseScanner;
pub use index::IndexScanner;
pub use sequence::{SequenceLevel, SequenceScanner};
pub use sparse::SparseScanner;

use crate::batch::SlotData;
use crate::errors::{FieldError, ScanError};
use crate::field::FieldView;
use crate::slot::{Nesting, SlotHeader, SlotKind};

/// Common two-phase interface of all scanners.
///
/// `F` is the record field representation being decoded.
pub trait FieldScanner<F: FieldView> {
    /// Called once per batch before any `prepare`.
    fn start_prepare(&mut self) {}

    /// Sizing pass over one field (a whole record field, or one element of a
    /// sequence when wrapped).
    fn prepare(&mut self, field: &F) -> Result<(), ScanError>;

    /// Allocates output buffers from the counts accumulated by `prepare`.
    fn finish_prepare(&mut self);

    /// Called once per batch before any `fill`.
    fn start_fill(&mut self) {}

    /// Copy pass over one field, in the same order as `prepare`.
    fn fill(&mut self, field: &F) -> Result<(), ScanError>;

    fn finish_fill(&mut self) {}

    /// Consumes the scanner and returns the filled slot.
    fn into_slot(self: Box<Self>) -> SlotData;
}

/// Builds the scanner chain for one slot header.
///
/// `SubSequence` nests two sequence wrappers: the inner one records
/// sub-sequence starts, the outer one records sequence starts over the total
/// leaf count of each record.
pub fn create<F>(slot: usize, header: &SlotHeader) -> Box<dyn FieldScanner<F>>
where
    F: FieldView + 'static,
{
    let leaf: Box<dyn FieldScanner<F>> = match header.kind {
        SlotKind::Dense => Box::new(DenseScanner::new(slot, header.dim)),
        SlotKind::IndexList => Box::new(IndexScanner::new(slot, header.dim)),
        SlotKind::SparseNoValue => Box::new(SparseScanner::no_value(slot, header.dim)),
        SlotKind::SparseValue => Box::new(SparseScanner::with_value(slot, header.dim)),
    };

    match header.nesting {
        Nesting::None => leaf,
        Nesting::Sequence => Box::new(SequenceScanner::new(
            slot,
            leaf,
            SequenceLevel::Sequence,
            0,
        )),
        Nesting::SubSequence => {
            let sub = Box::new(SequenceScanner::new(
                slot,
                leaf,
                SequenceLevel::SubSequence,
                0,
            ));
            Box::new(SequenceScanner::new(slot, sub, SequenceLevel::Sequence, 1))
        }
    }
}

/// Attaches the slot index to a field-level error.
pub(crate) fn in_slot(slot: usize) -> impl Fn(FieldError) -> ScanError {
    move |source| ScanError::Field { slot, source }
}

/// Checks an id or column against the slot dimension and narrows it.
pub(crate) fn checked_index(slot: usize, index: u64, dim: usize) -> Result<u32, ScanError> {
    if index >= dim as u64 {
        return Err(ScanError::IndexOutOfRange { slot, index, dim });
    }
    u32::try_from(index).map_err(|_| ScanError::IndexOutOfRange { slot, index, dim })
}
