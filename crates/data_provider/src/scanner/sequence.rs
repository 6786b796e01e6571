use super::{in_slot, FieldScanner};
use crate::batch::SlotData;
use crate::errors::{FieldError, ScanError};
use crate::field::FieldView;

/// Which start-position array a [`SequenceScanner`] writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceLevel {
    Sequence,
    SubSequence,
}

/// Wraps another scanner and feeds it every element of a sequence field.
///
/// Start positions are a prefix sum over the number of *leaf* elements of
/// each sequence, with a leading 0, so `count + 1` entries in total.
/// `inner_depth` is the number of sequence levels below this wrapper: 0 when
/// it wraps a leaf scanner, 1 when it wraps a sub-sequence scanner.
pub struct SequenceScanner<F: FieldView> {
    inner: Box<dyn FieldScanner<F>>,
    level: SequenceLevel,
    inner_depth: usize,
    slot: usize,
    count: usize,
    starts: Vec<usize>,
}

impl<F: FieldView> SequenceScanner<F> {
    pub fn new(
        slot: usize,
        inner: Box<dyn FieldScanner<F>>,
        level: SequenceLevel,
        inner_depth: usize,
    ) -> Self {
        Self {
            inner,
            level,
            inner_depth,
            slot,
            count: 0,
            starts: Vec::new(),
        }
    }

    fn wrap(&self) -> impl Fn(FieldError) -> ScanError {
        in_slot(self.slot)
    }
}

/// Number of leaf elements below `field`, `depth` sequence levels down.
pub(crate) fn leaf_count<F: FieldView>(field: &F, depth: usize) -> Result<usize, FieldError> {
    let len = field.len()?;
    if depth == 0 {
        return Ok(len);
    }
    let mut total = 0;
    for i in 0..len {
        total += leaf_count(field.sub_field_at(i)?, depth - 1)?;
    }
    Ok(total)
}

impl<F: FieldView> FieldScanner<F> for SequenceScanner<F> {
    fn start_prepare(&mut self) {
        self.inner.start_prepare();
    }

    fn prepare(&mut self, field: &F) -> Result<(), ScanError> {
        let len = field.len().map_err(self.wrap())?;
        self.count += 1;
        for i in 0..len {
            let element = field.sub_field_at(i).map_err(self.wrap())?;
            self.inner.prepare(element)?;
        }
        Ok(())
    }

    fn finish_prepare(&mut self) {
        self.starts = Vec::with_capacity(self.count + 1);
        self.inner.finish_prepare();
    }

    fn start_fill(&mut self) {
        self.starts.push(0);
        self.inner.start_fill();
    }

    fn fill(&mut self, field: &F) -> Result<(), ScanError> {
        let size = leaf_count(field, self.inner_depth).map_err(self.wrap())?;
        let last = self.starts.last().copied().unwrap_or(0);
        self.starts.push(last + size);

        let len = field.len().map_err(self.wrap())?;
        for i in 0..len {
            let element = field.sub_field_at(i).map_err(self.wrap())?;
            self.inner.fill(element)?;
        }
        Ok(())
    }

    fn finish_fill(&mut self) {
        self.inner.finish_fill();
    }

    fn into_slot(self: Box<Self>) -> SlotData {
        let Self {
            inner,
            level,
            starts,
            ..
        } = *self;
        let mut slot = inner.into_slot();
        match level {
            SequenceLevel::Sequence => slot.sequence_starts = Some(starts),
            SequenceLevel::SubSequence => slot.sub_sequence_starts = Some(starts),
        }
        slot
    }
}
