use super::{checked_index, in_slot, FieldScanner};
use crate::batch::{SlotData, SlotValue};
use crate::errors::ScanError;
use crate::field::FieldView;

/// Scanner for index slots: every field is a single integer id.
#[derive(Debug)]
pub struct IndexScanner {
    slot: usize,
    dim: usize,
    count: usize,
    ids: Vec<u32>,
}

impl IndexScanner {
    pub fn new(slot: usize, dim: usize) -> Self {
        Self {
            slot,
            dim,
            count: 0,
            ids: Vec::new(),
        }
    }
}

impl<F: FieldView> FieldScanner<F> for IndexScanner {
    fn prepare(&mut self, _field: &F) -> Result<(), ScanError> {
        self.count += 1;
        Ok(())
    }

    fn finish_prepare(&mut self) {
        self.ids = Vec::with_capacity(self.count);
    }

    fn fill(&mut self, field: &F) -> Result<(), ScanError> {
        let id = field.as_index().map_err(in_slot(self.slot))?;
        self.ids.push(checked_index(self.slot, id, self.dim)?);
        Ok(())
    }

    fn into_slot(self: Box<Self>) -> SlotData {
        SlotData::new(SlotValue::Ids(self.ids))
    }
}
