use super::{in_slot, FieldScanner};
use crate::batch::{DenseMatrix, SlotData, SlotValue};
use crate::errors::ScanError;
use crate::field::FieldView;

/// Scanner for dense slots: one row of exactly `dim` numbers per field.
#[derive(Debug)]
pub struct DenseScanner {
    slot: usize,
    dim: usize,
    rows: usize,
    data: Vec<f32>,
}

impl DenseScanner {
    pub fn new(slot: usize, dim: usize) -> Self {
        Self {
            slot,
            dim,
            rows: 0,
            data: Vec::new(),
        }
    }
}

impl<F: FieldView> FieldScanner<F> for DenseScanner {
    fn prepare(&mut self, field: &F) -> Result<(), ScanError> {
        let found = field.len().map_err(in_slot(self.slot))?;
        if found != self.dim {
            return Err(ScanError::DenseArity {
                slot: self.slot,
                dim: self.dim,
                found,
            });
        }
        self.rows += 1;
        Ok(())
    }

    fn finish_prepare(&mut self) {
        self.data = Vec::with_capacity(self.rows * self.dim);
    }

    fn fill(&mut self, field: &F) -> Result<(), ScanError> {
        for i in 0..self.dim {
            let value = field.scalar_at(i).map_err(in_slot(self.slot))?;
            self.data.push(value as f32);
        }
        Ok(())
    }

    fn into_slot(self: Box<Self>) -> SlotData {
        SlotData::new(SlotValue::Dense(DenseMatrix {
            rows: self.rows,
            cols: self.dim,
            data: self.data,
        }))
    }
}
