use super::{checked_index, in_slot, FieldScanner};
use crate::batch::{SlotData, SlotValue, SparseMatrix};
use crate::errors::ScanError;
use crate::field::FieldView;

/// Scanner for sparse slots, packed as a CSR matrix.
///
/// Without values each field is a list of column ids. With values each field
/// is a list of `(column, value)` pairs and a values array runs parallel to
/// the columns.
#[derive(Debug)]
pub struct SparseScanner {
    slot: usize,
    dim: usize,
    with_values: bool,
    rows: usize,
    nnz: usize,
    row_offsets: Vec<usize>,
    columns: Vec<u32>,
    values: Option<Vec<f32>>,
}

impl SparseScanner {
    pub fn no_value(slot: usize, dim: usize) -> Self {
        Self::new(slot, dim, false)
    }

    pub fn with_value(slot: usize, dim: usize) -> Self {
        Self::new(slot, dim, true)
    }

    fn new(slot: usize, dim: usize, with_values: bool) -> Self {
        Self {
            slot,
            dim,
            with_values,
            rows: 0,
            nnz: 0,
            row_offsets: Vec::new(),
            columns: Vec::new(),
            values: None,
        }
    }

    fn push_element<F: FieldView>(&mut self, element: &F) -> Result<(), ScanError> {
        let slot = self.slot;
        let column = if self.with_values {
            let arity = element.len().map_err(in_slot(slot))?;
            if arity != 2 {
                return Err(ScanError::NotAPair { slot, found: arity });
            }
            let column = element
                .sub_field_at(0)
                .and_then(FieldView::as_index)
                .map_err(in_slot(slot))?;
            let value = element.scalar_at(1).map_err(in_slot(slot))?;
            if let Some(values) = self.values.as_mut() {
                values.push(value as f32);
            }
            column
        } else {
            element.as_index().map_err(in_slot(slot))?
        };
        self.columns.push(checked_index(slot, column, self.dim)?);
        Ok(())
    }
}

impl<F: FieldView> FieldScanner<F> for SparseScanner {
    fn prepare(&mut self, field: &F) -> Result<(), ScanError> {
        self.nnz += field.len().map_err(in_slot(self.slot))?;
        self.rows += 1;
        Ok(())
    }

    fn finish_prepare(&mut self) {
        self.row_offsets = Vec::with_capacity(self.rows + 1);
        self.columns = Vec::with_capacity(self.nnz);
        self.values = self.with_values.then(|| Vec::with_capacity(self.nnz));
    }

    fn start_fill(&mut self) {
        self.row_offsets.push(0);
    }

    fn fill(&mut self, field: &F) -> Result<(), ScanError> {
        let len = field.len().map_err(in_slot(self.slot))?;
        for i in 0..len {
            let element = field.sub_field_at(i).map_err(in_slot(self.slot))?;
            self.push_element(element)?;
        }
        self.row_offsets.push(self.columns.len());
        Ok(())
    }

    fn into_slot(self: Box<Self>) -> SlotData {
        SlotData::new(SlotValue::Sparse(SparseMatrix {
            rows: self.rows,
            cols: self.dim,
            row_offsets: self.row_offsets,
            columns: self.columns,
            values: self.values,
        }))
    }
}
