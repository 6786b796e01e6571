use crate::errors::{ProviderError, Result, ScanError};
use crate::field::FieldView;
use crate::scanner::{self, FieldScanner};
use crate::slot::SlotHeader;
use tracing::debug;

/// Row-major `rows × cols` matrix of dense values.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseMatrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f32>,
}

impl DenseMatrix {
    /// Returns one row, or `None` when `row` is out of range.
    pub fn row(&self, row: usize) -> Option<&[f32]> {
        let start = row.checked_mul(self.cols)?;
        self.data.get(start..start + self.cols)
    }
}

/// Compressed-row sparse matrix.
///
/// Row `r` owns `columns[row_offsets[r]..row_offsets[r + 1]]` and, when
/// present, the values at the same positions.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrix {
    pub rows: usize,
    pub cols: usize,
    pub row_offsets: Vec<usize>,
    pub columns: Vec<u32>,
    pub values: Option<Vec<f32>>,
}

impl SparseMatrix {
    pub fn nnz(&self) -> usize {
        self.columns.len()
    }
}

/// Packed values of one slot.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotValue {
    Dense(DenseMatrix),
    Ids(Vec<u32>),
    Sparse(SparseMatrix),
}

/// One slot of a [`Batch`]: its packed values plus optional sequence layout.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotData {
    pub value: SlotValue,
    /// `count + 1` start offsets of each record's sequence, in leaf rows.
    pub sequence_starts: Option<Vec<usize>>,
    /// `count + 1` start offsets of every sub-sequence, in leaf rows.
    pub sub_sequence_starts: Option<Vec<usize>>,
}

impl SlotData {
    pub fn new(value: SlotValue) -> Self {
        Self {
            value,
            sequence_starts: None,
            sub_sequence_starts: None,
        }
    }

    pub fn dense(&self) -> Option<&DenseMatrix> {
        match &self.value {
            SlotValue::Dense(matrix) => Some(matrix),
            _ => None,
        }
    }

    pub fn ids(&self) -> Option<&[u32]> {
        match &self.value {
            SlotValue::Ids(ids) => Some(ids),
            _ => None,
        }
    }

    pub fn sparse(&self) -> Option<&SparseMatrix> {
        match &self.value {
            SlotValue::Sparse(matrix) => Some(matrix),
            _ => None,
        }
    }
}

/// A fully assembled batch, or the empty end-of-pass marker.
///
/// `weight` is the realized weight of the drawn records (their count unless a
/// weight function is configured). Slots are in header order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Batch {
    weight: usize,
    num_records: usize,
    slots: Vec<SlotData>,
}

impl Batch {
    /// The zero-record batch that signals the end of a pass.
    pub fn end_of_pass() -> Self {
        Self::default()
    }

    pub fn is_end_of_pass(&self) -> bool {
        self.num_records == 0
    }

    pub fn weight(&self) -> usize {
        self.weight
    }

    pub fn num_records(&self) -> usize {
        self.num_records
    }

    pub fn slots(&self) -> &[SlotData] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&SlotData> {
        self.slots.get(index)
    }

    pub fn into_slots(self) -> Vec<SlotData> {
        self.slots
    }
}

/// Runs the scanner pipeline over `records` and packs them into a batch.
///
/// Scanners are created fresh from `headers`; every record must carry at
/// least one field per header. The first shape or type mismatch aborts the
/// whole batch.
pub fn assemble<R>(headers: &[SlotHeader], records: &[R], weight: usize) -> Result<Batch>
where
    R: FieldView + 'static,
{
    if records.is_empty() {
        return Ok(Batch::end_of_pass());
    }

    let wrap = |record: usize| move |source: ScanError| ProviderError::Scan { record, source };

    for (r, record) in records.iter().enumerate() {
        let found = record.len().map_err(|e| wrap(r)(ScanError::Record(e)))?;
        if found < headers.len() {
            return Err(wrap(r)(ScanError::MissingFields {
                expected: headers.len(),
                found,
            }));
        }
    }

    let mut scanners: Vec<Box<dyn FieldScanner<R>>> = headers
        .iter()
        .enumerate()
        .map(|(slot, header)| scanner::create::<R>(slot, header))
        .collect();
    debug!(slots = scanners.len(), records = records.len(), "scanners created");

    for scanner in scanners.iter_mut() {
        scanner.start_prepare();
    }
    for (r, record) in records.iter().enumerate() {
        for (slot, scanner) in scanners.iter_mut().enumerate() {
            let field = slot_field(record, slot).map_err(wrap(r))?;
            scanner.prepare(field).map_err(wrap(r))?;
        }
    }
    for scanner in scanners.iter_mut() {
        scanner.finish_prepare();
    }

    for scanner in scanners.iter_mut() {
        scanner.start_fill();
    }
    for (r, record) in records.iter().enumerate() {
        for (slot, scanner) in scanners.iter_mut().enumerate() {
            let field = slot_field(record, slot).map_err(wrap(r))?;
            scanner.fill(field).map_err(wrap(r))?;
        }
    }
    for scanner in scanners.iter_mut() {
        scanner.finish_fill();
    }

    let slots = scanners.into_iter().map(|s| s.into_slot()).collect();
    debug!(records = records.len(), weight, "batch assembled");
    Ok(Batch {
        weight,
        num_records: records.len(),
        slots,
    })
}

fn slot_field<R: FieldView>(record: &R, slot: usize) -> std::result::Result<&R, ScanError> {
    record.sub_field_at(slot).map_err(ScanError::Record)
}
