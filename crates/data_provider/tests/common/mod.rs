#![allow(dead_code)]

use data_provider::{
    Batch, DataProvider, ProviderConfig, RecordSource, RecordStream, SlotHeader,
};

use anyhow::{anyhow, bail, Result};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Headers matching [`record`]: a 2-wide dense row and a single id.
pub fn headers() -> Vec<SlotHeader> {
    vec![SlotHeader::dense(2), SlotHeader::index(1_000_000)]
}

/// Record with a recognizable id: `[[id, id / 2], id]`.
pub fn record(id: usize) -> Value {
    json!([[id as f64, id as f64 / 2.0], id])
}

pub fn records(ids: impl IntoIterator<Item = usize>) -> Vec<Value> {
    ids.into_iter().map(record).collect()
}

/// In-memory record source that counts every call made into it.
#[derive(Default)]
pub struct VecSource {
    files: HashMap<String, Vec<Value>>,
    /// Files whose stream yields an error after the given number of records.
    broken: HashMap<String, usize>,
    opens: AtomicUsize,
    pulls: Arc<AtomicUsize>,
}

impl VecSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, name: &str, records: Vec<Value>) -> Self {
        self.files.insert(name.to_string(), records);
        self
    }

    pub fn with_broken_file(mut self, name: &str, records: Vec<Value>, fail_after: usize) -> Self {
        self.broken.insert(name.to_string(), fail_after);
        self.with_file(name, records)
    }

    /// Number of streams opened so far.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Number of records pulled from all streams so far.
    pub fn pulls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }
}

impl RecordSource<Value> for VecSource {
    fn open(&self, file: &str) -> Result<RecordStream<Value>> {
        let Some(records) = self.files.get(file) else {
            bail!("no such file: {}", file);
        };
        self.opens.fetch_add(1, Ordering::SeqCst);

        let fail_after = self.broken.get(file).copied();
        let pulls = Arc::clone(&self.pulls);
        let name = file.to_string();
        let iter = records
            .clone()
            .into_iter()
            .enumerate()
            .map(move |(i, record)| {
                if fail_after == Some(i) {
                    return Err(anyhow!("{} is truncated at record {}", name, i));
                }
                pulls.fetch_add(1, Ordering::SeqCst);
                Ok(record)
            });
        Ok(Box::new(iter))
    }
}

pub fn provider(
    config: ProviderConfig,
    files: &[&str],
    source: Arc<VecSource>,
) -> Result<DataProvider<Value>> {
    let files = files.iter().map(|f| f.to_string()).collect();
    Ok(DataProvider::new(config, headers(), files, source)?)
}

/// Ids carried by one batch, in draw order.
pub fn batch_ids(batch: &Batch) -> Vec<usize> {
    batch
        .slot(1)
        .and_then(|slot| slot.ids())
        .map(|ids| ids.iter().map(|&id| id as usize).collect())
        .unwrap_or_default()
}

/// Drains the current pass and returns every id in draw order.
pub fn drain_pass(provider: &mut DataProvider<Value>, n: usize) -> Result<Vec<usize>> {
    let mut ids = Vec::new();
    loop {
        let batch = provider.get_next_batch(n)?;
        if batch.is_end_of_pass() {
            return Ok(ids);
        }
        ids.extend(batch_ids(&batch));
    }
}

pub fn sorted(mut ids: Vec<usize>) -> Vec<usize> {
    ids.sort_unstable();
    ids
}
