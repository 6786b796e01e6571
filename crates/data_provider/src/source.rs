//! src/source.rs
//!
//! Collaborator seams of the provider: where records come from, how they are
//! weighed, and the lock every call into them is scoped through.

use std::sync::{Arc, Mutex};

use crate::errors::{ProviderError, Result};

/// A stream of records read from one file. `None` is exhaustion; an `Err` item
/// is fatal for the pass.
pub type RecordStream<R> = Box<dyn Iterator<Item = anyhow::Result<R>> + Send>;

/// Produces one record stream per file id.
///
/// Implementations must be `Send + Sync`: streams are opened on the loader
/// thread while the provider itself lives on the consumer thread.
pub trait RecordSource<R>: Send + Sync {
    fn open(&self, file: &str) -> anyhow::Result<RecordStream<R>>;
}

/// Optional per-record weight function.
///
/// Called once when a record is loaded and again when it is drawn, so it must
/// return the same value both times.
pub type WeightFn<R> = Arc<dyn Fn(&R) -> anyhow::Result<i64> + Send + Sync>;

/// Serialization boundary for calls into the record source.
///
/// Sources backed by a runtime that tolerates a single caller at a time (an
/// embedded interpreter, a non-reentrant C library) share one gate between
/// every provider that uses them. Opening and pulling streams, calling the
/// weight function, and releasing records all happen inside [`enter`](Self::enter).
#[derive(Clone, Default)]
pub struct CallGate {
    lock: Arc<Mutex<()>>,
}

impl CallGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` while holding the gate.
    pub fn enter<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        f()
    }
}

impl std::fmt::Debug for CallGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallGate").finish_non_exhaustive()
    }
}

/// Weight of one record: 1 without a weight function, otherwise its checked
/// result.
pub(crate) fn weigh<R>(weight_fn: Option<&WeightFn<R>>, gate: &CallGate, record: &R) -> Result<usize> {
    let Some(weight_fn) = weight_fn else {
        return Ok(1);
    };
    let raw = gate
        .enter(|| weight_fn(record))
        .map_err(|e| ProviderError::InvalidWeight(format!("{:#}", e)))?;
    usize::try_from(raw)
        .map_err(|_| ProviderError::InvalidWeight(format!("weight must be non-negative, got {}", raw)))
}
