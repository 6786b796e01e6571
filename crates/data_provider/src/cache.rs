//! src/cache.rs
//!
//! Per-pass cache strategies.
//!
//! A cache strategy decides at every `reset()` whether the next pass must be
//! loaded from the record source or can be replayed from memory, and it takes
//! ownership of every record once the batch built from it has been handed out.
//!
//! ```text
//!             pass N                          pass N+1
//!   source ──► pool ──► batch ──► drop ──► staging
//!                                              │ reset(): swap
//!                                              ▼
//!                                           active ──► batch ──► drop ──► staging
//! ```
//!
//! Both sets are owned by the provider and only touched from the consumer
//! thread, so no locking is needed here.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::errors::{ProviderError, Result};

/// Which cache strategy a provider runs with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Every pass streams fresh records from the source.
    #[default]
    NoCache,
    /// The first pass streams from the source; later passes replay the
    /// records captured during the previous one.
    ReplayOnePass,
}

impl CacheMode {
    /// Parses the integer code used by legacy slot descriptions.
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Self::NoCache),
            1 => Ok(Self::ReplayOnePass),
            _ => Err(ProviderError::UnsupportedCode {
                what: "cache mode",
                code,
            }),
        }
    }

    pub fn create<R: Send + 'static>(self) -> Box<dyn CacheStrategy<R>> {
        match self {
            Self::NoCache => Box::new(NoCache),
            Self::ReplayOnePass => Box::new(ReplayOnePass::new()),
        }
    }
}

/// Behaviour shared by all cache strategies.
pub trait CacheStrategy<R>: Send {
    /// Starts a new pass. Returns `true` when the pass must be loaded from the
    /// record source, `false` when it will be replayed via [`load`](Self::load).
    fn reset(&mut self) -> Result<bool>;

    /// Takes ownership of records whose batch has been assembled.
    fn drop_records(&mut self, records: Vec<R>);

    /// The replay set of the current pass, if this strategy has one.
    fn load(&mut self) -> Option<&mut VecDeque<R>>;

    /// Number of records currently retained.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Discards every record as soon as its batch is built.
#[derive(Debug, Default)]
pub struct NoCache;

impl<R> CacheStrategy<R> for NoCache {
    fn reset(&mut self) -> Result<bool> {
        Ok(true)
    }

    fn drop_records(&mut self, records: Vec<R>) {
        drop(records);
    }

    fn load(&mut self) -> Option<&mut VecDeque<R>> {
        None
    }

    fn len(&self) -> usize {
        0
    }
}

/// Captures one pass and replays it on every later pass.
#[derive(Debug)]
pub struct ReplayOnePass<R> {
    active: VecDeque<R>,
    staging: VecDeque<R>,
}

impl<R> Default for ReplayOnePass<R> {
    fn default() -> Self {
        Self {
            active: VecDeque::new(),
            staging: VecDeque::new(),
        }
    }
}

impl<R> ReplayOnePass<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records left to replay in the current pass.
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Records captured for the next pass.
    pub fn staged_len(&self) -> usize {
        self.staging.len()
    }
}

impl<R: Send> CacheStrategy<R> for ReplayOnePass<R> {
    fn reset(&mut self) -> Result<bool> {
        if !self.active.is_empty() {
            return Err(ProviderError::CacheState(format!(
                "reset with {} records still waiting to be replayed",
                self.active.len()
            )));
        }
        if self.staging.is_empty() {
            return Ok(true);
        }
        std::mem::swap(&mut self.active, &mut self.staging);
        Ok(false)
    }

    fn drop_records(&mut self, records: Vec<R>) {
        self.staging.extend(records);
    }

    fn load(&mut self) -> Option<&mut VecDeque<R>> {
        Some(&mut self.active)
    }

    fn len(&self) -> usize {
        self.active.len() + self.staging.len()
    }
}
