//! src/provider/provider.rs
//!
//! The lifecycle API used by the training loop.

use std::sync::Arc;

use rand::rngs::StdRng;
use tracing::{debug, error, info};

use super::config::{ProviderConfig, ProviderSpec};
use super::engine::{pass_rng, LoadJob, LoadingEngine, DRAW_STREAM, LOADER_STREAM};
use super::pool::{draw_records, DrawFailure, Shared};
use crate::batch::{assemble, Batch};
use crate::cache::CacheStrategy;
use crate::errors::{ProviderError, Result};
use crate::field::FieldView;
use crate::slot::{validate_headers, SlotHeader};
use crate::source::{weigh, CallGate, RecordSource, WeightFn};

/// Streams records from a [`RecordSource`] into fixed-shape batches.
///
/// ```ignore
/// let mut provider = DataProvider::new(config, headers, files, Arc::new(JsonlSource::new()))?;
/// for _ in 0..num_passes {
///     provider.reset()?;
///     loop {
///         let batch = provider.get_next_batch(128)?;
///         if batch.is_end_of_pass() {
///             break;
///         }
///         train(&batch);
///     }
/// }
/// ```
///
/// Each [`reset`](Self::reset) starts a pass. The cache strategy decides
/// whether the pass is loaded by a background thread or replayed from memory.
/// [`get_next_batch`](Self::get_next_batch) returns an empty batch exactly when
/// the pass is over, and keeps returning one until the next `reset`.
pub struct DataProvider<R: FieldView + Send + 'static> {
    config: ProviderConfig,
    headers: Vec<SlotHeader>,
    files: Vec<String>,
    source: Arc<dyn RecordSource<R>>,
    weight_fn: Option<WeightFn<R>>,
    gate: CallGate,
    cache: Box<dyn CacheStrategy<R>>,
    shared: Arc<Shared<R>>,
    engine: Option<LoadingEngine<R>>,
    base_seed: u64,
    rng: StdRng,
    pass: usize,
    started: bool,
}

impl<R: FieldView + Send + 'static> DataProvider<R> {
    /// Validates the configuration and headers. No stream is opened until the
    /// first [`reset`](Self::reset).
    pub fn new(
        config: ProviderConfig,
        headers: Vec<SlotHeader>,
        files: Vec<String>,
        source: Arc<dyn RecordSource<R>>,
    ) -> Result<Self> {
        config.validate()?;
        validate_headers(&headers)?;
        for (slot, header) in headers.iter().enumerate() {
            debug!(slot, %header, "slot header");
        }

        let base_seed = config.seed.unwrap_or_else(rand::random);
        let cache = config.cache_mode.create();
        Ok(Self {
            headers,
            files,
            source,
            weight_fn: None,
            gate: CallGate::new(),
            cache,
            shared: Arc::new(Shared::new()),
            engine: None,
            base_seed,
            rng: pass_rng(base_seed, 0, DRAW_STREAM),
            pass: 0,
            started: false,
            config,
        })
    }

    pub fn from_spec(spec: ProviderSpec, source: Arc<dyn RecordSource<R>>) -> Result<Self> {
        Self::new(spec.config, spec.slots, spec.files, source)
    }

    /// Weighs records with `weight_fn` instead of counting them.
    pub fn with_weight_fn(mut self, weight_fn: WeightFn<R>) -> Self {
        self.weight_fn = Some(weight_fn);
        self
    }

    /// Shares a call gate with other users of the same record source.
    pub fn with_gate(mut self, gate: CallGate) -> Self {
        self.gate = gate;
        self
    }

    /// Ends the current pass, if any, and starts the next one.
    pub fn reset(&mut self) -> Result<()> {
        self.stop_loading();
        self.release_pool();

        let fresh = self.cache.reset()?;
        if self.started {
            self.pass += 1;
        }
        self.started = true;
        self.rng = pass_rng(self.base_seed, self.pass, DRAW_STREAM);

        if fresh {
            let job = LoadJob {
                pass: self.pass,
                source: Arc::clone(&self.source),
                files: self.files.clone(),
                gate: self.gate.clone(),
                weight_fn: self.weight_fn.clone(),
                capacity: self.config.pool_capacity,
                allow_exceed_capacity: self.config.allow_exceed_capacity,
                shuffle: self.config.shuffle,
                rng: pass_rng(self.base_seed, self.pass, LOADER_STREAM),
            };
            self.engine = Some(LoadingEngine::start(Arc::clone(&self.shared), job)?);
        }
        info!(
            pass = self.pass,
            replay = !fresh,
            cached = self.cache.len(),
            "pass started"
        );
        Ok(())
    }

    /// Draws records of total weight `n` (or whatever is left) and assembles
    /// them into a batch.
    ///
    /// An empty batch marks the end of the pass. `n == 0` draws nothing.
    pub fn get_next_batch(&mut self, n: usize) -> Result<Batch> {
        if !self.started {
            return Err(ProviderError::NotStarted);
        }

        let (records, weight) = if self.engine.is_some() {
            self.draw_loaded(n)?
        } else {
            self.draw_cached(n)?
        };

        if records.is_empty() {
            debug!(pass = self.pass, "end of pass");
            return Ok(Batch::end_of_pass());
        }

        let batch = assemble(&self.headers, &records, weight);
        let cache = &mut self.cache;
        self.gate.enter(|| cache.drop_records(records));
        if let Err(e) = &batch {
            error!(pass = self.pass, error = %e, "batch assembly failed");
        }
        batch
    }

    /// Draws from the pool filled by the background loader.
    fn draw_loaded(&mut self, n: usize) -> Result<(Vec<R>, usize)> {
        let shared = Arc::clone(&self.shared);
        let mut state = shared.wait_available(n);
        if let Some(failure) = state.failure.take() {
            drop(state);
            return Err(self.abandon_pass(Vec::new(), failure));
        }

        let weight_fn = self.weight_fn.as_ref();
        let gate = &self.gate;
        let drawn = draw_records(
            &mut state.records,
            n,
            self.config.shuffle,
            &mut self.rng,
            |r| weigh(weight_fn, gate, r),
        );
        match drawn {
            Ok((records, weight)) => {
                shared.release(&mut state, weight);
                debug!(
                    drawn = records.len(),
                    weight,
                    resident = state.actual_weight,
                    "drew from pool"
                );
                Ok((records, weight))
            }
            Err(DrawFailure { records, error }) => {
                drop(state);
                Err(self.abandon_pass(records, error))
            }
        }
    }

    /// Draws from the replay set when no loader runs this pass.
    fn draw_cached(&mut self, n: usize) -> Result<(Vec<R>, usize)> {
        let weight_fn = self.weight_fn.as_ref();
        let gate = &self.gate;
        let Some(active) = self.cache.load() else {
            return Ok((Vec::new(), 0));
        };
        match draw_records(active, n, self.config.shuffle, &mut self.rng, |r| {
            weigh(weight_fn, gate, r)
        }) {
            Ok(drawn) => Ok(drawn),
            Err(DrawFailure { records, error }) => Err(self.abandon_pass(records, error)),
        }
    }

    /// Ends the running pass after a fatal error and returns the error.
    ///
    /// `drawn` records and whatever is left of a replayed pass go to the
    /// cache. The loader is stopped and the pool released, so later calls
    /// report the end of the pass until the next [`reset`](Self::reset).
    fn abandon_pass(&mut self, drawn: Vec<R>, error: ProviderError) -> ProviderError {
        error!(error = %error, pass = self.pass, drawn = drawn.len(), "pass aborted");
        self.stop_loading();
        self.release_pool();
        let cache = &mut self.cache;
        self.gate.enter(|| {
            cache.drop_records(drawn);
            if let Some(active) = cache.load() {
                let rest: Vec<R> = active.drain(..).collect();
                cache.drop_records(rest);
            }
        });
        error
    }

    /// Randomization happens per draw, so there is nothing to do here.
    pub fn shuffle(&mut self) {}

    /// The number of records is only known once a pass has been read.
    pub fn size(&self) -> Option<usize> {
        None
    }

    pub fn headers(&self) -> &[SlotHeader] {
        &self.headers
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Weight currently resident in the pool.
    pub fn pool_weight(&self) -> usize {
        self.shared.lock().actual_weight
    }

    /// Records retained by the cache strategy.
    pub fn cached_records(&self) -> usize {
        self.cache.len()
    }

    /// Zero-based index of the current pass.
    pub fn pass(&self) -> usize {
        self.pass
    }

    fn stop_loading(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.stop();
        }
    }

    /// Drops every record left in the pool inside the call gate.
    fn release_pool(&mut self) {
        let leftover = self.shared.clear();
        if !leftover.is_empty() {
            debug!(pass = self.pass, records = leftover.len(), "releasing undrawn records");
        }
        self.gate.enter(|| drop(leftover));
    }
}

impl<R: FieldView + Send + 'static> Drop for DataProvider<R> {
    fn drop(&mut self) {
        self.stop_loading();
        self.release_pool();
    }
}
