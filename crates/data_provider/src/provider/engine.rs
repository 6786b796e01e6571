//! src/provider/engine.rs
//!
//! Background loader for one pass.
//!
//! The loader opens one stream per file, signals the consumer through a
//! one-shot startup channel, then moves records from randomly chosen streams
//! into the shared pool until every stream is exhausted or it is told to stop.
//!
//! ```text
//!   files ──open──► [stream 0] [stream 1] ... [stream k]
//!                         │ pick one (random, or the first)
//!                         ▼
//!                    next record ──weigh──► wait for room ──► pool
//! ```

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Sender};
use rand::rngs::StdRng;
use rand::{Rng as _, SeedableRng};
use tracing::{debug, error, info};

use super::pool::Shared;
use crate::errors::{ProviderError, Result};
use crate::source::{weigh, CallGate, RecordSource, RecordStream, WeightFn};

/// RNG stream id of the loader's file picker.
pub(crate) const LOADER_STREAM: usize = 0;
/// RNG stream id of the consumer's draws.
pub(crate) const DRAW_STREAM: usize = 1;

/// Seeds one RNG stream for one pass.
/// Seed formula: base_seed + (pass << 32) + stream_id
pub(crate) fn pass_rng(base_seed: u64, pass: usize, stream_id: usize) -> StdRng {
    let seed = base_seed
        .wrapping_add((pass as u64) << 32)
        .wrapping_add(stream_id as u64);
    StdRng::seed_from_u64(seed)
}

/// Everything the loader thread needs for one pass.
pub(crate) struct LoadJob<R> {
    pub(crate) pass: usize,
    pub(crate) source: Arc<dyn RecordSource<R>>,
    pub(crate) files: Vec<String>,
    pub(crate) gate: CallGate,
    pub(crate) weight_fn: Option<WeightFn<R>>,
    pub(crate) capacity: Option<usize>,
    pub(crate) allow_exceed_capacity: bool,
    pub(crate) shuffle: bool,
    pub(crate) rng: StdRng,
}

/// Handle to a running loader thread. Dropping it stops and joins the thread.
pub(crate) struct LoadingEngine<R> {
    shared: Arc<Shared<R>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl<R: Send + 'static> LoadingEngine<R> {
    /// Spawns the loader and waits until all of its streams are open.
    ///
    /// Returns the first open failure instead of a running engine.
    pub(crate) fn start(shared: Arc<Shared<R>>, job: LoadJob<R>) -> Result<Self> {
        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);
        let worker_shared = Arc::clone(&shared);

        let handle = thread::Builder::new()
            .name("record-loader".to_string())
            .spawn(move || run(worker_shared, job, ready_tx))
            .map_err(ProviderError::LoaderSpawn)?;

        let mut engine = Self {
            shared,
            handle: Some(handle),
        };
        match ready_rx.recv() {
            Ok(Ok(())) => Ok(engine),
            Ok(Err(e)) => {
                engine.stop();
                Err(e)
            }
            Err(_) => {
                engine.stop();
                Err(ProviderError::LoaderDisconnected)
            }
        }
    }
}

impl<R> LoadingEngine<R> {
    /// Requests cancellation and joins the loader thread.
    pub(crate) fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.shared.request_exit();
            if handle.join().is_err() {
                error!("record loader panicked");
            }
        }
    }
}

impl<R> Drop for LoadingEngine<R> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<R>(shared: Arc<Shared<R>>, mut job: LoadJob<R>, ready_tx: Sender<Result<()>>) {
    let mut streams: Vec<(String, RecordStream<R>)> = Vec::with_capacity(job.files.len());
    for file in &job.files {
        match job.gate.enter(|| job.source.open(file)) {
            Ok(stream) => {
                debug!(pass = job.pass, file = %file, "stream opened");
                streams.push((file.clone(), stream));
            }
            Err(source) => {
                job.gate.enter(|| drop(streams));
                let _ = ready_tx.send(Err(ProviderError::SourceOpen {
                    file: file.clone(),
                    source,
                }));
                return;
            }
        }
    }

    shared.start_loading(streams.len());
    info!(
        pass = job.pass,
        files = streams.len(),
        shuffle = job.shuffle,
        "record loader started"
    );
    let _ = ready_tx.send(Ok(()));

    let outcome = load(&shared, &mut job, &mut streams);
    job.gate.enter(|| drop(streams));

    match outcome {
        Ok(loaded) => {
            info!(
                pass = job.pass,
                loaded,
                cancelled = shared.exiting(),
                "record loader finished"
            );
            shared.finish_loading(None);
        }
        Err(e) => {
            error!(pass = job.pass, error = %e, "record loader failed");
            shared.finish_loading(Some(e));
        }
    }
}

/// The loader loop. Returns the number of records moved into the pool.
fn load<R>(
    shared: &Shared<R>,
    job: &mut LoadJob<R>,
    streams: &mut Vec<(String, RecordStream<R>)>,
) -> Result<usize> {
    let mut loaded = 0;
    while !streams.is_empty() {
        if shared.exiting() {
            break;
        }

        let index = if job.shuffle {
            job.rng.random_range(0..streams.len())
        } else {
            0
        };
        let (file, stream) = &mut streams[index];
        let record = match job.gate.enter(|| stream.next()) {
            Some(Ok(record)) => record,
            Some(Err(source)) => {
                return Err(ProviderError::SourceRead {
                    file: file.clone(),
                    source,
                })
            }
            None => {
                let (file, stream) = streams.remove(index);
                job.gate.enter(|| drop(stream));
                shared.stream_exhausted();
                debug!(
                    pass = job.pass,
                    file = %file,
                    remaining = streams.len(),
                    "stream exhausted"
                );
                continue;
            }
        };

        let weight = weigh(job.weight_fn.as_ref(), &job.gate, &record)?;
        if let Some(rejected) =
            shared.push(record, weight, job.capacity, job.allow_exceed_capacity)?
        {
            job.gate.enter(|| drop(rejected));
            break;
        }
        loaded += 1;
    }
    Ok(loaded)
}

#[cfg(test)]
mod engine_tests {
    use super::*;
    use anyhow::anyhow;
    use rand::Rng;

    struct Counting {
        per_file: usize,
    }

    impl RecordSource<usize> for Counting {
        fn open(&self, file: &str) -> anyhow::Result<RecordStream<usize>> {
            if file == "missing" {
                return Err(anyhow!("no such file"));
            }
            Ok(Box::new((0..self.per_file).map(Ok)))
        }
    }

    fn job(files: &[&str], capacity: Option<usize>) -> LoadJob<usize> {
        LoadJob {
            pass: 0,
            source: Arc::new(Counting { per_file: 5 }),
            files: files.iter().map(|f| f.to_string()).collect(),
            gate: CallGate::new(),
            weight_fn: None,
            capacity,
            allow_exceed_capacity: false,
            shuffle: true,
            rng: pass_rng(7, 0, LOADER_STREAM),
        }
    }

    #[test]
    fn test_engine_loads_every_stream() -> Result<()> {
        let shared = Arc::new(Shared::new());
        let mut engine = LoadingEngine::start(Arc::clone(&shared), job(&["a", "b", "c"], None))?;

        let state = shared.wait_available(usize::MAX);
        assert!(!state.loading);
        assert_eq!(state.live_streams, 0);
        assert_eq!(state.records.len(), 15);
        assert_eq!(state.actual_weight, 15);
        drop(state);

        engine.stop();
        Ok(())
    }

    #[test]
    fn test_engine_start_reports_open_failure() {
        let shared = Arc::new(Shared::new());
        let err = LoadingEngine::start(Arc::clone(&shared), job(&["a", "missing"], None))
            .err()
            .expect("open failure");
        assert!(matches!(err, ProviderError::SourceOpen { ref file, .. } if file == "missing"));
        assert!(!shared.lock().loading);
    }

    #[test]
    fn test_engine_stop_unblocks_backpressure() -> Result<()> {
        let shared = Arc::new(Shared::new());
        let mut engine = LoadingEngine::start(Arc::clone(&shared), job(&["a"], Some(3)))?;

        {
            let state = shared.wait_available(usize::MAX);
            assert!(state.producer_blocked);
            assert_eq!(state.actual_weight, 2);
        }
        engine.stop();
        assert!(!shared.lock().loading);
        Ok(())
    }

    struct Panicking;

    impl RecordSource<usize> for Panicking {
        fn open(&self, _file: &str) -> anyhow::Result<RecordStream<usize>> {
            Ok(Box::new(std::iter::from_fn(
                || -> Option<anyhow::Result<usize>> { panic!("stream blew up") },
            )))
        }
    }

    #[test]
    fn test_drop_joins_panicked_loader() -> Result<()> {
        let shared = Arc::new(Shared::new());
        let mut job = job(&["a"], None);
        job.source = Arc::new(Panicking);
        let engine = LoadingEngine::start(Arc::clone(&shared), job)?;

        // the join error is logged, not re-raised
        drop(engine);
        assert!(shared.exiting());
        Ok(())
    }

    #[test]
    fn test_pass_rng_is_reproducible() {
        let a: u64 = pass_rng(1, 2, DRAW_STREAM).random();
        let b: u64 = pass_rng(1, 2, DRAW_STREAM).random();
        let c: u64 = pass_rng(1, 3, DRAW_STREAM).random();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
