//! src/provider/pool.rs
//!
//! The bounded weighted pool shared by the loader thread and the consumer.
//!
//! All mutable state sits behind one mutex. Two condition variables split the
//! wake-ups:
//! - `room`: the consumer drained weight, or shutdown was requested
//!   (the loader waits on it for backpressure)
//! - `ready`: weight was added, the loader finished, failed, or is blocked
//!   on room (the consumer waits on it before drawing)

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};

use rand::rngs::StdRng;
use rand::Rng as _;

use crate::errors::{ProviderError, Result};

/// Mutable pool state guarded by [`Shared::state`].
pub(crate) struct PoolState<R> {
    pub(crate) records: VecDeque<R>,
    /// Sum of the weights of `records`.
    pub(crate) actual_weight: usize,
    /// Streams that still have records in the running pass.
    pub(crate) live_streams: usize,
    /// True from the loader's startup signal until its loop exits.
    pub(crate) loading: bool,
    /// The loader is parked waiting for room.
    pub(crate) producer_blocked: bool,
    /// Fatal loader error waiting to be reported to the consumer.
    pub(crate) failure: Option<ProviderError>,
}

impl<R> Default for PoolState<R> {
    fn default() -> Self {
        Self {
            records: VecDeque::new(),
            actual_weight: 0,
            live_streams: 0,
            loading: false,
            producer_blocked: false,
            failure: None,
        }
    }
}

pub(crate) struct Shared<R> {
    state: Mutex<PoolState<R>>,
    room: Condvar,
    ready: Condvar,
    exit: AtomicBool,
}

impl<R> Default for Shared<R> {
    fn default() -> Self {
        Self {
            state: Mutex::new(PoolState::default()),
            room: Condvar::new(),
            ready: Condvar::new(),
            exit: AtomicBool::new(false),
        }
    }
}

impl<R> Shared<R> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Locks the pool. The state stays consistent across a panic in another
    /// holder, so poisoning is ignored.
    pub(crate) fn lock(&self) -> MutexGuard<'_, PoolState<R>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn exiting(&self) -> bool {
        self.exit.load(Ordering::Acquire)
    }

    /// Asks the loader to stop and wakes every waiter.
    pub(crate) fn request_exit(&self) {
        self.exit.store(true, Ordering::Release);
        // Taking the lock orders the flag before any waiter re-checks it.
        drop(self.lock());
        self.room.notify_all();
        self.ready.notify_all();
    }

    /// Clears all per-pass state and returns the records that were still
    /// resident. Only called while no loader is running.
    pub(crate) fn clear(&self) -> VecDeque<R> {
        self.exit.store(false, Ordering::Release);
        let mut state = self.lock();
        let records = std::mem::take(&mut state.records);
        *state = PoolState::default();
        records
    }

    /// Called by the loader once every stream is open.
    pub(crate) fn start_loading(&self, live_streams: usize) {
        let mut state = self.lock();
        state.live_streams = live_streams;
        state.loading = true;
    }

    /// One stream ran dry.
    pub(crate) fn stream_exhausted(&self) {
        let mut state = self.lock();
        state.live_streams = state.live_streams.saturating_sub(1);
        self.ready.notify_all();
    }

    /// The loader loop is over, normally or not.
    pub(crate) fn finish_loading(&self, failure: Option<ProviderError>) {
        let mut state = self.lock();
        state.loading = false;
        state.producer_blocked = false;
        if failure.is_some() {
            state.failure = failure;
        }
        self.ready.notify_all();
    }

    /// Appends one record, waiting for room first when the pool is bounded.
    ///
    /// Returns the record back instead of inserting it when shutdown was
    /// requested during the wait.
    pub(crate) fn push(
        &self,
        record: R,
        weight: usize,
        capacity: Option<usize>,
        allow_exceed_capacity: bool,
    ) -> Result<Option<R>> {
        let mut state = self.lock();
        if let Some(capacity) = capacity {
            if !allow_exceed_capacity && weight >= capacity {
                return Err(ProviderError::WeightExceedsCapacity { weight, capacity });
            }
            while !self.exiting() && !has_room(&state, weight, capacity, allow_exceed_capacity) {
                if !state.producer_blocked {
                    state.producer_blocked = true;
                    self.ready.notify_all();
                }
                state = self.room.wait(state).unwrap_or_else(|e| e.into_inner());
            }
            state.producer_blocked = false;
        }
        if self.exiting() {
            return Ok(Some(record));
        }
        state.records.push_back(record);
        state.actual_weight += weight;
        self.ready.notify_all();
        Ok(None)
    }

    /// Blocks until a draw of weight `n` can proceed.
    ///
    /// That is the case once the pool holds at least `n`, the loader stopped
    /// or failed, or the loader is itself waiting for room (the pool then
    /// cannot grow until the consumer drains it).
    pub(crate) fn wait_available(&self, n: usize) -> MutexGuard<'_, PoolState<R>> {
        let mut state = self.lock();
        while !self.exiting()
            && state.loading
            && state.failure.is_none()
            && !state.producer_blocked
            && state.actual_weight < n
        {
            state = self.ready.wait(state).unwrap_or_else(|e| e.into_inner());
        }
        state
    }

    /// Subtracts drained weight and wakes the loader.
    pub(crate) fn release(&self, state: &mut PoolState<R>, weight: usize) {
        state.actual_weight = state.actual_weight.saturating_sub(weight);
        self.room.notify_all();
    }
}

fn has_room<R>(state: &PoolState<R>, weight: usize, capacity: usize, allow_exceed: bool) -> bool {
    if allow_exceed {
        state.actual_weight < capacity
    } else {
        state.actual_weight + weight < capacity
    }
}

/// A draw cut short by a failed weight call.
///
/// `records` holds everything already taken out of the pool, including the
/// record that failed to weigh, so the caller can still retire them.
pub(crate) struct DrawFailure<R> {
    pub(crate) records: Vec<R>,
    pub(crate) error: ProviderError,
}

/// Draws records from `pool` until their weight reaches `n` or the pool is
/// empty.
///
/// Without shuffling records leave in FIFO order. With shuffling each draw
/// picks a uniformly random resident record and fills its hole with the last
/// one, which is O(1) but does not preserve any order.
pub(crate) fn draw_records<R>(
    pool: &mut VecDeque<R>,
    n: usize,
    shuffle: bool,
    rng: &mut StdRng,
    mut weigh: impl FnMut(&R) -> Result<usize>,
) -> std::result::Result<(Vec<R>, usize), DrawFailure<R>> {
    let mut drawn = Vec::new();
    let mut total = 0;
    while total < n {
        let next = if shuffle && !pool.is_empty() {
            let index = rng.random_range(0..pool.len());
            pool.swap_remove_back(index)
        } else {
            pool.pop_front()
        };
        let Some(record) = next else {
            break;
        };
        let weight = weigh(&record);
        drawn.push(record);
        match weight {
            Ok(weight) => total += weight,
            Err(error) => {
                return Err(DrawFailure {
                    records: drawn,
                    error,
                })
            }
        }
    }
    Ok((drawn, total))
}

#[cfg(test)]
mod pool_tests {
    use super::*;
    use rand::SeedableRng;
    use std::sync::Arc;
    use std::thread;

    fn resident_weight(state: &PoolState<usize>) -> usize {
        state.records.iter().sum()
    }

    /// Draws records whose value is their weight.
    fn draw(
        pool: &mut VecDeque<usize>,
        n: usize,
        shuffle: bool,
        rng: &mut StdRng,
    ) -> Result<(Vec<usize>, usize)> {
        draw_records(pool, n, shuffle, rng, |r| Ok(*r)).map_err(|f| f.error)
    }

    /// FIFO draw where every record weighs 1.
    fn draw_unit(
        pool: &mut VecDeque<usize>,
        n: usize,
        rng: &mut StdRng,
    ) -> Result<(Vec<usize>, usize)> {
        draw_records(pool, n, false, rng, |_| Ok(1)).map_err(|f| f.error)
    }

    #[test]
    fn test_weight_invariant_across_push_and_draw() -> Result<()> {
        let shared = Shared::<usize>::new();
        shared.start_loading(1);
        let mut rng = StdRng::seed_from_u64(3);

        for weight in [2, 0, 5, 1, 3] {
            assert!(shared.push(weight, weight, None, false)?.is_none());
            let state = shared.lock();
            assert_eq!(state.actual_weight, resident_weight(&state));
        }
        assert_eq!(shared.lock().actual_weight, 11);

        for n in [4, 1, 100] {
            let mut state = shared.lock();
            let (drawn, weight) = draw(&mut state.records, n, true, &mut rng)?;
            assert_eq!(weight, drawn.iter().sum::<usize>());
            shared.release(&mut state, weight);
            assert_eq!(state.actual_weight, resident_weight(&state));
        }
        assert_eq!(shared.lock().actual_weight, 0);
        Ok(())
    }

    #[test]
    fn test_draw_fifo_without_shuffle() -> Result<()> {
        let mut pool: VecDeque<usize> = (0..6).collect();
        let mut rng = StdRng::seed_from_u64(0);
        let (first, w) = draw_unit(&mut pool, 4, &mut rng)?;
        assert_eq!(first, vec![0, 1, 2, 3]);
        assert_eq!(w, 4);
        let (rest, w) = draw_unit(&mut pool, 4, &mut rng)?;
        assert_eq!(rest, vec![4, 5]);
        assert_eq!(w, 2);
        let (none, w) = draw_unit(&mut pool, 4, &mut rng)?;
        assert!(none.is_empty());
        assert_eq!(w, 0);
        Ok(())
    }

    #[test]
    fn test_draw_stops_at_requested_weight() -> Result<()> {
        let mut pool: VecDeque<usize> = VecDeque::from(vec![3, 3, 3]);
        let mut rng = StdRng::seed_from_u64(0);
        let (drawn, weight) = draw(&mut pool, 4, false, &mut rng)?;
        assert_eq!(drawn.len(), 2);
        assert_eq!(weight, 6);

        let (none, _) = draw(&mut pool, 0, true, &mut rng)?;
        assert!(none.is_empty());
        assert_eq!(pool.len(), 1);
        Ok(())
    }

    #[test]
    fn test_draw_failure_returns_removed_records() {
        let mut pool: VecDeque<usize> = (0..6).collect();
        let mut rng = StdRng::seed_from_u64(0);
        let result = draw_records(&mut pool, 10, false, &mut rng, |r| {
            if *r == 2 {
                Err(ProviderError::InvalidWeight("negative".into()))
            } else {
                Ok(1)
            }
        });
        let Err(failure) = result else {
            panic!("draw should fail on record 2");
        };
        assert!(matches!(failure.error, ProviderError::InvalidWeight(_)));
        assert_eq!(failure.records, vec![0, 1, 2]);
        assert_eq!(pool, VecDeque::from(vec![3, 4, 5]));
    }

    #[test]
    fn test_shuffled_draw_is_not_fifo_and_covers_every_record() -> Result<()> {
        let mut rng = StdRng::seed_from_u64(17);
        let mut firsts = Vec::new();
        for _ in 0..256 {
            let mut pool: VecDeque<usize> = (0..8).collect();
            let (drawn, _) = draw(&mut pool, 8, true, &mut rng)?;
            let mut sorted = drawn.clone();
            sorted.sort_unstable();
            assert_eq!(sorted, (0..8).collect::<Vec<_>>());
            firsts.push(drawn[0]);
        }
        // the first pick is uniform over the pool, not always the head
        firsts.sort_unstable();
        firsts.dedup();
        assert_eq!(firsts, (0..8).collect::<Vec<_>>());

        let mut pool: VecDeque<usize> = (0..8).collect();
        let (drawn, _) = draw(&mut pool, 8, true, &mut StdRng::seed_from_u64(17))?;
        assert_ne!(drawn, (0..8).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn test_strict_rejects_record_heavier_than_pool() {
        let shared = Shared::<usize>::new();
        let err = shared.push(1, 4, Some(4), false).unwrap_err();
        assert!(matches!(
            err,
            ProviderError::WeightExceedsCapacity {
                weight: 4,
                capacity: 4
            }
        ));
        // the same record is admitted when the pool may overflow
        assert!(shared.push(1, 4, Some(4), true).unwrap().is_none());
    }

    #[test]
    fn test_blocked_producer_wakes_consumer_and_exit() -> Result<()> {
        let shared = Arc::new(Shared::<usize>::new());
        shared.start_loading(1);
        shared.push(1, 1, Some(2), false)?;

        let producer = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || shared.push(2, 1, Some(2), false))
        };

        // A request larger than capacity still returns once the producer blocks.
        {
            let state = shared.wait_available(10);
            assert!(state.producer_blocked);
            assert_eq!(state.actual_weight, 1);
        }

        shared.request_exit();
        let returned = producer.join().expect("producer thread")?;
        assert_eq!(returned, Some(2));
        assert_eq!(shared.lock().records.len(), 1);
        Ok(())
    }

    #[test]
    fn test_finish_reports_failure_to_waiter() {
        let shared = Arc::new(Shared::<usize>::new());
        shared.start_loading(2);
        let consumer = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                let mut state = shared.wait_available(5);
                state.failure.take()
            })
        };
        shared.stream_exhausted();
        shared.finish_loading(Some(ProviderError::InvalidWeight("boom".into())));
        let failure = consumer.join().expect("consumer thread");
        assert!(matches!(failure, Some(ProviderError::InvalidWeight(_))));
        assert_eq!(shared.lock().live_streams, 1);
    }
}
