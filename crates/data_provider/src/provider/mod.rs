//! src/provider/mod.rs
//!
//! Asynchronous batch provider.
//!
//! # Architecture
//!
//! ```text
//!   RecordSource ──► LoadingEngine ──► Pool ──┐
//!   (one stream     (record-loader    (weighted, │  get_next_batch(n)
//!    per file)        thread)          bounded)  ├──► draw ──► scanners ──► Batch
//!                                               │                 │
//!                          CacheStrategy.load() ┘                 ▼
//!                                                      CacheStrategy.drop_records()
//! ```
//!
//! - A pass starts with [`DataProvider::reset`]. If the cache strategy asks
//!   for a fresh load, a loader thread opens every file and fills the pool
//!   under backpressure. Otherwise the pass is replayed from the cache and no
//!   thread is started.
//! - The consumer blocks until the pool holds the requested weight, the loader
//!   is done, or the loader is itself waiting for room.
//! - Drawn records are decoded by the scanner pipeline and then handed to the
//!   cache strategy, which either releases them or keeps them for the next
//!   pass.
//!
//! # Capacity modes
//! With a bounded pool of capacity `C`, a record of weight `w` is admitted
//! when:
//! - strict (`allow_exceed_capacity = false`): `resident + w < C`
//! - overflow allowed (`allow_exceed_capacity = true`): `resident < C`

mod config;
mod engine;
mod pool;
#[allow(clippy::module_inception)]
mod provider;

pub use config::{ProviderConfig, ProviderConfigBuilder, ProviderSpec};
pub use provider::DataProvider;
