//! src/provider/config.rs
//!
//! Configuration for provider behaviour
//!
//! `ProviderConfig` holds the parameters that control how records are pooled
//! and drawn. `ProviderSpec` bundles a config with the file list and the slot
//! headers, which is everything needed to build a provider from a JSON file.
//!
//! Example:
//! ```ignore
//! let config = ProviderConfig::builder()
//!     .pool_capacity(4096)
//!     .allow_exceed_capacity(false)
//!     .shuffle(true)
//!     .cache_mode(CacheMode::ReplayOnePass)
//!     .seed(42)
//!     .build();
//! ```
//!
//! # Performance considerations:
//! - `pool_capacity`: Larger pools give better shuffling but hold more records
//!                    in memory. `None` lets the loader run ahead unbounded.
//! - `cache_mode`: `ReplayOnePass` keeps a whole pass in memory after the
//!                 first one and never touches the source again.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use tracing::warn;

use crate::cache::CacheMode;
use crate::errors::{ProviderError, Result};
use crate::slot::SlotHeader;

/// Configuration for DataProvider
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    /// Maximum resident pool weight (`None` = unbounded)
    pub pool_capacity: Option<usize>,
    /// When true the loader only waits for the pool to drop below capacity,
    /// so one record may push it past the bound. When false a record is only
    /// admitted if it keeps the pool strictly below capacity.
    pub allow_exceed_capacity: bool,
    /// Whether to pick a random file per load and a random record per draw
    pub shuffle: bool,
    /// Per-pass cache strategy
    pub cache_mode: CacheMode,
    /// Random seed for reproducible shuffling
    pub seed: Option<u64>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            pool_capacity: None,
            allow_exceed_capacity: false,
            shuffle: true,
            cache_mode: CacheMode::NoCache,
            seed: None,
        }
    }
}

impl ProviderConfig {
    pub fn builder() -> ProviderConfigBuilder {
        ProviderConfigBuilder::default()
    }

    /// Checks the configuration before a provider is built from it.
    pub fn validate(&self) -> Result<()> {
        if self.pool_capacity == Some(0) {
            return Err(ProviderError::Config(
                "pool_capacity must be > 0 (omit it for an unbounded pool)".to_string(),
            ));
        }
        if self.pool_capacity.is_none() && self.allow_exceed_capacity {
            warn!("allow_exceed_capacity has no effect on an unbounded pool");
        }
        Ok(())
    }
}

/// Builder for ProviderConfig with method chaining
#[derive(Default)]
pub struct ProviderConfigBuilder {
    config: ProviderConfig,
}

impl ProviderConfigBuilder {
    /// Bound the resident pool weight
    pub fn pool_capacity(mut self, capacity: usize) -> Self {
        self.config.pool_capacity = Some(capacity);
        self
    }

    /// Remove the pool bound
    pub fn unbounded(mut self) -> Self {
        self.config.pool_capacity = None;
        self
    }

    /// Let a single record push the pool past its capacity
    pub fn allow_exceed_capacity(mut self, allow: bool) -> Self {
        self.config.allow_exceed_capacity = allow;
        self
    }

    /// Set whether loading and drawing are randomized
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.config.shuffle = shuffle;
        self
    }

    pub fn cache_mode(mut self, mode: CacheMode) -> Self {
        self.config.cache_mode = mode;
        self
    }

    /// Set the random seed for reproducible shuffling.
    ///
    /// Every pass reseeds from this value, so two providers with the same
    /// seed and the same sources produce the same batches.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Build the final configuration.
    pub fn build(self) -> ProviderConfig {
        self.config
    }
}

/// One slot as written in a spec file: either a named header or the legacy
/// `[dim, type, seq_type]` integer triple.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum SlotEntry {
    Header(SlotHeader),
    Codes([i64; 3]),
}

impl SlotEntry {
    fn into_header(self) -> Result<SlotHeader> {
        match self {
            SlotEntry::Header(header) => Ok(header),
            SlotEntry::Codes([dim, kind, nesting]) => SlotHeader::from_codes(dim, kind, nesting),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSpec {
    #[serde(default)]
    config: ProviderConfig,
    files: Vec<String>,
    slots: Vec<SlotEntry>,
}

/// Everything needed to build a provider: config, file list, and slot headers.
///
/// ```json
/// {
///   "config": { "pool_capacity": 1024, "cache_mode": "replay_one_pass" },
///   "files": ["part-0.jsonl", "part-1.jsonl"],
///   "slots": [
///     { "dim": 3, "kind": "dense" },
///     [10, 3, 0]
///   ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSpec {
    pub config: ProviderConfig,
    pub files: Vec<String>,
    pub slots: Vec<SlotHeader>,
}

impl ProviderSpec {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: RawSpec = serde_json::from_str(json)?;
        let slots = raw
            .slots
            .into_iter()
            .map(SlotEntry::into_header)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            config: raw.config,
            files: raw.files,
            slots,
        })
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read provider spec {}", path.display()))
            .map_err(|e| ProviderError::Config(format!("{:#}", e)))?;
        Self::from_json_str(&json)
    }
}
