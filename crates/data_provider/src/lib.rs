#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

pub mod batch;
pub mod cache;
pub mod errors;
pub mod field;
pub mod logging;
pub mod provider;
pub mod readers;
pub mod scanner;
pub mod slot;
pub mod source;

pub use batch::{Batch, DenseMatrix, SlotData, SlotValue, SparseMatrix};
pub use cache::{CacheMode, CacheStrategy, NoCache, ReplayOnePass};
pub use errors::{FieldError, ProviderError, Result, ScanError};
pub use field::FieldView;
pub use provider::{DataProvider, ProviderConfig, ProviderConfigBuilder, ProviderSpec};
pub use readers::JsonlSource;
pub use slot::{Nesting, SlotHeader, SlotKind};
pub use source::{CallGate, RecordSource, RecordStream, WeightFn};
