#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use tracing::info;

use data_provider::logging::init_tracing;
use data_provider::{DataProvider, FieldView, JsonlSource, ProviderSpec, WeightFn};

/// Drives a provider over JSONL files and reports what every pass produced.
#[derive(Debug, Parser)]
#[command(name = "provider_demo")]
struct Args {
    /// Provider spec: config, file list, and slot headers.
    #[arg(long, env = "DATA_PROVIDER_SPEC")]
    spec: PathBuf,

    /// Directory the spec's file ids are resolved against (defaults to the
    /// spec's own directory).
    #[arg(long)]
    root: Option<PathBuf>,

    #[arg(long, default_value_t = 2)]
    passes: usize,

    /// Requested weight of every batch.
    #[arg(long, default_value_t = 32)]
    batch_weight: usize,

    /// Weigh each record by the integer stored in this slot instead of
    /// counting it.
    #[arg(long)]
    weight_slot: Option<usize>,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let spec = ProviderSpec::from_json_file(&args.spec)?;
    let root = match args.root {
        Some(root) => root,
        None => args
            .spec
            .parent()
            .map(PathBuf::from)
            .unwrap_or_default(),
    };
    info!(
        files = spec.files.len(),
        slots = spec.slots.len(),
        root = %root.display(),
        "loaded provider spec"
    );

    let source = Arc::new(JsonlSource::new().with_root(root));
    let mut provider: DataProvider<Value> = DataProvider::from_spec(spec, source)?;
    if let Some(slot) = args.weight_slot {
        provider = provider.with_weight_fn(slot_weight(slot));
    }

    for _ in 0..args.passes {
        provider.reset()?;
        let started = Instant::now();
        let (mut batches, mut records, mut weight) = (0usize, 0usize, 0usize);
        loop {
            let batch = provider
                .get_next_batch(args.batch_weight)
                .with_context(|| format!("pass {} batch {}", provider.pass(), batches))?;
            if batch.is_end_of_pass() {
                break;
            }
            batches += 1;
            records += batch.num_records();
            weight += batch.weight();
        }
        println!(
            "pass {}: {} batches, {} records, weight {} ({:.1?}, {} cached)",
            provider.pass(),
            batches,
            records,
            weight,
            started.elapsed(),
            provider.cached_records()
        );
    }
    Ok(())
}

/// Weight function reading an integer field of the record.
fn slot_weight(slot: usize) -> WeightFn<Value> {
    Arc::new(move |record: &Value| -> Result<i64> {
        let field = record
            .sub_field_at(slot)
            .with_context(|| format!("record has no slot {}", slot))?;
        let weight = field
            .as_index()
            .with_context(|| format!("slot {} is not a weight", slot))?;
        Ok(i64::try_from(weight)?)
    })
}
