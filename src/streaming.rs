//! The transaction pass: reader → selector → key accumulator → writer, one batch at a time.

use crate::date::YearMonth;
use crate::keys::KeyAccumulator;
use crate::partition::PartitionedWriter;
use crate::progress::{BatchObserver, Stage};
use crate::reader::{source_size, TransactionBatches};
use crate::selector::Selector;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;

/// Row counts of one transaction pass, overall and per month.
#[derive(Debug, Default, Clone)]
pub struct StreamCounts {
    pub rows_read: u64,
    pub rows_retained: u64,
    pub read_by_month: BTreeMap<YearMonth, u64>,
    pub retained_by_month: BTreeMap<YearMonth, u64>,
}

fn count_months(into: &mut BTreeMap<YearMonth, u64>, periods: impl Iterator<Item = YearMonth>) {
    for ym in periods {
        *into.entry(ym).or_insert(0) += 1;
    }
}

/// Stream the whole transaction log once. `keys` is borrowed for the pass and only
/// becomes meaningful after this returns.
pub fn stream_transactions(
    path: &Path,
    chunk_rows: usize,
    read_buf_bytes: usize,
    selector: &mut Selector,
    keys: &mut KeyAccumulator,
    writer: &mut PartitionedWriter,
    observer: &mut dyn BatchObserver,
) -> Result<StreamCounts> {
    let mut batches = TransactionBatches::open(path, chunk_rows, read_buf_bytes)?;
    observer.on_stage_start(Stage::Transactions, source_size(path));

    let mut counts = StreamCounts::default();
    while let Some(batch) = batches.next() {
        let batch = batch.with_context(|| format!("sampling {}", path.display()))?;
        let n = batch.len() as u64;
        counts.rows_read += n;
        count_months(&mut counts.read_by_month, batch.iter().map(|r| r.period()));

        let retained = selector.select(batch);
        if !retained.is_empty() {
            keys.record(&retained);
            writer.write_batch(&retained)?;
            counts.rows_retained += retained.len() as u64;
            count_months(&mut counts.retained_by_month, retained.iter().map(|r| r.period()));
        }
        observer.on_batch(Stage::Transactions, n, batches.take_bytes_delta());
    }
    observer.on_stage_done(Stage::Transactions);
    Ok(counts)
}
