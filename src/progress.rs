//! Progress reporting as a side channel: the pipeline calls a `BatchObserver`
//! once per batch and never depends on it. `NoProgress` is the default;
//! `BarProgress` draws byte-based `indicatif` bars, one per stage.

use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::time::Duration;

/// Streaming stages that report per-batch progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Probe,
    Transactions,
    Customers,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::Probe => "Probing date range",
            Stage::Transactions => "Sampling transactions",
            Stage::Customers => "Filtering customers",
        }
    }
}

pub trait BatchObserver {
    fn on_stage_start(&mut self, _stage: Stage, _total_bytes: u64) {}

    /// `rows` rows were just read, advancing the source by `bytes` bytes.
    fn on_batch(&mut self, stage: Stage, rows: u64, bytes: u64);

    fn on_stage_done(&mut self, _stage: Stage) {}
}

#[derive(Debug, Default)]
pub struct NoProgress;

impl BatchObserver for NoProgress {
    fn on_batch(&mut self, _stage: Stage, _rows: u64, _bytes: u64) {}
}

/// Observer adapter over a closure, handy for tests and embedding.
pub struct FnObserver<F: FnMut(Stage, u64, u64)>(pub F);

impl<F: FnMut(Stage, u64, u64)> BatchObserver for FnObserver<F> {
    fn on_batch(&mut self, stage: Stage, rows: u64, bytes: u64) {
        (self.0)(stage, rows, bytes)
    }
}

/// A small wrapper around an `indicatif` bar that tracks bytes and rows.
pub struct ProgressScope {
    pb: ProgressBar,
    rows: u64,
}

impl ProgressScope {
    pub fn bytes(label: impl Into<String>, total_bytes: u64) -> Self {
        let pb = ProgressBar::new(total_bytes);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.green} {msg} {bytes:>10}/{total_bytes:<10} [{bar:.cyan/blue}] {percent:>3}%  \
             {bytes_per_sec}  elapsed: {elapsed_precise}  eta: {eta_precise}",
        ) {
            pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
        }
        pb.set_message(label.into());
        pb.enable_steady_tick(Duration::from_millis(100));
        Self { pb, rows: 0 }
    }

    #[inline]
    pub fn inc(&mut self, rows: u64, bytes: u64) {
        self.rows += rows;
        self.pb.inc(bytes);
    }

    pub fn finish(&self, msg: impl Into<String>) {
        self.pb.finish_with_message(msg.into());
    }
}

#[derive(Default)]
pub struct BarProgress {
    bars: HashMap<Stage, ProgressScope>,
}

impl BarProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BatchObserver for BarProgress {
    fn on_stage_start(&mut self, stage: Stage, total_bytes: u64) {
        self.bars.insert(stage, ProgressScope::bytes(stage.label(), total_bytes));
    }

    fn on_batch(&mut self, stage: Stage, rows: u64, bytes: u64) {
        if let Some(bar) = self.bars.get_mut(&stage) {
            bar.inc(rows, bytes);
        }
    }

    fn on_stage_done(&mut self, stage: Stage) {
        if let Some(bar) = self.bars.remove(&stage) {
            bar.finish(format!("{}: {} rows", stage.label(), bar.rows));
        }
    }
}
