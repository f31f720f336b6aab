use crate::catalog::{stage_articles, stage_customers};
use crate::config::{Layout, OutputFormat, SampleOptions, DEFAULT_WINDOW_MONTHS};
use crate::date::{format_date, months_back, YearMonth};
use crate::error::SampleError;
use crate::keys::KeyAccumulator;
use crate::partition::{promote_all, PartitionedWriter, StagedFile};
use crate::paths::{previous_outputs, resolve_sources, MANIFEST_FILE};
use crate::progress::{BarProgress, BatchObserver, NoProgress};
use crate::reader::probe_date_range;
use crate::selector::{Selection, Selector};
use crate::streaming::stream_transactions;
use crate::util::{init_tracing_once, remove_with_backoff};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use time::Date;

/// Chainable front door for a sampling run.
#[derive(Clone, Default)]
pub struct Sampler {
    pub(crate) opts: SampleOptions,
}

/// Outcome of a run; also persisted as `sample_manifest.json` next to the outputs.
#[derive(Clone, Debug, Serialize)]
pub struct SampleReport {
    pub selection: String,
    pub window_start: Option<String>,
    pub window_end: Option<String>,
    pub fraction: Option<f64>,
    pub seed: u64,
    /// Global `t_dat` range, present when the default window had to be probed.
    pub probed_range: Option<(String, String)>,
    pub format: OutputFormat,
    pub layout: Layout,
    pub chunk_size: usize,
    pub rows_read: u64,
    pub rows_retained: u64,
    pub read_by_month: BTreeMap<String, u64>,
    pub retained_by_month: BTreeMap<String, u64>,
    pub distinct_articles: usize,
    pub distinct_customers: usize,
    pub articles_retained: u64,
    pub customers_retained: u64,
    pub transaction_files: Vec<PathBuf>,
    pub articles_file: PathBuf,
    pub customers_file: PathBuf,
}

/// Default window: the last six calendar months of the probed range.
pub fn default_window(max: Date) -> (Date, Date) {
    (months_back(max, DEFAULT_WINDOW_MONTHS), max)
}

impl Sampler {
    pub fn new() -> Self {
        Self { opts: SampleOptions::default() }
    }

    pub fn from_options(opts: SampleOptions) -> Self {
        Self { opts }
    }

    // -------- Builder methods --------
    pub fn data_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_data_dir(dir); self }
    pub fn out_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_out_dir(dir); self }
    pub fn window(mut self, start: Option<Date>, end: Option<Date>) -> Self { self.opts = self.opts.with_window(start, end); self }
    pub fn fraction(mut self, frac: f64) -> Self { self.opts = self.opts.with_fraction(Some(frac)); self }
    pub fn format(mut self, format: OutputFormat) -> Self { self.opts = self.opts.with_format(format); self }
    pub fn layout(mut self, layout: Layout) -> Self { self.opts = self.opts.with_layout(layout); self }
    pub fn chunk_size(mut self, rows: usize) -> Self { self.opts = self.opts.with_chunk_size(rows); self }
    pub fn seed(mut self, seed: u64) -> Self { self.opts = self.opts.with_seed(seed); self }
    pub fn progress(mut self, yes: bool) -> Self { self.opts = self.opts.with_progress(yes); self }
    pub fn io_buffers(mut self, read_bytes: usize, write_bytes: usize) -> Self { self.opts = self.opts.with_io_buffers(read_bytes, write_bytes); self }

    pub fn options(&self) -> &SampleOptions {
        &self.opts
    }

    /// Run with the observer implied by `progress(..)`: bars on, or silent.
    pub fn run(self) -> Result<SampleReport> {
        if self.opts.progress {
            self.run_with_observer(&mut BarProgress::new())
        } else {
            self.run_with_observer(&mut NoProgress)
        }
    }

    /// validate → probe (only without window and fraction) → transactions →
    /// articles → customers → manifest → promote. Every output is staged until the
    /// last step, so an aborted run leaves no final files behind.
    pub fn run_with_observer(self, observer: &mut dyn BatchObserver) -> Result<SampleReport> {
        init_tracing_once();
        let opts = &self.opts;

        let explicit = opts.explicit_selection()?;
        let sources = resolve_sources(&opts.data_dir)?;
        fs::create_dir_all(&opts.out_dir).with_context(|| format!("create {}", opts.out_dir.display()))?;
        for stale in previous_outputs(&opts.out_dir) {
            remove_with_backoff(&stale, 16, 50)?;
        }

        let mut probed_range = None;
        let selection = match explicit {
            Some(sel) => sel,
            None => {
                let (min, max) = probe_date_range(&sources.transactions, opts.chunk_size, opts.read_buffer_bytes, observer)?
                    .ok_or_else(|| SampleError::config("transaction log is empty; cannot derive a default window"))?;
                tracing::info!(min = %format_date(min), max = %format_date(max), "transaction date range");
                probed_range = Some((format_date(min), format_date(max)));
                let (start, end) = default_window(max);
                tracing::info!(start = %format_date(start), end = %format_date(end), "no selection given, using the last {DEFAULT_WINDOW_MONTHS} months");
                Selection::Range { start: Some(start), end: Some(end) }
            }
        };
        tracing::info!(%selection, source = %sources.transactions.display(), "sampling transactions");

        let layout = opts.effective_layout();
        let mut selector = Selector::new(selection);
        let mut acc = KeyAccumulator::new();
        let mut writer = PartitionedWriter::new(&opts.out_dir, opts.format, layout, opts.write_buffer_bytes)?;
        let counts = stream_transactions(
            &sources.transactions,
            opts.chunk_size,
            opts.read_buffer_bytes,
            &mut selector,
            &mut acc,
            &mut writer,
            observer,
        )?;
        let staged_transactions = writer.finalize()?;
        tracing::info!(read = counts.rows_read, retained = counts.rows_retained, files = staged_transactions.len(), "transactions sampled");

        let keys = acc.finish();
        let (articles_retained, staged_articles) = stage_articles(
            &sources.articles,
            &opts.out_dir,
            opts.format,
            &keys,
            opts.read_buffer_bytes,
            opts.write_buffer_bytes,
        )?;
        let (customers_retained, staged_customers) = stage_customers(
            &sources.customers,
            &opts.out_dir,
            &keys,
            opts.chunk_size,
            opts.read_buffer_bytes,
            opts.write_buffer_bytes,
            observer,
        )?;

        let by_month = |m: &BTreeMap<YearMonth, u64>| -> BTreeMap<String, u64> {
            m.iter().map(|(k, v)| (k.to_string(), *v)).collect()
        };
        let (window_start, window_end, fraction) = match selection {
            Selection::Range { start, end } => (start.map(format_date), end.map(format_date), None),
            Selection::Fraction { frac, .. } => (None, None, Some(frac)),
        };
        let report = SampleReport {
            selection: selection.to_string(),
            window_start,
            window_end,
            fraction,
            seed: opts.seed,
            probed_range,
            format: opts.format,
            layout,
            chunk_size: opts.chunk_size,
            rows_read: counts.rows_read,
            rows_retained: counts.rows_retained,
            read_by_month: by_month(&counts.read_by_month),
            retained_by_month: by_month(&counts.retained_by_month),
            distinct_articles: keys.article_count(),
            distinct_customers: keys.customer_count(),
            articles_retained,
            customers_retained,
            transaction_files: staged_transactions.iter().map(|s| s.final_path.clone()).collect(),
            articles_file: staged_articles.final_path.clone(),
            customers_file: staged_customers.final_path.clone(),
        };
        let staged_manifest = write_manifest(&opts.out_dir, &report)?;

        // Everything is staged; the sample and its catalogs become visible together.
        let mut staged = staged_transactions;
        staged.extend([staged_articles, staged_customers, staged_manifest]);
        promote_all(staged)?;
        Ok(report)
    }
}

fn write_manifest(out_dir: &Path, report: &SampleReport) -> Result<StagedFile> {
    let (staged, file) = StagedFile::create(out_dir, MANIFEST_FILE)?;
    let mut w = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut w, report)?;
    w.write_all(b"\n")?;
    w.flush()?;
    Ok(staged)
}
