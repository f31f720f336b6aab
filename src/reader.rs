//! Bounded-memory readers: delimited sources (plain or zstd) streamed as fixed-size
//! row batches, plus the one-pass min/max date prober.

use crate::error::SampleError;
use crate::progress::{BatchObserver, Stage};
use crate::record::{Transaction, TXN_COLUMNS};
use crate::util::open_with_backoff;
use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::fs;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use time::Date;
use zstd::stream::read::Decoder;

/// A `Read` wrapper that counts on-disk (compressed) bytes consumed.
struct CountingReader<R: Read> {
    inner: R,
    counter: Arc<AtomicU64>,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.counter.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

/// Shared byte counter handed out with every opened source.
#[derive(Clone, Default)]
pub struct ByteCounter {
    total: Arc<AtomicU64>,
    reported: u64,
}

impl ByteCounter {
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Bytes read since the previous call.
    pub fn take_delta(&mut self) -> u64 {
        let now = self.total();
        let delta = now.saturating_sub(self.reported);
        self.reported = now;
        delta
    }
}

pub(crate) fn is_zst(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("zst"))
}

/// Open a delimited source with a header row. `.zst` files are decoded on the fly;
/// `window_log_max(31)` avoids "frame requires too much memory" on large frames.
pub fn open_csv(path: &Path, read_buf_bytes: usize) -> Result<(csv::Reader<Box<dyn Read>>, ByteCounter)> {
    let file = open_with_backoff(path, 16, 50).with_context(|| format!("open {}", path.display()))?;
    let counter = ByteCounter::default();
    let counted = CountingReader { inner: file, counter: counter.total.clone() };

    let inner: Box<dyn Read> = if is_zst(path) {
        let mut decoder = Decoder::new(counted).with_context(|| format!("zstd {}", path.display()))?;
        decoder.window_log_max(31)?;
        Box::new(decoder)
    } else {
        Box::new(counted)
    };
    let buffered: Box<dyn Read> = Box::new(BufReader::with_capacity(read_buf_bytes.max(8 * 1024), inner));
    // Header names are trimmed once here; column lookups and serde field matching
    // both see the trimmed names.
    let rdr = ReaderBuilder::new().has_headers(true).trim(Trim::Headers).from_reader(buffered);
    Ok((rdr, counter))
}

/// Classify a csv error: transport failures stay I/O errors, everything else is a
/// row that does not fit the file's shape.
pub(crate) fn csv_error(path: &Path, err: csv::Error) -> anyhow::Error {
    if let csv::ErrorKind::Io(_) = err.kind() {
        return anyhow::Error::new(err).context(format!("read {}", path.display()));
    }
    let line = err.position().map(|p| p.line()).unwrap_or(0);
    SampleError::Parse { path: path.to_path_buf(), line, message: err.to_string() }.into()
}

/// Position of `name` in the header row, or a parse error naming the missing column.
pub(crate) fn column_index(path: &Path, headers: &StringRecord, name: &str) -> Result<usize> {
    headers.iter().position(|h| h == name).ok_or_else(|| {
        SampleError::Parse { path: path.to_path_buf(), line: 1, message: format!("missing column {name:?}") }.into()
    })
}

pub fn source_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Lazy, finite, non-restartable sequence of transaction batches. Each batch holds at
/// most `batch_rows` rows; the source itself is never fully materialized.
/// The first coercion failure is yielded as an error and ends the sequence.
pub struct TransactionBatches {
    path: PathBuf,
    rdr: csv::Reader<Box<dyn Read>>,
    headers: StringRecord,
    record: StringRecord,
    batch_rows: usize,
    bytes: ByteCounter,
    done: bool,
}

impl TransactionBatches {
    pub fn open(path: &Path, batch_rows: usize, read_buf_bytes: usize) -> Result<Self> {
        let (mut rdr, bytes) = open_csv(path, read_buf_bytes)?;
        let headers = rdr.headers().map_err(|e| csv_error(path, e))?.clone();
        for col in TXN_COLUMNS {
            column_index(path, &headers, col)?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            rdr,
            headers,
            record: StringRecord::new(),
            batch_rows: batch_rows.max(1),
            bytes,
            done: false,
        })
    }

    /// Source bytes consumed since the last call (for progress reporting).
    pub fn take_bytes_delta(&mut self) -> u64 {
        self.bytes.take_delta()
    }

    fn read_batch(&mut self) -> Result<Vec<Transaction>> {
        let mut batch = Vec::with_capacity(self.batch_rows.min(64 * 1024));
        while batch.len() < self.batch_rows {
            if !self.rdr.read_record(&mut self.record).map_err(|e| csv_error(&self.path, e))? {
                break;
            }
            let row: Transaction = self
                .record
                .deserialize(Some(&self.headers))
                .map_err(|e| csv_error(&self.path, e))?;
            batch.push(row);
        }
        Ok(batch)
    }
}

impl Iterator for TransactionBatches {
    type Item = Result<Vec<Transaction>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_batch() {
            Ok(batch) if batch.is_empty() => {
                self.done = true;
                None
            }
            Ok(batch) => Some(Ok(batch)),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// One full pass over the source: exact global `(min, max)` of `t_dat`,
/// or `None` when the source has no rows.
pub fn probe_date_range(
    path: &Path,
    batch_rows: usize,
    read_buf_bytes: usize,
    observer: &mut dyn BatchObserver,
) -> Result<Option<(Date, Date)>> {
    let mut batches = TransactionBatches::open(path, batch_rows, read_buf_bytes)?;
    observer.on_stage_start(Stage::Probe, source_size(path));

    let mut bounds: Option<(Date, Date)> = None;
    while let Some(batch) = batches.next() {
        let batch = batch?;
        for row in &batch {
            bounds = Some(match bounds {
                None => (row.t_dat, row.t_dat),
                Some((lo, hi)) => (lo.min(row.t_dat), hi.max(row.t_dat)),
            });
        }
        let delta = batches.take_bytes_delta();
        observer.on_batch(Stage::Probe, batch.len() as u64, delta);
    }
    observer.on_stage_done(Stage::Probe);
    Ok(bounds)
}
