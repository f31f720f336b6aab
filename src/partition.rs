use anyhow::{Context, Result};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::config::{Layout, OutputFormat};
use crate::date::YearMonth;
use crate::paths::{transactions_file_name, STAGING_DIR};
use crate::record::Transaction;
use crate::sink::{CsvSink, ParquetSink, RowSink};
use crate::util::{create_with_backoff, replace_file_atomic_backoff};

/// An output written to `<dir>/_staging/<name>.inprogress`, moved to `<dir>/<name>`
/// by `promote`.
#[derive(Debug)]
pub struct StagedFile {
    pub tmp: PathBuf,
    pub final_path: PathBuf,
}

impl StagedFile {
    /// Create the staging file for `name` under `dir`.
    pub fn create(dir: &Path, name: &str) -> Result<(Self, File)> {
        let staging = dir.join(STAGING_DIR);
        fs::create_dir_all(&staging).with_context(|| format!("create {}", staging.display()))?;
        let tmp = staging.join(format!("{name}.inprogress"));
        let file = create_with_backoff(&tmp, 16, 50).with_context(|| format!("create {}", tmp.display()))?;
        Ok((Self { tmp, final_path: dir.join(name) }, file))
    }

    pub fn promote(self) -> Result<PathBuf> {
        replace_file_atomic_backoff(&self.tmp, &self.final_path)?;
        if let Some(staging) = self.tmp.parent() {
            // Only succeeds once the staging dir is empty.
            let _ = fs::remove_dir(staging);
        }
        Ok(self.final_path)
    }
}

/// Promote a run's outputs together, in the given order.
pub fn promote_all(files: impl IntoIterator<Item = StagedFile>) -> Result<Vec<PathBuf>> {
    files.into_iter().map(StagedFile::promote).collect()
}

struct Part {
    sink: Box<dyn RowSink>,
    staged: StagedFile,
}

/// Writers for the transaction sample, one per output file.
///
/// File layout:
///   <dir>/_staging/<name>.inprogress   (while the run is going)
///   <dir>/<name>                       (after promotion)
///
/// A file is opened on the first row routed to it and stays open for the run, so a
/// month spread over many batches is appended to, never truncated or rewritten.
/// `finalize()` only closes the files; promotion is left to the caller so the
/// sample and its catalogs appear together.
pub struct PartitionedWriter {
    dir: PathBuf,
    format: OutputFormat,
    layout: Layout,
    write_buf: usize,
    parts: BTreeMap<Option<YearMonth>, Part>,
    rows_written: u64,
}

fn open_part(dir: &Path, format: OutputFormat, period: Option<YearMonth>, write_buf: usize) -> Result<Part> {
    let name = transactions_file_name(format, period);
    let (staged, file) = StagedFile::create(dir, &name)?;
    let sink: Box<dyn RowSink> = match format {
        OutputFormat::Csv => Box::new(CsvSink::create(file, write_buf)?),
        OutputFormat::Parquet => Box::new(ParquetSink::create(file)?),
    };
    tracing::debug!(file = %name, "opened output partition");
    Ok(Part { sink, staged })
}

impl PartitionedWriter {
    pub fn new(dir: &Path, format: OutputFormat, layout: Layout, write_buf: usize) -> Result<Self> {
        let staging = dir.join(STAGING_DIR);
        fs::create_dir_all(&staging).with_context(|| format!("create {}", staging.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            format,
            layout,
            write_buf,
            parts: BTreeMap::new(),
            rows_written: 0,
        })
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Append one batch of retained rows, routed by month when partitioning.
    pub fn write_batch(&mut self, rows: &[Transaction]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut groups: BTreeMap<Option<YearMonth>, Vec<&Transaction>> = BTreeMap::new();
        for row in rows {
            let key = match self.layout {
                Layout::Single => None,
                Layout::ByMonth => Some(row.period()),
            };
            groups.entry(key).or_default().push(row);
        }

        for (key, group) in groups {
            let part = match self.parts.entry(key) {
                Entry::Occupied(e) => e.into_mut(),
                Entry::Vacant(v) => v.insert(open_part(&self.dir, self.format, key, self.write_buf)?),
            };
            part.sink.write_rows(&group)?;
            self.rows_written += group.len() as u64;
        }
        Ok(())
    }

    /// Close every sink. Returns the still-staged files in period order.
    pub fn finalize(self) -> Result<Vec<StagedFile>> {
        let mut out = Vec::with_capacity(self.parts.len());
        for (_, part) in self.parts {
            part.sink.finish().with_context(|| format!("finish {}", part.staged.tmp.display()))?;
            out.push(part.staged);
        }
        Ok(out)
    }
}
