use crate::error::SampleError;
use crate::selector::Selection;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use time::Date;

pub const DEFAULT_CHUNK: usize = 1_000_000;
pub const DEFAULT_SEED: u64 = 42;
/// Width of the default window (months back from the newest transaction).
pub const DEFAULT_WINDOW_MONTHS: u32 = 6;

/// Encoding of the transaction sample and the article catalog.
/// The customer catalog is always streamed out as CSV.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    Parquet,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Parquet => "parquet",
        }
    }

    /// Parquet is partitioned per month, CSV goes to one flat file.
    pub fn default_layout(self) -> Layout {
        match self {
            OutputFormat::Csv => Layout::Single,
            OutputFormat::Parquet => Layout::ByMonth,
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "parquet" => Ok(Self::Parquet),
            other => Err(format!("unknown format {other:?} (expected parquet|csv)")),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// How retained transactions are spread over files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Layout {
    Single,
    ByMonth,
}

impl FromStr for Layout {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "by-month" | "month" => Ok(Self::ByMonth),
            other => Err(format!("unknown layout {other:?} (expected single|by-month)")),
        }
    }
}

/// User-facing options with sensible defaults and builder chaining.
#[derive(Clone, Debug)]
pub struct SampleOptions {
    pub data_dir: PathBuf,
    pub out_dir: PathBuf,
    pub start: Option<Date>, // inclusive
    pub end: Option<Date>,   // inclusive
    pub frac: Option<f64>,
    pub format: OutputFormat,
    pub layout: Option<Layout>, // None: format's default
    pub chunk_size: usize,      // rows per batch (RAM control)
    pub seed: u64,
    pub progress: bool,

    // IO tuning
    pub read_buffer_bytes: usize,
    pub write_buffer_bytes: usize,
}

impl Default for SampleOptions {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/raw"),
            out_dir: PathBuf::from("./data/sample"),
            start: None,
            end: None,
            frac: None,
            format: OutputFormat::Parquet,
            layout: None,
            chunk_size: DEFAULT_CHUNK,
            seed: DEFAULT_SEED,
            progress: true,
            read_buffer_bytes: 256 * 1024,
            write_buffer_bytes: 256 * 1024,
        }
    }
}

impl SampleOptions {
    pub fn with_data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.data_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_out_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.out_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_window(mut self, start: Option<Date>, end: Option<Date>) -> Self {
        self.start = start;
        self.end = end;
        self
    }
    pub fn with_fraction(mut self, frac: Option<f64>) -> Self {
        self.frac = frac;
        self
    }
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }
    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = Some(layout);
        self
    }
    pub fn with_chunk_size(mut self, rows: usize) -> Self {
        self.chunk_size = rows.max(1);
        self
    }
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
    pub fn with_io_buffers(mut self, read_bytes: usize, write_bytes: usize) -> Self {
        self.read_buffer_bytes = read_bytes.max(8 * 1024);
        self.write_buffer_bytes = write_bytes.max(8 * 1024);
        self
    }

    pub fn effective_layout(&self) -> Layout {
        self.layout.unwrap_or_else(|| self.format.default_layout())
    }

    /// Validate the selection flags. `Ok(None)` means no selection was given and the
    /// default window has to be derived from the data.
    pub fn explicit_selection(&self) -> Result<Option<Selection>, SampleError> {
        let windowed = self.start.is_some() || self.end.is_some();
        match (windowed, self.frac) {
            (true, Some(_)) => Err(SampleError::config(
                "choose one mode: a date window (--start/--end) or a sampling fraction (--frac)",
            )),
            (false, Some(frac)) => {
                if !(frac > 0.0 && frac <= 1.0) {
                    return Err(SampleError::config(format!("--frac must be in (0, 1], got {frac}")));
                }
                Ok(Some(Selection::Fraction { frac, seed: self.seed }))
            }
            (true, None) => {
                if let (Some(s), Some(e)) = (self.start, self.end) {
                    if s > e {
                        return Err(SampleError::config(format!("--start {s} is after --end {e}")));
                    }
                }
                Ok(Some(Selection::Range { start: self.start, end: self.end }))
            }
            (false, None) => Ok(None),
        }
    }
}
