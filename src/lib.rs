mod config;
mod date;
mod error;
mod paths;
mod record;
mod util;

mod progress;
mod reader;
mod selector;
mod keys;
mod sink;
mod partition;
mod streaming;
mod catalog;
mod pipeline;

mod calendar;
mod warehouse;

pub use crate::config::{Layout, OutputFormat, SampleOptions, DEFAULT_CHUNK, DEFAULT_SEED, DEFAULT_WINDOW_MONTHS};
pub use crate::date::{date_key, format_date, months_back, parse_date, YearMonth};
pub use crate::error::SampleError;
pub use crate::record::{Transaction, TXN_COLUMNS};
pub use crate::pipeline::{default_window, SampleReport, Sampler};

// Building blocks of the transaction pass, usable on their own.
pub use crate::reader::{open_csv, probe_date_range, ByteCounter, TransactionBatches};
pub use crate::selector::{Selection, Selector};
pub use crate::keys::{KeyAccumulator, RetainedKeys};
pub use crate::partition::{promote_all, PartitionedWriter, StagedFile};
pub use crate::streaming::{stream_transactions, StreamCounts};
pub use crate::catalog::{filter_articles, filter_customers, stage_articles, stage_customers, ARTICLE_KEY, CUSTOMER_KEY};
pub use crate::sink::{date_to_days, days_to_date};

// Progress observers.
pub use crate::progress::{BarProgress, BatchObserver, FnObserver, NoProgress, ProgressScope, Stage};

// File naming and discovery of sample outputs.
pub use crate::paths::{
    articles_file_name, discover_sample, resolve_sources, transactions_file_name, SampleFiles, SourcePaths,
    ART_FILE, CUS_FILE, CUS_OUT_FILE, MANIFEST_FILE, STAGING_DIR, TXN_FILE,
};

// Warehouse staging.
pub use crate::calendar::{calendar_rows, write_calendar, CalendarRow, DEFAULT_CALENDAR_END, DEFAULT_CALENDAR_START};
pub use crate::warehouse::{build_star, StarReport, D_ARTICLE_FILE, D_CHANNEL_FILE, D_CUSTOMER_FILE, F_TRANSACTIONS_FILE};

// Robust file ops from util so binaries can import from crate root.
pub use crate::util::{create_with_backoff, open_with_backoff, remove_with_backoff, replace_file_atomic_backoff};
