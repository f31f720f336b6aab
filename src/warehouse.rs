//! Star-schema staging of a finished sample: surrogate-keyed dimensions plus a fact
//! table, written as CSV files ready for a bulk loader.
//!
//! Dimensions are built before facts. A fact whose article, customer or channel
//! does not resolve to a dimension row is dropped and counted.

use crate::date::date_key;
use crate::error::SampleError;
use crate::paths::{discover_sample, SampleFiles};
use crate::reader::{column_index, csv_error, open_csv, TransactionBatches};
use crate::record::Transaction;
use crate::sink::days_to_date;
use crate::util::{create_with_backoff, open_with_backoff};
use ahash::{AHashMap, AHashSet};
use anyhow::{anyhow, Context, Result};
use arrow::array::{Array, Date32Array, Float64Array, Int64Array, Int8Array, StringArray};
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use csv::StringRecord;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::Serialize;
use std::fs;
use std::hash::Hash;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

pub const D_CHANNEL_FILE: &str = "d_channel.csv";
pub const D_ARTICLE_FILE: &str = "d_article.csv";
pub const D_CUSTOMER_FILE: &str = "d_customer.csv";
pub const F_TRANSACTIONS_FILE: &str = "f_transactions.csv";

/// `(channel_key, sales_channel_id, channel_name)`
pub const CHANNELS: [(i64, i8, &str); 2] = [(1, 1, "Store"), (2, 2, "Online")];

const READ_BATCH_ROWS: usize = 64 * 1024;
const IO_BUF: usize = 256 * 1024;

#[derive(Clone, Debug, Default, Serialize)]
pub struct StarReport {
    pub channels: u64,
    pub articles: u64,
    pub customers: u64,
    pub facts: u64,
    /// Transactions whose natural keys did not all resolve.
    pub dropped_facts: u64,
    pub tables: Vec<PathBuf>,
}

/// A loaded catalog: header plus string cells.
struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

fn is_parquet(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("parquet"))
}

fn load_table_csv(path: &Path) -> Result<Table> {
    let (mut rdr, _) = open_csv(path, IO_BUF)?;
    let headers = rdr.headers().map_err(|e| csv_error(path, e))?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    let mut record = StringRecord::new();
    while rdr.read_record(&mut record).map_err(|e| csv_error(path, e))? {
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(Table { headers, rows })
}

fn load_table_parquet(path: &Path) -> Result<Table> {
    let file = open_with_backoff(path, 16, 50).with_context(|| format!("open parquet {}", path.display()))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?.with_batch_size(READ_BATCH_ROWS);
    let headers = builder.schema().fields().iter().map(|f| f.name().clone()).collect();
    let mut rows = Vec::new();
    for batch in builder.build()? {
        let batch = batch?;
        for i in 0..batch.num_rows() {
            let row = batch
                .columns()
                .iter()
                .map(|col| if col.is_null(i) { Ok(String::new()) } else { array_value_to_string(col, i) })
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(row);
        }
    }
    Ok(Table { headers, rows })
}

fn load_table(path: &Path) -> Result<Table> {
    if is_parquet(path) {
        load_table_parquet(path)
    } else {
        load_table_csv(path)
    }
}

/// Distinct catalog rows with surrogate keys `1..=n` in first-seen order, and the
/// natural key → surrogate key map (first key wins).
struct Dimension<K> {
    headers: Vec<String>,
    rows: Vec<(u64, Vec<String>)>,
    keys: AHashMap<K, u64>,
}

fn build_dimension<K, F>(path: &Path, table: Table, key_column: &str, natural: F) -> Result<Dimension<K>>
where
    K: Hash + Eq,
    F: Fn(&str) -> Option<K>,
{
    let header_record = StringRecord::from(table.headers.clone());
    let idx = column_index(path, &header_record, key_column)?;

    let mut seen: AHashSet<Vec<String>> = AHashSet::with_capacity(table.rows.len());
    let mut rows = Vec::new();
    let mut keys = AHashMap::new();
    for (n, row) in table.rows.into_iter().enumerate() {
        let raw = row.get(idx).map(|s| s.trim()).unwrap_or("");
        let Some(k) = natural(raw) else {
            return Err(SampleError::Parse {
                path: path.to_path_buf(),
                line: n as u64 + 2,
                message: format!("{key_column} {raw:?} is not a valid key"),
            }
            .into());
        };
        if !seen.insert(row.clone()) {
            continue;
        }
        let surrogate = rows.len() as u64 + 1;
        keys.entry(k).or_insert(surrogate);
        rows.push((surrogate, row));
    }
    Ok(Dimension { headers: table.headers, rows, keys })
}

fn write_dimension<K>(out: &Path, key_name: &str, dim: &Dimension<K>) -> Result<u64> {
    let file = create_with_backoff(out, 16, 50).with_context(|| format!("create {}", out.display()))?;
    let mut w = csv::Writer::from_writer(BufWriter::with_capacity(IO_BUF, file));
    w.write_record(std::iter::once(key_name).chain(dim.headers.iter().map(String::as_str)))?;
    for (key, row) in &dim.rows {
        let key = key.to_string();
        w.write_record(std::iter::once(key.as_str()).chain(row.iter().map(String::as_str)))?;
    }
    w.flush()?;
    Ok(dim.rows.len() as u64)
}

fn write_channels(out: &Path) -> Result<u64> {
    let file = create_with_backoff(out, 16, 50).with_context(|| format!("create {}", out.display()))?;
    let mut w = csv::Writer::from_writer(BufWriter::new(file));
    w.write_record(["channel_key", "sales_channel_id", "channel_name"])?;
    for (key, id, name) in CHANNELS {
        w.write_record([key.to_string(), id.to_string(), name.to_string()])?;
    }
    w.flush()?;
    Ok(CHANNELS.len() as u64)
}

fn channel_key(sales_channel_id: i8) -> Option<i64> {
    CHANNELS.iter().find(|(_, id, _)| *id == sales_channel_id).map(|(key, _, _)| *key)
}

#[derive(Debug, Serialize)]
struct FactRow {
    date_key: i32,
    article_key: u64,
    customer_key: u64,
    channel_key: i64,
    price: f64,
    quantity: u32,
}

fn get_array<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    let column = batch
        .schema()
        .column_with_name(name)
        .ok_or_else(|| anyhow!("missing column {name}"))?
        .0;
    batch
        .column(column)
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| anyhow!("column {name} has unexpected type"))
}

/// Decode one batch of a transaction sample written by the parquet sink.
/// Rows with a null in any column are skipped; the count of skipped rows is returned.
fn parquet_transactions(path: &Path, batch: &RecordBatch, out: &mut Vec<Transaction>) -> Result<u64> {
    let ctx = || format!("decode {}", path.display());
    let t_dat = get_array::<Date32Array>(batch, "t_dat").with_context(ctx)?;
    let customer = get_array::<StringArray>(batch, "customer_id").with_context(ctx)?;
    let article = get_array::<Int64Array>(batch, "article_id").with_context(ctx)?;
    let price = get_array::<Float64Array>(batch, "price").with_context(ctx)?;
    let channel = get_array::<Int8Array>(batch, "sales_channel_id").with_context(ctx)?;

    let mut skipped = 0;
    for i in 0..batch.num_rows() {
        if t_dat.is_null(i) || customer.is_null(i) || article.is_null(i) || price.is_null(i) || channel.is_null(i) {
            skipped += 1;
            continue;
        }
        let Some(date) = days_to_date(t_dat.value(i)) else {
            skipped += 1;
            continue;
        };
        out.push(Transaction {
            t_dat: date,
            customer_id: customer.value(i).to_string(),
            article_id: article.value(i),
            price: price.value(i),
            sales_channel_id: channel.value(i),
        });
    }
    Ok(skipped)
}

/// Feed every transaction of one sample file to `f`, batch by batch.
/// Returns the number of undecodable rows (parquet nulls).
fn for_each_batch(path: &Path, mut f: impl FnMut(&[Transaction]) -> Result<()>) -> Result<u64> {
    if !is_parquet(path) {
        for batch in TransactionBatches::open(path, READ_BATCH_ROWS, IO_BUF)? {
            f(&batch?)?;
        }
        return Ok(0);
    }
    let file = open_with_backoff(path, 16, 50).with_context(|| format!("open parquet {}", path.display()))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.with_batch_size(READ_BATCH_ROWS).build()?;
    let mut skipped = 0;
    let mut rows = Vec::with_capacity(READ_BATCH_ROWS);
    for batch in reader {
        rows.clear();
        skipped += parquet_transactions(path, &batch?, &mut rows)?;
        f(&rows)?;
    }
    Ok(skipped)
}

/// Build the star-schema tables for the sample in `sample_dir` into `out_dir`.
pub fn build_star(sample_dir: &Path, out_dir: &Path) -> Result<StarReport> {
    crate::util::init_tracing_once();
    let SampleFiles { transactions, articles, customers } = discover_sample(sample_dir)?;
    fs::create_dir_all(out_dir).with_context(|| format!("create {}", out_dir.display()))?;
    let mut report = StarReport::default();

    let channel_path = out_dir.join(D_CHANNEL_FILE);
    report.channels = write_channels(&channel_path)?;
    report.tables.push(channel_path);

    let article_dim = build_dimension(&articles, load_table(&articles)?, "article_id", |s| s.parse::<i64>().ok())?;
    let article_path = out_dir.join(D_ARTICLE_FILE);
    report.articles = write_dimension(&article_path, "article_key", &article_dim)?;
    report.tables.push(article_path);

    let customer_dim = build_dimension(&customers, load_table(&customers)?, "customer_id", |s| {
        Some(s.to_string()).filter(|s| !s.is_empty())
    })?;
    let customer_path = out_dir.join(D_CUSTOMER_FILE);
    report.customers = write_dimension(&customer_path, "customer_key", &customer_dim)?;
    report.tables.push(customer_path);
    tracing::info!(articles = report.articles, customers = report.customers, "dimensions staged");

    let fact_path = out_dir.join(F_TRANSACTIONS_FILE);
    let file = create_with_backoff(&fact_path, 16, 50).with_context(|| format!("create {}", fact_path.display()))?;
    let mut w = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(BufWriter::with_capacity(IO_BUF, file));
    w.write_record(["date_key", "article_key", "customer_key", "channel_key", "price", "quantity"])?;
    let (mut facts, mut dropped) = (0u64, 0u64);
    for path in &transactions {
        let skipped = for_each_batch(path, |rows| {
            for t in rows {
                let resolved = (
                    article_dim.keys.get(&t.article_id),
                    customer_dim.keys.get(t.customer_id.as_str()),
                    channel_key(t.sales_channel_id),
                );
                let (Some(&article_key), Some(&customer_key), Some(channel_key)) = resolved else {
                    dropped += 1;
                    continue;
                };
                w.serialize(FactRow {
                    date_key: date_key(t.t_dat),
                    article_key,
                    customer_key,
                    channel_key,
                    price: t.price,
                    quantity: 1,
                })?;
                facts += 1;
            }
            Ok(())
        })
        .with_context(|| format!("staging facts from {}", path.display()))?;
        dropped += skipped;
        tracing::debug!(file = %path.display(), "facts loaded");
    }
    w.flush()?;
    drop(w);

    report.facts = facts;
    report.dropped_facts = dropped;
    report.tables.push(fact_path);
    if dropped > 0 {
        tracing::warn!(dropped, "transactions dropped: unresolved article, customer or channel");
    }
    tracing::info!(facts, "fact table staged");
    Ok(report)
}
