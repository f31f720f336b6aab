//! Second pass: shrink the article and customer catalogs to the keys referenced by
//! retained transactions. Rows keep their catalog order and all of their columns;
//! keys missing from a catalog are simply not represented.

use crate::config::OutputFormat;
use crate::error::SampleError;
use crate::keys::RetainedKeys;
use crate::partition::StagedFile;
use crate::paths::{articles_file_name, CUS_OUT_FILE};
use crate::progress::{BatchObserver, Stage};
use crate::reader::{column_index, csv_error, open_csv, source_size};
use crate::sink::write_table_parquet;
use anyhow::Result;
use csv::StringRecord;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

pub const ARTICLE_KEY: &str = "article_id";
pub const CUSTOMER_KEY: &str = "customer_id";

fn article_id(path: &Path, record: &StringRecord, idx: usize) -> Result<i64> {
    let raw = record.get(idx).unwrap_or("").trim();
    raw.parse::<i64>().map_err(|e| {
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        SampleError::Parse { path: path.to_path_buf(), line, message: format!("article_id {raw:?}: {e}") }.into()
    })
}

/// Load the (small) article catalog in one pass and keep referenced rows.
/// Written in the transaction sample's format. Returns `(rows kept, output path)`.
pub fn filter_articles(
    path: &Path,
    out_dir: &Path,
    format: OutputFormat,
    keys: &RetainedKeys,
    read_buf: usize,
    write_buf: usize,
) -> Result<(u64, PathBuf)> {
    let (kept, staged) = stage_articles(path, out_dir, format, keys, read_buf, write_buf)?;
    Ok((kept, staged.promote()?))
}

/// `filter_articles` without the promotion: the output stays in `_staging`.
pub fn stage_articles(
    path: &Path,
    out_dir: &Path,
    format: OutputFormat,
    keys: &RetainedKeys,
    read_buf: usize,
    write_buf: usize,
) -> Result<(u64, StagedFile)> {
    let (mut rdr, _) = open_csv(path, read_buf)?;
    let headers = rdr.headers().map_err(|e| csv_error(path, e))?.clone();
    let idx = column_index(path, &headers, ARTICLE_KEY)?;

    let mut kept = Vec::new();
    let mut record = StringRecord::new();
    while rdr.read_record(&mut record).map_err(|e| csv_error(path, e))? {
        if keys.has_article(article_id(path, &record, idx)?) {
            kept.push(record.clone());
        }
    }

    let (staged, file) = StagedFile::create(out_dir, &articles_file_name(format))?;
    match format {
        OutputFormat::Csv => {
            let mut w = csv::Writer::from_writer(BufWriter::with_capacity(write_buf, file));
            w.write_record(&headers)?;
            for r in &kept {
                w.write_record(r)?;
            }
            w.flush()?;
        }
        OutputFormat::Parquet => write_table_parquet(file, &headers, &kept)?,
    }
    tracing::info!(kept = kept.len(), referenced = keys.article_count(), "articles filtered");
    Ok((kept.len() as u64, staged))
}

/// Stream the (large) customer catalog in `chunk_rows` batches, appending kept rows
/// to `customers_filtered.csv`. Always CSV; the header is written even if nothing is kept.
pub fn filter_customers(
    path: &Path,
    out_dir: &Path,
    keys: &RetainedKeys,
    chunk_rows: usize,
    read_buf: usize,
    write_buf: usize,
    observer: &mut dyn BatchObserver,
) -> Result<(u64, PathBuf)> {
    let (kept, staged) = stage_customers(path, out_dir, keys, chunk_rows, read_buf, write_buf, observer)?;
    Ok((kept, staged.promote()?))
}

/// `filter_customers` without the promotion: the output stays in `_staging`.
pub fn stage_customers(
    path: &Path,
    out_dir: &Path,
    keys: &RetainedKeys,
    chunk_rows: usize,
    read_buf: usize,
    write_buf: usize,
    observer: &mut dyn BatchObserver,
) -> Result<(u64, StagedFile)> {
    let (mut rdr, mut bytes) = open_csv(path, read_buf)?;
    let headers = rdr.headers().map_err(|e| csv_error(path, e))?.clone();
    let idx = column_index(path, &headers, CUSTOMER_KEY)?;

    let (staged, file) = StagedFile::create(out_dir, CUS_OUT_FILE)?;
    let mut w = csv::Writer::from_writer(BufWriter::with_capacity(write_buf, file));
    w.write_record(&headers)?;

    observer.on_stage_start(Stage::Customers, source_size(path));
    let chunk_rows = chunk_rows.max(1);
    let mut chunk: Vec<StringRecord> = Vec::with_capacity(chunk_rows.min(64 * 1024));
    let mut record = StringRecord::new();
    let mut kept = 0u64;
    loop {
        chunk.clear();
        while chunk.len() < chunk_rows && rdr.read_record(&mut record).map_err(|e| csv_error(path, e))? {
            chunk.push(record.clone());
        }
        if chunk.is_empty() {
            break;
        }
        for r in chunk.iter().filter(|r| keys.has_customer(r.get(idx).unwrap_or(""))) {
            w.write_record(r)?;
            kept += 1;
        }
        observer.on_batch(Stage::Customers, chunk.len() as u64, bytes.take_delta());
    }
    w.flush()?;
    drop(w);
    observer.on_stage_done(Stage::Customers);

    tracing::info!(kept, referenced = keys.customer_count(), "customers filtered");
    Ok((kept, staged))
}
