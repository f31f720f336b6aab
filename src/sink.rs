//! Row sinks for the transaction sample (CSV or Parquet) and the Parquet
//! encoding of in-memory catalog tables.

use crate::record::{Transaction, TXN_COLUMNS};
use anyhow::{Context, Result};
use arrow::array::{
    ArrayRef, Date32Array, Float64Array, Float64Builder, Int64Array, Int64Builder, Int8Array, StringArray, StringBuilder,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use csv::StringRecord;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Arc;
use time::Date;

/// Julian day number of 1970-01-01; Arrow `Date32` counts days from there.
const EPOCH_JULIAN_DAY: i32 = 2_440_588;

pub fn date_to_days(date: Date) -> i32 {
    date.to_julian_day() - EPOCH_JULIAN_DAY
}

pub fn days_to_date(days: i32) -> Option<Date> {
    Date::from_julian_day(days.checked_add(EPOCH_JULIAN_DAY)?).ok()
}

fn writer_props() -> WriterProperties {
    WriterProperties::builder().set_compression(Compression::SNAPPY).build()
}

/// Destination for retained transactions. Each call appends; `finish` flushes and closes.
pub trait RowSink {
    fn write_rows(&mut self, rows: &[&Transaction]) -> Result<()>;

    fn finish(self: Box<Self>) -> Result<()>;
}

pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
}

impl CsvSink<BufWriter<File>> {
    /// The header goes out on creation, so it is written exactly once per file.
    pub fn create(file: File, write_buf: usize) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(BufWriter::with_capacity(write_buf, file));
        writer.write_record(TXN_COLUMNS)?;
        Ok(Self { writer })
    }
}

impl<W: Write> RowSink for CsvSink<W> {
    fn write_rows(&mut self, rows: &[&Transaction]) -> Result<()> {
        for row in rows {
            self.writer.serialize(row)?;
        }
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

pub fn transactions_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("t_dat", DataType::Date32, false),
        Field::new("customer_id", DataType::Utf8, false),
        Field::new("article_id", DataType::Int64, false),
        Field::new("price", DataType::Float64, false),
        Field::new("sales_channel_id", DataType::Int8, false),
    ]))
}

pub fn transactions_batch(schema: &SchemaRef, rows: &[&Transaction]) -> Result<RecordBatch> {
    let arrays: Vec<ArrayRef> = vec![
        Arc::new(Date32Array::from(rows.iter().map(|r| date_to_days(r.t_dat)).collect::<Vec<_>>())),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.customer_id.as_str()))),
        Arc::new(Int64Array::from(rows.iter().map(|r| r.article_id).collect::<Vec<_>>())),
        Arc::new(Float64Array::from(rows.iter().map(|r| r.price).collect::<Vec<_>>())),
        Arc::new(Int8Array::from(rows.iter().map(|r| r.sales_channel_id).collect::<Vec<_>>())),
    ];
    Ok(RecordBatch::try_new(Arc::clone(schema), arrays)?)
}

/// One Parquet file kept open for the run; the writer cuts row groups by size.
pub struct ParquetSink {
    schema: SchemaRef,
    writer: ArrowWriter<File>,
}

impl ParquetSink {
    pub fn create(file: File) -> Result<Self> {
        let schema = transactions_schema();
        let writer = ArrowWriter::try_new(file, Arc::clone(&schema), Some(writer_props()))?;
        Ok(Self { schema, writer })
    }
}

impl RowSink for ParquetSink {
    fn write_rows(&mut self, rows: &[&Transaction]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let batch = transactions_batch(&self.schema, rows)?;
        self.writer.write(&batch)?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        let Self { writer, .. } = *self;
        writer.close().context("close parquet writer")?;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ColumnKind {
    Int,
    Float,
    Text,
}

/// Narrowest type that fits every non-empty cell of column `idx`.
fn infer_column(rows: &[StringRecord], idx: usize) -> ColumnKind {
    let mut kind = ColumnKind::Int;
    for value in rows.iter().filter_map(|r| cell(r, idx)) {
        if kind == ColumnKind::Int && value.parse::<i64>().is_err() {
            kind = ColumnKind::Float;
        }
        if kind == ColumnKind::Float && value.parse::<f64>().is_err() {
            return ColumnKind::Text;
        }
    }
    kind
}

fn cell(r: &StringRecord, i: usize) -> Option<&str> {
    r.get(i).map(str::trim).filter(|c| !c.is_empty())
}

/// Encode a loaded table as Parquet, inferring Int64 / Float64 / Utf8 per column.
/// Empty cells become nulls.
pub fn write_table_parquet(file: File, headers: &StringRecord, rows: &[StringRecord]) -> Result<()> {
    let kinds: Vec<ColumnKind> = (0..headers.len()).map(|i| infer_column(rows, i)).collect();
    let fields: Vec<Field> = headers
        .iter()
        .zip(&kinds)
        .map(|(name, kind)| {
            let dt = match kind {
                ColumnKind::Int => DataType::Int64,
                ColumnKind::Float => DataType::Float64,
                ColumnKind::Text => DataType::Utf8,
            };
            Field::new(name, dt, true)
        })
        .collect();
    let schema: SchemaRef = Arc::new(Schema::new(fields));

    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(kinds.len());
    for (i, kind) in kinds.iter().enumerate() {
        let array: ArrayRef = match kind {
            ColumnKind::Int => {
                let mut b = Int64Builder::with_capacity(rows.len());
                for r in rows {
                    b.append_option(cell(r, i).and_then(|c| c.parse().ok()));
                }
                Arc::new(b.finish())
            }
            ColumnKind::Float => {
                let mut b = Float64Builder::with_capacity(rows.len());
                for r in rows {
                    b.append_option(cell(r, i).and_then(|c| c.parse().ok()));
                }
                Arc::new(b.finish())
            }
            ColumnKind::Text => {
                let mut b = StringBuilder::with_capacity(rows.len(), rows.len() * 16);
                for r in rows {
                    b.append_option(cell(r, i));
                }
                Arc::new(b.finish())
            }
        };
        arrays.push(array);
    }

    let mut writer = ArrowWriter::try_new(file, Arc::clone(&schema), Some(writer_props()))?;
    if !rows.is_empty() {
        writer.write(&RecordBatch::try_new(schema, arrays)?)?;
    }
    writer.close()?;
    Ok(())
}
