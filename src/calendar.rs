//! Calendar dimension: one row per day, keyed by `YYYYMMDD`.

use crate::date::{date_key, format_date, iter_days};
use crate::error::SampleError;
use crate::util::create_with_backoff;
use anyhow::{Context, Result};
use serde::Serialize;
use std::io::BufWriter;
use std::path::Path;
use time::macros::date;
use time::Date;

pub const DEFAULT_CALENDAR_START: Date = date!(2018 - 09 - 20);
pub const DEFAULT_CALENDAR_END: Date = date!(2020 - 09 - 22);

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CalendarRow {
    pub datekey: i32,
    pub fulldate: String,
    pub year: i32,
    pub month: u8,
    pub monthname: String,
    pub week: u8, // ISO week number
    pub day: u8,
}

impl CalendarRow {
    pub fn of(d: Date) -> Self {
        Self {
            datekey: date_key(d),
            fulldate: format_date(d),
            year: d.year(),
            month: d.month() as u8,
            monthname: d.month().to_string(),
            week: d.iso_week(),
            day: d.day(),
        }
    }
}

/// Rows for every day in `start..=end`.
pub fn calendar_rows(start: Date, end: Date) -> Result<Vec<CalendarRow>, SampleError> {
    if start > end {
        return Err(SampleError::config(format!(
            "calendar start {} is after end {}",
            format_date(start),
            format_date(end)
        )));
    }
    Ok(iter_days(start, end).map(CalendarRow::of).collect())
}

/// Write the calendar CSV (with header) to `out`. Returns the number of days written.
pub fn write_calendar(out: &Path, start: Date, end: Date) -> Result<u64> {
    let rows = calendar_rows(start, end)?;
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let file = create_with_backoff(out, 16, 50).with_context(|| format!("create {}", out.display()))?;
    let mut w = csv::Writer::from_writer(BufWriter::new(file));
    for row in &rows {
        w.serialize(row)?;
    }
    w.flush()?;
    tracing::info!(days = rows.len(), out = %out.display(), "calendar written");
    Ok(rows.len() as u64)
}
