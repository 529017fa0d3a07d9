// src/export/mod.rs
use crate::process::{date_parser, normalize::date_array};
use anyhow::{Context, Result};
use arrow::{
    array::{Array, ArrayRef, Date32Array, StringArray},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
    util::{display::array_value_to_string, pretty::pretty_format_batches},
};
use chrono::{DateTime, TimeZone};
use std::{io::Write, sync::Arc};

pub mod xlsx;

pub use xlsx::write_workbook;

/// Text of one cell: dates as `YYYY-MM-DD`, nulls as `None`.
pub(crate) fn cell_text(arr: &ArrayRef, row: usize) -> Option<String> {
    if arr.is_null(row) {
        return None;
    }
    if let Some(s) = arr.as_any().downcast_ref::<StringArray>() {
        return Some(s.value(row).to_string());
    }
    if let Some(d) = arr.as_any().downcast_ref::<Date32Array>() {
        return Some(date_parser::from_epoch_days(d.value(row)).format("%Y-%m-%d").to_string());
    }
    array_value_to_string(arr, row).ok()
}

/// Write `batch` as CSV (header row first).
pub fn write_csv<W: Write>(batch: &RecordBatch, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    let schema = batch.schema();
    wtr.write_record(schema.fields().iter().map(|f| f.name().as_str()))
        .context("writing CSV header")?;

    for row in 0..batch.num_rows() {
        let record: Vec<String> = batch
            .columns()
            .iter()
            .map(|arr| cell_text(arr, row).unwrap_or_default())
            .collect();
        wtr.write_record(&record)
            .with_context(|| format!("writing CSV row {}", row))?;
    }
    wtr.flush().context("flushing CSV writer")?;
    Ok(())
}

/// Replace the `Date32` column with `dd/mm/YYYY` text for on-screen use.
pub fn format_dates_for_display(batch: &RecordBatch, date_column: &str) -> Result<RecordBatch> {
    let Some(dates) = date_array(batch, date_column) else {
        return Ok(batch.clone());
    };
    let schema = batch.schema();
    let idx = schema.index_of(date_column)?;

    let text: StringArray = dates
        .iter()
        .map(|d| d.map(|d| date_parser::from_epoch_days(d).format("%d/%m/%Y").to_string()))
        .collect();

    let fields: Vec<Field> = schema
        .fields()
        .iter()
        .enumerate()
        .map(|(i, f)| {
            if i == idx {
                Field::new(f.name(), DataType::Utf8, true)
            } else {
                f.as_ref().clone()
            }
        })
        .collect();
    let mut columns = batch.columns().to_vec();
    columns[idx] = Arc::new(text) as ArrayRef;

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
        .context("building display batch")
}

/// Render up to `limit` rows as a text table.
pub fn display_table(
    batch: &RecordBatch,
    date_column: &str,
    limit: Option<usize>,
) -> Result<String> {
    let shown = match limit {
        Some(n) if n < batch.num_rows() => batch.slice(0, n),
        _ => batch.clone(),
    };
    let shown = format_dates_for_display(&shown, date_column)?;
    let table = pretty_format_batches(&[shown]).context("formatting table")?;
    Ok(table.to_string())
}

/// `boletin_summary_report_YYYYmmdd_HHMMSS.xlsx`
pub fn default_report_name<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("boletin_summary_report_{}.xlsx", now.format("%Y%m%d_%H%M%S"))
}
