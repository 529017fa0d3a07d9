use crate::process::date_parser;
use anyhow::{Context, Result};
use arrow::{
    array::{Array, ArrayRef, Date32Array, Date32Builder, StringArray},
    compute::cast,
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Convert `date_column` to `Date32`, returning a new batch.
///
/// - missing column: batch returned unchanged
/// - already `Date32`: unchanged, so calling this twice equals calling it once
/// - `Date64` / `Timestamp`: narrowed to calendar dates
/// - text: parsed value by value, failures become null
pub fn normalize_dates(batch: &RecordBatch, date_column: &str) -> RecordBatch {
    match try_normalize_dates(batch, date_column) {
        Ok(out) => out,
        Err(e) => {
            warn!(column = date_column, "date normalization failed: {:#}", e);
            batch.clone()
        }
    }
}

fn try_normalize_dates(batch: &RecordBatch, date_column: &str) -> Result<RecordBatch> {
    let schema = batch.schema();
    let Ok(idx) = schema.index_of(date_column) else {
        debug!(column = date_column, "date column not present; skipping");
        return Ok(batch.clone());
    };

    let arr = batch.column(idx);
    let dates: ArrayRef = match arr.data_type() {
        DataType::Date32 => return Ok(batch.clone()),
        DataType::Date64 | DataType::Timestamp(_, _) => {
            cast(arr, &DataType::Date32).context("casting temporal column to Date32")?
        }
        DataType::Utf8 => parse_strings(string_array(arr)?),
        _ => {
            let as_text = cast(arr, &DataType::Utf8)
                .with_context(|| format!("casting {} to text", date_column))?;
            parse_strings(string_array(&as_text)?)
        }
    };

    let parsed = dates.len() - dates.null_count();
    let unparsed = dates.null_count() - arr.null_count().min(dates.null_count());
    if unparsed > 0 {
        warn!(column = date_column, unparsed, "some dates could not be parsed");
    }
    debug!(column = date_column, parsed, "normalized date column");

    let fields: Vec<Field> = schema
        .fields()
        .iter()
        .enumerate()
        .map(|(i, f)| {
            if i == idx {
                Field::new(f.name(), DataType::Date32, true)
            } else {
                f.as_ref().clone()
            }
        })
        .collect();

    let mut columns = batch.columns().to_vec();
    columns[idx] = dates;

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
        .context("rebuilding batch with normalized dates")
}

fn string_array(arr: &ArrayRef) -> Result<&StringArray> {
    arr.as_any()
        .downcast_ref::<StringArray>()
        .context("expected a Utf8 column")
}

fn parse_strings(sarr: &StringArray) -> ArrayRef {
    let mut b = Date32Builder::with_capacity(sarr.len());
    for opt in sarr.iter() {
        b.append_option(
            opt.and_then(date_parser::parse_date)
                .map(date_parser::to_epoch_days),
        );
    }
    Arc::new(b.finish()) as ArrayRef
}

/// Borrow the normalized date column, if present and already `Date32`.
pub fn date_array<'a>(batch: &'a RecordBatch, date_column: &str) -> Option<&'a Date32Array> {
    batch
        .column_by_name(date_column)?
        .as_any()
        .downcast_ref::<Date32Array>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, LargeStringArray, TimestampMillisecondArray};
    use chrono::NaiveDate;

    const DAY_MS: i64 = 86_400_000;

    fn single_column(array: ArrayRef) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new(
            "Fecha Publicación",
            array.data_type().clone(),
            true,
        )]));
        RecordBatch::try_new(schema, vec![array]).unwrap()
    }

    fn jan_15() -> i32 {
        date_parser::to_epoch_days(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
    }

    fn batch(dates: Vec<Option<&str>>) -> RecordBatch {
        let n = dates.len();
        let schema = Arc::new(Schema::new(vec![
            Field::new("Rol", DataType::Utf8, true),
            Field::new("Fecha Publicación", DataType::Utf8, true),
        ]));
        let rol: Vec<Option<String>> = (0..n).map(|i| Some(format!("C-{}-2024", i))).collect();
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(rol)),
                Arc::new(StringArray::from(dates)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_parses_and_nulls_bad_values() {
        let raw = batch(vec![Some("15/01/2024"), Some("no es fecha"), None]);
        let out = normalize_dates(&raw, "Fecha Publicación");

        let field = out.schema().field_with_name("Fecha Publicación").unwrap().clone();
        assert_eq!(field.data_type(), &DataType::Date32);

        let dates = date_array(&out, "Fecha Publicación").unwrap();
        assert_eq!(dates.len(), 3);
        assert_eq!(
            dates.value(0),
            date_parser::to_epoch_days(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
        );
        assert!(dates.is_null(1));
        assert!(dates.is_null(2));

        // input untouched
        assert_eq!(raw.schema().field(1).data_type(), &DataType::Utf8);
    }

    #[test]
    fn test_idempotent() {
        let raw = batch(vec![Some("01/02/2024"), Some("basura")]);
        let once = normalize_dates(&raw, "Fecha Publicación");
        let twice = normalize_dates(&once, "Fecha Publicación");
        assert_eq!(once, twice);
    }

    #[test]
    fn test_missing_column_is_passthrough() {
        let raw = batch(vec![Some("01/02/2024")]);
        let out = normalize_dates(&raw, "Fecha Inexistente");
        assert_eq!(out, raw);
        assert!(date_array(&out, "Fecha Inexistente").is_none());
    }

    #[test]
    fn test_timestamps_narrow_to_calendar_dates() {
        let midnight = jan_15() as i64 * DAY_MS;
        let afternoon = midnight + 13 * 3_600_000;
        let raw = single_column(Arc::new(TimestampMillisecondArray::from(vec![
            Some(midnight),
            Some(afternoon),
            None,
        ])));

        let out = normalize_dates(&raw, "Fecha Publicación");
        assert_eq!(out.schema().field(0).data_type(), &DataType::Date32);
        let dates = date_array(&out, "Fecha Publicación").unwrap();
        assert_eq!(dates.value(0), jan_15());
        assert_eq!(dates.value(1), jan_15());
        assert!(dates.is_null(2));

        assert_eq!(normalize_dates(&out, "Fecha Publicación"), out);
    }

    #[test]
    fn test_other_types_are_parsed_as_text() {
        let raw = single_column(Arc::new(LargeStringArray::from(vec![
            Some("15/01/2024"),
            Some("2024-01-15 10:30:00"),
            Some("pendiente"),
        ])));

        let out = normalize_dates(&raw, "Fecha Publicación");
        let dates = date_array(&out, "Fecha Publicación").unwrap();
        assert_eq!(dates.value(0), jan_15());
        assert_eq!(dates.value(1), jan_15());
        assert!(dates.is_null(2));
        assert_eq!(normalize_dates(&out, "Fecha Publicación"), out);

        // integers render as digits no date format accepts
        let ints = single_column(Arc::new(Int64Array::from(vec![Some(20240115), None])));
        let out = normalize_dates(&ints, "Fecha Publicación");
        assert_eq!(out.schema().field(0).data_type(), &DataType::Date32);
        assert_eq!(out.column(0).null_count(), 2);
        assert_eq!(normalize_dates(&out, "Fecha Publicación"), out);
    }
}
