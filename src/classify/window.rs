use crate::process::{date_parser, normalize::date_array};
use anyhow::{Context, Result};
use arrow::{array::BooleanArray, compute::filter_record_batch, record_batch::RecordBatch};
use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;
use tracing::{debug, warn};

/// Inclusive `[start, end]` range of publication dates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// First of `today`'s month minus 14 days, through `today`.
    pub fn default_for(today: NaiveDate) -> Self {
        let month_start = today.with_day(1).unwrap_or(today);
        Self {
            start: month_start - Duration::days(14),
            end: today,
        }
    }

    /// Default window pulled inside the data's own date range. Falls back to
    /// the plain default when clamping would leave nothing to select.
    pub fn default_within(today: NaiveDate, bounds: Option<(NaiveDate, NaiveDate)>) -> Self {
        let default = Self::default_for(today);
        let Some((min, max)) = bounds else {
            return default;
        };
        let clamped = Self {
            start: default.start.max(min),
            end: default.end.min(max),
        };
        if clamped.start <= clamped.end {
            clamped
        } else {
            default
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Keep rows whose normalized date lies inside `window`. Without a window the
/// batch is returned as is; with one, rows lacking a usable date are dropped.
pub fn filter_by_window(
    batch: &RecordBatch,
    date_column: &str,
    window: Option<&DateWindow>,
) -> RecordBatch {
    let Some(window) = window else {
        return batch.clone();
    };
    match try_filter(batch, date_column, window) {
        Ok(out) => out,
        Err(e) => {
            warn!(column = date_column, "date filter failed: {:#}", e);
            RecordBatch::new_empty(batch.schema())
        }
    }
}

fn try_filter(batch: &RecordBatch, date_column: &str, window: &DateWindow) -> Result<RecordBatch> {
    let mask: BooleanArray = match date_array(batch, date_column) {
        Some(dates) => dates
            .iter()
            .map(|d| Some(d.is_some_and(|d| window.contains(date_parser::from_epoch_days(d)))))
            .collect(),
        None => {
            if batch.num_rows() > 0 {
                warn!(
                    column = date_column,
                    "no normalized date column; window excludes every row"
                );
            }
            BooleanArray::from(vec![false; batch.num_rows()])
        }
    };

    let out = filter_record_batch(batch, &mask).context("filtering by date window")?;
    debug!(
        start = %window.start,
        end = %window.end,
        kept = out.num_rows(),
        of = batch.num_rows(),
        "applied date window"
    );
    Ok(out)
}

/// Earliest and latest non-null normalized date.
pub fn date_bounds(batch: &RecordBatch, date_column: &str) -> Option<(NaiveDate, NaiveDate)> {
    let dates = date_array(batch, date_column)?;
    let min = dates.iter().flatten().min()?;
    let max = dates.iter().flatten().max()?;
    Some((date_parser::from_epoch_days(min), date_parser::from_epoch_days(max)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{classify, tests::registry_batch, Cohort};
    use crate::process::normalize::normalize_dates;

    const DATE_COL: &str = "Fecha Publicación";

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn january() -> DateWindow {
        DateWindow::new(ymd(2024, 1, 1), ymd(2024, 1, 31))
    }

    #[test]
    fn test_window_excludes_row_after_end() {
        let raw = registry_batch(&[
            (Some("Renegociación"), Some("Resolución de Admisibilidad"), Some("31/01/2024")),
            (Some("Renegociación"), Some("Resolución de Admisibilidad"), Some("01/02/2024")),
            (Some("Renegociación"), Some("Resolución de Admisibilidad"), Some("01/01/2024")),
        ]);
        let normalized = normalize_dates(&raw, DATE_COL);
        let cohort = classify(&normalized, Cohort::Renegociaciones);
        assert_eq!(cohort.num_rows(), 3);

        let out = filter_by_window(&cohort, DATE_COL, Some(&january()));
        assert_eq!(out.num_rows(), 2);
    }

    #[test]
    fn test_null_dates_only_dropped_when_window_active() {
        let raw = registry_batch(&[
            (Some("Renegociación"), Some("Resolución de Admisibilidad"), Some("??")),
            (Some("Renegociación"), Some("Resolución de Admisibilidad"), None),
        ]);
        let normalized = normalize_dates(&raw, DATE_COL);
        assert_eq!(filter_by_window(&normalized, DATE_COL, None).num_rows(), 2);
        assert_eq!(
            filter_by_window(&normalized, DATE_COL, Some(&january())).num_rows(),
            0
        );
    }

    #[test]
    fn test_missing_or_unnormalized_column_with_window() {
        let raw = registry_batch(&[(Some("x"), Some("y"), Some("15/01/2024"))]);
        // still Utf8: not usable for comparisons
        assert_eq!(filter_by_window(&raw, DATE_COL, Some(&january())).num_rows(), 0);
        assert_eq!(filter_by_window(&raw, "Otra", Some(&january())).num_rows(), 0);
        assert_eq!(filter_by_window(&raw, "Otra", None).num_rows(), 1);
    }

    #[test]
    fn test_inverted_window_selects_nothing() {
        let raw = registry_batch(&[(Some("x"), Some("y"), Some("15/01/2024"))]);
        let normalized = normalize_dates(&raw, DATE_COL);
        let inverted = DateWindow::new(ymd(2024, 1, 31), ymd(2024, 1, 1));
        assert_eq!(filter_by_window(&normalized, DATE_COL, Some(&inverted)).num_rows(), 0);
    }

    #[test]
    fn test_default_window() {
        let w = DateWindow::default_for(ymd(2024, 3, 20));
        assert_eq!(w, DateWindow::new(ymd(2024, 2, 16), ymd(2024, 3, 20)));

        let w = DateWindow::default_for(ymd(2024, 1, 5));
        assert_eq!(w.start, ymd(2023, 12, 18));
    }

    #[test]
    fn test_default_within_bounds() {
        let today = ymd(2024, 3, 20);
        let w = DateWindow::default_within(today, Some((ymd(2024, 3, 1), ymd(2024, 3, 10))));
        assert_eq!(w, DateWindow::new(ymd(2024, 3, 1), ymd(2024, 3, 10)));

        // data entirely older than the default window
        let w = DateWindow::default_within(today, Some((ymd(2020, 1, 1), ymd(2020, 2, 1))));
        assert_eq!(w, DateWindow::default_for(today));
    }

    #[test]
    fn test_date_bounds() {
        let raw = registry_batch(&[
            (None, None, Some("10/01/2024")),
            (None, None, None),
            (None, None, Some("02/01/2024")),
        ]);
        let normalized = normalize_dates(&raw, DATE_COL);
        assert_eq!(
            date_bounds(&normalized, DATE_COL),
            Some((ymd(2024, 1, 2), ymd(2024, 1, 10)))
        );
        assert_eq!(date_bounds(&raw, DATE_COL), None);
    }
}
