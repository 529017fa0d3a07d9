use crate::classify::{classify_by, date_bounds, filter_by_window, Cohort, DateWindow};
use crate::process::{columns::resolve_date_column, normalize::normalize_dates};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use tracing::info;

/// Both cohorts for one load of the registry, plus what the front end
/// needs to describe them.
#[derive(Debug, Clone)]
pub struct Report {
    /// Resolved publication-date column (may be absent from the data).
    pub date_column: String,
    /// Registry with the date column normalized.
    pub normalized: RecordBatch,
    pub bounds: Option<(NaiveDate, NaiveDate)>,
    pub window: Option<DateWindow>,
    pub renegociaciones: RecordBatch,
    pub liquidaciones_voluntarias: RecordBatch,
}

impl Report {
    pub fn cohort(&self, cohort: Cohort) -> &RecordBatch {
        match cohort {
            Cohort::Renegociaciones => &self.renegociaciones,
            Cohort::LiquidacionesVoluntarias => &self.liquidaciones_voluntarias,
        }
    }

    /// Cohorts in export order, paired with their tables.
    pub fn sheets(&self) -> Vec<(Cohort, &RecordBatch)> {
        Cohort::ALL.iter().map(|&c| (c, self.cohort(c))).collect()
    }
}

/// Normalize the date column once, then classify both cohorts.
///
/// Cohort predicates read the raw text columns, so a date column resolved
/// onto one of them cannot hide the rows from classification.
pub fn build_report(raw: &RecordBatch, window: Option<DateWindow>) -> Report {
    let schema = raw.schema();
    let date_column = resolve_date_column(schema.fields().iter().map(|f| f.name().as_str()));
    let normalized = normalize_dates(raw, &date_column);
    let bounds = date_bounds(&normalized, &date_column);

    let select = |cohort: Cohort| {
        let subset = classify_by(&normalized, raw, cohort);
        filter_by_window(&subset, &date_column, window.as_ref())
    };
    let renegociaciones = select(Cohort::Renegociaciones);
    let liquidaciones_voluntarias = select(Cohort::LiquidacionesVoluntarias);

    info!(
        date_column = %date_column,
        renegociaciones = renegociaciones.num_rows(),
        liquidaciones_voluntarias = liquidaciones_voluntarias.num_rows(),
        "report built"
    );

    Report {
        date_column,
        normalized,
        bounds,
        window,
        renegociaciones,
        liquidaciones_voluntarias,
    }
}
