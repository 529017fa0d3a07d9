// src/classify/mod.rs
use crate::process::{
    columns::{resolve_procedure_column, resolve_publication_column},
    utils::{contains_ci, fold_text},
};
use anyhow::{bail, Context, Result};
use arrow::{
    array::{BooleanArray, StringArray},
    compute::{filter_record_batch, kernels::boolean},
    record_batch::RecordBatch,
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use tracing::{debug, warn};

pub mod report;
pub mod window;

pub use report::{build_report, Report};
pub use window::{date_bounds, filter_by_window, DateWindow};

/// The two reporting cohorts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cohort {
    Renegociaciones,
    LiquidacionesVoluntarias,
}

/// Substring predicates for one cohort. Every fragment in an `all_of` list
/// must be present; the exclusion wins over the inclusion.
#[derive(Debug)]
pub struct CohortDefinition {
    pub procedure_all_of: &'static [&'static str],
    pub publication_all_of: &'static [&'static str],
    pub publication_exclude: &'static str,
}

const RENEGOCIACIONES: CohortDefinition = CohortDefinition {
    procedure_all_of: &["renegociación"],
    publication_all_of: &["resolución de admisibilidad"],
    publication_exclude: "antecedentes resolución de admisibilidad",
};

const LIQUIDACIONES_VOLUNTARIAS: CohortDefinition = CohortDefinition {
    procedure_all_of: &["liquid", "volunt"],
    publication_all_of: &["reso", "liquida"],
    publication_exclude: "antecedentes de la resolución de liquidación",
};

impl Cohort {
    pub const ALL: [Cohort; 2] = [Cohort::Renegociaciones, Cohort::LiquidacionesVoluntarias];

    pub fn definition(&self) -> &'static CohortDefinition {
        match self {
            Cohort::Renegociaciones => &RENEGOCIACIONES,
            Cohort::LiquidacionesVoluntarias => &LIQUIDACIONES_VOLUNTARIAS,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Cohort::Renegociaciones => "Renegociaciones",
            Cohort::LiquidacionesVoluntarias => "Liquidaciones Voluntarias",
        }
    }

    /// Worksheet / file stem used on export.
    pub fn sheet_name(&self) -> &'static str {
        match self {
            Cohort::Renegociaciones => "Renegociaciones",
            Cohort::LiquidacionesVoluntarias => "Liquidaciones_Voluntarias",
        }
    }
}

impl FromStr for Cohort {
    type Err = String;

    /// Accepts the display name, the sheet name, or a kebab-case key, with
    /// or without accents.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = fold_text(s).chars().filter(|c| c.is_alphanumeric()).collect();
        match key.as_str() {
            "renegociaciones" | "renegociacion" => Ok(Cohort::Renegociaciones),
            "liquidacionesvoluntarias" | "liquidacionvoluntaria" | "liquidaciones" => {
                Ok(Cohort::LiquidacionesVoluntarias)
            }
            _ => Err(format!(
                "unknown cohort `{}` (expected `renegociaciones` or `liquidaciones-voluntarias`)",
                s
            )),
        }
    }
}

impl fmt::Display for Cohort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CohortDefinition {
    fn procedure_matches(&self, text: Option<&str>) -> bool {
        self.procedure_all_of.iter().all(|n| contains_ci(text, n))
    }

    fn publication_matches(&self, text: Option<&str>) -> bool {
        self.publication_all_of.iter().all(|n| contains_ci(text, n))
    }

    fn publication_excluded(&self, text: Option<&str>) -> bool {
        contains_ci(text, self.publication_exclude)
    }
}

/// Rows of `batch` that belong to `cohort`.
///
/// A missing procedure or publication column yields an empty batch with the
/// input schema. So does any internal failure, which is logged.
pub fn classify(batch: &RecordBatch, cohort: Cohort) -> RecordBatch {
    classify_by(batch, batch, cohort)
}

/// Like [`classify`], but the predicates read the text columns of `text`
/// while the selected rows are taken from `rows`. Both batches must be the
/// same table row for row; `rows` is typically `text` after date
/// normalization.
pub fn classify_by(rows: &RecordBatch, text: &RecordBatch, cohort: Cohort) -> RecordBatch {
    match try_classify(rows, text, cohort) {
        Ok(Some(out)) => out,
        Ok(None) => RecordBatch::new_empty(rows.schema()),
        Err(e) => {
            warn!(%cohort, "classification failed: {:#}", e);
            RecordBatch::new_empty(rows.schema())
        }
    }
}

fn text_column<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a StringArray> {
    batch
        .column_by_name(name)?
        .as_any()
        .downcast_ref::<StringArray>()
}

fn try_classify(
    rows: &RecordBatch,
    text: &RecordBatch,
    cohort: Cohort,
) -> Result<Option<RecordBatch>> {
    if rows.num_rows() != text.num_rows() {
        bail!(
            "row count mismatch: {} rows vs {} text rows",
            rows.num_rows(),
            text.num_rows()
        );
    }

    let schema = text.schema();
    let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
    let procedure_col = resolve_procedure_column(names.iter().copied());
    let publication_col = resolve_publication_column(names.iter().copied());

    let (Some(procedure), Some(publication)) = (
        text_column(text, &procedure_col),
        text_column(text, &publication_col),
    ) else {
        warn!(
            %cohort,
            procedure = %procedure_col,
            publication = %publication_col,
            "required text columns missing; returning empty result"
        );
        return Ok(None);
    };

    let def = cohort.definition();
    let procedure_mask: BooleanArray = procedure
        .iter()
        .map(|v| Some(def.procedure_matches(v)))
        .collect();
    let publication_mask: BooleanArray = publication
        .iter()
        .map(|v| Some(def.publication_matches(v)))
        .collect();
    let exclude_mask: BooleanArray = publication
        .iter()
        .map(|v| Some(def.publication_excluded(v)))
        .collect();

    let include = boolean::and(&procedure_mask, &publication_mask)
        .context("combining include masks")?;
    let keep = boolean::and(&include, &boolean::not(&exclude_mask)?)
        .context("applying exclusion mask")?;

    let out = filter_record_batch(rows, &keep).context("filtering registry rows")?;
    debug!(%cohort, kept = out.num_rows(), of = rows.num_rows(), "classified");
    Ok(Some(out))
}
