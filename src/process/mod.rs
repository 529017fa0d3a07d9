// src/process/mod.rs
use anyhow::{Context, Result};
use arrow::{
    array::{ArrayRef, StringArray},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use csv::ReaderBuilder;
use std::{fs, io::Cursor, path::Path, sync::Arc};
use tracing::{debug, info, warn};

pub mod columns;
pub mod date_parser;
pub mod normalize;
pub mod utils;

use utils::{clean_str, decode_text};

/// Registry rows as read from the CSV, before they become a `RecordBatch`.
#[derive(Debug, Default)]
pub struct RawTable {
    /// Column names from the header line, cleaned.
    pub headers: Vec<String>,
    /// One entry per data line, padded/truncated to `headers.len()`.
    /// Empty cells are `None`.
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    /// Every column becomes a nullable `Utf8` column.
    pub fn into_batch(self) -> Result<RecordBatch> {
        let fields: Vec<Field> = self
            .headers
            .iter()
            .map(|h| Field::new(h, DataType::Utf8, true))
            .collect();
        let schema = Arc::new(Schema::new(fields));

        let columns: Vec<ArrayRef> = (0..self.headers.len())
            .map(|i| {
                let col: StringArray = self.rows.iter().map(|r| r[i].as_deref()).collect();
                Arc::new(col) as ArrayRef
            })
            .collect();

        if columns.is_empty() {
            return Ok(RecordBatch::new_empty(schema));
        }
        RecordBatch::try_new(schema, columns).context("building registry batch")
    }
}

/// Pick `;` when the header line has more of them than commas.
fn sniff_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or("");
    let semis = header.matches(';').count();
    let commas = header.matches(',').count();
    if semis > commas {
        b';'
    } else {
        b','
    }
}

/// Parse registry CSV text. Records with a different field count are kept:
/// short ones are padded with nulls, long ones truncated.
pub fn parse_registry_csv(text: &str) -> Result<RawTable> {
    let delimiter = sniff_delimiter(text);
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(Cursor::new(text.as_bytes()));

    let headers: Vec<String> = rdr
        .headers()
        .context("reading CSV header")?
        .iter()
        .map(clean_str)
        .collect();

    let mut rows = Vec::new();
    let mut ragged = 0usize;
    for (idx, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("CSV parse error at record {}", idx))?;
        if record.len() != headers.len() {
            ragged += 1;
        }
        let row: Vec<Option<String>> = (0..headers.len())
            .map(|i| {
                record
                    .get(i)
                    .map(clean_str)
                    .filter(|s| !s.is_empty())
            })
            .collect();
        rows.push(row);
    }
    if ragged > 0 {
        warn!(ragged, "records with unexpected field count");
    }
    debug!(
        delimiter = %(delimiter as char),
        columns = headers.len(),
        rows = rows.len(),
        "parsed registry CSV"
    );

    Ok(RawTable { headers, rows })
}

/// Read the cached registry file into a batch of `Utf8` columns.
#[tracing::instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
pub fn load_registry<P: AsRef<Path>>(path: P) -> Result<RecordBatch> {
    let bytes = fs::read(&path)
        .with_context(|| format!("Failed to read registry file: {:?}", path.as_ref()))?;
    let text = decode_text(&bytes);
    let batch = parse_registry_csv(&text)?.into_batch()?;
    info!(rows = batch.num_rows(), columns = batch.num_columns(), "loaded registry");
    Ok(batch)
}

/// True when `path` exists, parses, and holds at least one row.
pub fn has_usable_data<P: AsRef<Path>>(path: P) -> bool {
    if !path.as_ref().exists() {
        return false;
    }
    match load_registry(&path) {
        Ok(batch) => batch.num_rows() > 0,
        Err(e) => {
            warn!("existing registry file is unusable: {:#}", e);
            false
        }
    }
}
