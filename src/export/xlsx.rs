//! Minimal Office Open XML workbook writer: one worksheet per cohort,
//! written directly as zipped SpreadsheetML parts.

use crate::export::cell_text;
use anyhow::{Context, Result};
use arrow::{
    array::{Array, Date32Array},
    record_batch::RecordBatch,
};
use std::{
    fs,
    io::{Cursor, Write},
    path::Path,
};
use tracing::{info, warn};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

/// Days between Excel's day zero (1899-12-30) and 1970-01-01.
const EXCEL_EPOCH_OFFSET: i32 = 25_569;
/// Style index of the `dd/mm/yyyy` cell format in `styles.xml`.
const DATE_STYLE: usize = 1;
const HEADER_STYLE: usize = 2;

/// Write `sheets` to an `.xlsx` file, skipping empty tables. Returns `false`
/// (and writes nothing) when every table is empty.
pub fn write_workbook<P: AsRef<Path>>(path: P, sheets: &[(&str, &RecordBatch)]) -> Result<bool> {
    let path = path.as_ref();
    let non_empty: Vec<(&str, &RecordBatch)> = sheets
        .iter()
        .copied()
        .filter(|(_, b)| b.num_rows() > 0)
        .collect();
    if non_empty.is_empty() {
        warn!(path = %path.display(), "no rows in any sheet; workbook not written");
        return Ok(false);
    }

    let bytes = workbook_bytes(&non_empty)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(path, &bytes).with_context(|| format!("writing workbook {}", path.display()))?;
    info!(path = %path.display(), sheets = non_empty.len(), "workbook written");
    Ok(true)
}

/// Build the zipped workbook in memory.
pub fn workbook_bytes(sheets: &[(&str, &RecordBatch)]) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let names: Vec<String> = sheets.iter().map(|(n, _)| sheet_name(n)).collect();

    zip.start_file("[Content_Types].xml", options)?;
    zip.write_all(content_types_xml(sheets.len()).as_bytes())?;

    zip.start_file("_rels/.rels", options)?;
    zip.write_all(ROOT_RELS.as_bytes())?;

    zip.start_file("xl/workbook.xml", options)?;
    zip.write_all(workbook_xml(&names).as_bytes())?;

    zip.start_file("xl/_rels/workbook.xml.rels", options)?;
    zip.write_all(workbook_rels_xml(sheets.len()).as_bytes())?;

    zip.start_file("xl/styles.xml", options)?;
    zip.write_all(STYLES.as_bytes())?;

    for (i, (_, batch)) in sheets.iter().enumerate() {
        zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), options)?;
        zip.write_all(sheet_xml(batch).as_bytes())?;
    }

    let cursor = zip.finish().context("finishing workbook archive")?;
    Ok(cursor.into_inner())
}

/// Excel limits: 31 chars, none of `[]:*?/\`.
fn sheet_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if "[]:*?/\\".contains(c) { '_' } else { c })
        .take(31)
        .collect();
    if cleaned.is_empty() {
        "Sheet".to_string()
    } else {
        cleaned
    }
}

/// 0 → A, 25 → Z, 26 → AA
fn column_letter(mut idx: usize) -> String {
    let mut out = Vec::new();
    loop {
        out.push(b'A' + (idx % 26) as u8);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            // not allowed in XML 1.0
            c if (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r') => {}
            c => out.push(c),
        }
    }
    out
}

fn inline_cell(reference: &str, text: &str, style: Option<usize>) -> String {
    let s = style.map(|s| format!(" s=\"{}\"", s)).unwrap_or_default();
    format!(
        "<c r=\"{}\" t=\"inlineStr\"{}><is><t xml:space=\"preserve\">{}</t></is></c>",
        reference,
        s,
        escape_xml(text)
    )
}

fn sheet_xml(batch: &RecordBatch) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    let letters: Vec<String> = (0..batch.num_columns()).map(column_letter).collect();

    xml.push_str("<row r=\"1\">");
    for (col, field) in batch.schema().fields().iter().enumerate() {
        let r = format!("{}1", letters[col]);
        xml.push_str(&inline_cell(&r, field.name(), Some(HEADER_STYLE)));
    }
    xml.push_str("</row>");

    for row in 0..batch.num_rows() {
        let excel_row = row + 2;
        xml.push_str(&format!("<row r=\"{}\">", excel_row));
        for (col, arr) in batch.columns().iter().enumerate() {
            let r = format!("{}{}", letters[col], excel_row);
            if let Some(dates) = arr.as_any().downcast_ref::<Date32Array>() {
                if dates.is_valid(row) {
                    xml.push_str(&format!(
                        "<c r=\"{}\" s=\"{}\"><v>{}</v></c>",
                        r,
                        DATE_STYLE,
                        dates.value(row) + EXCEL_EPOCH_OFFSET
                    ));
                }
                continue;
            }
            if let Some(text) = cell_text(arr, row) {
                xml.push_str(&inline_cell(&r, &text, None));
            }
        }
        xml.push_str("</row>");
    }

    xml.push_str("</sheetData></worksheet>");
    xml
}

fn content_types_xml(sheet_count: usize) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#,
    );
    for i in 1..=sheet_count {
        xml.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
            i
        ));
    }
    xml.push_str("</Types>");
    xml
}

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

fn workbook_xml(names: &[String]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#,
    );
    for (i, name) in names.iter().enumerate() {
        xml.push_str(&format!(
            r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
            escape_xml(name),
            i + 1,
            i + 1
        ));
    }
    xml.push_str("</sheets></workbook>");
    xml
}

fn workbook_rels_xml(sheet_count: usize) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for i in 1..=sheet_count {
        xml.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{}.xml"/>"#,
            i, i
        ));
    }
    xml.push_str(&format!(
        r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#,
        sheet_count + 1
    ));
    xml.push_str("</Relationships>");
    xml
}

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><numFmts count="1"><numFmt numFmtId="164" formatCode="dd/mm/yyyy"/></numFmts><fonts count="2"><font><sz val="11"/><name val="Calibri"/></font><font><b/><sz val="11"/><name val="Calibri"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="3"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="164" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/><xf numFmtId="0" fontId="1" fillId="0" borderId="0" xfId="0" applyFont="1"/></cellXfs><cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles></styleSheet>"#;
