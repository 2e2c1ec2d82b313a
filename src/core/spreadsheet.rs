//! Thin spreadsheet extraction: bytes in, raw header→value rows out.
//!
//! Deliberately does nothing beyond pulling cell values under their headers.
//! All interpretation (dates, amounts, directions) happens in
//! [`crate::core::normalize`]. XLSX support is feature-gated; without the
//! `xlsx` feature the format is simply not recognized.

use crate::core::normalize::RawRow;
use crate::errors::{Error, Result};
use serde_json::Value;

/// Spreadsheet formats the ingestion pipeline accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadsheetFormat {
    Csv,
    #[cfg(feature = "xlsx")]
    Xlsx,
}

/// Decides the parser from the filename extension, case-insensitively.
/// `None` means the upload must be rejected before anything is stored.
pub fn detect_format(filename: &str) -> Option<SpreadsheetFormat> {
    let extension = std::path::Path::new(filename).extension()?.to_str()?;
    if extension.eq_ignore_ascii_case("csv") {
        return Some(SpreadsheetFormat::Csv);
    }
    #[cfg(feature = "xlsx")]
    if extension.eq_ignore_ascii_case("xlsx") {
        return Some(SpreadsheetFormat::Xlsx);
    }
    None
}

/// Extracts raw rows from spreadsheet bytes. Fully empty rows are skipped;
/// empty cells under a header come through as empty strings.
pub fn parse_rows(bytes: &[u8], format: SpreadsheetFormat) -> Result<Vec<RawRow>> {
    match format {
        SpreadsheetFormat::Csv => parse_csv(bytes),
        #[cfg(feature = "xlsx")]
        SpreadsheetFormat::Xlsx => parse_xlsx(bytes),
    }
}

fn parse_csv(bytes: &[u8]) -> Result<Vec<RawRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| Error::Parse {
            message: format!("could not read header row: {e}"),
        })?
        .clone();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| Error::Parse {
            message: format!("malformed record: {e}"),
        })?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let mut row = RawRow::new();
        for (i, cell) in record.iter().enumerate() {
            let Some(header) = headers.get(i).map(str::trim).filter(|h| !h.is_empty()) else {
                continue;
            };
            row.insert(header.to_string(), Value::String(cell.to_string()));
        }
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(feature = "xlsx")]
fn parse_xlsx(bytes: &[u8]) -> Result<Vec<RawRow>> {
    use calamine::{Data, Reader, Xlsx};
    use std::io::Cursor;

    let mut workbook = Xlsx::new(Cursor::new(bytes)).map_err(|e| Error::Parse {
        message: format!("could not open workbook: {e}"),
    })?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| Error::Parse {
            message: "workbook has no sheets".to_string(),
        })?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| Error::Parse {
            message: format!("could not read sheet '{sheet_name}': {e}"),
        })?;

    let mut sheet_rows = range.rows();
    let Some(header_row) = sheet_rows.next() else {
        return Ok(Vec::new());
    };
    let headers: Vec<String> = header_row
        .iter()
        .map(|cell| cell.to_string().trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for sheet_row in sheet_rows {
        if sheet_row.iter().all(|cell| matches!(cell, Data::Empty)) {
            continue;
        }
        let mut row = RawRow::new();
        for (i, cell) in sheet_row.iter().enumerate() {
            let Some(header) = headers.get(i).filter(|h| !h.is_empty()) else {
                continue;
            };
            let value = match cell {
                Data::Empty => Value::String(String::new()),
                Data::String(s) => Value::String(s.clone()),
                Data::Float(f) => serde_json::Number::from_f64(*f)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                Data::Int(n) => Value::Number((*n).into()),
                Data::Bool(b) => Value::Bool(*b),
                Data::DateTime(dt) => Value::String(
                    crate::core::normalize::excel_serial_to_date(dt.as_f64())
                        .format("%Y-%m-%d")
                        .to_string(),
                ),
                Data::DateTimeIso(s) | Data::DurationIso(s) => Value::String(s.clone()),
                Data::Error(e) => Value::String(e.to_string()),
            };
            row.insert(header.clone(), value);
        }
        rows.push(row);
    }
    Ok(rows)
}
