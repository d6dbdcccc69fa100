//! Lookup Table Reader
//!
//! Reads delimited text and spreadsheet lookup tables. Headers are normalized
//! once here (trimmed, upper-cased, bookkeeping columns dropped) so every
//! other component sees the same column names. Full reads produce a polars
//! `DataFrame` whose columns are all `String`, so join keys always agree on
//! type.

use crate::config::LookupConfig;
use crate::decode::{decode_with_fallback, read_text};
use crate::error::{GeocodeError, Result};
use calamine::{open_workbook_auto, Data, Reader};
use encoding_rs::Encoding;
use polars::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Delimited(u8),
    /// Delimiter decided from the header line
    SniffedText,
    Spreadsheet,
}

impl TableFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(TableFormat::Delimited(b',')),
            "tsv" | "tab" => Some(TableFormat::Delimited(b'\t')),
            "txt" => Some(TableFormat::SniffedText),
            "xlsx" | "xlsm" | "xls" | "ods" => Some(TableFormat::Spreadsheet),
            _ => None,
        }
    }
}

fn sniff_delimiter(header_line: &str) -> u8 {
    let tabs = header_line.matches('\t').count();
    let commas = header_line.matches(',').count();
    if tabs > commas {
        b'\t'
    } else {
        b','
    }
}

pub struct TableReader {
    fallback: &'static Encoding,
    dropped: HashSet<String>,
}

impl TableReader {
    pub fn new(config: &LookupConfig) -> Result<Self> {
        let fallback = config.fallback_encoding()?;
        let dropped = config
            .dropped_columns
            .iter()
            .map(|c| LookupConfig::normalize_column(c))
            .collect();
        Ok(Self { fallback, dropped })
    }

    /// Normalized header of a table, reading as little of the file as possible.
    pub fn read_headers(&self, path: &Path) -> Result<Vec<String>> {
        let format = TableFormat::from_path(path).ok_or_else(|| unreadable(path, "not a tabular file"))?;
        let raw: Vec<String> = match format {
            TableFormat::Spreadsheet => {
                let rows = read_spreadsheet_rows(path)?;
                rows.into_iter()
                    .next()
                    .map(|row| row.into_iter().map(|c| c.unwrap_or_default()).collect())
                    .unwrap_or_default()
            }
            TableFormat::Delimited(_) | TableFormat::SniffedText => self.read_delimited_header(path, format)?,
        };

        let headers: Vec<String> = self.normalize_headers(&raw).into_iter().map(|(_, name)| name).collect();
        if headers.is_empty() {
            return Err(unreadable(path, "no header row"));
        }
        Ok(headers)
    }

    fn read_delimited_header(&self, path: &Path, format: TableFormat) -> Result<Vec<String>> {
        let mut line = Vec::new();
        BufReader::new(File::open(path)?).read_until(b'\n', &mut line)?;

        // A quoted header spanning lines can only be parsed from the whole file.
        let quotes = line.iter().filter(|b| **b == b'"').count();
        let text = if quotes % 2 == 1 {
            read_text(path, self.fallback)?.text
        } else {
            decode_with_fallback(path, &line, self.fallback)?.text
        };

        let delimiter = resolve_delimiter(format, text.lines().next().unwrap_or_default());
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .has_headers(true)
            .from_reader(text.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| unreadable(path, &format!("failed to read header: {}", e)))?
            .iter()
            .map(|h| h.to_string())
            .collect();
        Ok(headers)
    }

    /// Full read of a table into a `String`-typed `DataFrame`.
    pub fn read_table(&self, path: &Path) -> Result<DataFrame> {
        let format = TableFormat::from_path(path).ok_or_else(|| unreadable(path, "not a tabular file"))?;
        let (raw_headers, rows) = match format {
            TableFormat::Spreadsheet => {
                let mut rows = read_spreadsheet_rows(path)?.into_iter();
                let header = rows
                    .next()
                    .map(|row| row.into_iter().map(|c| c.unwrap_or_default()).collect::<Vec<_>>())
                    .unwrap_or_default();
                (header, rows.collect::<Vec<_>>())
            }
            TableFormat::Delimited(_) | TableFormat::SniffedText => self.read_delimited_rows(path, format)?,
        };

        let kept = self.normalize_headers(&raw_headers);
        if kept.is_empty() {
            return Err(unreadable(path, "no header row"));
        }

        let mut columns: Vec<Vec<Option<String>>> = vec![Vec::with_capacity(rows.len()); kept.len()];
        for row in &rows {
            for (slot, (idx, _)) in kept.iter().enumerate() {
                columns[slot].push(row.get(*idx).cloned().flatten());
            }
        }

        let series: Vec<Series> = kept
            .iter()
            .zip(columns)
            .map(|((_, name), values)| Series::new(name.as_str(), values))
            .collect();
        let df = DataFrame::new(series)?;
        tracing::debug!("Loaded {} ({} rows x {} columns)", path.display(), df.height(), df.width());
        Ok(df)
    }

    fn read_delimited_rows(&self, path: &Path, format: TableFormat) -> Result<(Vec<String>, Vec<Vec<Option<String>>>)> {
        let decoded = read_text(path, self.fallback)?;
        if decoded.used_fallback {
            tracing::warn!("{} is not UTF-8, read as {}", path.display(), decoded.encoding.name());
        }

        let first_line = decoded.text.lines().next().unwrap_or_default();
        let delimiter = resolve_delimiter(format, first_line);
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .has_headers(true)
            .from_reader(decoded.text.as_bytes());

        let headers = rdr
            .headers()
            .map_err(|e| unreadable(path, &format!("failed to read header: {}", e)))?
            .iter()
            .map(|h| h.to_string())
            .collect::<Vec<_>>();

        let mut rows = Vec::new();
        for rec in rdr.records() {
            let rec = rec.map_err(|e| unreadable(path, &format!("failed to read row: {}", e)))?;
            rows.push(
                rec.iter()
                    .map(|cell| if cell.is_empty() { None } else { Some(cell.to_string()) })
                    .collect(),
            );
        }
        Ok((headers, rows))
    }

    /// Source index and normalized name of every kept column.
    fn normalize_headers(&self, raw: &[String]) -> Vec<(usize, String)> {
        let mut seen = HashSet::new();
        let mut kept = Vec::new();
        for (idx, header) in raw.iter().enumerate() {
            let name = LookupConfig::normalize_column(header);
            if name.is_empty() || self.dropped.contains(&name) {
                continue;
            }
            if !seen.insert(name.clone()) {
                tracing::warn!("Duplicate column {} after normalization, keeping the first", name);
                continue;
            }
            kept.push((idx, name));
        }
        kept
    }
}

fn resolve_delimiter(format: TableFormat, header_line: &str) -> u8 {
    match format {
        TableFormat::Delimited(d) => d,
        _ => sniff_delimiter(header_line),
    }
}

fn read_spreadsheet_rows(path: &Path) -> Result<Vec<Vec<Option<String>>>> {
    let mut workbook = open_workbook_auto(path).map_err(|e| unreadable(path, &e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| unreadable(path, "workbook has no sheets"))?
        .map_err(|e| unreadable(path, &e.to_string()))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect())
}

fn cell_to_string(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) if s.is_empty() => None,
        Data::String(s) => Some(s.clone()),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => Some(format!("{}", *f as i64)),
        Data::Float(f) => Some(f.to_string()),
        Data::Int(i) => Some(i.to_string()),
        other => Some(other.to_string()),
    }
}

fn unreadable(path: &Path, reason: &str) -> GeocodeError {
    GeocodeError::Unreadable {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
