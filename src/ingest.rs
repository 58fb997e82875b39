//! Tabular ingestion.
//!
//! Reads row-major measurement tables: row 1 holds headers, row 2 unit
//! strings, rows 3 and below numeric data. An optional uncertainty block
//! sits in a second column range and is either the same shape as the data
//! (per-element standard deviations) or one covariance matrix per data row.
//!
//! The spreadsheet reader itself is external; anything that can serve cells
//! as text implements [`TableSource`]. A CSV-backed source ships with the
//! crate.

use crate::measurement::Measurement;
use crate::registry::KNOWN_CHARACTERS;
use crate::value::Value;
use crate::{Error, Result};
use regex::Regex;
use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;

/// A grid of textual cells, possibly spanning several sheets.
pub trait TableSource {
    fn sheet_count(&self) -> usize;
    fn rows(&self, sheet: usize) -> usize;
    /// The trimmed cell text, or `None` when the cell is blank or absent.
    fn cell(&self, sheet: usize, row: usize, col: usize) -> Option<String>;
}

/// A single-sheet [`TableSource`] backed by a CSV document.
pub struct CsvSource {
    rows: Vec<Vec<String>>,
}

impl CsvSource {
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);
        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record.map_err(|e| Error::Table(e.to_string()))?;
            rows.push(record.iter().map(|s| s.trim().to_string()).collect());
        }
        Ok(Self { rows })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| Error::Table(e.to_string()))?;
        Self::from_reader(file)
    }
}

impl TableSource for CsvSource {
    fn sheet_count(&self) -> usize {
        1
    }

    fn rows(&self, _sheet: usize) -> usize {
        self.rows.len()
    }

    fn cell(&self, _sheet: usize, row: usize, col: usize) -> Option<String> {
        let text = self.rows.get(row)?.get(col)?;
        if text.is_empty() {
            None
        } else {
            Some(text.clone())
        }
    }
}

/// All measurements read from a source, one [`Sheet`] per source sheet.
#[derive(Debug)]
pub struct DataSet {
    sheets: Vec<Sheet>,
}

impl DataSet {
    /// Look a sheet up by its generated name (`s1`, `s2`, …).
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }
}

impl std::fmt::Display for DataSet {
    /// List the addressable contents, one `sheet.column [unit]` line per
    /// measurement.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for sheet in &self.sheets {
            for (name, measurement) in &sheet.columns {
                writeln!(f, "{}.{} [{}]", sheet.name, name, measurement.unit())?;
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct Sheet {
    pub name: String,
    columns: Vec<(String, Measurement)>,
}

impl Sheet {
    /// Look a column up by its sanitised header name.
    pub fn column(&self, name: &str) -> Option<&Measurement> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, m)| m)
    }

    pub fn columns(&self) -> &[(String, Measurement)] {
        &self.columns
    }
}

/// Read measurement tables from a source. Column ranges are spreadsheet
/// letters (`"A"`, `"AB"`); the uncertainty range is optional but must be
/// given in full or not at all.
pub fn read_table(
    source: &impl TableSource,
    data_start: &str,
    data_end: &str,
    uncert_start: Option<&str>,
    uncert_end: Option<&str>,
) -> Result<DataSet> {
    // Column letters are 1-based; cell access is 0-based.
    let data_start = column_index(data_start)? - 1;
    let data_end = column_index(data_end)? - 1;
    let uncert = match (uncert_start, uncert_end) {
        (None, None) => None,
        (Some(start), Some(end)) => Some((column_index(start)? - 1, column_index(end)? - 1)),
        _ => {
            return Err(Error::Table(
                "both ends of the uncertainty range are required".to_string(),
            ))
        }
    };
    let n_cols = data_end
        .checked_sub(data_start)
        .map(|d| d + 1)
        .ok_or_else(|| Error::Table("the data range is reversed".to_string()))?;
    if let Some((start, end)) = uncert {
        let n_uncert = end
            .checked_sub(start)
            .map(|d| d + 1)
            .ok_or_else(|| Error::Table("the uncertainty range is reversed".to_string()))?;
        if n_uncert != n_cols {
            return Err(Error::Table(format!(
                "the data spans {n_cols} columns but the uncertainty spans {n_uncert}"
            )));
        }
    }

    let mut sheets = Vec::new();
    for sheet_index in 0..source.sheet_count() {
        let sheet = read_sheet(source, sheet_index, data_start, n_cols, uncert)?;
        sheets.push(sheet);
    }
    Ok(DataSet { sheets })
}

fn read_sheet(
    source: &impl TableSource,
    sheet: usize,
    data_start: usize,
    n_cols: usize,
    uncert: Option<(usize, usize)>,
) -> Result<Sheet> {
    let name = format!("s{}", sheet + 1);

    let headers: Vec<String> = (0..n_cols)
        .map(|c| {
            source.cell(sheet, 0, data_start + c).ok_or_else(|| {
                Error::Table(format!("sheet {name} is missing a header in column {c}"))
            })
        })
        .collect::<Result<_>>()?;
    let headers = sanitise_headers(&headers);
    let units: Vec<String> = (0..n_cols)
        .map(|c| clean_unit(&source.cell(sheet, 1, data_start + c).unwrap_or_default()))
        .collect();

    let data = read_block(source, sheet, data_start, n_cols, &name)?;
    let n_rows = data.len();
    if n_rows == 0 {
        return Err(Error::Table(format!("sheet {name} contains no data rows")));
    }

    let mut columns = Vec::with_capacity(n_cols);
    match uncert {
        None => {
            for (c, (header, unit)) in headers.iter().zip(&units).enumerate() {
                let values: Vec<f64> = data.iter().map(|row| row[c]).collect();
                columns.push((header.clone(), Measurement::new(values, unit)?));
            }
        }
        Some((uncert_start, _)) => {
            let block = read_block(source, sheet, uncert_start, n_cols, &name)?;
            if block.len() == n_rows {
                // Per-element standard deviations.
                for (c, (header, unit)) in headers.iter().zip(&units).enumerate() {
                    let values: Vec<f64> = data.iter().map(|row| row[c]).collect();
                    let sigmas: Vec<f64> = block.iter().map(|row| row[c]).collect();
                    columns.push((header.clone(), Measurement::with_uncert(values, unit, sigmas)?));
                }
            } else if block.len() == n_rows * n_cols {
                // One covariance matrix per data row; the diagonal carries
                // each column's variance.
                let mut measurements = Vec::with_capacity(n_cols);
                for (c, (header, unit)) in headers.iter().zip(&units).enumerate() {
                    let values: Vec<f64> = data.iter().map(|row| row[c]).collect();
                    let sigmas: Vec<f64> = (0..n_rows)
                        .map(|r| block[r * n_cols + c][c].max(0.0).sqrt())
                        .collect();
                    measurements.push((header.clone(), Measurement::with_uncert(values, unit, sigmas)?));
                }
                for i in 0..n_cols {
                    for j in i + 1..n_cols {
                        let cov: Vec<f64> = (0..n_rows).map(|r| block[r * n_cols + i][j]).collect();
                        Measurement::set_covariance(
                            &measurements[i].1,
                            &measurements[j].1,
                            Value::from(cov),
                        )?;
                    }
                }
                columns = measurements;
            } else {
                return Err(Error::Table(format!(
                    "sheet {name} has {} uncertainty rows for {n_rows} data rows and {n_cols} columns",
                    block.len()
                )));
            }
        }
    }
    Ok(Sheet { name, columns })
}

/// Read the numeric block below the two header rows. Every column must hold
/// the same number of values.
fn read_block(
    source: &impl TableSource,
    sheet: usize,
    start: usize,
    n_cols: usize,
    name: &str,
) -> Result<Vec<Vec<f64>>> {
    let total_rows = source.rows(sheet);
    let mut counts = vec![0usize; n_cols];
    for (c, count) in counts.iter_mut().enumerate() {
        for row in 2..total_rows {
            if source.cell(sheet, row, start + c).is_some() {
                *count += 1;
            }
        }
    }
    if counts.iter().any(|c| *c != counts[0]) {
        return Err(Error::Table(format!(
            "sheet {name} does not have an equal amount of rows in every column"
        )));
    }
    let mut out = Vec::with_capacity(counts[0]);
    for row in 2..2 + counts[0] {
        let mut values = Vec::with_capacity(n_cols);
        for c in 0..n_cols {
            let text = source.cell(sheet, row, start + c).ok_or_else(|| {
                Error::Table(format!("sheet {name} has a blank cell inside its block"))
            })?;
            let value: f64 = text
                .parse()
                .map_err(|_| Error::Table(format!("'{text}' is not a number")))?;
            values.push(value);
        }
        out.push(values);
    }
    Ok(out)
}

/// Convert spreadsheet column letters to a 1-based index.
fn column_index(column: &str) -> Result<usize> {
    let mut index = 0usize;
    let mut seen = false;
    for c in column.chars() {
        if c.is_ascii_alphabetic() {
            index = index * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize) + 1;
            seen = true;
        }
    }
    if !seen {
        return Err(Error::Table(format!("'{column}' is not a column")));
    }
    Ok(index)
}

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w]").expect("the pattern is valid"));
static UNDERSCORE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_{2,}").expect("the pattern is valid"));

/// Turn raw headers into identifier-safe, unique names.
fn sanitise_headers(headers: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(headers.len());
    for header in headers {
        let lowered = header.to_lowercase();
        let mut name = NON_WORD.replace_all(&lowered, "_").into_owned();
        name = UNDERSCORE_RUN.replace_all(&name, "_").into_owned();
        if name.len() > 1 && name.ends_with('_') {
            name.pop();
        }
        if name.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            name.insert(0, '_');
        }
        if name.is_empty() {
            name.push('_');
        }
        if out.contains(&name) {
            let mut suffix = 2;
            loop {
                let candidate = format!("{name}_{suffix}");
                if !out.contains(&candidate) {
                    name = candidate;
                    break;
                }
                suffix += 1;
            }
        }
        out.push(name);
    }
    out
}

/// Strip characters the unit grammar does not know before parsing.
fn clean_unit(unit: &str) -> String {
    unit.chars().filter(|c| KNOWN_CHARACTERS.contains(c)).collect()
}
