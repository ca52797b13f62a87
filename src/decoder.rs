// Wide-to-long reshaping.
//
// An IFs export carries one column per (country, second dimension, unit,
// value type) tuple spread over several header lines, and one data line per
// year. Every non-year column becomes one `LongRecord` per year.
//
// The last header level packs the value name, JMP category and commitment
// into one underscore-joined string. Decimal points in it were exported as
// underscores too, so `_0_` is read back as `_0.` before splitting.
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::config::{HeaderLayout, PipelineConfig};
use crate::error::DecodeError;
use crate::loader::RawGrid;
use crate::types::{JmpRecord, LongRecord};
use crate::util::{non_empty, parse_f64_safe, parse_year};

static ORDINAL_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\s*").unwrap());
static TRAILING_ANNOTATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\([^)]*\)\s*$").unwrap());
static FILE_EXTENSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\.csv$").unwrap());

/// Measure columns of the JMP file, in file order after `country, year, jmp_name`.
const JMP_MEASURE_COLUMNS: &[&str] = &[
    "total_ALB",
    "annual_rate_change_ALB",
    "total_SM",
    "annual_rate_change_SM",
    "manual_rate_change_SM",
    "manual_rate_change_ALB",
];

/// One column's header, one optional cell per level.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeaderTuple {
    pub country: Option<String>,
    pub secondary: Option<String>,
    pub unit: Option<String>,
    pub value_type: Option<String>,
}

impl HeaderTuple {
    fn read(grid: &RawGrid, layout: &HeaderLayout, col: usize) -> Self {
        Self {
            country: header_cell(grid.cell(layout.country_row, col)),
            secondary: layout
                .secondary_row
                .and_then(|row| header_cell(grid.cell(row, col))),
            unit: header_cell(grid.cell(layout.unit_row, col)),
            value_type: header_cell(grid.cell(layout.value_type_row, col)),
        }
    }

    /// Every level blank: the column holding the years.
    pub fn is_year_axis(&self) -> bool {
        self.country.is_none()
            && self.secondary.is_none()
            && self.unit.is_none()
            && self.value_type.is_none()
    }
}

/// Blank cells and spreadsheet "Unnamed: …" placeholders carry no label.
fn header_cell(raw: Option<&str>) -> Option<String> {
    let cell = non_empty(raw?)?;
    if cell.starts_with("Unnamed:") {
        None
    } else {
        Some(cell)
    }
}

/// The three named fields packed into the last header level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueType {
    pub value_name: String,
    pub jmp_category: Option<String>,
    pub commitment: Option<String>,
}

/// Split a value-type header into tokens, restoring `0.x` decimals.
pub fn value_type_tokens(raw: &str) -> Vec<String> {
    raw.replace("_0_", "_0.")
        .split('_')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

impl ValueType {
    /// Parse `value_name[_jmp_category[_commitment]]`.
    pub fn parse(source_id: &str, column: usize, raw: &str) -> Result<Self, DecodeError> {
        let mut tokens = value_type_tokens(raw).into_iter();
        let count = tokens.len();
        if count > 3 {
            return Err(DecodeError::TooManyValueTokens {
                source_id: source_id.to_string(),
                header: raw.to_string(),
                count,
            });
        }
        let value_name = tokens.next().ok_or_else(|| DecodeError::EmptyValueType {
            source_id: source_id.to_string(),
            column,
        })?;
        Ok(Self {
            value_name,
            jmp_category: tokens.next(),
            commitment: tokens.next(),
        })
    }
}

/// Indicator name from a file name: `"13. Water Access (2nd Dim = X).csv"`
/// becomes `"Water Access"`.
pub fn indicator_name(source_id: &str) -> String {
    let name = FILE_EXTENSION.replace(source_id.trim(), "");
    let name = ORDINAL_PREFIX.replace(&name, "");
    let name = TRAILING_ANNOTATION.replace(&name, "");
    name.trim().to_string()
}

fn clean_unit(raw: &str) -> Option<String> {
    non_empty(&raw.replace("2017", ""))
}

#[derive(Debug, Clone, PartialEq)]
struct DataColumn {
    index: usize,
    header: HeaderTuple,
    value_type: ValueType,
}

#[derive(Debug)]
struct DecodedHeader {
    year_column: usize,
    columns: Vec<DataColumn>,
}

fn decode_header(grid: &RawGrid, layout: &HeaderLayout) -> Result<DecodedHeader, DecodeError> {
    let header_rows = [
        Some(layout.country_row),
        layout.secondary_row,
        Some(layout.unit_row),
        Some(layout.value_type_row),
    ];
    for row in header_rows.iter().flatten() {
        if grid.rows.len() <= *row {
            return Err(DecodeError::MissingHeaderRow {
                source_id: grid.source_id.clone(),
                row: *row,
            });
        }
    }
    let width = header_rows
        .iter()
        .flatten()
        .map(|row| grid.rows[*row].len())
        .max()
        .unwrap_or(0);

    let mut year_column = None;
    let mut columns = Vec::new();
    for col in 0..width {
        let header = HeaderTuple::read(grid, layout, col);
        if header.is_year_axis() {
            if year_column.is_none() {
                year_column = Some(col);
            } else {
                debug!(source = %grid.source_id, column = col, "skipping blank column");
            }
            continue;
        }
        if header.country.is_none() {
            return Err(DecodeError::MissingCountry {
                source_id: grid.source_id.clone(),
                column: col,
            });
        }
        let raw_value_type = header
            .value_type
            .clone()
            .ok_or_else(|| DecodeError::EmptyValueType {
                source_id: grid.source_id.clone(),
                column: col,
            })?;
        let value_type = ValueType::parse(&grid.source_id, col, &raw_value_type)?;
        columns.push(DataColumn {
            index: col,
            header,
            value_type,
        });
    }
    let year_column = year_column.ok_or_else(|| DecodeError::MissingYearAxis {
        source_id: grid.source_id.clone(),
    })?;
    Ok(DecodedHeader {
        year_column,
        columns,
    })
}

/// Reshape one wide IFs file into long records, one per (column, year).
///
/// Country names are normalized through the alias table here, before any
/// other processing sees them.
pub fn decode_wide(grid: &RawGrid, config: &PipelineConfig) -> Result<Vec<LongRecord>, DecodeError> {
    let header = decode_header(grid, &config.header)?;
    let indicator = indicator_name(&grid.source_id);
    let countries: Vec<String> = header
        .columns
        .iter()
        .map(|c| config.normalize_country(c.header.country.as_deref().unwrap_or_default()))
        .collect();
    let units: Vec<Option<String>> = header
        .columns
        .iter()
        .map(|c| c.header.unit.as_deref().and_then(clean_unit))
        .collect();

    let mut records = Vec::new();
    let mut skipped_rows = 0usize;
    for row in grid.rows.iter().skip(config.header.data_start()) {
        let Some(year) = parse_year(row.get(header.year_column).map(|s| s.as_str())) else {
            skipped_rows += 1;
            continue;
        };
        for (i, column) in header.columns.iter().enumerate() {
            let value = parse_f64_safe(row.get(column.index).map(|s| s.as_str()));
            records.push(LongRecord {
                indicator: indicator.clone(),
                year,
                country: countries[i].clone(),
                secondary: column.header.secondary.clone(),
                unit: units[i].clone(),
                value_name: column.value_type.value_name.clone(),
                jmp_category: column.value_type.jmp_category.clone(),
                commitment: column.value_type.commitment.clone(),
                value,
                ..LongRecord::default()
            });
        }
    }
    if skipped_rows > 0 {
        debug!(source = %grid.source_id, skipped_rows, "rows without a year were skipped");
    }
    if records.is_empty() {
        warn!(source = %grid.source_id, "file produced no records");
    }
    Ok(records)
}

/// Melt the JMP household-survey file: one record per (row, measure column).
///
/// The first line is a header; columns are read by position.
pub fn melt_jmp(grid: &RawGrid, config: &PipelineConfig) -> Vec<JmpRecord> {
    let mut records = Vec::new();
    for row in grid.rows.iter().skip(1) {
        let Some(country) = row.first().and_then(|c| non_empty(c)) else {
            continue;
        };
        let Some(year) = parse_year(row.get(1).map(|s| s.as_str())) else {
            continue;
        };
        let country = config.normalize_country(&country);
        let jmp_name = row.get(2).and_then(|c| non_empty(c));
        for (offset, measure) in JMP_MEASURE_COLUMNS.iter().enumerate() {
            let (value_type, jmp_category) = split_measure(measure);
            records.push(JmpRecord {
                country: country.clone(),
                year,
                jmp_name: jmp_name.clone(),
                value_type: value_type.to_string(),
                jmp_category: jmp_category.to_string(),
                value: parse_f64_safe(row.get(3 + offset).map(|s| s.as_str())),
            });
        }
    }
    records
}

/// `"annual_rate_change_ALB"` -> `("annual_rate_change", "ALB")`.
fn split_measure(measure: &str) -> (&str, &str) {
    measure.rsplit_once('_').unwrap_or((measure, ""))
}
