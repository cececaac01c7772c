use std::fs::File;
use std::io::Read;
use std::path::Path;

use arrow::array::{Array, AsArray, StringArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use log::{debug, info};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{Dataset, Record};
use crate::error::{DataLoadError, Result};

/// Columns every source must provide. Anything else is ignored.
pub const REQUIRED_COLUMNS: [&str; 5] = [
    "device_type",
    "channel",
    "signup_date",
    "feature_adopted",
    "feature_used_times",
];

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load an adoption dataset from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row naming the columns (the canonical export)
/// * `.json`    – `[{ "device_type": "mobile", "channel": "email", ... }, ...]`
/// * `.parquet` – one column per field, cast to the required types
pub fn load_file(path: &Path) -> Result<Dataset> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    debug!("Loading dataset from {} (.{ext})", path.display());
    let dataset = match ext.as_str() {
        "csv" => load_csv_reader(open(path)?),
        "json" => {
            let mut text = String::new();
            open(path)?
                .read_to_string(&mut text)
                .map_err(|source| io_error(path, source))?;
            load_json_str(&text)
        }
        "parquet" | "pq" => load_parquet(path),
        other => Err(DataLoadError::UnsupportedFormat(other.to_string())),
    }?;

    info!("Loaded {} records from {}", dataset.len(), path.display());
    Ok(dataset)
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|source| io_error(path, source))
}

fn io_error(path: &Path, source: std::io::Error) -> DataLoadError {
    DataLoadError::Io {
        path: path.to_path_buf(),
        source,
    }
}

// ---------------------------------------------------------------------------
// Row parsing shared by every format
// ---------------------------------------------------------------------------

/// One row as text, before coercion. Null cells arrive as `""`.
struct RawRow<'a> {
    device_type: &'a str,
    channel: &'a str,
    signup_date: &'a str,
    feature_adopted: &'a str,
    feature_used_times: &'a str,
}

impl<'a> RawRow<'a> {
    /// Build from cells given in [`REQUIRED_COLUMNS`] order.
    fn from_cells(cells: [&'a str; 5]) -> Self {
        let [device_type, channel, signup_date, feature_adopted, feature_used_times] = cells;
        RawRow {
            device_type,
            channel,
            signup_date,
            feature_adopted,
            feature_used_times,
        }
    }

    fn parse(&self, row: usize) -> Result<Record> {
        let feature_adopted = parse_adopted(row, self.feature_adopted)?;
        Ok(Record {
            device_type: parse_category(row, "device_type", self.device_type)?,
            channel: parse_category(row, "channel", self.channel)?,
            signup_date: parse_signup_date(row, self.signup_date)?,
            feature_adopted,
            feature_used_times: parse_used_times(row, self.feature_used_times, feature_adopted)?,
        })
    }
}

fn parse_category(row: usize, column: &'static str, raw: &str) -> Result<String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(DataLoadError::invalid(row, column, raw, "empty category"));
    }
    Ok(value.to_string())
}

fn parse_adopted(row: usize, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "1.0" | "true" => Ok(true),
        "0" | "0.0" | "false" => Ok(false),
        _ => Err(DataLoadError::invalid(
            row,
            "feature_adopted",
            raw,
            "expected 0/1 or true/false",
        )),
    }
}

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

fn parse_signup_date(row: usize, raw: &str) -> Result<NaiveDate> {
    let s = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
        .ok_or_else(|| DataLoadError::invalid(row, "signup_date", raw, "not a recognised date"))
}

fn parse_used_times(row: usize, raw: &str, adopted: bool) -> Result<u32> {
    let s = raw.trim();
    if s.is_empty() && !adopted {
        return Ok(0);
    }
    if let Ok(n) = s.parse::<u32>() {
        return Ok(n);
    }
    // Integer columns with gaps are often exported as floats ("3.0").
    match s.parse::<f64>() {
        Ok(v) if v < 0.0 => Err(DataLoadError::invalid(
            row,
            "feature_used_times",
            raw,
            "must be non-negative",
        )),
        Ok(v) if v.fract() == 0.0 && v <= f64::from(u32::MAX) => Ok(v as u32),
        _ => Err(DataLoadError::invalid(
            row,
            "feature_used_times",
            raw,
            "expected a whole number",
        )),
    }
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with column names, one event per line.
/// Columns are located by name; order and extra columns don't matter.
pub fn load_csv_reader<R: Read>(reader: R) -> Result<Dataset> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers = reader.headers()?.clone();

    let mut positions = [0usize; 5];
    for (slot, name) in positions.iter_mut().zip(REQUIRED_COLUMNS) {
        *slot = headers
            .iter()
            .position(|h| h.trim_start_matches('\u{feff}').trim() == name)
            .ok_or(DataLoadError::MissingColumn(name))?;
    }

    let mut records = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let row = result?;
        let cells = positions.map(|idx| row.get(idx).unwrap_or(""));
        records.push(RawRow::from_cells(cells).parse(row_no)?);
    }

    Ok(Dataset::from_records(records))
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, `df.to_json(orient='records')`):
///
/// ```json
/// [
///   {
///     "device_type": "mobile",
///     "channel": "email",
///     "signup_date": "2024-02-11",
///     "feature_adopted": 1,
///     "feature_used_times": 4
///   },
///   ...
/// ]
/// ```
pub fn load_json_str(text: &str) -> Result<Dataset> {
    let root: JsonValue = serde_json::from_str(text)?;
    let rows = root
        .as_array()
        .ok_or_else(|| DataLoadError::InvalidLayout("expected top-level JSON array".into()))?;

    let mut records = Vec::with_capacity(rows.len());
    for (i, rec) in rows.iter().enumerate() {
        let obj = rec
            .as_object()
            .ok_or_else(|| DataLoadError::InvalidLayout(format!("row {i} is not a JSON object")))?;

        let mut cells: [String; 5] = Default::default();
        for (cell, name) in cells.iter_mut().zip(REQUIRED_COLUMNS) {
            *cell = json_cell(obj.get(name), i, name)?;
        }
        let cells = [
            cells[0].as_str(),
            cells[1].as_str(),
            cells[2].as_str(),
            cells[3].as_str(),
            cells[4].as_str(),
        ];
        records.push(RawRow::from_cells(cells).parse(i)?);
    }

    Ok(Dataset::from_records(records))
}

fn json_cell(val: Option<&JsonValue>, row: usize, col: &'static str) -> Result<String> {
    match val {
        None => Err(DataLoadError::MissingColumn(col)),
        Some(JsonValue::Null) => Ok(String::new()),
        Some(JsonValue::String(s)) => Ok(s.clone()),
        Some(JsonValue::Number(n)) => Ok(n.to_string()),
        Some(JsonValue::Bool(b)) => Ok(b.to_string()),
        Some(other) => Err(DataLoadError::invalid(
            row,
            col,
            other.to_string(),
            "expected a scalar",
        )),
    }
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file containing adoption events.
///
/// Every required column is cast to text and goes through the same coercion
/// as CSV, so integer, float, boolean, date and timestamp encodings all work.
/// Named timezones such as `UTC` resolve through arrow's `chrono-tz` feature.
/// This covers files written by both **Pandas** and **Polars**.
fn load_parquet(path: &Path) -> Result<Dataset> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(open(path)?)?;

    let schema = builder.schema().clone();
    for name in REQUIRED_COLUMNS {
        if schema.index_of(name).is_err() {
            return Err(DataLoadError::MissingColumn(name));
        }
    }

    let reader = builder.build()?;
    let mut records = Vec::new();

    for batch in reader {
        let batch = batch?;
        let [c0, c1, c2, c3, c4] = [
            text_column(&batch, REQUIRED_COLUMNS[0])?,
            text_column(&batch, REQUIRED_COLUMNS[1])?,
            text_column(&batch, REQUIRED_COLUMNS[2])?,
            text_column(&batch, REQUIRED_COLUMNS[3])?,
            text_column(&batch, REQUIRED_COLUMNS[4])?,
        ];

        for row in 0..batch.num_rows() {
            let cells = [
                cell(&c0, row),
                cell(&c1, row),
                cell(&c2, row),
                cell(&c3, row),
                cell(&c4, row),
            ];
            let row_no = records.len();
            records.push(RawRow::from_cells(cells).parse(row_no)?);
        }
    }

    Ok(Dataset::from_records(records))
}

// -- Arrow helpers --

fn text_column(batch: &RecordBatch, name: &'static str) -> Result<StringArray> {
    let column = batch
        .column_by_name(name)
        .ok_or(DataLoadError::MissingColumn(name))?;
    let text = cast(column, &DataType::Utf8)?;
    Ok(text.as_string::<i32>().clone())
}

fn cell(array: &StringArray, row: usize) -> &str {
    if array.is_null(row) {
        ""
    } else {
        array.value(row)
    }
}
