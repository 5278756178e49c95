use std::fs;
use std::path::Path;

use csv::{ReaderBuilder, Trim};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::errors::ParserError;
use crate::record::{FieldValue, Record};
use crate::timestamp::normalize_timestamp;

/// Columns carrying embedded JSON are recognised by this suffix.
pub const DETAILS_SUFFIX: &str = "_details";

#[derive(Debug, Clone, Copy)]
pub enum HeaderMode {
    /// First row is always a header row.
    Present,
    /// First row is a header only when it contains `token`; otherwise every row is data
    /// and cells map onto `columns` by position.
    Detect {
        token: &'static str,
        columns: &'static [&'static str],
    },
}

#[derive(Debug, Clone, Copy)]
pub struct ReadOptions<'a> {
    pub timestamp_columns: &'a [&'a str],
    pub header: HeaderMode,
}

impl<'a> ReadOptions<'a> {
    pub fn new(timestamp_columns: &'a [&'a str]) -> Self {
        Self {
            timestamp_columns,
            header: HeaderMode::Present,
        }
    }

    pub fn with_header(mut self, header: HeaderMode) -> Self {
        self.header = header;
        self
    }

    fn is_timestamp_column(&self, column: &str) -> bool {
        self.timestamp_columns.contains(&column)
    }
}

/// Reads a CSV file into records, normalizing the declared timestamp columns and
/// parsing every `*_details` column as a JSON object.
pub fn read_table(path: &Path, options: &ReadOptions<'_>) -> Result<Vec<Record>, ParserError> {
    if !path.exists() {
        return Err(ParserError::MissingFile {
            path: path.to_path_buf(),
        });
    }

    let content = fs::read_to_string(path).map_err(|source| ParserError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let records = parse_table(&content, options).map_err(|source| ParserError::Csv {
        path: path.to_path_buf(),
        source,
    })?;

    info!(path = %path.display(), rows = records.len(), "loaded table");
    Ok(records)
}

pub fn parse_table(content: &str, options: &ReadOptions<'_>) -> Result<Vec<Record>, csv::Error> {
    let positional = match options.header {
        HeaderMode::Present => None,
        HeaderMode::Detect { token, columns } => {
            let first_line = content.lines().next().unwrap_or_default();
            if first_line.contains(token) {
                None
            } else {
                Some(columns)
            }
        }
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(positional.is_none())
        .flexible(true)
        .escape(Some(b'\\'))
        .trim(Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = match positional {
        Some(columns) => columns.iter().map(|column| column.to_string()).collect(),
        None => reader
            .headers()?
            .iter()
            .map(|header| header.trim().to_string())
            .collect(),
    };

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let mut record = Record::new();
        for (idx, column) in headers.iter().enumerate() {
            if column.is_empty() {
                continue;
            }
            let raw = row.get(idx).unwrap_or_default();
            record.insert(column.clone(), convert_cell(column, raw, options));
        }
        records.push(record);
    }

    Ok(records)
}

fn convert_cell(column: &str, raw: &str, options: &ReadOptions<'_>) -> FieldValue {
    let value = raw.trim();
    if value.is_empty() {
        return FieldValue::Null;
    }

    if options.is_timestamp_column(column) {
        return match normalize_timestamp(value) {
            Some(ts) => FieldValue::Timestamp(ts),
            None => {
                warn!(column, value, "failed to parse timestamp; treating as unknown");
                FieldValue::Null
            }
        };
    }

    if column.ends_with(DETAILS_SUFFIX) {
        return FieldValue::Details(parse_details(column, value));
    }

    FieldValue::Text(value.to_string())
}

fn parse_details(column: &str, value: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(value) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            warn!(column, value = %other, "details column is not a JSON object");
            Map::new()
        }
        Err(err) => {
            warn!(column, value, error = %err, "failed to parse JSON in details column");
            Map::new()
        }
    }
}
