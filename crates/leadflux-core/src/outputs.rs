use std::fs::{self, File};
use std::path::{Path, PathBuf};

use leadflux_parser::{format_timestamp, Timestamp};
use polars::io::parquet::write::{ParquetCompression, ParquetWriter, StatisticsOptions};
use polars::prelude::*;
use tracing::{info, warn};

use crate::config::{OutputFormat, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::pipelines::{PipelineRun, RunMode, RunSummary};
use crate::types::{ConversionEvent, LeadConversionRecord};

/// Column order and timestamp-typed columns of an output table.
#[derive(Debug, Clone, Copy)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [&'static str],
    pub timestamp_columns: &'static [&'static str],
}

const TIMESTAMP_COLUMNS: &[&str] = &[
    "local_user_created_at",
    "client_conversion_event_local_created_at",
    "first_local_membership_purchased_at",
    "first_local_credit_pack_purchased_at",
];

pub const CONVERSION_EVENTS_SCHEMA: TableSchema = TableSchema {
    name: "fct_client_conversion_events",
    columns: &[
        "user_id",
        "branch_id",
        "local_user_created_at",
        "lead_status",
        "client_conversion_event_type",
        "client_conversion_event_id",
        "client_conversion_event_local_created_at",
        "client_conversion_event_name",
        "client_conversion_event_source",
        "first_user_membership_id",
        "first_local_membership_purchased_at",
        "first_membership_name",
        "first_membership_source",
        "first_credit_pack_id",
        "first_local_credit_pack_purchased_at",
        "first_credit_pack_name",
        "first_credit_pack_source",
    ],
    timestamp_columns: TIMESTAMP_COLUMNS,
};

pub const LEAD_CONVERSIONS_SCHEMA: TableSchema = TableSchema {
    name: "fct_lead_conversions",
    columns: &[
        "user_id",
        "branch_id",
        "local_user_created_at",
        "lead_status",
        "client_conversion_event_type",
        "client_conversion_event_id",
        "client_conversion_event_local_created_at",
        "client_conversion_event_name",
        "client_conversion_event_source",
        "first_user_membership_id",
        "first_local_membership_purchased_at",
        "first_membership_name",
        "first_membership_source",
        "first_credit_pack_id",
        "first_local_credit_pack_purchased_at",
        "first_credit_pack_name",
        "first_credit_pack_source",
        "client_conversion_event_filter",
    ],
    timestamp_columns: TIMESTAMP_COLUMNS,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Null,
    Text(String),
    Timestamp(Timestamp),
}

impl Cell {
    fn text(value: Option<&str>) -> Self {
        value.map_or(Cell::Null, |value| Cell::Text(value.to_string()))
    }

    fn timestamp(value: Option<Timestamp>) -> Self {
        value.map_or(Cell::Null, Cell::Timestamp)
    }

    pub fn render(&self) -> String {
        match self {
            Cell::Null => String::new(),
            Cell::Text(value) => value.clone(),
            Cell::Timestamp(ts) => format_timestamp(ts),
        }
    }
}

/// A row that can be looked up column by column.
pub trait TableRecord {
    fn cell(&self, column: &str) -> Cell;
}

impl TableRecord for ConversionEvent {
    fn cell(&self, column: &str) -> Cell {
        let conversion = self.conversion.as_ref();
        let membership = self.first_membership.as_ref();
        let credit = self.first_credit_pack.as_ref();

        match column {
            "user_id" => Cell::Text(self.user_id.clone()),
            "branch_id" => Cell::text(self.branch_id.as_deref()),
            "local_user_created_at" => Cell::timestamp(self.local_user_created_at),
            "lead_status" => Cell::Text(self.lead_status.as_str().to_string()),
            "client_conversion_event_type" => {
                Cell::text(conversion.map(|c| c.conversion_type.as_str()))
            }
            "client_conversion_event_id" => Cell::text(conversion.and_then(|c| c.id.as_deref())),
            "client_conversion_event_local_created_at" => {
                Cell::timestamp(conversion.and_then(|c| c.created_at))
            }
            "client_conversion_event_name" => {
                Cell::text(conversion.and_then(|c| c.name.as_deref()))
            }
            "client_conversion_event_source" => {
                Cell::text(conversion.and_then(|c| c.source.as_deref()))
            }
            "first_user_membership_id" => Cell::text(membership.map(|m| m.id.as_str())),
            "first_local_membership_purchased_at" => {
                Cell::timestamp(membership.and_then(|m| m.purchased_at))
            }
            "first_membership_name" => Cell::text(membership.and_then(|m| m.name.as_deref())),
            "first_membership_source" => {
                Cell::text(membership.and_then(|m| m.source.as_deref()))
            }
            "first_credit_pack_id" => Cell::text(credit.map(|c| c.id.as_str())),
            "first_local_credit_pack_purchased_at" => {
                Cell::timestamp(credit.and_then(|c| c.purchased_at))
            }
            "first_credit_pack_name" => Cell::text(credit.and_then(|c| c.name.as_deref())),
            "first_credit_pack_source" => Cell::text(credit.and_then(|c| c.source.as_deref())),
            _ => Cell::Null,
        }
    }
}

impl TableRecord for LeadConversionRecord {
    fn cell(&self, column: &str) -> Cell {
        match column {
            "client_conversion_event_filter" => Cell::Text(self.filter.as_str().to_string()),
            other => self.event.cell(other),
        }
    }
}

/// Writes `rows` to `path` in the requested format, creating parent directories.
pub fn write_table<R: TableRecord>(
    path: &Path,
    schema: &TableSchema,
    rows: &[R],
    format: OutputFormat,
) -> Result<()> {
    ensure_parent_dir(path)?;

    match format {
        OutputFormat::Csv => write_csv(path, schema, rows)?,
        OutputFormat::Parquet => {
            let mut df = build_dataframe(schema, rows)?;
            write_parquet(path, &mut df)?;
        }
    }

    info!(
        table = schema.name,
        path = %path.display(),
        rows = rows.len(),
        "saved table"
    );
    Ok(())
}

pub fn write_csv<R: TableRecord>(path: &Path, schema: &TableSchema, rows: &[R]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(schema.columns)?;
    for row in rows {
        writer.write_record(schema.columns.iter().map(|column| row.cell(column).render()))?;
    }
    writer.flush().map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Lays the rows out as a DataFrame; timestamp columns become UTC microsecond datetimes.
pub fn build_dataframe<R: TableRecord>(schema: &TableSchema, rows: &[R]) -> Result<DataFrame> {
    let mut columns: Vec<Column> = Vec::with_capacity(schema.columns.len());

    for name in schema.columns {
        let series = if schema.timestamp_columns.contains(name) {
            let values: Vec<Option<i64>> = rows
                .iter()
                .map(|row| match row.cell(name) {
                    Cell::Timestamp(ts) => Some(ts.timestamp_micros()),
                    _ => None,
                })
                .collect();
            Series::new((*name).into(), values).cast(&DataType::Datetime(
                TimeUnit::Microseconds,
                Some(polars::prelude::TimeZone::UTC),
            ))?
        } else {
            let values: Vec<Option<String>> = rows
                .iter()
                .map(|row| match row.cell(name) {
                    Cell::Null => None,
                    cell => Some(cell.render()),
                })
                .collect();
            Series::new((*name).into(), values)
        };
        columns.push(series.into());
    }

    Ok(DataFrame::new(columns)?)
}

fn write_parquet(path: &Path, df: &mut DataFrame) -> Result<()> {
    let file = File::create(path).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    ParquetWriter::new(file)
        .with_compression(ParquetCompression::Zstd(None))
        .with_statistics(StatisticsOptions::default())
        .finish(df)?;
    Ok(())
}

pub fn write_run_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    ensure_parent_dir(path)?;
    let bytes = serde_json::to_vec_pretty(summary)?;
    fs::write(path, bytes).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), run_id = %summary.run_id, "saved run summary");
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|source| PipelineError::Io {
                path: parent.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}

/// Paths actually written by [`publish_outputs`].
#[derive(Debug, Clone, Default)]
pub struct PublishedOutputs {
    pub conversion_events: Option<PathBuf>,
    pub lead_conversions: Option<PathBuf>,
    pub run_summary: Option<PathBuf>,
    pub summary: Option<RunSummary>,
}

/// Writes every table the run produced. Conversion events are only written for full
/// runs; lead conversions only when there are any.
pub fn publish_outputs(config: &PipelineConfig, run: &PipelineRun) -> Result<PublishedOutputs> {
    let mut published = PublishedOutputs::default();
    let paths = &config.output_paths;

    if run.mode == RunMode::Full {
        write_table(
            &paths.fct_client_conversion_events,
            &CONVERSION_EVENTS_SCHEMA,
            &run.conversion_events,
            config.output_format,
        )?;
        published.conversion_events = Some(paths.fct_client_conversion_events.clone());
    }

    if run.lead_conversions.is_empty() {
        warn!("no lead conversions data to write");
    } else {
        write_table(
            &paths.fct_lead_conversions,
            &LEAD_CONVERSIONS_SCHEMA,
            &run.lead_conversions,
            config.output_format,
        )?;
        published.lead_conversions = Some(paths.fct_lead_conversions.clone());
    }

    if let Some(summary_path) = &paths.run_summary {
        let summary = run.summary();
        write_run_summary(summary_path, &summary)?;
        published.run_summary = Some(summary_path.clone());
        published.summary = Some(summary);
    }

    Ok(published)
}
