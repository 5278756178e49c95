use std::path::{Path, PathBuf};

use leadflux_parser::{read_table, HeaderMode, ReadOptions, Record};
use tracing::{info, warn};

use crate::outputs::CONVERSION_EVENTS_SCHEMA;
use crate::types::{ConversionDetails, ConversionEvent, ConversionType, LeadStatus, PurchaseSummary};

/// Supplies pre-built conversion events when the primary path yields no lead conversions.
pub trait FallbackSource {
    fn name(&self) -> &str;

    /// Returns the substitute events. Absent or unreadable data is an empty result,
    /// never an error.
    fn load(&self) -> Vec<ConversionEvent>;
}

/// Reads the `fct_client_conversion_events_part_2` CSV layout.
#[derive(Debug, Clone)]
pub struct CsvFallbackSource {
    path: PathBuf,
}

impl CsvFallbackSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FallbackSource for CsvFallbackSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn load(&self) -> Vec<ConversionEvent> {
        let options = ReadOptions::new(CONVERSION_EVENTS_SCHEMA.timestamp_columns).with_header(
            HeaderMode::Detect {
                token: "user_id",
                columns: CONVERSION_EVENTS_SCHEMA.columns,
            },
        );

        let records = match read_table(&self.path, &options) {
            Ok(records) => records,
            Err(err) if err.is_missing_file() => {
                warn!(path = %self.path.display(), "fallback conversion events file not found");
                return Vec::new();
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to read fallback conversion events");
                return Vec::new();
            }
        };

        let events: Vec<ConversionEvent> = records
            .iter()
            .filter_map(conversion_event_from_record)
            .collect();
        info!(
            path = %self.path.display(),
            rows = records.len(),
            events = events.len(),
            "loaded fallback conversion events"
        );
        events
    }
}

/// Rebuilds a conversion event from a row in the 17-column layout.
pub fn conversion_event_from_record(record: &Record) -> Option<ConversionEvent> {
    let Some(user_id) = record.owned_text("user_id") else {
        warn!("skipping fallback row without user_id");
        return None;
    };

    let lead_status = match record.text("lead_status") {
        Some(raw) => LeadStatus::parse(raw).unwrap_or_else(|| {
            warn!(user_id = %user_id, lead_status = raw, "unknown lead_status; treating as LEAD");
            LeadStatus::Lead
        }),
        None => LeadStatus::Lead,
    };

    let conversion = record
        .text("client_conversion_event_type")
        .and_then(ConversionType::parse)
        .map(|conversion_type| ConversionDetails {
            conversion_type,
            id: record.owned_text("client_conversion_event_id"),
            created_at: record.timestamp("client_conversion_event_local_created_at"),
            name: record.owned_text("client_conversion_event_name"),
            source: record.owned_text("client_conversion_event_source"),
        });

    let first_membership = record
        .owned_text("first_user_membership_id")
        .map(|id| PurchaseSummary {
            id,
            purchased_at: record.timestamp("first_local_membership_purchased_at"),
            name: record.owned_text("first_membership_name"),
            source: record.owned_text("first_membership_source"),
        });

    let first_credit_pack = record
        .owned_text("first_credit_pack_id")
        .map(|id| PurchaseSummary {
            id,
            purchased_at: record.timestamp("first_local_credit_pack_purchased_at"),
            name: record.owned_text("first_credit_pack_name"),
            source: record.owned_text("first_credit_pack_source"),
        });

    Some(ConversionEvent {
        user_id,
        branch_id: record.owned_text("branch_id"),
        local_user_created_at: record.timestamp("local_user_created_at"),
        lead_status,
        conversion,
        first_membership,
        first_credit_pack,
    })
}
