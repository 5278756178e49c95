use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use leadflux_parser::{
    read_table, PurchaseEvent, PurchaseKind, ReadOptions, Record, User, USER_TIMESTAMP_COLUMNS,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::composer::compose;
use crate::config::InputPaths;
use crate::earliest::select_earliest;
use crate::error::{PipelineError, Result};
use crate::expander::expand;
use crate::fallback::FallbackSource;
use crate::types::{ConversionEvent, ConversionFilter, LeadConversionRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Compose conversion events from raw inputs, falling back when nothing expands.
    Full,
    /// Expand the pre-built fallback table only.
    FallbackOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadConversionSource {
    Primary,
    Fallback,
}

impl LeadConversionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadConversionSource::Primary => "primary",
            LeadConversionSource::Fallback => "fallback",
        }
    }
}

/// States of the lead-conversion resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadConversionState {
    AttemptPrimary,
    AttemptFallback,
    Done(LeadConversionSource),
    Failed,
}

impl LeadConversionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LeadConversionState::Done(_) | LeadConversionState::Failed
        )
    }

    pub fn source(&self) -> Option<LeadConversionSource> {
        match self {
            LeadConversionState::Done(source) => Some(*source),
            _ => None,
        }
    }
}

/// Where an input table came from and what it contained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDigest {
    pub table: String,
    pub path: String,
    pub rows: usize,
    /// BLAKE3 of the file contents; `None` when the file was missing.
    pub blake3: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineInputs {
    pub users: Vec<User>,
    pub credit_purchases: Vec<PurchaseEvent>,
    pub membership_purchases: Vec<PurchaseEvent>,
    pub digests: Vec<InputDigest>,
}

impl PipelineInputs {
    /// Reads the roster and both purchase streams. Missing files are warnings and load
    /// as empty tables; files that exist but cannot be parsed are errors.
    pub fn load(paths: &InputPaths) -> Result<Self> {
        let (user_records, user_digest) =
            load_records("dim_user", &paths.dim_user, USER_TIMESTAMP_COLUMNS)?;
        let users: Vec<User> = user_records.iter().filter_map(User::from_record).collect();

        let (credit_purchases, credit_digest) = load_purchases(
            "fct_credit_pack_purchases",
            &paths.fct_credit_pack_purchases,
            PurchaseKind::CreditPack,
        )?;
        let (membership_purchases, membership_digest) = load_purchases(
            "fct_membership_purchases",
            &paths.fct_membership_purchases,
            PurchaseKind::Membership,
        )?;

        Ok(Self {
            users,
            credit_purchases,
            membership_purchases,
            digests: vec![user_digest, credit_digest, membership_digest],
        })
    }
}

fn load_purchases(
    table: &str,
    path: &Path,
    kind: PurchaseKind,
) -> Result<(Vec<PurchaseEvent>, InputDigest)> {
    let (records, digest) = load_records(table, path, kind.timestamp_columns())?;
    let events = records
        .iter()
        .map(|record| PurchaseEvent::from_record(kind, record))
        .collect();
    Ok((events, digest))
}

fn load_records(
    table: &str,
    path: &Path,
    timestamp_columns: &[&str],
) -> Result<(Vec<Record>, InputDigest)> {
    let records = match read_table(path, &ReadOptions::new(timestamp_columns)) {
        Ok(records) => records,
        Err(err) if err.is_missing_file() => {
            warn!(table, path = %path.display(), "input file not found; treating as empty");
            return Ok((
                Vec::new(),
                InputDigest {
                    table: table.to_string(),
                    path: path.display().to_string(),
                    rows: 0,
                    blake3: None,
                },
            ));
        }
        Err(err) => return Err(err.into()),
    };

    let bytes = fs::read(path).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let digest = InputDigest {
        table: table.to_string(),
        path: path.display().to_string(),
        rows: records.len(),
        blake3: Some(blake3::hash(&bytes).to_hex().to_string()),
    };
    Ok((records, digest))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub users: usize,
    pub credit_purchases: usize,
    pub membership_purchases: usize,
    pub earliest_credits: usize,
    pub earliest_memberships: usize,
    pub fallback_events: usize,
}

#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub mode: RunMode,
    pub state: LeadConversionState,
    pub conversion_events: Vec<ConversionEvent>,
    pub lead_conversions: Vec<LeadConversionRecord>,
    pub stats: RunStats,
    pub inputs: Vec<InputDigest>,
}

/// Runs the full pipeline: select, compose, expand, and fall back when expansion is empty.
pub fn run_pipeline(inputs: PipelineInputs, fallback: &dyn FallbackSource) -> PipelineRun {
    let PipelineInputs {
        users,
        credit_purchases,
        membership_purchases,
        digests,
    } = inputs;

    let mut stats = RunStats {
        users: users.len(),
        credit_purchases: credit_purchases.len(),
        membership_purchases: membership_purchases.len(),
        ..RunStats::default()
    };

    let earliest_credits = select_earliest(credit_purchases);
    let earliest_memberships = select_earliest(membership_purchases);
    stats.earliest_credits = earliest_credits.len();
    stats.earliest_memberships = earliest_memberships.len();

    let conversion_events = compose(&users, &earliest_credits, &earliest_memberships);

    let (state, lead_conversions) = resolve_lead_conversions(
        LeadConversionState::AttemptPrimary,
        &conversion_events,
        fallback,
        &mut stats,
    );

    PipelineRun {
        mode: RunMode::Full,
        state,
        conversion_events,
        lead_conversions,
        stats,
        inputs: digests,
    }
}

/// Skips the primary path and expands the fallback table directly.
pub fn run_fallback_only(fallback: &dyn FallbackSource) -> PipelineRun {
    let mut stats = RunStats::default();
    let (state, lead_conversions) = resolve_lead_conversions(
        LeadConversionState::AttemptFallback,
        &[],
        fallback,
        &mut stats,
    );

    PipelineRun {
        mode: RunMode::FallbackOnly,
        state,
        conversion_events: Vec::new(),
        lead_conversions,
        stats,
        inputs: Vec::new(),
    }
}

fn resolve_lead_conversions(
    start: LeadConversionState,
    primary_events: &[ConversionEvent],
    fallback: &dyn FallbackSource,
    stats: &mut RunStats,
) -> (LeadConversionState, Vec<LeadConversionRecord>) {
    let mut state = start;
    let mut lead_conversions = Vec::new();

    while !state.is_terminal() {
        state = match state {
            LeadConversionState::AttemptPrimary => {
                lead_conversions = expand(primary_events);
                if lead_conversions.is_empty() {
                    warn!("no lead conversions from composed events; falling back to pre-built conversion events");
                    LeadConversionState::AttemptFallback
                } else {
                    info!(records = lead_conversions.len(), "lead conversions generated from composed events");
                    LeadConversionState::Done(LeadConversionSource::Primary)
                }
            }
            LeadConversionState::AttemptFallback => {
                let fallback_events = fallback.load();
                stats.fallback_events = fallback_events.len();
                lead_conversions = expand(&fallback_events);
                if lead_conversions.is_empty() {
                    warn!(
                        source = fallback.name(),
                        events = fallback_events.len(),
                        "fallback produced no lead conversions"
                    );
                    LeadConversionState::Failed
                } else {
                    info!(
                        source = fallback.name(),
                        records = lead_conversions.len(),
                        "lead conversions generated from fallback"
                    );
                    LeadConversionState::Done(LeadConversionSource::Fallback)
                }
            }
            terminal => terminal,
        };
    }

    (state, lead_conversions)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub users: usize,
    pub credit_purchases: usize,
    pub membership_purchases: usize,
    pub earliest_credits: usize,
    pub earliest_memberships: usize,
    pub conversion_events: usize,
    pub clients: usize,
    pub leads: usize,
    pub fallback_events: usize,
    pub lead_conversions: usize,
    pub lead_conversions_membership: usize,
    pub lead_conversions_user_credit: usize,
    pub lead_conversions_all: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub mode: RunMode,
    pub lead_conversion_source: Option<LeadConversionSource>,
    pub counts: RunCounts,
    pub inputs: Vec<InputDigest>,
}

impl PipelineRun {
    pub fn source(&self) -> Option<LeadConversionSource> {
        self.state.source()
    }

    pub fn counts(&self) -> RunCounts {
        let clients = self
            .conversion_events
            .iter()
            .filter(|event| event.is_client())
            .count();
        let by_filter = |filter: ConversionFilter| {
            self.lead_conversions
                .iter()
                .filter(|record| record.filter == filter)
                .count()
        };

        RunCounts {
            users: self.stats.users,
            credit_purchases: self.stats.credit_purchases,
            membership_purchases: self.stats.membership_purchases,
            earliest_credits: self.stats.earliest_credits,
            earliest_memberships: self.stats.earliest_memberships,
            conversion_events: self.conversion_events.len(),
            clients,
            leads: self.conversion_events.len() - clients,
            fallback_events: self.stats.fallback_events,
            lead_conversions: self.lead_conversions.len(),
            lead_conversions_membership: by_filter(ConversionFilter::Membership),
            lead_conversions_user_credit: by_filter(ConversionFilter::UserCredit),
            lead_conversions_all: by_filter(ConversionFilter::All),
        }
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            mode: self.mode,
            lead_conversion_source: self.source(),
            counts: self.counts(),
            inputs: self.inputs.clone(),
        }
    }
}
