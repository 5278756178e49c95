use std::path::PathBuf;

use leadflux_core::config::InputPaths;
use leadflux_core::fallback::{CsvFallbackSource, FallbackSource};
use leadflux_core::pipelines::{
    run_fallback_only, run_pipeline, LeadConversionSource, LeadConversionState, PipelineInputs,
    RunMode,
};
use leadflux_core::types::{ConversionEvent, ConversionFilter, ConversionType, LeadStatus};
use leadflux_parser::User;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../leadflux-parser/tests/data")
        .join(name)
}

fn fixture_inputs() -> InputPaths {
    InputPaths {
        dim_user: fixture("dim_user.csv"),
        fct_credit_pack_purchases: fixture("fct_credit_pack_purchases.csv"),
        fct_membership_purchases: fixture("fct_membership_purchases.csv"),
        fct_client_conversion_events_part_2: fixture("fct_client_conversion_events_part_2.csv"),
    }
}

/// Counts how often it was asked for events.
struct RecordingFallback {
    events: Vec<ConversionEvent>,
    calls: std::cell::Cell<usize>,
}

impl FallbackSource for RecordingFallback {
    fn name(&self) -> &str {
        "recording"
    }

    fn load(&self) -> Vec<ConversionEvent> {
        self.calls.set(self.calls.get() + 1);
        self.events.clone()
    }
}

fn empty_fallback() -> RecordingFallback {
    RecordingFallback {
        events: Vec::new(),
        calls: std::cell::Cell::new(0),
    }
}

#[test]
fn end_to_end_over_fixture_tables() {
    let inputs = PipelineInputs::load(&fixture_inputs()).expect("inputs load");
    assert_eq!(inputs.users.len(), 4);
    assert_eq!(inputs.credit_purchases.len(), 7);
    assert_eq!(inputs.membership_purchases.len(), 3);

    let fallback = empty_fallback();
    let run = run_pipeline(inputs, &fallback);

    assert_eq!(run.mode, RunMode::Full);
    assert_eq!(run.state, LeadConversionState::Done(LeadConversionSource::Primary));
    assert_eq!(fallback.calls.get(), 0);
    assert_eq!(run.conversion_events.len(), 4);

    let by_user = |id: &str| {
        run.conversion_events
            .iter()
            .find(|event| event.user_id == id)
            .expect("user present")
    };

    let u1 = by_user("U1").conversion.as_ref().expect("U1 converted");
    assert_eq!(u1.conversion_type, ConversionType::Membership);
    assert_eq!(u1.id.as_deref(), Some("M-1"));
    assert_eq!(u1.name.as_deref(), Some("Monthly Unlimited"));

    let u2 = by_user("U2");
    assert_eq!(u2.lead_status, LeadStatus::Lead);
    assert!(u2.conversion.is_none());

    let u3 = by_user("U3");
    let u3_conversion = u3.conversion.as_ref().expect("U3 converted");
    assert_eq!(u3_conversion.conversion_type, ConversionType::Membership);
    assert_eq!(u3_conversion.id.as_deref(), Some("M-4"));
    assert_eq!(
        u3.first_credit_pack.as_ref().map(|c| c.id.as_str()),
        Some("CP-30")
    );

    let u4 = by_user("U4");
    assert!(u4.local_user_created_at.is_none());
    let u4_conversion = u4.conversion.as_ref().expect("U4 converted");
    assert_eq!(u4_conversion.conversion_type, ConversionType::UserCredit);
    assert_eq!(u4_conversion.id.as_deref(), Some("CP-40"));
    assert!(u4_conversion.name.is_none());

    assert_eq!(run.lead_conversions.len(), 8);
    let counts = run.counts();
    assert_eq!(counts.clients, 3);
    assert_eq!(counts.leads, 1);
    assert_eq!(counts.earliest_credits, 3);
    assert_eq!(counts.earliest_memberships, 2);
    assert_eq!(counts.lead_conversions_membership, 2);
    assert_eq!(counts.lead_conversions_user_credit, 3);
    assert_eq!(counts.lead_conversions_all, 3);
    assert_eq!(counts.fallback_events, 0);

    assert_eq!(run.inputs.len(), 3);
    assert!(run.inputs.iter().all(|digest| digest.blake3.is_some()));
}

#[test]
fn falls_back_when_no_user_converted() {
    let inputs = PipelineInputs {
        users: vec![User {
            user_id: "U1".to_string(),
            branch_id: None,
            created_at: None,
        }],
        ..PipelineInputs::default()
    };
    let fallback = CsvFallbackSource::new(fixture("fct_client_conversion_events_part_2.csv"));

    let run = run_pipeline(inputs, &fallback);

    assert_eq!(run.state, LeadConversionState::Done(LeadConversionSource::Fallback));
    assert_eq!(run.conversion_events.len(), 1);
    assert_eq!(run.stats.fallback_events, 3);
    assert_eq!(run.lead_conversions.len(), 5);

    let f1: Vec<_> = run
        .lead_conversions
        .iter()
        .filter(|record| record.event.user_id == "F1")
        .collect();
    assert_eq!(f1.len(), 3);
    assert_eq!(f1[2].filter, ConversionFilter::All);
    assert_eq!(
        f1[2].event.conversion.as_ref().map(|c| c.conversion_type),
        Some(ConversionType::Membership)
    );

    let f2_filters: Vec<_> = run
        .lead_conversions
        .iter()
        .filter(|record| record.event.user_id == "F2")
        .map(|record| record.filter)
        .collect();
    assert_eq!(f2_filters, vec![ConversionFilter::UserCredit, ConversionFilter::All]);
}

#[test]
fn missing_fallback_ends_in_failure() {
    let fallback = CsvFallbackSource::new(fixture("does_not_exist.csv"));
    let run = run_pipeline(PipelineInputs::default(), &fallback);

    assert_eq!(run.state, LeadConversionState::Failed);
    assert!(run.source().is_none());
    assert!(run.lead_conversions.is_empty());
    assert!(run.conversion_events.is_empty());
}

#[test]
fn fallback_only_skips_primary_path() {
    let fallback = CsvFallbackSource::new(fixture("fct_client_conversion_events_part_2.csv"));
    let run = run_fallback_only(&fallback);

    assert_eq!(run.mode, RunMode::FallbackOnly);
    assert_eq!(run.source(), Some(LeadConversionSource::Fallback));
    assert!(run.conversion_events.is_empty());
    assert_eq!(run.lead_conversions.len(), 5);
}

#[test]
fn missing_inputs_load_as_empty_tables() {
    let paths = InputPaths {
        dim_user: fixture("missing_dim_user.csv"),
        fct_credit_pack_purchases: fixture("missing_credit.csv"),
        fct_membership_purchases: fixture("fct_membership_purchases.csv"),
        fct_client_conversion_events_part_2: fixture("missing_part_2.csv"),
    };

    let inputs = PipelineInputs::load(&paths).expect("missing files are not errors");
    assert!(inputs.users.is_empty());
    assert!(inputs.credit_purchases.is_empty());
    assert_eq!(inputs.membership_purchases.len(), 3);

    let digests: Vec<_> = inputs
        .digests
        .iter()
        .map(|digest| (digest.table.as_str(), digest.rows, digest.blake3.is_some()))
        .collect();
    assert_eq!(
        digests,
        vec![
            ("dim_user", 0, false),
            ("fct_credit_pack_purchases", 0, false),
            ("fct_membership_purchases", 3, true),
        ]
    );
}

#[test]
fn summary_reports_source_and_counts() {
    let inputs = PipelineInputs::load(&fixture_inputs()).expect("inputs load");
    let run = run_pipeline(inputs, &empty_fallback());
    let summary = run.summary();

    assert_eq!(summary.lead_conversion_source, Some(LeadConversionSource::Primary));
    assert_eq!(summary.counts, run.counts());

    let json = serde_json::to_value(&summary).expect("summary serializes");
    assert_eq!(json["mode"], "full");
    assert_eq!(json["lead_conversion_source"], "primary");
    assert_eq!(json["counts"]["lead_conversions"], 8);
}
