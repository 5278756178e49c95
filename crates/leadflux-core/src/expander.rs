use tracing::{debug, info};

use crate::composer::first_conversion_type;
use crate::types::{
    ConversionDetails, ConversionEvent, ConversionFilter, ConversionType, LeadConversionRecord,
};

/// Fans every client conversion event out into its filtered report rows.
///
/// Per client: a MEMBERSHIP row when a membership exists, a USER_CREDIT row when a
/// credit pack exists, then one ALL row pointing at whichever came first. Leads
/// produce nothing.
pub fn expand(events: &[ConversionEvent]) -> Vec<LeadConversionRecord> {
    let mut records = Vec::new();

    for event in events {
        if !event.is_client() {
            continue;
        }

        let credit = event.first_credit_pack.as_ref();
        let membership = event.first_membership.as_ref();
        if credit.is_none() && membership.is_none() {
            debug!(user_id = %event.user_id, "client row carries no purchase; skipping");
            continue;
        }

        if membership.is_some() {
            records.push(retarget(
                event,
                ConversionType::Membership,
                ConversionFilter::Membership,
            ));
        }
        if credit.is_some() {
            records.push(retarget(
                event,
                ConversionType::UserCredit,
                ConversionFilter::UserCredit,
            ));
        }

        // Two unknown timestamps tie, and credit wins ties.
        let earliest =
            first_conversion_type(credit, membership).unwrap_or(ConversionType::UserCredit);
        records.push(retarget(event, earliest, ConversionFilter::All));
    }

    let count = |filter: ConversionFilter| records.iter().filter(|r| r.filter == filter).count();
    info!(
        records = records.len(),
        membership = count(ConversionFilter::Membership),
        user_credit = count(ConversionFilter::UserCredit),
        all = count(ConversionFilter::All),
        "expanded lead conversions"
    );

    records
}

fn retarget(
    event: &ConversionEvent,
    conversion_type: ConversionType,
    filter: ConversionFilter,
) -> LeadConversionRecord {
    let mut copy = event.clone();
    copy.conversion = event
        .first_purchase(conversion_type)
        .map(|purchase| ConversionDetails::from_purchase(conversion_type, purchase));
    LeadConversionRecord {
        event: copy,
        filter,
    }
}
