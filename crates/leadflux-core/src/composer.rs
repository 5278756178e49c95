use std::cmp::Ordering;

use leadflux_parser::User;
use tracing::{info, warn};

use crate::earliest::{compare_purchase_times, EarliestPurchaseIndex};
use crate::types::{
    ConversionDetails, ConversionEvent, ConversionType, LeadStatus, PurchaseSummary,
};

/// Decides which of a user's first purchases marks the conversion.
///
/// Credit wins when its timestamp is earlier than or equal to the membership's. An
/// unknown timestamp sorts last; when both are unknown the result is `None`.
pub fn first_conversion_type(
    credit: Option<&PurchaseSummary>,
    membership: Option<&PurchaseSummary>,
) -> Option<ConversionType> {
    match (credit, membership) {
        (None, None) => None,
        (Some(_), None) => Some(ConversionType::UserCredit),
        (None, Some(_)) => Some(ConversionType::Membership),
        (Some(credit), Some(membership)) => {
            if credit.purchased_at.is_none() && membership.purchased_at.is_none() {
                return None;
            }
            match compare_purchase_times(credit.purchased_at, membership.purchased_at) {
                Ordering::Greater => Some(ConversionType::Membership),
                Ordering::Less | Ordering::Equal => Some(ConversionType::UserCredit),
            }
        }
    }
}

/// Builds one conversion event per roster entry, in roster order.
pub fn compose(
    users: &[User],
    earliest_credits: &EarliestPurchaseIndex,
    earliest_memberships: &EarliestPurchaseIndex,
) -> Vec<ConversionEvent> {
    let events: Vec<ConversionEvent> = users
        .iter()
        .map(|user| compose_user(user, earliest_credits, earliest_memberships))
        .collect();

    let clients = events.iter().filter(|event| event.is_client()).count();
    info!(
        events = events.len(),
        clients,
        leads = events.len() - clients,
        "composed client conversion events"
    );

    events
}

fn compose_user(
    user: &User,
    earliest_credits: &EarliestPurchaseIndex,
    earliest_memberships: &EarliestPurchaseIndex,
) -> ConversionEvent {
    let mut event = ConversionEvent::lead(user);
    event.first_credit_pack = earliest_credits
        .get(&user.user_id)
        .and_then(PurchaseSummary::from_event);
    event.first_membership = earliest_memberships
        .get(&user.user_id)
        .and_then(PurchaseSummary::from_event);

    if event.first_credit_pack.is_none() && event.first_membership.is_none() {
        return event;
    }

    // Any qualifying purchase makes a client, comparable timestamps or not.
    event.lead_status = LeadStatus::Client;
    event.conversion = first_conversion_type(
        event.first_credit_pack.as_ref(),
        event.first_membership.as_ref(),
    )
    .and_then(|conversion_type| {
        event
            .first_purchase(conversion_type)
            .map(|purchase| ConversionDetails::from_purchase(conversion_type, purchase))
    });

    if event.conversion.is_none() {
        warn!(
            user_id = %user.user_id,
            "client has credit and membership purchases without comparable timestamps"
        );
    }

    event
}
