use leadflux_core::composer::compose;
use leadflux_core::earliest::{select_earliest, EarliestPurchaseIndex};
use leadflux_core::types::{ConversionType, LeadStatus};
use leadflux_parser::{
    normalize_timestamp, PurchaseDetails, PurchaseEvent, PurchaseKind, Timestamp, User,
};

fn ts(raw: &str) -> Timestamp {
    normalize_timestamp(raw).expect("valid timestamp")
}

fn user(user_id: &str) -> User {
    User {
        user_id: user_id.to_string(),
        branch_id: Some("B1".to_string()),
        created_at: Some(ts("2023-12-01T00:00:00")),
    }
}

fn purchase(kind: PurchaseKind, user_id: &str, item_id: &str, at: Option<&str>) -> PurchaseEvent {
    PurchaseEvent {
        kind,
        user_id: Some(user_id.to_string()),
        item_id: Some(item_id.to_string()),
        purchased_at: at.map(ts),
        details: PurchaseDetails {
            name: Some(format!("{item_id} name")),
            source: Some(format!("{item_id} source")),
        },
    }
}

fn credits(events: Vec<PurchaseEvent>) -> EarliestPurchaseIndex {
    select_earliest(events)
}

fn memberships(events: Vec<PurchaseEvent>) -> EarliestPurchaseIndex {
    select_earliest(events)
}

#[test]
fn earlier_membership_is_the_conversion_event() {
    let users = vec![user("U1"), user("U2")];
    let credit_index = credits(vec![purchase(
        PurchaseKind::CreditPack,
        "U1",
        "CP-1",
        Some("2024-01-10T00:00:00.000"),
    )]);
    let membership_index = memberships(vec![purchase(
        PurchaseKind::Membership,
        "U1",
        "M-1",
        Some("2024-01-05T00:00:00.000"),
    )]);

    let events = compose(&users, &credit_index, &membership_index);

    let u1 = &events[0];
    assert_eq!(u1.lead_status, LeadStatus::Client);
    let conversion = u1.conversion.as_ref().expect("conversion event");
    assert_eq!(conversion.conversion_type, ConversionType::Membership);
    assert_eq!(conversion.id.as_deref(), Some("M-1"));
    assert_eq!(conversion.created_at, Some(ts("2024-01-05T00:00:00.000")));
    assert_eq!(conversion.name.as_deref(), Some("M-1 name"));
    assert_eq!(u1.first_credit_pack.as_ref().map(|c| c.id.as_str()), Some("CP-1"));
    assert_eq!(u1.first_membership.as_ref().map(|m| m.id.as_str()), Some("M-1"));

    let u2 = &events[1];
    assert_eq!(u2.lead_status, LeadStatus::Lead);
    assert!(u2.conversion.is_none());
    assert!(u2.first_credit_pack.is_none());
    assert!(u2.first_membership.is_none());
    assert_eq!(u2.branch_id.as_deref(), Some("B1"));
}

#[test]
fn equal_timestamps_resolve_to_credit() {
    let users = vec![user("U1")];
    let at = Some("2024-03-01T12:00:00");
    let events = compose(
        &users,
        &credits(vec![purchase(PurchaseKind::CreditPack, "U1", "CP-1", at)]),
        &memberships(vec![purchase(PurchaseKind::Membership, "U1", "M-1", at)]),
    );

    let conversion = events[0].conversion.as_ref().expect("conversion event");
    assert_eq!(conversion.conversion_type, ConversionType::UserCredit);
    assert_eq!(conversion.id.as_deref(), Some("CP-1"));
}

#[test]
fn single_purchase_fills_both_slots() {
    let users = vec![user("U1"), user("U2")];
    let events = compose(
        &users,
        &credits(vec![purchase(
            PurchaseKind::CreditPack,
            "U1",
            "CP-1",
            Some("2024-01-01T00:00:00"),
        )]),
        &memberships(vec![purchase(
            PurchaseKind::Membership,
            "U2",
            "M-2",
            Some("2024-01-02T00:00:00"),
        )]),
    );

    let u1 = &events[0];
    assert_eq!(u1.lead_status, LeadStatus::Client);
    assert_eq!(
        u1.conversion.as_ref().map(|c| c.conversion_type),
        Some(ConversionType::UserCredit)
    );
    assert!(u1.first_membership.is_none());

    let u2 = &events[1];
    assert_eq!(
        u2.conversion.as_ref().map(|c| c.conversion_type),
        Some(ConversionType::Membership)
    );
    assert_eq!(
        u2.conversion.as_ref().and_then(|c| c.source.as_deref()),
        Some("M-2 source")
    );
    assert!(u2.first_credit_pack.is_none());
}

#[test]
fn known_timestamp_beats_unknown_one() {
    let users = vec![user("U1")];
    let events = compose(
        &users,
        &credits(vec![purchase(PurchaseKind::CreditPack, "U1", "CP-1", None)]),
        &memberships(vec![purchase(
            PurchaseKind::Membership,
            "U1",
            "M-1",
            Some("2024-06-01T00:00:00"),
        )]),
    );

    assert_eq!(
        events[0].conversion.as_ref().map(|c| c.conversion_type),
        Some(ConversionType::Membership)
    );
}

#[test]
fn both_unknown_timestamps_leave_a_client_without_conversion() {
    let users = vec![user("U1")];
    let events = compose(
        &users,
        &credits(vec![purchase(PurchaseKind::CreditPack, "U1", "CP-1", None)]),
        &memberships(vec![purchase(PurchaseKind::Membership, "U1", "M-1", None)]),
    );

    let event = &events[0];
    assert_eq!(event.lead_status, LeadStatus::Client);
    assert!(event.conversion.is_none());
    assert!(event.first_credit_pack.is_some());
    assert!(event.first_membership.is_some());
}

#[test]
fn preserves_roster_cardinality_and_order() {
    let users: Vec<User> = ["U5", "U1", "U3", "U2", "U4"].into_iter().map(user).collect();
    let events = compose(
        &users,
        &credits(vec![
            purchase(PurchaseKind::CreditPack, "U1", "CP-1", Some("2024-01-01T00:00:00")),
            purchase(PurchaseKind::CreditPack, "U9", "CP-9", Some("2024-01-01T00:00:00")),
        ]),
        &EarliestPurchaseIndex::default(),
    );

    assert_eq!(events.len(), users.len());
    let ids: Vec<&str> = events.iter().map(|e| e.user_id.as_str()).collect();
    assert_eq!(ids, vec!["U5", "U1", "U3", "U2", "U4"]);
    assert_eq!(
        events.iter().filter(|e| e.lead_status == LeadStatus::Client).count(),
        1
    );

    let empty = compose(&[], &EarliestPurchaseIndex::default(), &EarliestPurchaseIndex::default());
    assert!(empty.is_empty());
}

#[test]
fn composing_twice_is_identical() {
    let users = vec![user("U1"), user("U2"), user("U3")];
    let credit_index = credits(vec![
        purchase(PurchaseKind::CreditPack, "U1", "CP-1", Some("2024-01-10T00:00:00")),
        purchase(PurchaseKind::CreditPack, "U3", "CP-3", Some("2024-01-01T00:00:00")),
    ]);
    let membership_index = memberships(vec![purchase(
        PurchaseKind::Membership,
        "U1",
        "M-1",
        Some("2024-01-05T00:00:00"),
    )]);

    let first = compose(&users, &credit_index, &membership_index);
    let second = compose(&users, &credit_index, &membership_index);
    assert_eq!(first, second);
}
