use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use leadflux_parser::{PurchaseEvent, PurchaseKind, Timestamp};
use tracing::{debug, info};

/// Earliest purchase per user for one purchase stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EarliestPurchaseIndex {
    by_user: HashMap<String, PurchaseEvent>,
}

impl EarliestPurchaseIndex {
    pub fn get(&self, user_id: &str) -> Option<&PurchaseEvent> {
        self.by_user.get(user_id)
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.by_user.contains_key(user_id)
    }

    pub fn len(&self) -> usize {
        self.by_user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_user.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PurchaseEvent)> {
        self.by_user
            .iter()
            .map(|(user_id, event)| (user_id.as_str(), event))
    }
}

/// Orders purchase times with unknown timestamps after every known one.
pub fn compare_purchase_times(a: Option<Timestamp>, b: Option<Timestamp>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Folds a purchase stream down to the earliest event per user.
///
/// Events without a user id or item id are skipped. An event replaces the retained one
/// only when it is strictly earlier, so the first-seen event wins exact ties.
pub fn select_earliest<I>(events: I) -> EarliestPurchaseIndex
where
    I: IntoIterator<Item = PurchaseEvent>,
{
    let mut by_user: HashMap<String, PurchaseEvent> = HashMap::new();
    let mut kind: Option<PurchaseKind> = None;
    let mut skipped = 0usize;

    for event in events {
        kind.get_or_insert(event.kind);

        let user_id = match (&event.user_id, &event.item_id) {
            (Some(user_id), Some(_)) => user_id.clone(),
            (user_id, _) => {
                debug!(
                    kind = %event.kind,
                    user_id = user_id.as_deref().unwrap_or(""),
                    "skipping purchase without user or item id"
                );
                skipped += 1;
                continue;
            }
        };

        match by_user.entry(user_id) {
            Entry::Occupied(mut slot) => {
                if compare_purchase_times(event.purchased_at, slot.get().purchased_at)
                    == Ordering::Less
                {
                    slot.insert(event);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(event);
            }
        }
    }

    info!(
        kind = kind.map(|k| k.as_str()).unwrap_or("unknown"),
        users = by_user.len(),
        skipped,
        "selected earliest purchases"
    );

    EarliestPurchaseIndex { by_user }
}
