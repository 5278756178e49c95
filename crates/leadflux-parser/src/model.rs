use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::record::Record;
use crate::timestamp::Timestamp;

pub const USER_TIMESTAMP_COLUMNS: &[&str] = &["created_at"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub user_id: String,
    pub branch_id: Option<String>,
    pub created_at: Option<Timestamp>,
}

impl User {
    /// Builds a roster entry; rows without a `user_id` are not users.
    pub fn from_record(record: &Record) -> Option<Self> {
        let Some(user_id) = record.owned_text("user_id") else {
            warn!("skipping user row without user_id");
            return None;
        };

        Some(Self {
            user_id,
            branch_id: record.owned_text("branch_id"),
            created_at: record.timestamp("created_at"),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PurchaseKind {
    CreditPack,
    Membership,
}

impl PurchaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseKind::CreditPack => "credit_pack",
            PurchaseKind::Membership => "membership",
        }
    }

    pub fn id_column(&self) -> &'static str {
        match self {
            PurchaseKind::CreditPack => "credit_pack_id",
            PurchaseKind::Membership => "membership_id",
        }
    }

    pub fn purchased_at_column(&self) -> &'static str {
        match self {
            PurchaseKind::CreditPack => "credit_pack_purchased_at",
            PurchaseKind::Membership => "membership_purchased_at",
        }
    }

    pub fn details_column(&self) -> &'static str {
        match self {
            PurchaseKind::CreditPack => "credit_pack_purchase_details",
            PurchaseKind::Membership => "membership_purchase_details",
        }
    }

    pub fn timestamp_columns(&self) -> &'static [&'static str] {
        match self {
            PurchaseKind::CreditPack => &["credit_pack_purchased_at"],
            PurchaseKind::Membership => &["membership_purchased_at"],
        }
    }
}

impl fmt::Display for PurchaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurchaseDetails {
    pub name: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseEvent {
    pub kind: PurchaseKind,
    pub user_id: Option<String>,
    pub item_id: Option<String>,
    /// `None` when the source value was missing or unparsable.
    pub purchased_at: Option<Timestamp>,
    pub details: PurchaseDetails,
}

impl PurchaseEvent {
    pub fn from_record(kind: PurchaseKind, record: &Record) -> Self {
        let details_column = kind.details_column();
        Self {
            kind,
            user_id: record.owned_text("user_id"),
            item_id: record.owned_text(kind.id_column()),
            purchased_at: record.timestamp(kind.purchased_at_column()),
            details: PurchaseDetails {
                name: record.detail_text(details_column, "name"),
                source: record.detail_text(details_column, "source"),
            },
        }
    }
}
