use std::fmt;

use leadflux_parser::{PurchaseEvent, PurchaseKind, Timestamp, User};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadStatus {
    Lead,
    Client,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::Lead => "LEAD",
            LeadStatus::Client => "CLIENT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "LEAD" => Some(LeadStatus::Lead),
            "CLIENT" => Some(LeadStatus::Client),
            _ => None,
        }
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversionType {
    Membership,
    UserCredit,
}

impl ConversionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionType::Membership => "MEMBERSHIP",
            ConversionType::UserCredit => "USER_CREDIT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "MEMBERSHIP" => Some(ConversionType::Membership),
            "USER_CREDIT" => Some(ConversionType::UserCredit),
            _ => None,
        }
    }
}

impl From<PurchaseKind> for ConversionType {
    fn from(kind: PurchaseKind) -> Self {
        match kind {
            PurchaseKind::CreditPack => ConversionType::UserCredit,
            PurchaseKind::Membership => ConversionType::Membership,
        }
    }
}

impl fmt::Display for ConversionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversionFilter {
    Membership,
    UserCredit,
    All,
}

impl ConversionFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionFilter::Membership => "MEMBERSHIP",
            ConversionFilter::UserCredit => "USER_CREDIT",
            ConversionFilter::All => "ALL",
        }
    }
}

impl From<ConversionType> for ConversionFilter {
    fn from(conversion_type: ConversionType) -> Self {
        match conversion_type {
            ConversionType::Membership => ConversionFilter::Membership,
            ConversionType::UserCredit => ConversionFilter::UserCredit,
        }
    }
}

impl fmt::Display for ConversionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The earliest purchase of one kind for a user, as carried in the `first_*` columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseSummary {
    pub id: String,
    pub purchased_at: Option<Timestamp>,
    pub name: Option<String>,
    pub source: Option<String>,
}

impl PurchaseSummary {
    pub fn from_event(event: &PurchaseEvent) -> Option<Self> {
        Some(Self {
            id: event.item_id.clone()?,
            purchased_at: event.purchased_at,
            name: event.details.name.clone(),
            source: event.details.source.clone(),
        })
    }
}

/// The `client_conversion_event_*` block of a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionDetails {
    pub conversion_type: ConversionType,
    pub id: Option<String>,
    pub created_at: Option<Timestamp>,
    pub name: Option<String>,
    pub source: Option<String>,
}

impl ConversionDetails {
    pub fn from_purchase(conversion_type: ConversionType, purchase: &PurchaseSummary) -> Self {
        Self {
            conversion_type,
            id: Some(purchase.id.clone()),
            created_at: purchase.purchased_at,
            name: purchase.name.clone(),
            source: purchase.source.clone(),
        }
    }
}

/// One row of `fct_client_conversion_events`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionEvent {
    pub user_id: String,
    pub branch_id: Option<String>,
    pub local_user_created_at: Option<Timestamp>,
    pub lead_status: LeadStatus,
    pub conversion: Option<ConversionDetails>,
    pub first_membership: Option<PurchaseSummary>,
    pub first_credit_pack: Option<PurchaseSummary>,
}

impl ConversionEvent {
    pub fn lead(user: &User) -> Self {
        Self {
            user_id: user.user_id.clone(),
            branch_id: user.branch_id.clone(),
            local_user_created_at: user.created_at,
            lead_status: LeadStatus::Lead,
            conversion: None,
            first_membership: None,
            first_credit_pack: None,
        }
    }

    pub fn is_client(&self) -> bool {
        self.lead_status == LeadStatus::Client
    }

    pub fn first_purchase(&self, conversion_type: ConversionType) -> Option<&PurchaseSummary> {
        match conversion_type {
            ConversionType::Membership => self.first_membership.as_ref(),
            ConversionType::UserCredit => self.first_credit_pack.as_ref(),
        }
    }
}

/// One row of `fct_lead_conversions`: a conversion event re-pointed at one purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadConversionRecord {
    pub event: ConversionEvent,
    pub filter: ConversionFilter,
}
