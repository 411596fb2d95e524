use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Meta key holding the processor customer id, on both donors and donations.
pub const CUSTOMER_ID_META_KEY: &str = "_give_stripe_customer_id";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[clap(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl std::fmt::Display for SortOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Asc => write!(f, "asc"),
            Self::Desc => write!(f, "desc"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Donor {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Donation ids in the order the donor record stores them. Not re-sorted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub payment_ids: Vec<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_customer_id: Option<String>,
}

impl Donor {
    /// The donation treated as most recent: the last stored id.
    pub fn latest_payment_id(&self) -> Option<u64> {
        self.payment_ids.last().copied()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Donation {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub donor_id: Option<u64>,
    pub created_at: DateTime<Utc>,
}

/// A row of the pre-refactor payment meta table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LegacyMetaRow {
    pub meta_id: u64,
    pub donation_id: u64,
    pub meta_key: String,
    pub meta_value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentSource {
    pub id: String,
    #[serde(default)]
    pub fingerprint: String,
    #[serde(default)]
    pub is_default: bool,
}

impl PaymentSource {
    pub fn new(id: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fingerprint: fingerprint.into(),
            is_default: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Customer {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_source_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionRecord {
    pub task_id: String,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordedEvent {
    pub id: u64,
    pub category: String,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_payment_id_uses_stored_order() {
        let donor = Donor {
            id: 1,
            email: None,
            payment_ids: vec![30, 10, 20],
            external_customer_id: None,
        };
        assert_eq!(donor.latest_payment_id(), Some(20));
    }

    #[test]
    fn donor_without_payments_has_no_latest() {
        let donor = Donor {
            id: 1,
            email: None,
            payment_ids: vec![],
            external_customer_id: None,
        };
        assert_eq!(donor.latest_payment_id(), None);
    }
}
