//! Duplicate payment-source reconciliation.
//!
//! The processor can hold several source objects for one physical card (one
//! per checkout attempt, for instance). Sources sharing a fingerprint are
//! collapsed onto the first one listed: it becomes the customer's default and
//! the later copies are detached.

pub mod engine;
pub mod task;

pub use engine::ReconciliationEngine;
pub use task::DuplicateSourcesTask;

use std::collections::HashSet;

use serde::Serialize;

use crate::model::PaymentSource;

pub const TASK_ID: &str = "give_stripe_healthcheck_fix_duplicate_card_sources";
pub const TASK_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileError {
    /// Source id or customer id the failure concerns.
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationResult {
    pub donor_id: u64,
    /// `None` when no customer id could be resolved; the donor was skipped.
    pub customer_id: Option<String>,
    pub unique_sources: Vec<PaymentSource>,
    pub duplicate_source_ids: Vec<String>,
    pub default_source_changed: bool,
    pub detached_source_ids: Vec<String>,
    pub errors: Vec<ReconcileError>,
}

impl ReconciliationResult {
    pub fn for_donor(donor_id: u64, customer_id: Option<String>) -> Self {
        Self {
            donor_id,
            customer_id,
            ..Self::default()
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.customer_id.is_none()
    }

    pub(crate) fn push_error(&mut self, subject: &str, message: impl Into<String>) {
        self.errors.push(ReconcileError {
            subject: subject.to_string(),
            message: message.into(),
        });
    }
}

/// Card-style sources follow the `src_` id convention (any case).
pub fn is_card_style(source_id: &str) -> bool {
    source_id
        .get(..4)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("src_"))
}

/// The fingerprint used for deduplication: empty for anything not card-style.
pub fn effective_fingerprint(source: &PaymentSource) -> &str {
    if is_card_style(&source.id) {
        &source.fingerprint
    } else {
        ""
    }
}

/// Split sources into the first occurrence per fingerprint and the ids of
/// every later occurrence, both in list order.
///
/// Sources with an empty effective fingerprint are always kept.
pub fn partition_sources(sources: Vec<PaymentSource>) -> (Vec<PaymentSource>, Vec<String>) {
    let mut seen: HashSet<String> = HashSet::new();
    let mut unique = Vec::with_capacity(sources.len());
    let mut duplicates = Vec::new();

    for source in sources {
        let fingerprint = effective_fingerprint(&source);
        if fingerprint.is_empty() || seen.insert(fingerprint.to_string()) {
            unique.push(source);
        } else {
            duplicates.push(source.id);
        }
    }

    (unique, duplicates)
}
