use serde_json::{Map, Value};

use crate::error::Result;
use crate::observe::EventCategory;
use crate::store::StoreAdapter;
use crate::upgrade::cursor::BatchCursor;
use crate::upgrade::{TaskBody, TaskContext, TaskResult};

use super::{
    DEPRECATED_KEYS, DONOR_ID_KEY, LEGACY_BLOB_KEY, has_value, linked_donor_id, page_result,
};

pub const TASK_ID: &str = "give_db_healthcheck_post_200_data";
pub const TASK_VERSION: &str = "0.0.1";

/// Blob field and the meta key it is stored under after the split.
const BLOB_FIELDS: [(&str, &str); 7] = [
    ("key", "_give_payment_purchase_key"),
    ("email", "_give_payment_donor_email"),
    ("form_id", "_give_payment_form_id"),
    ("form_title", "_give_payment_form_title"),
    ("price_id", "_give_payment_price_id"),
    ("currency", "_give_payment_currency"),
    ("date", "_give_payment_date"),
];

const USER_INFO_FIELDS: [(&str, &str); 2] = [
    ("first_name", "_give_donor_billing_first_name"),
    ("last_name", "_give_donor_billing_last_name"),
];

/// Address part and the donation meta key it is read from.
const BILLING_ADDRESS_FIELDS: [(&str, &str); 6] = [
    ("line1", "_give_donor_billing_address1"),
    ("line2", "_give_donor_billing_address2"),
    ("city", "_give_donor_billing_city"),
    ("state", "_give_donor_billing_state"),
    ("zip", "_give_donor_billing_zip"),
    ("country", "_give_donor_billing_country"),
];

/// Donor meta key for one part of the `index`th billing address.
pub fn billing_address_key(part: &str, index: usize) -> String {
    format!("_give_donor_address_billing_{part}_{index}")
}

/// Splits the combined `_give_payment_meta` JSON blob into individual keys and
/// copies deprecated keys to their replacements.
#[derive(Debug, Default, Clone, Copy)]
pub struct PaymentMetaSplitTask;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SplitSummary {
    pub written: u64,
    pub skipped_refactored: bool,
    /// A billing address was added to the linked donor.
    pub address_saved: bool,
}

impl PaymentMetaSplitTask {
    /// Rewrite one donation. A malformed blob comes back as the problem
    /// message; the deprecated-key copy still runs in that case.
    pub fn rewrite_donation(
        store: &dyn StoreAdapter,
        donation_id: u64,
    ) -> Result<(SplitSummary, Option<String>)> {
        let mut summary = SplitSummary::default();
        if store.get_donation_meta(donation_id, DONOR_ID_KEY)?.is_some() {
            summary.skipped_refactored = true;
            return Ok((summary, None));
        }

        let mut problem = None;
        if let Some(raw) = store.get_donation_meta(donation_id, LEGACY_BLOB_KEY)? {
            match split_blob(&raw) {
                Ok(fields) => {
                    for (key, value) in fields {
                        if store.add_donation_meta(donation_id, key, &value)? {
                            summary.written += 1;
                        }
                    }
                }
                Err(message) => problem = Some(message),
            }
        }

        for (old_key, new_key) in DEPRECATED_KEYS {
            let Some(value) = store
                .get_donation_meta(donation_id, old_key)?
                .filter(|v| has_value(v))
            else {
                continue;
            };
            if store.add_donation_meta(donation_id, new_key, &value)? {
                summary.written += 1;
            }
        }

        if let Some(donor_id) = linked_donor_id(store, donation_id)? {
            summary.address_saved = Self::save_billing_address(store, donation_id, donor_id)?;
        }

        Ok((summary, problem))
    }

    /// Append the donation's billing address to the donor's address list.
    /// Empty addresses, unknown donors and addresses the donor already has
    /// are skipped.
    pub fn save_billing_address(
        store: &dyn StoreAdapter,
        donation_id: u64,
        donor_id: u64,
    ) -> Result<bool> {
        let mut address = Vec::with_capacity(BILLING_ADDRESS_FIELDS.len());
        for (part, key) in BILLING_ADDRESS_FIELDS {
            let value = store.get_donation_meta(donation_id, key)?.unwrap_or_default();
            address.push((part, value));
        }
        if address.iter().all(|(_, v)| v.trim().is_empty()) || !store.donor_exists(donor_id)? {
            return Ok(false);
        }

        let mut index = 0;
        loop {
            let mut stored = Vec::with_capacity(address.len());
            for (part, _) in &address {
                stored.push(store.get_donor_meta(donor_id, &billing_address_key(part, index))?);
            }
            if stored.iter().all(Option::is_none) {
                break;
            }
            let same = address
                .iter()
                .zip(&stored)
                .all(|((_, want), have)| have.as_deref().unwrap_or("") == want.as_str());
            if same {
                return Ok(false);
            }
            index += 1;
        }

        for (part, value) in &address {
            store.set_donor_meta(donor_id, &billing_address_key(part, index), value)?;
        }
        tracing::debug!(donation_id, donor_id, index, "saved billing address");
        Ok(true)
    }
}

impl TaskBody for PaymentMetaSplitTask {
    fn run(&self, cursor: &mut BatchCursor, ctx: &TaskContext<'_>) -> Result<TaskResult> {
        let total = ctx.store.count_donations()?;
        let donations = ctx.store.list_donations(cursor.step, cursor.page_size)?;
        cursor.record_progress(total);
        if donations.is_empty() {
            return Ok(TaskResult::exhausted());
        }

        let mut failures: u64 = 0;
        let mut written: u64 = 0;
        for donation in &donations {
            let (summary, problem) = Self::rewrite_donation(ctx.store, donation.id)?;
            written += summary.written;
            if let Some(message) = problem {
                failures += 1;
                ctx.sink.record(
                    EventCategory::Migration,
                    &format!("donation {}: {message}", donation.id),
                );
            }
        }
        tracing::info!(donations = donations.len(), written, failures, "split legacy payment meta");

        Ok(page_result(cursor, donations.len() as u64, failures))
    }
}

/// Flatten the blob into `(meta key, value)` pairs. Unknown fields are ignored.
pub fn split_blob(raw: &str) -> std::result::Result<Vec<(&'static str, String)>, String> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let value: Value =
        serde_json::from_str(raw).map_err(|e| format!("unreadable {LEGACY_BLOB_KEY}: {e}"))?;
    let Value::Object(obj) = value else {
        return Err(format!("{LEGACY_BLOB_KEY} is not an object"));
    };

    let mut fields = Vec::new();
    collect(&obj, &BLOB_FIELDS, &mut fields);
    if let Some(Value::Object(user_info)) = obj.get("user_info") {
        collect(user_info, &USER_INFO_FIELDS, &mut fields);
    }
    Ok(fields)
}

fn collect(
    obj: &Map<String, Value>,
    mapping: &[(&str, &'static str)],
    out: &mut Vec<(&'static str, String)>,
) {
    for (field, key) in mapping {
        let text = match obj.get(*field) {
            None | Some(Value::Null) => continue,
            Some(Value::String(s)) if s.is_empty() => continue,
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };
        out.push((*key, text));
    }
}
