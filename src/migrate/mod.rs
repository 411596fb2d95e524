//! Rewrites of donation records that predate the meta-table refactor.
//!
//! Each task pages through its input with the batch cursor. The split,
//! backfill and post meta recovery tasks only add missing data and legacy
//! recovery only rewrites values that differ, so a page re-run after an
//! interruption is a no-op.

pub mod donor_backfill;
pub mod payment_meta;
pub mod postmeta_recover;
pub mod recover_meta;

pub use donor_backfill::DonorBackfillTask;
pub use payment_meta::PaymentMetaSplitTask;
pub use postmeta_recover::PostmetaRecoverTask;
pub use recover_meta::LegacyMetaRecoverTask;

use crate::error::Result;
use crate::store::StoreAdapter;
use crate::upgrade::TaskResult;
use crate::upgrade::cursor::BatchCursor;

pub const DONOR_ID_KEY: &str = "_give_payment_donor_id";
pub const DONOR_EMAIL_KEY: &str = "_give_payment_donor_email";
pub const LEGACY_BLOB_KEY: &str = "_give_payment_meta";

/// Pre-refactor key and the key that replaced it.
pub const DEPRECATED_KEYS: [(&str, &str); 3] = [
    ("_give_payment_customer_id", DONOR_ID_KEY),
    ("_give_payment_user_email", DONOR_EMAIL_KEY),
    ("_give_payment_user_ip", "_give_payment_donor_ip"),
];

/// Legacy rows store "no value" as an empty string or `0`.
pub fn has_value(raw: &str) -> bool {
    let raw = raw.trim();
    !raw.is_empty() && raw != "0"
}

/// The donation's donor id, ignoring blank and zero placeholders.
pub fn linked_donor_id(store: &dyn StoreAdapter, donation_id: u64) -> Result<Option<u64>> {
    let raw = store.get_donation_meta(donation_id, DONOR_ID_KEY)?;
    Ok(raw
        .filter(|v| has_value(v))
        .and_then(|v| v.trim().parse().ok()))
}

fn page_result(cursor: &BatchCursor, items_seen: u64, failures: u64) -> TaskResult {
    TaskResult {
        items_seen,
        done: cursor.is_last_page(items_seen),
        failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sqlite::SqliteStore;

    #[test]
    fn placeholders_are_not_values() {
        assert!(!has_value(""));
        assert!(!has_value("  "));
        assert!(!has_value("0"));
        assert!(has_value("12"));
        assert!(has_value("ada@example.org"));
    }

    #[test]
    fn blank_donor_id_reads_as_unlinked() {
        let store = SqliteStore::open_memory().unwrap();
        store.set_donation_meta(1, DONOR_ID_KEY, "").unwrap();
        store.set_donation_meta(2, DONOR_ID_KEY, "0").unwrap();
        store.set_donation_meta(3, DONOR_ID_KEY, "42").unwrap();

        assert_eq!(linked_donor_id(&store, 1).unwrap(), None);
        assert_eq!(linked_donor_id(&store, 2).unwrap(), None);
        assert_eq!(linked_donor_id(&store, 3).unwrap(), Some(42));
        assert_eq!(linked_donor_id(&store, 4).unwrap(), None);
    }
}
