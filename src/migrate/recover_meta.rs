use crate::error::Result;
use crate::store::StoreAdapter;
use crate::upgrade::cursor::BatchCursor;
use crate::upgrade::{TaskBody, TaskContext, TaskResult};
use crate::model::LegacyMetaRow;

use super::page_result;

pub const TASK_ID: &str = "give_db_healthcheck_220_recover_donationmeta";
pub const TASK_VERSION: &str = "0.0.3";
/// Upgrade id the recovered data supersedes; completed alongside this task.
pub const SUPERSEDED_TASK_ID: &str = "v220_rename_donation_meta_type";

/// Copies rows from the legacy payment meta table into donation meta where
/// the donation meta value is missing or differs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LegacyMetaRecoverTask;

impl LegacyMetaRecoverTask {
    /// Returns whether the row changed donation meta.
    pub fn recover_row(store: &dyn StoreAdapter, row: &LegacyMetaRow) -> Result<bool> {
        if row.meta_value.is_empty() {
            return Ok(false);
        }
        let existing = store.get_donation_meta(row.donation_id, &row.meta_key)?;
        if existing.as_deref() == Some(row.meta_value.as_str()) {
            return Ok(false);
        }
        store.set_donation_meta(row.donation_id, &row.meta_key, &row.meta_value)?;
        Ok(true)
    }
}

impl TaskBody for LegacyMetaRecoverTask {
    fn run(&self, cursor: &mut BatchCursor, ctx: &TaskContext<'_>) -> Result<TaskResult> {
        let total = ctx.store.count_legacy_meta()?;
        let rows = ctx.store.list_legacy_meta(cursor.step, cursor.page_size)?;
        cursor.record_progress(total);
        if rows.is_empty() {
            return Ok(TaskResult::exhausted());
        }

        let mut recovered = 0usize;
        for row in &rows {
            if Self::recover_row(ctx.store, row)? {
                recovered += 1;
            }
        }
        tracing::info!(rows = rows.len(), recovered, "recovered legacy donation meta");

        Ok(page_result(cursor, rows.len() as u64, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sqlite::SqliteStore;

    fn row(donation_id: u64, key: &str, value: &str) -> LegacyMetaRow {
        LegacyMetaRow {
            meta_id: 1,
            donation_id,
            meta_key: key.into(),
            meta_value: value.into(),
        }
    }

    #[test]
    fn differing_values_are_restored() {
        let store = SqliteStore::open_memory().unwrap();
        store.set_donation_meta(5, "_give_payment_total", "0").unwrap();

        assert!(LegacyMetaRecoverTask::recover_row(&store, &row(5, "_give_payment_total", "25.00")).unwrap());
        assert_eq!(
            store.get_donation_meta(5, "_give_payment_total").unwrap().as_deref(),
            Some("25.00")
        );
        assert!(!LegacyMetaRecoverTask::recover_row(&store, &row(5, "_give_payment_total", "25.00")).unwrap());
    }

    #[test]
    fn empty_legacy_values_are_skipped() {
        let store = SqliteStore::open_memory().unwrap();
        store.set_donation_meta(5, "_give_payment_mode", "live").unwrap();
        assert!(!LegacyMetaRecoverTask::recover_row(&store, &row(5, "_give_payment_mode", "")).unwrap());
        assert_eq!(
            store.get_donation_meta(5, "_give_payment_mode").unwrap().as_deref(),
            Some("live")
        );
    }
}
