use crate::error::Result;
use crate::store::StoreAdapter;
use crate::upgrade::cursor::BatchCursor;
use crate::upgrade::{TaskBody, TaskContext, TaskResult};

use super::{LEGACY_BLOB_KEY, page_result};

pub const TASK_ID: &str = "give_db_healthcheck_003_recover_old_paymentdata";
pub const TASK_VERSION: &str = "0.0.3";

/// Copies each donation's post meta rows into donation meta. Keys the
/// donation already has are left alone, and the combined blob is never
/// copied since the split task owns it.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostmetaRecoverTask;

impl PostmetaRecoverTask {
    /// Returns the number of donation meta keys added.
    pub fn recover_donation(store: &dyn StoreAdapter, donation_id: u64) -> Result<u64> {
        let mut added = 0;
        for row in store.list_payment_postmeta(donation_id)? {
            if row.meta_key == LEGACY_BLOB_KEY {
                continue;
            }
            if store.add_donation_meta(donation_id, &row.meta_key, &row.meta_value)? {
                added += 1;
            }
        }
        Ok(added)
    }
}

impl TaskBody for PostmetaRecoverTask {
    fn run(&self, cursor: &mut BatchCursor, ctx: &TaskContext<'_>) -> Result<TaskResult> {
        let total = ctx.store.count_donations()?;
        let donations = ctx.store.list_donations(cursor.step, cursor.page_size)?;
        cursor.record_progress(total);
        if donations.is_empty() {
            return Ok(TaskResult::exhausted());
        }

        let mut added: u64 = 0;
        for donation in &donations {
            added += Self::recover_donation(ctx.store, donation.id)?;
        }
        tracing::info!(donations = donations.len(), added, "recovered donation post meta");

        Ok(page_result(cursor, donations.len() as u64, 0))
    }
}
