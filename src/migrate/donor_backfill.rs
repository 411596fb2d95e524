use crate::error::Result;
use crate::store::StoreAdapter;
use crate::upgrade::cursor::BatchCursor;
use crate::upgrade::{TaskBody, TaskContext, TaskResult};

use super::{DONOR_EMAIL_KEY, DONOR_ID_KEY, has_value, linked_donor_id, page_result};

pub const TASK_ID: &str = "give_db_healthcheck_donation_donor";
pub const TASK_VERSION: &str = "0.0.2";

/// Links donations that lost their donor id back to the donor with the
/// matching email address.
#[derive(Debug, Default, Clone, Copy)]
pub struct DonorBackfillTask;

impl DonorBackfillTask {
    /// Returns the donor id written, if any. A blank or `0` donor id counts
    /// as missing.
    pub fn link_donation(store: &dyn StoreAdapter, donation_id: u64) -> Result<Option<u64>> {
        if linked_donor_id(store, donation_id)?.is_some() {
            return Ok(None);
        }
        let Some(email) = store
            .get_donation_meta(donation_id, DONOR_EMAIL_KEY)?
            .filter(|e| has_value(e))
        else {
            return Ok(None);
        };
        let Some(donor_id) = store.find_donor_id_by_email(&email)? else {
            tracing::debug!(donation_id, "no donor matches donation email");
            return Ok(None);
        };
        store.set_donation_meta(donation_id, DONOR_ID_KEY, &donor_id.to_string())?;
        Ok(Some(donor_id))
    }
}

impl TaskBody for DonorBackfillTask {
    fn run(&self, cursor: &mut BatchCursor, ctx: &TaskContext<'_>) -> Result<TaskResult> {
        let total = ctx.store.count_donations()?;
        let donations = ctx.store.list_donations(cursor.step, cursor.page_size)?;
        cursor.record_progress(total);
        if donations.is_empty() {
            return Ok(TaskResult::exhausted());
        }

        let mut linked = 0usize;
        for donation in &donations {
            if Self::link_donation(ctx.store, donation.id)?.is_some() {
                linked += 1;
            }
        }
        tracing::info!(donations = donations.len(), linked, "backfilled donation donors");

        Ok(page_result(cursor, donations.len() as u64, 0))
    }
}
