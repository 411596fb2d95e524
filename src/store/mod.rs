//! Access to donor, donation, metadata and task-state records.
//!
//! The upgrade machinery and the task bodies only ever talk to
//! [`StoreAdapter`]; [`sqlite::SqliteStore`] is the concrete adapter the CLI
//! uses.

pub mod lock;
pub mod sqlite;
pub mod workspace;

use crate::error::Result;
use crate::model::{CompletionRecord, Donation, Donor, LegacyMetaRow, RecordedEvent, SortOrder};
use crate::upgrade::cursor::BatchCursor;

pub trait StoreAdapter {
    /// Page of donors, `page` is 1-based.
    fn list_donors(&self, page: u64, page_size: u64, order: SortOrder) -> Result<Vec<Donor>>;
    fn count_donors(&self) -> Result<u64>;
    fn get_donor_meta(&self, donor_id: u64, key: &str) -> Result<Option<String>>;
    /// Insert or replace.
    fn set_donor_meta(&self, donor_id: u64, key: &str, value: &str) -> Result<()>;
    fn donor_exists(&self, donor_id: u64) -> Result<bool>;

    fn get_completion(&self, task_id: &str) -> Result<bool>;
    /// Idempotent: a second write for the same task is a no-op.
    fn set_completion(&self, task_id: &str) -> Result<()>;
    fn list_completions(&self) -> Result<Vec<CompletionRecord>>;

    fn get_cursor(&self, task_id: &str) -> Result<Option<BatchCursor>>;
    fn save_cursor(&self, cursor: &BatchCursor) -> Result<()>;
    fn delete_cursor(&self, task_id: &str) -> Result<()>;

    /// Page of donations, oldest first. `page` is 1-based.
    fn list_donations(&self, page: u64, page_size: u64) -> Result<Vec<Donation>>;
    fn count_donations(&self) -> Result<u64>;
    fn get_donation_meta(&self, donation_id: u64, key: &str) -> Result<Option<String>>;
    /// Insert unless the key already exists. Returns whether a row was written.
    fn add_donation_meta(&self, donation_id: u64, key: &str, value: &str) -> Result<bool>;
    /// Insert or replace.
    fn set_donation_meta(&self, donation_id: u64, key: &str, value: &str) -> Result<()>;
    fn find_donor_id_by_email(&self, email: &str) -> Result<Option<u64>>;

    /// Page of legacy meta rows ordered by meta id. `page` is 1-based.
    fn list_legacy_meta(&self, page: u64, page_size: u64) -> Result<Vec<LegacyMetaRow>>;
    fn count_legacy_meta(&self) -> Result<u64>;
    /// Pre-migration post meta rows for one donation, ordered by meta id.
    fn list_payment_postmeta(&self, donation_id: u64) -> Result<Vec<LegacyMetaRow>>;

    fn record_event(&self, category: &str, message: &str) -> Result<()>;
    fn recent_events(&self, limit: u64) -> Result<Vec<RecordedEvent>>;
}
