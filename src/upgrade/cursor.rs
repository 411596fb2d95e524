//! Progress tracking for resumable batch tasks.

use serde::{Deserialize, Serialize};

use crate::error::{HealthError, Result};
use crate::store::StoreAdapter;

/// Pagination position of one task across repeated invocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCursor {
    pub task_id: String,
    /// 1-based page number of the next page to process.
    pub step: u64,
    pub page_size: u64,
    pub total_items: u64,
    pub processed_so_far: u64,
    pub percentage: u8,
}

impl BatchCursor {
    pub fn new(task_id: impl Into<String>, page_size: u64) -> Self {
        Self {
            task_id: task_id.into(),
            step: 1,
            page_size,
            total_items: 0,
            processed_so_far: 0,
            percentage: 0,
        }
    }

    pub fn offset(&self) -> u64 {
        offset_for(self.step, self.page_size)
    }

    /// Set the input size and recompute the completion percentage.
    pub fn record_progress(&mut self, total_items: u64) {
        self.total_items = total_items;
        self.percentage = percentage_for(self.step, self.page_size, total_items);
        self.processed_so_far = self.processed_so_far.min(total_items);
    }

    /// Count rows handled by the current page, never past the known total.
    pub fn note_processed(&mut self, items: u64) {
        let next = self.processed_so_far.saturating_add(items);
        self.processed_so_far = if self.total_items > 0 {
            next.min(self.total_items)
        } else {
            next
        };
    }

    /// Whether the page at the current step reaches the end of the input.
    pub fn is_last_page(&self, items_seen: u64) -> bool {
        self.offset().saturating_add(items_seen) >= self.total_items
    }
}

pub fn offset_for(step: u64, page_size: u64) -> u64 {
    step.saturating_sub(1).saturating_mul(page_size)
}

/// `min(100, round(step * page_size / total * 100))`; an empty input is 100%.
pub fn percentage_for(step: u64, page_size: u64, total_items: u64) -> u8 {
    if total_items == 0 {
        return 100;
    }
    let covered = step.saturating_mul(page_size) as f64;
    let pct = (covered / total_items as f64 * 100.0).round();
    pct.min(100.0) as u8
}

/// Load the cursor for `task_id`, creating one at step 1 when none is stored.
///
/// A stored cursor keeps its own page size so offsets computed by earlier
/// invocations stay valid.
pub fn advance(store: &dyn StoreAdapter, task_id: &str, page_size: u64) -> Result<BatchCursor> {
    if page_size == 0 {
        return Err(HealthError::Configuration(format!(
            "task '{task_id}' has a page size of 0"
        )));
    }
    match store.get_cursor(task_id)? {
        Some(cursor) => {
            if cursor.page_size != page_size {
                tracing::warn!(
                    task_id,
                    stored = cursor.page_size,
                    configured = page_size,
                    "keeping stored page size for in-flight task"
                );
            }
            Ok(cursor)
        }
        None => Ok(BatchCursor::new(task_id, page_size)),
    }
}

pub fn save(store: &dyn StoreAdapter, cursor: &BatchCursor) -> Result<()> {
    store.save_cursor(cursor)
}

/// Move to the next page and persist.
pub fn bump(store: &dyn StoreAdapter, cursor: &mut BatchCursor) -> Result<()> {
    cursor.step += 1;
    store.save_cursor(cursor)
}

/// Forget a task's position; the next invocation starts again at step 1.
pub fn reset(store: &dyn StoreAdapter, task_id: &str) -> Result<()> {
    store.delete_cursor(task_id)
}
