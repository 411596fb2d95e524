use std::rc::Rc;

use crate::error::{HealthError, Result};
use crate::model::SortOrder;
use crate::payment::PaymentApi;
use crate::reconcile::ReconciliationEngine;
use crate::upgrade::cursor::BatchCursor;
use crate::upgrade::{TaskBody, TaskContext, TaskResult};

/// Task body that reconciles one page of donors per invocation.
pub struct DuplicateSourcesTask {
    api: Option<Rc<dyn PaymentApi>>,
}

impl DuplicateSourcesTask {
    pub fn new(api: Option<Rc<dyn PaymentApi>>) -> Self {
        Self { api }
    }
}

impl TaskBody for DuplicateSourcesTask {
    fn run(&self, cursor: &mut BatchCursor, ctx: &TaskContext<'_>) -> Result<TaskResult> {
        let api = self.api.as_deref().ok_or_else(|| {
            HealthError::Configuration(
                "duplicate source cleanup needs a payment processor secret key".into(),
            )
        })?;

        let total = ctx.store.count_donors()?;
        let donors = ctx
            .store
            .list_donors(cursor.step, cursor.page_size, SortOrder::Asc)?;
        cursor.record_progress(total);
        if donors.is_empty() {
            return Ok(TaskResult::exhausted());
        }

        let engine = ReconciliationEngine::new(api, ctx.store, ctx.sink);
        let results = engine.reconcile_page(&donors)?;

        let items_seen = donors.len() as u64;
        let failures: u64 = results.iter().map(|r| r.errors.len() as u64).sum();
        let duplicates: usize = results.iter().map(|r| r.duplicate_source_ids.len()).sum();
        tracing::info!(
            donors = items_seen,
            skipped = results.iter().filter(|r| r.is_skipped()).count(),
            duplicates,
            failures,
            "reconciled donor page"
        );

        Ok(TaskResult {
            items_seen,
            done: cursor.is_last_page(items_seen),
            failures,
        })
    }
}
