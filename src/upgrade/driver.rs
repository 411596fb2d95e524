use serde::Serialize;
use uuid::Uuid;

use crate::error::{HealthError, Result};
use crate::observe::{EventCategory, ObservabilitySink};
use crate::store::StoreAdapter;
use crate::upgrade::cursor::{self, BatchCursor};
use crate::upgrade::registry::Registry;
use crate::upgrade::{TaskContext, TaskResult, UpgradeTask};

/// Result of a single unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every registered task is complete.
    Idle,
    /// The named task was already complete; nothing was run.
    AlreadyComplete { task_id: String },
    /// A page was processed and the cursor moved forward.
    Progressed {
        task_id: String,
        result: TaskResult,
        cursor: BatchCursor,
    },
    /// The input was exhausted and the task is now complete.
    Completed {
        task_id: String,
        result: TaskResult,
        cursor: BatchCursor,
    },
}

impl RunOutcome {
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::Idle => None,
            Self::AlreadyComplete { task_id }
            | Self::Progressed { task_id, .. }
            | Self::Completed { task_id, .. } => Some(task_id),
        }
    }

    /// Whether calling again could do more work.
    pub fn has_more(&self) -> bool {
        matches!(self, Self::Progressed { .. } | Self::Completed { .. })
    }
}

/// Runs one page of one pending task per call.
///
/// How many calls to make, and when, is the caller's decision.
pub struct TaskDriver<'a> {
    registry: &'a Registry,
    store: &'a dyn StoreAdapter,
    sink: &'a dyn ObservabilitySink,
}

impl<'a> TaskDriver<'a> {
    pub fn new(
        registry: &'a Registry,
        store: &'a dyn StoreAdapter,
        sink: &'a dyn ObservabilitySink,
    ) -> Self {
        Self {
            registry,
            store,
            sink,
        }
    }

    /// Advance the first pending task by one page.
    pub fn run_once(&self) -> Result<RunOutcome> {
        let pending = self.registry.pending_tasks(self.store)?;
        let Some(task) = pending.first() else {
            tracing::debug!("no pending upgrade tasks");
            return Ok(RunOutcome::Idle);
        };
        self.invoke(task)
    }

    /// Advance a specific task by one page, regardless of registration order.
    pub fn run_task(&self, task_id: &str) -> Result<RunOutcome> {
        let task = self
            .registry
            .get(task_id)
            .ok_or_else(|| HealthError::UnknownTask(task_id.to_string()))?;
        if self.registry.is_complete(self.store, &task.id)? {
            return Ok(RunOutcome::AlreadyComplete {
                task_id: task.id.clone(),
            });
        }
        self.invoke(task)
    }

    fn invoke(&self, task: &UpgradeTask) -> Result<RunOutcome> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("upgrade_task", task_id = %task.id, %run_id);
        let _guard = span.enter();

        let mut cursor = cursor::advance(self.store, &task.id, task.page_size)?;
        tracing::info!(step = cursor.step, offset = cursor.offset(), "running page");

        let ctx = TaskContext {
            store: self.store,
            sink: self.sink,
        };
        let result = task.body.run(&mut cursor, &ctx)?;
        cursor.note_processed(result.items_seen);

        if result.items_seen == 0 || result.done {
            cursor::save(self.store, &cursor)?;
            self.registry.complete(self.store, &task.id)?;
            for other in &task.completes_with {
                self.registry.complete(self.store, other)?;
            }
            tracing::info!(
                step = cursor.step,
                processed = cursor.processed_so_far,
                "task complete"
            );
            self.sink.record(
                EventCategory::Task,
                &format!(
                    "{} complete after {} page(s), {} item(s)",
                    task.id, cursor.step, cursor.processed_so_far
                ),
            );
            return Ok(RunOutcome::Completed {
                task_id: task.id.clone(),
                result,
                cursor,
            });
        }

        cursor::bump(self.store, &mut cursor)?;
        tracing::info!(
            next_step = cursor.step,
            percentage = cursor.percentage,
            failures = result.failures,
            "page processed"
        );
        Ok(RunOutcome::Progressed {
            task_id: task.id.clone(),
            result,
            cursor,
        })
    }
}
