//! Resumable one-time upgrade tasks.
//!
//! A task body processes one page of input per invocation. The [`driver`]
//! decides when a task is finished and persists progress through the
//! [`cursor`]; the [`registry`] holds the task catalog for the process.

pub mod cursor;
pub mod driver;
pub mod registry;

use serde::Serialize;

use crate::error::Result;
use crate::observe::ObservabilitySink;
use crate::store::StoreAdapter;
use cursor::BatchCursor;

/// What one invocation of a task body observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskResult {
    /// Input rows in the page that was read. Zero means the input is exhausted.
    pub items_seen: u64,
    /// The body knows no further pages remain.
    pub done: bool,
    /// Per-row failures recorded to the sink while processing the page.
    pub failures: u64,
}

impl TaskResult {
    pub fn exhausted() -> Self {
        Self {
            items_seen: 0,
            done: true,
            failures: 0,
        }
    }
}

/// Collaborators handed to a task body for one invocation.
pub struct TaskContext<'a> {
    pub store: &'a dyn StoreAdapter,
    pub sink: &'a dyn ObservabilitySink,
}

pub trait TaskBody {
    fn run(&self, cursor: &mut BatchCursor, ctx: &TaskContext<'_>) -> Result<TaskResult>;
}

impl<F> TaskBody for F
where
    F: Fn(&mut BatchCursor, &TaskContext<'_>) -> Result<TaskResult>,
{
    fn run(&self, cursor: &mut BatchCursor, ctx: &TaskContext<'_>) -> Result<TaskResult> {
        self(cursor, ctx)
    }
}

pub struct UpgradeTask {
    pub id: String,
    pub target_version: String,
    pub description: String,
    pub page_size: u64,
    /// Other task ids marked complete together with this one.
    pub completes_with: Vec<String>,
    pub body: Box<dyn TaskBody>,
}

impl UpgradeTask {
    pub fn new(
        id: impl Into<String>,
        target_version: impl Into<String>,
        page_size: u64,
        body: impl TaskBody + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            target_version: target_version.into(),
            description: String::new(),
            page_size,
            completes_with: Vec::new(),
            body: Box::new(body),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn completes_with(mut self, task_id: impl Into<String>) -> Self {
        self.completes_with.push(task_id.into());
        self
    }
}

impl std::fmt::Debug for UpgradeTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpgradeTask")
            .field("id", &self.id)
            .field("target_version", &self.target_version)
            .field("page_size", &self.page_size)
            .field("completes_with", &self.completes_with)
            .finish_non_exhaustive()
    }
}
