//! Manual intervention on a single task's durable state.

use std::path::Path;

use crate::error::{HealthError, Result};
use crate::output::{self, Format};
use crate::store::StoreAdapter;
use crate::store::workspace::Workspace;
use crate::upgrade::cursor;
use crate::upgrade::registry::Registry;

fn ensure_registered(registry: &Registry, task_id: &str) -> Result<()> {
    registry
        .get(task_id)
        .map(|_| ())
        .ok_or_else(|| HealthError::UnknownTask(task_id.to_string()))
}

/// Drop the stored cursor so the next run starts at the first page.
/// Completion flags are not touched.
pub fn reset_task(registry: &Registry, store: &dyn StoreAdapter, task_id: &str) -> Result<()> {
    ensure_registered(registry, task_id)?;
    if registry.is_complete(store, task_id)? {
        tracing::warn!(task_id, "task is already complete; reset only clears its cursor");
    }
    cursor::reset(store, task_id)
}

/// Mark a task complete without running it, along with the ids it supersedes.
pub fn complete_task(registry: &Registry, store: &dyn StoreAdapter, task_id: &str) -> Result<()> {
    ensure_registered(registry, task_id)?;
    registry.complete(store, task_id)?;
    if let Some(task) = registry.get(task_id) {
        for other in &task.completes_with {
            registry.complete(store, other)?;
        }
    }
    Ok(())
}

pub fn reset(base: &Path, task_id: &str, format: Format) -> Result<()> {
    let workspace = Workspace::open(base)?;
    let registry = super::registry(&workspace.config()?)?;
    reset_task(&registry, &workspace.store()?, task_id)?;
    output::print_ack("reset", task_id, format)
}

pub fn complete(base: &Path, task_id: &str, format: Format) -> Result<()> {
    let workspace = Workspace::open(base)?;
    let registry = super::registry(&workspace.config()?)?;
    complete_task(&registry, &workspace.store()?, task_id)?;
    output::print_ack("complete", task_id, format)
}
