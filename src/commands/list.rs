use std::path::Path;

use crate::error::Result;
use crate::output::{self, Format, TaskStatus};
use crate::store::workspace::Workspace;
use crate::upgrade::registry::Registry;

pub(crate) fn describe(registry: &Registry) -> Vec<TaskStatus> {
    registry
        .tasks()
        .iter()
        .map(|task| TaskStatus {
            id: task.id.clone(),
            target_version: task.target_version.clone(),
            description: task.description.clone(),
            page_size: task.page_size,
            complete: false,
            completed_at: None,
            cursor: None,
        })
        .collect()
}

/// Print the task catalog in run order.
pub fn run(base: &Path, format: Format) -> Result<()> {
    let workspace = Workspace::open(base)?;
    let registry = super::registry(&workspace.config()?)?;
    output::print_tasks(&describe(&registry), format)
}
