use std::collections::HashMap;
use std::path::Path;

use crate::build_info;
use crate::error::Result;
use crate::output::{self, Format, StatusReport};
use crate::store::StoreAdapter;
use crate::store::workspace::Workspace;
use crate::upgrade::registry::Registry;

pub fn report(registry: &Registry, store: &dyn StoreAdapter) -> Result<StatusReport> {
    let completed: HashMap<String, _> = store
        .list_completions()?
        .into_iter()
        .map(|record| (record.task_id, record.completed_at))
        .collect();

    let mut tasks = super::list::describe(registry);
    for status in &mut tasks {
        status.completed_at = completed.get(&status.id).copied();
        status.complete = status.completed_at.is_some();
        status.cursor = store.get_cursor(&status.id)?;
    }
    Ok(StatusReport {
        git_sha: build_info::git_sha().map(str::to_string),
        pending: tasks.iter().filter(|t| !t.complete).count(),
        tasks,
    })
}

pub fn run(base: &Path, format: Format) -> Result<()> {
    let workspace = Workspace::open(base)?;
    let registry = super::registry(&workspace.config()?)?;
    let store = workspace.store()?;
    output::print_status(&report(&registry, &store)?, format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::sqlite::SqliteStore;
    use crate::tasks::default_registry;
    use crate::upgrade::cursor::BatchCursor;

    #[test]
    fn report_merges_completion_and_cursor() {
        let store = SqliteStore::open_memory().unwrap();
        let registry = default_registry(&Config::default(), None);
        let first = registry.tasks()[0].id.clone();
        let second = registry.tasks()[1].id.clone();

        store.set_completion(&first).unwrap();
        let mut cursor = BatchCursor::new(second.as_str(), 100);
        cursor.step = 2;
        store.save_cursor(&cursor).unwrap();

        let report = report(&registry, &store).unwrap();
        assert_eq!(report.pending, registry.tasks().len() - 1);
        assert!(report.tasks[0].complete);
        assert!(report.tasks[0].completed_at.is_some());
        assert_eq!(report.tasks[1].cursor.as_ref().unwrap().step, 2);
        assert!(report.tasks[2].cursor.is_none());
    }
}
