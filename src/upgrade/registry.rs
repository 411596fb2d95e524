use crate::error::Result;
use crate::store::StoreAdapter;
use crate::upgrade::UpgradeTask;

/// Process-wide task catalog, rebuilt on every run.
///
/// Only completion flags are durable; they live in the store.
#[derive(Debug, Default)]
pub struct Registry {
    tasks: Vec<UpgradeTask>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task. Re-registering an id replaces the earlier definition in place.
    pub fn register(&mut self, task: UpgradeTask) {
        match self.tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => {
                tracing::debug!(task_id = %task.id, "replacing earlier task definition");
                *existing = task;
            }
            None => self.tasks.push(task),
        }
    }

    pub fn get(&self, task_id: &str) -> Option<&UpgradeTask> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn tasks(&self) -> &[UpgradeTask] {
        &self.tasks
    }

    pub fn is_complete(&self, store: &dyn StoreAdapter, task_id: &str) -> Result<bool> {
        store.get_completion(task_id)
    }

    pub fn complete(&self, store: &dyn StoreAdapter, task_id: &str) -> Result<()> {
        store.set_completion(task_id)
    }

    /// Incomplete tasks in registration order.
    pub fn pending_tasks(&self, store: &dyn StoreAdapter) -> Result<Vec<&UpgradeTask>> {
        let mut pending = Vec::new();
        for task in &self.tasks {
            if !store.get_completion(&task.id)? {
                pending.push(task);
            }
        }
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sqlite::SqliteStore;
    use crate::upgrade::cursor::BatchCursor;
    use crate::upgrade::{TaskContext, TaskResult};

    fn noop(_: &mut BatchCursor, _: &TaskContext<'_>) -> Result<TaskResult> {
        Ok(TaskResult::exhausted())
    }

    fn ids(tasks: &[&UpgradeTask]) -> Vec<String> {
        tasks.iter().map(|t| t.id.clone()).collect()
    }

    #[test]
    fn pending_tasks_follow_registration_order() {
        let store = SqliteStore::open_memory().unwrap();
        let mut registry = Registry::new();
        registry.register(UpgradeTask::new("b", "1.0.0", 10, noop));
        registry.register(UpgradeTask::new("a", "1.0.0", 10, noop));
        registry.register(UpgradeTask::new("c", "1.0.0", 10, noop));

        registry.complete(&store, "a").unwrap();

        let pending = registry.pending_tasks(&store).unwrap();
        assert_eq!(ids(&pending), vec!["b", "c"]);
    }

    #[test]
    fn reregistering_replaces_definition_and_keeps_position() {
        let mut registry = Registry::new();
        registry.register(UpgradeTask::new("a", "1.0.0", 10, noop));
        registry.register(UpgradeTask::new("b", "1.0.0", 10, noop));
        registry.register(UpgradeTask::new("a", "1.1.0", 25, noop));

        assert_eq!(registry.tasks().len(), 2);
        assert_eq!(registry.tasks()[0].id, "a");
        assert_eq!(registry.tasks()[0].target_version, "1.1.0");
        assert_eq!(registry.get("a").unwrap().page_size, 25);
    }

    #[test]
    fn complete_is_idempotent() {
        let store = SqliteStore::open_memory().unwrap();
        let mut registry = Registry::new();
        registry.register(UpgradeTask::new("a", "1.0.0", 10, noop));

        registry.complete(&store, "a").unwrap();
        registry.complete(&store, "a").unwrap();

        assert!(registry.is_complete(&store, "a").unwrap());
        assert!(registry.pending_tasks(&store).unwrap().is_empty());
        assert_eq!(store.list_completions().unwrap().len(), 1);
    }
}
