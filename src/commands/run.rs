use std::path::Path;

use crate::error::Result;
use crate::observe::StoreSink;
use crate::output::{self, Format};
use crate::store::lock::RunLock;
use crate::store::workspace::Workspace;
use crate::upgrade::driver::{RunOutcome, TaskDriver};

/// What a `run` invocation should advance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// One page of the first pending task.
    Next,
    /// One page of the named task.
    Task(String),
    /// Pages until every task is complete or one fails.
    All,
}

/// Drive pages until `target` is satisfied. An error aborts the loop; work
/// already persisted stays persisted.
pub fn drive(driver: &TaskDriver<'_>, target: &Target) -> Result<Vec<RunOutcome>> {
    match target {
        Target::Next => Ok(vec![driver.run_once()?]),
        Target::Task(id) => Ok(vec![driver.run_task(id)?]),
        Target::All => {
            let mut outcomes = Vec::new();
            loop {
                let outcome = driver.run_once()?;
                let more = outcome.has_more();
                outcomes.push(outcome);
                if !more {
                    return Ok(outcomes);
                }
            }
        }
    }
}

pub fn run(base: &Path, target: Target, format: Format) -> Result<()> {
    let workspace = Workspace::open(base)?;
    let lock = RunLock::acquire(&workspace.lock_path())?;

    let config = workspace.config()?;
    let registry = super::registry(&config)?;
    let store = workspace.store()?;
    let sink = StoreSink::new(&store);
    let driver = TaskDriver::new(&registry, &store, &sink);

    let outcomes = drive(&driver, &target);
    lock.release()?;
    output::print_outcomes(&outcomes?, format)
}
