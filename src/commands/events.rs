use std::path::Path;

use crate::error::Result;
use crate::output::{self, Format};
use crate::store::StoreAdapter;
use crate::store::workspace::Workspace;

pub fn run(base: &Path, limit: u64, format: Format) -> Result<()> {
    let store = Workspace::open(base)?.store()?;
    let events = store.recent_events(limit)?;
    output::print_events(&events, format)
}
