use std::path::Path;

use crate::error::Result;
use crate::store::workspace::Workspace;

pub fn run(base: &Path) -> Result<()> {
    let workspace = Workspace::init(base)?;
    eprintln!("Initialized {}", workspace.root().display());
    Ok(())
}
