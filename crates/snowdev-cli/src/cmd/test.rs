use super::LocalArgs;
use anyhow::Context;
use snowdev_core::local;
use std::path::Path;

pub fn run(root: &Path, args: &LocalArgs) -> anyhow::Result<()> {
    let (kind, name) = args.selected()?;
    local::run_locally(root, kind, name)
        .with_context(|| format!("local run of {} '{name}' failed", kind.label()))
}
