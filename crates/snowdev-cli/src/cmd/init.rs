use crate::output::print_json;
use anyhow::Context;
use snowdev_core::scaffold::{self, ScaffoldItem};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let items = scaffold::init(root)
        .with_context(|| format!("failed to initialize {}", root.display()))?;

    if json {
        return print_json(&items);
    }
    println!("Initializing snowdev in: {}", root.display());
    print_items(&items);
    println!("\nNext: fill in .env, then run: snowdev new --udf <name>");
    Ok(())
}

pub fn print_items(items: &[ScaffoldItem]) {
    for item in items {
        let label = format!("{}:", item.status.as_str());
        println!("  {label:<8} {}", item.path);
    }
}
