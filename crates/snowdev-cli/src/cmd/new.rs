use super::init::print_items;
use super::ComponentArgs;
use crate::output::print_json;
use anyhow::Context;
use snowdev_core::component::ComponentKind;
use snowdev_core::scaffold;
use std::path::Path;

pub fn run(root: &Path, args: &ComponentArgs, json: bool) -> anyhow::Result<()> {
    let (kind, name) = args.selected()?;
    let items = scaffold::new_component(root, kind, name)
        .with_context(|| format!("failed to create {} '{name}'", kind.label()))?;

    if json {
        return print_json(&items);
    }
    println!("New {} '{name}':", kind.label());
    print_items(&items);
    match kind {
        ComponentKind::Udf | ComponentKind::Sproc => {
            println!("\nTry it locally: snowdev test --{kind} {name}")
        }
        ComponentKind::Pipe => println!("\nFill in its entry in src/pipe/pipes.yml"),
        _ => {}
    }
    println!("Deploy with: snowdev deploy --{kind} {name}");
    Ok(())
}
