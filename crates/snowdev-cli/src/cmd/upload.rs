use crate::output::{print_json, print_table};
use anyhow::Context;
use snowdev_core::deploy::DeploymentManager;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = super::load_config(root)?;
    let mut connection = super::connect()?;

    let results = DeploymentManager::new(root, &config).upload_static(&mut connection);
    super::disconnect(connection);
    let results = results.context("failed to upload static/")?;

    if json {
        return print_json(&results);
    }
    if results.is_empty() {
        println!("Nothing to upload: static/ is empty");
        return Ok(());
    }
    print_table(&results);
    Ok(())
}
