use crate::output::{print_json, print_table, settings};
use anyhow::Context;
use snowdev_core::session;

pub fn run(json: bool) -> anyhow::Result<()> {
    let mut connection = super::connect()?;
    let info = session::environment_info(&mut connection);
    super::disconnect(connection);
    let info = info.context("failed to query the session environment")?;

    if json {
        return print_json(&info);
    }
    print_table(&settings(&info));
    Ok(())
}
