use crate::output::print_json;
use anyhow::Context;
use serde::Serialize;
use snowdev_core::channel::{self, ChannelClient};
use snowdev_core::config::{Config, DEFAULT_CHANNEL_URL};
use std::path::Path;

#[derive(Serialize)]
struct PackageReport {
    name: String,
    available: bool,
    versions: Vec<String>,
}

pub fn run(root: &Path, name: &str, json: bool) -> anyhow::Result<()> {
    // Works outside a project too; the channel URL is the only setting used.
    let url = match Config::load(root) {
        Ok(config) => config.channel.url,
        Err(_) => DEFAULT_CHANNEL_URL.to_string(),
    };
    let mut client = ChannelClient::new(&url)?;

    let available = client
        .is_available(name)
        .with_context(|| format!("failed to query channel {url}"))?;
    let versions = if available {
        client
            .versions(name)
            .with_context(|| format!("failed to list versions of '{name}'"))?
    } else {
        Vec::new()
    };
    let report = PackageReport {
        name: channel::normalize(name),
        available,
        versions,
    };

    if json {
        return print_json(&report);
    }
    if !report.available {
        println!("'{}' is not available in the Snowflake channel", report.name);
        println!("List it under packages.skip_check in snowdev.yaml if you ship it yourself.");
        return Ok(());
    }
    println!("'{}' is available in the Snowflake channel", report.name);
    if let Some(latest) = report.versions.last() {
        println!("Latest:   {latest}");
        println!("Versions: {}", report.versions.join(", "));
    }
    Ok(())
}
