pub mod deploy;
pub mod info;
pub mod init;
pub mod new;
pub mod package;
pub mod test;
pub mod upload;

use anyhow::{bail, Context};
use clap::Args;
use snowdev_core::component::ComponentKind;
use snowdev_core::config::{Config, ConnectionConfig, WarnLevel};
use snowdev_core::snowflake::Connection;
use std::path::Path;

/// Exactly one component selector, e.g. `--udf score`.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct ComponentArgs {
    /// Python user-defined function under src/udf/
    #[arg(long, value_name = "NAME")]
    pub udf: Option<String>,

    /// Python stored procedure under src/sproc/
    #[arg(long, value_name = "NAME")]
    pub sproc: Option<String>,

    /// Streamlit app under src/streamlit/
    #[arg(long, value_name = "NAME")]
    pub streamlit: Option<String>,

    /// SQL task under src/task/
    #[arg(long, value_name = "NAME")]
    pub task: Option<String>,

    /// Pipe declared in src/pipe/pipes.yml
    #[arg(long, value_name = "NAME")]
    pub pipe: Option<String>,
}

impl ComponentArgs {
    pub fn selected(&self) -> anyhow::Result<(ComponentKind, &str)> {
        let choices = [
            (ComponentKind::Udf, &self.udf),
            (ComponentKind::Sproc, &self.sproc),
            (ComponentKind::Streamlit, &self.streamlit),
            (ComponentKind::Task, &self.task),
            (ComponentKind::Pipe, &self.pipe),
        ];
        choices
            .into_iter()
            .find_map(|(kind, name)| name.as_deref().map(|n| (kind, n)))
            .context("one of --udf, --sproc, --streamlit, --task or --pipe is required")
    }
}

/// Components that can run on the local machine.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct LocalArgs {
    /// Python user-defined function under src/udf/
    #[arg(long, value_name = "NAME")]
    pub udf: Option<String>,

    /// Python stored procedure under src/sproc/
    #[arg(long, value_name = "NAME")]
    pub sproc: Option<String>,
}

impl LocalArgs {
    pub fn selected(&self) -> anyhow::Result<(ComponentKind, &str)> {
        match (&self.udf, &self.sproc) {
            (Some(name), None) => Ok((ComponentKind::Udf, name.as_str())),
            (None, Some(name)) => Ok((ComponentKind::Sproc, name.as_str())),
            _ => bail!("exactly one of --udf or --sproc is required"),
        }
    }
}

/// Load `snowdev.yaml`, logging warnings and refusing error-level problems.
pub fn load_config(root: &Path) -> anyhow::Result<Config> {
    let config = Config::load(root).context("failed to load snowdev.yaml")?;
    let mut errors = Vec::new();
    for warning in config.validate() {
        match warning.level {
            WarnLevel::Warning => tracing::warn!("{}", warning.message),
            WarnLevel::Error => errors.push(warning.message),
        }
    }
    if !errors.is_empty() {
        bail!("invalid snowdev.yaml:\n  {}", errors.join("\n  "));
    }
    Ok(config)
}

/// A lazily-opened platform connection from the environment.
pub fn connect() -> anyhow::Result<Connection> {
    let config = ConnectionConfig::from_env()
        .context("connection settings are read from the environment or .env")?;
    tracing::debug!(account = %config.account, user = %config.user, "connection configured");
    Ok(Connection::new(config))
}

/// Log out of the platform session, if one was opened. Failures only warn.
pub fn disconnect(mut connection: Connection) {
    if let Err(e) = connection.close() {
        tracing::warn!("failed to close the Snowflake session: {e}");
    }
}
