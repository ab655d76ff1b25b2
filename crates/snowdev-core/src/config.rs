use crate::error::{Result, SnowdevError};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ExecuteAs
// ---------------------------------------------------------------------------

/// Execution identity of a stored procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecuteAs {
    Caller,
    Owner,
}

impl ExecuteAs {
    pub fn as_sql(self) -> &'static str {
        match self {
            ExecuteAs::Caller => "CALLER",
            ExecuteAs::Owner => "OWNER",
        }
    }
}

impl fmt::Display for ExecuteAs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteAsConfig {
    #[serde(default = "default_sproc_execute_as")]
    pub sproc: ExecuteAs,
}

fn default_sproc_execute_as() -> ExecuteAs {
    ExecuteAs::Caller
}

impl Default for ExecuteAsConfig {
    fn default() -> Self {
        Self {
            sproc: default_sproc_execute_as(),
        }
    }
}

// ---------------------------------------------------------------------------
// ChannelConfig / PackagesConfig
// ---------------------------------------------------------------------------

pub const DEFAULT_CHANNEL_URL: &str = "https://repo.anaconda.com/pkgs/snowflake";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default = "default_channel_url")]
    pub url: String,
}

fn default_channel_url() -> String {
    DEFAULT_CHANNEL_URL.to_string()
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: default_channel_url(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackagesConfig {
    /// Package names exempt from the channel availability check.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip_check: Vec<String>,
}

// ---------------------------------------------------------------------------
// DeployGuard
// ---------------------------------------------------------------------------

/// Restricts a deployment kind to sessions whose current database matches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployGuard {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_database: Option<String>,
}

impl DeployGuard {
    pub fn check(&self, current_database: &str) -> Result<()> {
        let Some(expected) = self.required_database.as_deref() else {
            return Ok(());
        };
        let actual = current_database.trim_matches('"');
        if actual.eq_ignore_ascii_case(expected.trim_matches('"')) {
            Ok(())
        } else {
            Err(SnowdevError::WrongDatabase {
                expected: expected.to_string(),
                actual: actual.to_string(),
            })
        }
    }

    fn is_empty(&self) -> bool {
        self.required_database.is_none()
    }
}

// ---------------------------------------------------------------------------
// ProjectConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

pub const SUPPORTED_RUNTIMES: &[&str] = &["3.8", "3.9", "3.10", "3.11", "3.12"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub project: ProjectConfig,
    /// Stage that receives component sources, uploads and static assets.
    #[serde(default = "default_stage")]
    pub stage: String,
    #[serde(default = "default_python_runtime")]
    pub python_runtime: String,
    #[serde(default)]
    pub execute_as: ExecuteAsConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub packages: PackagesConfig,
    #[serde(default, skip_serializing_if = "DeployGuard::is_empty")]
    pub streamlit: DeployGuard,
    #[serde(default, skip_serializing_if = "DeployGuard::is_empty")]
    pub task: DeployGuard,
}

fn default_version() -> u32 {
    1
}

fn default_stage() -> String {
    "SNOWDEV".to_string()
}

fn default_python_runtime() -> String {
    "3.10".to_string()
}

impl Config {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            version: 1,
            project: ProjectConfig {
                name: project_name.into(),
            },
            stage: default_stage(),
            python_runtime: default_python_runtime(),
            execute_as: ExecuteAsConfig::default(),
            channel: ChannelConfig::default(),
            packages: PackagesConfig::default(),
            streamlit: DeployGuard::default(),
            task: DeployGuard::default(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(SnowdevError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if paths::validate_component_name(&self.stage).is_err() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "stage '{}' is not a plain identifier (letters, digits, underscores)",
                    self.stage
                ),
            });
        }

        if !SUPPORTED_RUNTIMES.contains(&self.python_runtime.as_str()) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "python_runtime '{}' is not one of {}",
                    self.python_runtime,
                    SUPPORTED_RUNTIMES.join(", ")
                ),
            });
        }

        let url = self.channel.url.as_str();
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!("channel.url '{url}' must be an http(s) URL"),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// ConnectionConfig
// ---------------------------------------------------------------------------

pub const DEFAULT_TOKEN_TYPE: &str = "PROGRAMMATIC_ACCESS_TOKEN";
pub const PASSWORD_TOKEN_TYPE: &str = "PASSWORD";

/// Connection parameters, read from the environment (and the project `.env`).
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    pub account: String,
    pub user: String,
    pub token: String,
    pub token_type: String,
    pub warehouse: String,
    pub database: String,
    pub schema: String,
    pub role: String,
    /// Overrides `https://<account>.snowflakecomputing.com`.
    pub host: Option<String>,
}

impl ConnectionConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| SnowdevError::MissingEnv(key.to_string()))
        };
        // PASSWORD is accepted for older .env files and logs in as a
        // password unless a token type says otherwise.
        let (token, fallback_type) = match get("TOKEN") {
            Ok(token) => (token, DEFAULT_TOKEN_TYPE),
            Err(_) => (
                get("PASSWORD").map_err(|_| SnowdevError::MissingEnv("TOKEN".to_string()))?,
                PASSWORD_TOKEN_TYPE,
            ),
        };
        Ok(Self {
            account: get("ACCOUNT")?,
            user: get("USER_NAME")?,
            token,
            token_type: lookup("SNOWFLAKE_TOKEN_TYPE")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| fallback_type.to_string()),
            warehouse: get("WAREHOUSE")?,
            database: get("DATABASE")?,
            schema: get("SCHEMA")?,
            role: get("ROLE")?,
            host: lookup("SNOWFLAKE_HOST").filter(|v| !v.trim().is_empty()),
        })
    }

    pub fn base_url(&self) -> String {
        match &self.host {
            Some(host) if host.starts_with("http") => host.trim_end_matches('/').to_string(),
            Some(host) => format!("https://{}", host.trim_end_matches('/')),
            None => format!("https://{}.snowflakecomputing.com", self.account),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
