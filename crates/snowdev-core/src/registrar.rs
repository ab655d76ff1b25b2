//! Registration of a deployable unit as a platform function or procedure.
//!
//! A registration stages the entry file, then issues one `CREATE` whose
//! flags follow from whether the target is a temporary shadow:
//!
//! | target     | permanence  | on conflict       | stage sub-path                  |
//! |------------|-------------|-------------------|---------------------------------|
//! | production | permanent   | `OR REPLACE`      | `@<stage>/<kind>/<name>`        |
//! | shadow     | `TEMPORARY` | fail if it exists | `@<stage>/<kind>/temp/<name>`   |

use crate::component::{package_name, DeployableUnit, EntityKind};
use crate::config::{Config, ExecuteAs};
use crate::error::Result;
use crate::handler::{self, HandlerSignature, HANDLER_FUNCTION};
use crate::session::Session;

pub const SHADOW_PREFIX: &str = "temp_";
pub const SNOWPARK_PACKAGE: &str = "snowflake-snowpark-python";

pub fn shadow_name(name: &str) -> String {
    format!("{SHADOW_PREFIX}{name}")
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationOptions {
    pub python_runtime: String,
    /// Procedures only.
    pub execute_as: Option<ExecuteAs>,
}

impl RegistrationOptions {
    pub fn from_config(config: &Config, kind: EntityKind) -> Self {
        Self {
            python_runtime: config.python_runtime.clone(),
            execute_as: match kind {
                EntityKind::Procedure => Some(config.execute_as.sproc),
                EntityKind::Function => None,
            },
        }
    }
}

pub struct Registrar {
    options: RegistrationOptions,
}

impl Registrar {
    pub fn new(options: RegistrationOptions) -> Self {
        Self { options }
    }

    /// Stage the entry file and create `name` from `unit`.
    pub fn register(
        &self,
        session: &mut dyn Session,
        unit: &DeployableUnit,
        name: &str,
        temporary: bool,
    ) -> Result<()> {
        let signature = handler::read_handler(&unit.source, unit.kind)?;
        let location = stage_path(unit, name, temporary);
        tracing::debug!(entity = name, temporary, %location, "staging entry file");
        session.put(&unit.source, &location)?;
        let statement = create_statement(unit, name, temporary, &signature, &self.options);
        tracing::debug!(%statement, "registering");
        session.sql(&statement)?;
        Ok(())
    }

    /// Remove the staged files of a dropped temporary entity. Returns true
    /// on success; failures are logged and swallowed.
    pub fn unstage_temporary(&self, session: &mut dyn Session, unit: &DeployableUnit, name: &str) -> bool {
        let statement = remove_statement(&stage_path(unit, name, true));
        match session.sql(&statement) {
            Ok(_) => {
                tracing::debug!(entity = name, %statement, "removed staged shadow files");
                true
            }
            Err(e) => {
                tracing::warn!(entity = name, error = %e, "failed to remove staged shadow files");
                false
            }
        }
    }
}

pub fn stage_path(unit: &DeployableUnit, name: &str, temporary: bool) -> String {
    let kind_dir = unit.kind.component_kind().as_str();
    if temporary {
        format!("@{}/{}/temp/{}", unit.stage, kind_dir, name)
    } else {
        format!("@{}/{}/{}", unit.stage, kind_dir, name)
    }
}

/// The trailing slash keeps `temp_F` from also matching `temp_FOO`.
pub fn remove_statement(location: &str) -> String {
    format!("REMOVE {location}/")
}

pub fn create_statement(
    unit: &DeployableUnit,
    name: &str,
    temporary: bool,
    signature: &HandlerSignature,
    options: &RegistrationOptions,
) -> String {
    let verb = if temporary {
        "CREATE TEMPORARY"
    } else {
        "CREATE OR REPLACE"
    };

    let mut packages: Vec<&str> = unit.packages.iter().map(String::as_str).collect();
    let has_snowpark = packages.iter().any(|p| package_name(p) == SNOWPARK_PACKAGE);
    if unit.kind == EntityKind::Procedure && !has_snowpark {
        packages.insert(0, SNOWPARK_PACKAGE);
    }

    let file_name = unit
        .source
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| "app.py".to_string());
    let module = file_name.trim_end_matches(".py");
    let staged = format!("{}/{}", stage_path(unit, name, temporary), file_name);
    let imports: Vec<&str> = std::iter::once(staged.as_str())
        .chain(unit.imports.iter().map(String::as_str))
        .collect();

    let mut sql = format!(
        "{verb} {} {name}({})\nRETURNS {}\nLANGUAGE PYTHON\nRUNTIME_VERSION = '{}'\n",
        unit.kind.sql_keyword(),
        signature.sql_params(),
        signature.returns,
        options.python_runtime,
    );
    if !packages.is_empty() {
        sql.push_str(&format!("PACKAGES = ({})\n", quote_list(&packages)));
    }
    sql.push_str(&format!("IMPORTS = ({})\n", quote_list(&imports)));
    sql.push_str(&format!("HANDLER = '{module}.{HANDLER_FUNCTION}'"));
    if let (EntityKind::Procedure, Some(identity)) = (unit.kind, options.execute_as) {
        sql.push_str(&format!("\nEXECUTE AS {identity}"));
    }
    sql
}

fn quote_list(items: &[&str]) -> String {
    items
        .iter()
        .map(|i| format!("'{}'", i.replace('\'', "''")))
        .collect::<Vec<_>>()
        .join(", ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
