use crate::component::ComponentKind;
use crate::config::Config;
use crate::error::{Result, SnowdevError};
use crate::paths;
use crate::session::{self, Session};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

// ---------------------------------------------------------------------------
// TaskAction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
    Execute,
    Resume,
    Suspend,
}

impl TaskAction {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskAction::Execute => "execute",
            TaskAction::Resume => "resume",
            TaskAction::Suspend => "suspend",
        }
    }

    pub fn statement(self, task: &str) -> String {
        match self {
            TaskAction::Execute => format!("EXECUTE TASK {task}"),
            TaskAction::Resume => format!("ALTER TASK {task} RESUME"),
            TaskAction::Suspend => format!("ALTER TASK {task} SUSPEND"),
        }
    }
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskAction {
    type Err = SnowdevError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "execute" => Ok(TaskAction::Execute),
            "resume" => Ok(TaskAction::Resume),
            "suspend" => Ok(TaskAction::Suspend),
            _ => Err(SnowdevError::InvalidTaskAction(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Deployment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct TaskDeployment {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<TaskAction>,
    pub statements: Vec<String>,
}

/// Split a script on `;`, dropping blank statements.
pub fn split_statements(sql: &str) -> Vec<String> {
    sql.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Run `src/task/<name>/app.sql`, or apply `action` to the deployed task.
pub fn deploy_task(
    session: &mut dyn Session,
    root: &Path,
    config: &Config,
    name: &str,
    action: Option<TaskAction>,
) -> Result<TaskDeployment> {
    paths::validate_component_name(name)?;
    let sql_path = paths::task_sql_path(root, name);
    if !sql_path.is_file() {
        return Err(SnowdevError::ComponentNotFound {
            kind: ComponentKind::Task.label().to_string(),
            path: sql_path.display().to_string(),
        });
    }

    let statements = match action {
        Some(action) => vec![action.statement(name)],
        None => {
            let statements = split_statements(&std::fs::read_to_string(&sql_path)?);
            if statements.is_empty() {
                return Err(SnowdevError::EmptySql(sql_path.display().to_string()));
            }
            statements
        }
    };

    if config.task.required_database.is_some() {
        config.task.check(&session::current_database(session)?)?;
    }

    for statement in &statements {
        tracing::info!(task = name, %statement, "executing");
        session.sql(statement)?;
    }
    match action {
        Some(action) => tracing::info!(task = name, %action, "task updated"),
        None => tracing::info!(task = name, count = statements.len(), "task deployed"),
    }

    Ok(TaskDeployment {
        name: name.to_string(),
        action,
        statements,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
