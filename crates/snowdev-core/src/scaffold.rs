use crate::component::ComponentKind;
use crate::config::Config;
use crate::error::{Result, SnowdevError};
use crate::pipe::{PipeConfig, PipesFile};
use crate::{io, paths};
use serde::Serialize;
use std::path::Path;

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Created,
    Exists,
    Updated,
}

impl ItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Created => "created",
            ItemStatus::Exists => "exists",
            ItemStatus::Updated => "updated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScaffoldItem {
    /// Relative to the project root.
    pub path: String,
    pub status: ItemStatus,
}

impl ScaffoldItem {
    fn new(path: impl Into<String>, status: ItemStatus) -> Self {
        Self {
            path: path.into(),
            status,
        }
    }
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

const NAME: &str = "__NAME__";

const ENV_TEMPLATE: &str = "\
ACCOUNT=
USER_NAME=
TOKEN=
WAREHOUSE=
DATABASE=
SCHEMA=
ROLE=
";

const GITIGNORE_ENTRIES: &[&str] = &[".env", "__pycache__/", "*.pyc"];

const PYPROJECT_TEMPLATE: &str = r#"[tool.poetry]
name = "__NAME__"
version = "0.1.0"
description = "Snowflake functions, procedures and apps"
authors = []
package-mode = false

[tool.poetry.dependencies]
python = ">=3.10,<3.12"
snowflake-snowpark-python = "*"
streamlit = "*"

[build-system]
requires = ["poetry-core"]
build-backend = "poetry.core.masonry.api"
"#;

const APP_TOML_TEMPLATE: &str = r#"[tool.poetry]
name = "__NAME__"
version = "0.1.0"
description = ""

[tool.poetry.dependencies]
python = "^3.10"
"#;

const UDF_TEMPLATE: &str = r#"def handler(df: str) -> str:
    print("Hello World!")

    return df


# Local testing
# snowdev test --udf __NAME__
if __name__ == "__main__":
    print(handler("test"))
"#;

const SPROC_TEMPLATE: &str = r#"import os

from snowflake.snowpark import Session


def handler(session: Session) -> str:
    return session.sql("SELECT current_version()").collect()[0][0]


# Local testing
# snowdev test --sproc __NAME__
if __name__ == "__main__":
    session = Session.builder.configs(
        {
            "account": os.environ["ACCOUNT"],
            "user": os.environ["USER_NAME"],
            "password": os.environ["TOKEN"],
            "warehouse": os.environ["WAREHOUSE"],
            "database": os.environ["DATABASE"],
            "schema": os.environ["SCHEMA"],
            "role": os.environ["ROLE"],
        }
    ).create()

    print(handler(session))
"#;

const STREAMLIT_TEMPLATE: &str = r#"import streamlit as st
from snowflake.snowpark.context import get_active_session

session = get_active_session()

st.set_page_config(layout="wide", page_title="__NAME__")

st.title("__NAME__")
st.caption("This is a streamlit app running in Snowflake!")

version = session.sql("SELECT current_version()").collect()[0][0]
st.write(f"Snowflake version: {version}")
"#;

const ENVIRONMENT_TEMPLATE: &str = "\
name: app_environment
channels:
  - snowflake
dependencies:
  - snowflake-snowpark-python
";

const TASK_TEMPLATE: &str = "\
CREATE OR REPLACE TASK __NAME__
  WAREHOUSE = COMPUTE_WH
  SCHEDULE = 'USING CRON 0 1 * * * UTC'
  COMMENT = 'Runs daily at 1am UTC'
AS
  CALL my_procedure();
";

const PIPE_TEMPLATE: &str = "\
CREATE STAGE IF NOT EXISTS {1}.{2}.{4}
  URL = '{5}';

CREATE OR REPLACE PIPE {1}.{2}.{0}
  AUTO_INGEST = {7}
AS
  COPY INTO {1}.{2}.{3}
  FROM @{1}.{2}.{4}
  FILE_FORMAT = (FORMAT_NAME = '{6}');
";

fn fill(template: &str, name: &str) -> String {
    template.replace(NAME, name)
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

/// Create the project layout. Existing files are left untouched.
pub fn init(root: &Path) -> Result<Vec<ScaffoldItem>> {
    let project_name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "snowdev-project".to_string());
    let mut items = Vec::new();

    let dirs = ComponentKind::all()
        .iter()
        .map(|k| k.base_dir())
        .chain([paths::PACKAGES_DIR]);
    for dir in dirs {
        let path = root.join(dir);
        let status = if path.is_dir() {
            ItemStatus::Exists
        } else {
            io::ensure_dir(&path)?;
            ItemStatus::Created
        };
        items.push(ScaffoldItem::new(format!("{dir}/"), status));
    }

    let config_path = paths::config_path(root);
    let status = if config_path.exists() {
        ItemStatus::Exists
    } else {
        Config::new(project_name.clone()).save(root)?;
        ItemStatus::Created
    };
    items.push(ScaffoldItem::new(paths::CONFIG_FILE, status));

    items.push(write_file(root, paths::ENV_FILE, ENV_TEMPLATE)?);
    items.push(write_file(root, paths::PYPROJECT_FILE, &fill(PYPROJECT_TEMPLATE, &project_name))?);

    let mut added = false;
    for entry in GITIGNORE_ENTRIES {
        added |= io::ensure_gitignore_entry(root, entry)?;
    }
    let status = if added {
        ItemStatus::Updated
    } else {
        ItemStatus::Exists
    };
    items.push(ScaffoldItem::new(".gitignore", status));

    tracing::debug!(root = %root.display(), "project initialized");
    Ok(items)
}

fn write_file(root: &Path, rel: &str, content: &str) -> Result<ScaffoldItem> {
    let status = if io::write_if_missing(&root.join(rel), content.as_bytes())? {
        ItemStatus::Created
    } else {
        ItemStatus::Exists
    };
    Ok(ScaffoldItem::new(rel, status))
}

// ---------------------------------------------------------------------------
// new
// ---------------------------------------------------------------------------

/// Write the starter files for a new component.
pub fn new_component(root: &Path, kind: ComponentKind, name: &str) -> Result<Vec<ScaffoldItem>> {
    paths::validate_component_name(name)?;
    let exists = || SnowdevError::ComponentExists {
        kind: kind.label().to_string(),
        name: name.to_string(),
    };

    if kind == ComponentKind::Pipe {
        return new_pipe(root, name).map_err(|e| match e {
            SnowdevError::ComponentExists { .. } => exists(),
            other => other,
        });
    }

    let dir = kind.component_dir(root, name);
    if dir.exists() {
        return Err(exists());
    }

    let files: Vec<(&str, String)> = match kind {
        ComponentKind::Udf => vec![
            (paths::APP_PY, fill(UDF_TEMPLATE, name)),
            (paths::APP_TOML, fill(APP_TOML_TEMPLATE, name)),
        ],
        ComponentKind::Sproc => vec![
            (paths::APP_PY, fill(SPROC_TEMPLATE, name)),
            (paths::APP_TOML, fill(APP_TOML_TEMPLATE, name)),
        ],
        ComponentKind::Streamlit => vec![
            (paths::STREAMLIT_APP_PY, fill(STREAMLIT_TEMPLATE, name)),
            (paths::ENVIRONMENT_YML, ENVIRONMENT_TEMPLATE.to_string()),
        ],
        ComponentKind::Task => vec![(paths::APP_SQL, fill(TASK_TEMPLATE, name))],
        ComponentKind::Pipe => Vec::new(),
    };

    let mut items = Vec::new();
    for (file, content) in files {
        io::atomic_write(&dir.join(file), content.as_bytes())?;
        items.push(ScaffoldItem::new(
            format!("{}/{name}/{file}", kind.base_dir()),
            ItemStatus::Created,
        ));
    }
    tracing::debug!(%kind, name, "component created");
    Ok(items)
}

fn new_pipe(root: &Path, name: &str) -> Result<Vec<ScaffoldItem>> {
    let sql_path = paths::pipe_sql_path(root, name);
    let mut pipes = PipesFile::load(root)?;
    if sql_path.exists() || pipes.get(name).is_some() {
        return Err(SnowdevError::ComponentExists {
            kind: ComponentKind::Pipe.label().to_string(),
            name: name.to_string(),
        });
    }

    io::atomic_write(&sql_path, PIPE_TEMPLATE.as_bytes())?;
    let pipes_existed = paths::pipes_path(root).exists();
    pipes.pipes.push(PipeConfig {
        name: name.to_string(),
        database: "MY_DATABASE".to_string(),
        schema: "PUBLIC".to_string(),
        table: name.to_uppercase(),
        stage: format!("{}_STAGE", name.to_uppercase()),
        stage_url: format!("s3://my-bucket/{name}/"),
        file_format: "MY_FILE_FORMAT".to_string(),
        auto_ingest: true,
    });
    pipes.save(root)?;

    Ok(vec![
        ScaffoldItem::new(format!("{}/{name}.sql", paths::PIPE_DIR), ItemStatus::Created),
        ScaffoldItem::new(
            paths::PIPES_FILE,
            if pipes_existed {
                ItemStatus::Updated
            } else {
                ItemStatus::Created
            },
        ),
    ])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{packages_from_manifest, EntityKind};
    use crate::handler::read_handler;
    use tempfile::TempDir;

    fn statuses(items: &[ScaffoldItem]) -> Vec<ItemStatus> {
        items.iter().map(|i| i.status).collect()
    }

    #[test]
    fn init_creates_layout() {
        let dir = TempDir::new().unwrap();
        let items = init(dir.path()).unwrap();

        for sub in ["src/udf", "src/sproc", "src/streamlit", "src/task", "src/pipe", "static/packages"] {
            assert!(dir.path().join(sub).is_dir(), "{sub} missing");
        }
        assert!(statuses(&items)
            .iter()
            .all(|s| *s != ItemStatus::Exists));

        let cfg = Config::load(dir.path()).unwrap();
        assert_eq!(cfg.stage, "SNOWDEV");

        let gitignore = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert_eq!(gitignore, ".env\n__pycache__/\n*.pyc\n");
        let env = std::fs::read_to_string(dir.path().join(".env")).unwrap();
        assert!(env.contains("USER_NAME="));
    }

    #[test]
    fn init_is_idempotent() {
        let dir = TempDir::new().unwrap();
        init(dir.path()).unwrap();
        std::fs::write(dir.path().join(".env"), "ACCOUNT=keep\n").unwrap();

        let again = init(dir.path()).unwrap();
        assert!(statuses(&again).iter().all(|s| *s == ItemStatus::Exists));
        assert_eq!(
            std::fs::read_to_string(dir.path().join(".env")).unwrap(),
            "ACCOUNT=keep\n"
        );
    }

    #[test]
    fn init_appends_to_existing_gitignore() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".gitignore"), "target/\n.env").unwrap();
        init(dir.path()).unwrap();
        let gitignore = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert_eq!(gitignore, "target/\n.env\n__pycache__/\n*.pyc\n");
    }

    #[test]
    fn new_function_templates_are_deployable() {
        let dir = TempDir::new().unwrap();
        new_component(dir.path(), ComponentKind::Udf, "get_sentiment").unwrap();
        new_component(dir.path(), ComponentKind::Sproc, "load_orders").unwrap();

        let udf = dir.path().join("src/udf/get_sentiment");
        let sig = read_handler(&udf.join("app.py"), EntityKind::Function).unwrap();
        assert_eq!(sig.sql_params(), "df STRING");
        assert!(packages_from_manifest(&udf.join("app.toml")).unwrap().is_empty());

        let sproc = dir.path().join("src/sproc/load_orders/app.py");
        let sig = read_handler(&sproc, EntityKind::Procedure).unwrap();
        assert!(sig.params.is_empty());
        assert_eq!(sig.returns, "STRING");
    }

    #[test]
    fn new_streamlit_and_task() {
        let dir = TempDir::new().unwrap();
        let items = new_component(dir.path(), ComponentKind::Streamlit, "dash").unwrap();
        assert_eq!(items[0].path, "src/streamlit/dash/streamlit_app.py");
        assert!(dir.path().join("src/streamlit/dash/environment.yml").is_file());

        new_component(dir.path(), ComponentKind::Task, "nightly").unwrap();
        let sql = std::fs::read_to_string(dir.path().join("src/task/nightly/app.sql")).unwrap();
        assert!(sql.starts_with("CREATE OR REPLACE TASK nightly"));
    }

    #[test]
    fn new_pipe_registers_entry() {
        let dir = TempDir::new().unwrap();
        let items = new_component(dir.path(), ComponentKind::Pipe, "orders").unwrap();
        assert_eq!(items[1].status, ItemStatus::Created);
        new_component(dir.path(), ComponentKind::Pipe, "events").unwrap();

        let pipes = PipesFile::load(dir.path()).unwrap();
        assert_eq!(pipes.pipes.len(), 2);
        assert_eq!(pipes.get("orders").unwrap().table, "ORDERS");

        let template = std::fs::read_to_string(dir.path().join("src/pipe/orders.sql")).unwrap();
        let rendered =
            crate::pipe::render(&template, &pipes.get("orders").unwrap().fields()).unwrap();
        assert!(rendered.contains("CREATE OR REPLACE PIPE MY_DATABASE.PUBLIC.orders"));
    }

    #[test]
    fn duplicates_and_bad_names_are_rejected() {
        let dir = TempDir::new().unwrap();
        new_component(dir.path(), ComponentKind::Udf, "f").unwrap();
        assert!(matches!(
            new_component(dir.path(), ComponentKind::Udf, "f"),
            Err(SnowdevError::ComponentExists { .. })
        ));
        new_component(dir.path(), ComponentKind::Pipe, "p").unwrap();
        assert!(matches!(
            new_component(dir.path(), ComponentKind::Pipe, "p"),
            Err(SnowdevError::ComponentExists { .. })
        ));
        assert!(matches!(
            new_component(dir.path(), ComponentKind::Task, "../x"),
            Err(SnowdevError::InvalidComponentName(_))
        ));
    }
}
