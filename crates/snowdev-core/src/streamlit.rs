use crate::component::ComponentKind;
use crate::config::Config;
use crate::error::{Result, SnowdevError};
use crate::session::{self, PutResult, Session};
use crate::{io, paths, stage};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct StreamlitDeployment {
    pub name: String,
    pub display_name: String,
    pub root_location: String,
    pub warehouse: String,
    pub files: Vec<PutResult>,
}

/// `sales_dashboard` → `Sales dashboard`
pub fn display_name(app: &str) -> String {
    let spaced = app.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

pub fn root_location(stage: &str, app: &str) -> String {
    format!("@{stage}/streamlit/{app}")
}

pub fn create_statement(display_name: &str, root_location: &str, warehouse: &str) -> String {
    format!(
        "CREATE OR REPLACE STREAMLIT \"{}\"\n\
         ROOT_LOCATION = '{root_location}'\n\
         MAIN_FILE = '{}'\n\
         QUERY_WAREHOUSE = '{warehouse}'",
        display_name.replace('"', ""),
        paths::STREAMLIT_APP_PY,
    )
}

/// Upload the app directory and (re)create the Streamlit object.
pub fn deploy_streamlit(
    session: &mut dyn Session,
    root: &Path,
    config: &Config,
    name: &str,
) -> Result<StreamlitDeployment> {
    paths::validate_component_name(name)?;
    let kind = ComponentKind::Streamlit;
    let dir = kind.component_dir(root, name);
    let entry = dir.join(paths::STREAMLIT_APP_PY);
    if !entry.is_file() {
        return Err(SnowdevError::ComponentNotFound {
            kind: kind.label().to_string(),
            path: entry.display().to_string(),
        });
    }

    if config.streamlit.required_database.is_some() {
        config.streamlit.check(&session::current_database(session)?)?;
    }
    let warehouse = session::current_warehouse(session)?;

    stage::upload_component_files(session, &dir, &config.stage, name)?;

    let location = root_location(&config.stage, name);
    let mut files = Vec::new();
    for file in io::files_in(&dir)? {
        tracing::info!(file = %file.display(), %location, "uploading");
        files.push(session.put(&file, &location)?);
    }

    let shown = display_name(name);
    session.sql(&create_statement(&shown, &location, &warehouse))?;
    tracing::info!(app = %shown, "streamlit app deployed");

    Ok(StreamlitDeployment {
        name: name.to_string(),
        display_name: shown,
        root_location: location,
        warehouse,
        files,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeployGuard;
    use crate::session::fake::{scalar_row, FakePlatform};
    use tempfile::TempDir;

    fn app(root: &Path, name: &str) {
        let dir = root.join("src/streamlit").join(name);
        std::fs::create_dir_all(dir.join("uploads")).unwrap();
        std::fs::write(dir.join("streamlit_app.py"), "import streamlit as st\n").unwrap();
        std::fs::write(dir.join("environment.yml"), "name: app_environment\n").unwrap();
        std::fs::write(dir.join("uploads/data.csv"), "a,b\n").unwrap();
    }

    fn platform(database: &str) -> FakePlatform {
        FakePlatform::new()
            .with_rows("SELECT current_database()", vec![scalar_row(database)])
            .with_rows("SELECT current_warehouse()", vec![scalar_row("\"COMPUTE_WH\"")])
    }

    #[test]
    fn display_names() {
        assert_eq!(display_name("sales_dashboard"), "Sales dashboard");
        assert_eq!(display_name("MyApp"), "Myapp");
        assert_eq!(display_name(""), "");
    }

    #[test]
    fn statement_shape() {
        assert_eq!(
            create_statement("Snowchat", "@SNOWDEV/streamlit/snowchat", "WH"),
            "CREATE OR REPLACE STREAMLIT \"Snowchat\"\n\
             ROOT_LOCATION = '@SNOWDEV/streamlit/snowchat'\n\
             MAIN_FILE = 'streamlit_app.py'\n\
             QUERY_WAREHOUSE = 'WH'"
        );
    }

    #[test]
    fn deploy_uploads_then_creates() {
        let dir = TempDir::new().unwrap();
        app(dir.path(), "snow_chat");
        let mut platform = platform("ANALYTICS");

        let deployment =
            deploy_streamlit(&mut platform, dir.path(), &Config::new("p"), "snow_chat").unwrap();

        assert_eq!(deployment.display_name, "Snow chat");
        assert_eq!(deployment.warehouse, "COMPUTE_WH");
        assert_eq!(deployment.files.len(), 2);
        let targets: Vec<&str> = platform.puts.iter().map(|(_, t)| t.as_str()).collect();
        assert_eq!(
            targets,
            vec![
                "@SNOWDEV/snow_chat",
                "@SNOWDEV/streamlit/snow_chat",
                "@SNOWDEV/streamlit/snow_chat",
            ]
        );
        let create = platform.statements_starting_with("CREATE OR REPLACE STREAMLIT");
        assert_eq!(create.len(), 1);
        assert!(create[0].contains("QUERY_WAREHOUSE = 'COMPUTE_WH'"));
        assert!(platform.statements_starting_with("SELECT current_database()").is_empty());
    }

    #[test]
    fn wrong_database_is_refused_before_upload() {
        let dir = TempDir::new().unwrap();
        app(dir.path(), "snowchat");
        let mut config = Config::new("p");
        config.streamlit = DeployGuard {
            required_database: Some("ANALYTICS".to_string()),
        };
        let mut platform = platform("RAW");

        let err = deploy_streamlit(&mut platform, dir.path(), &config, "snowchat").unwrap_err();
        assert!(matches!(err, SnowdevError::WrongDatabase { .. }));
        assert!(platform.puts.is_empty());
    }

    #[test]
    fn missing_app() {
        let dir = TempDir::new().unwrap();
        let err = deploy_streamlit(&mut FakePlatform::new(), dir.path(), &Config::new("p"), "nope")
            .unwrap_err();
        assert!(matches!(err, SnowdevError::ComponentNotFound { .. }));
    }
}
