use crate::error::{Result, SnowdevError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const SRC_DIR: &str = "src";
pub const UDF_DIR: &str = "src/udf";
pub const SPROC_DIR: &str = "src/sproc";
pub const STREAMLIT_DIR: &str = "src/streamlit";
pub const TASK_DIR: &str = "src/task";
pub const PIPE_DIR: &str = "src/pipe";
pub const STATIC_DIR: &str = "static";
pub const PACKAGES_DIR: &str = "static/packages";

/// Per-component directory whose files are staged before deployment.
pub const UPLOADS_DIR: &str = "uploads";

pub const CONFIG_FILE: &str = "snowdev.yaml";
pub const ENV_FILE: &str = ".env";
pub const PYPROJECT_FILE: &str = "pyproject.toml";
pub const PIPES_FILE: &str = "src/pipe/pipes.yml";

pub const APP_PY: &str = "app.py";
pub const APP_TOML: &str = "app.toml";
pub const IMPORTS_TXT: &str = "imports.txt";
pub const STREAMLIT_APP_PY: &str = "streamlit_app.py";
pub const ENVIRONMENT_YML: &str = "environment.yml";
pub const APP_SQL: &str = "app.sql";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn env_path(root: &Path) -> PathBuf {
    root.join(ENV_FILE)
}

pub fn static_dir(root: &Path) -> PathBuf {
    root.join(STATIC_DIR)
}

pub fn pipes_path(root: &Path) -> PathBuf {
    root.join(PIPES_FILE)
}

pub fn pipe_sql_path(root: &Path, name: &str) -> PathBuf {
    root.join(PIPE_DIR).join(format!("{name}.sql"))
}

pub fn task_sql_path(root: &Path, name: &str) -> PathBuf {
    root.join(TASK_DIR).join(name).join(APP_SQL)
}

pub fn uploads_dir(component_dir: &Path) -> PathBuf {
    component_dir.join(UPLOADS_DIR)
}

// ---------------------------------------------------------------------------
// Name validation
// ---------------------------------------------------------------------------

static NAME_RE: OnceLock<Regex> = OnceLock::new();

fn name_re() -> &'static Regex {
    NAME_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").unwrap())
}

/// Component names become SQL identifiers and directory names, so they are
/// restricted to `[A-Za-z0-9_]`.
pub fn validate_component_name(name: &str) -> Result<()> {
    if name.len() > 255 || !name_re().is_match(name) {
        return Err(SnowdevError::InvalidComponentName(name.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        for name in ["get_sentiment", "A", "daily_load_2", "UPPER_case"] {
            validate_component_name(name).unwrap_or_else(|_| panic!("expected valid: {name}"));
        }
    }

    #[test]
    fn invalid_names() {
        for name in ["", "has spaces", "dash-name", "semi;colon", "quote'", "dot.name"] {
            assert!(
                validate_component_name(name).is_err(),
                "expected invalid: {name}"
            );
        }
    }

    #[test]
    fn path_helpers() {
        let root = Path::new("/tmp/proj");
        assert_eq!(config_path(root), PathBuf::from("/tmp/proj/snowdev.yaml"));
        assert_eq!(
            task_sql_path(root, "nightly"),
            PathBuf::from("/tmp/proj/src/task/nightly/app.sql")
        );
        assert_eq!(
            pipe_sql_path(root, "events"),
            PathBuf::from("/tmp/proj/src/pipe/events.sql")
        );
        assert_eq!(
            pipes_path(root),
            PathBuf::from("/tmp/proj/src/pipe/pipes.yml")
        );
    }
}
