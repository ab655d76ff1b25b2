use crate::error::{Result, SnowdevError};
use crate::{io, paths};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ComponentKind
// ---------------------------------------------------------------------------

/// Everything snowdev can scaffold and deploy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Udf,
    Sproc,
    Streamlit,
    Task,
    Pipe,
}

impl ComponentKind {
    pub fn all() -> &'static [ComponentKind] {
        &[
            ComponentKind::Udf,
            ComponentKind::Sproc,
            ComponentKind::Streamlit,
            ComponentKind::Task,
            ComponentKind::Pipe,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ComponentKind::Udf => "udf",
            ComponentKind::Sproc => "sproc",
            ComponentKind::Streamlit => "streamlit",
            ComponentKind::Task => "task",
            ComponentKind::Pipe => "pipe",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ComponentKind::Udf => "UDF",
            ComponentKind::Sproc => "stored procedure",
            ComponentKind::Streamlit => "Streamlit app",
            ComponentKind::Task => "task",
            ComponentKind::Pipe => "pipe",
        }
    }

    /// Project-relative directory holding components of this kind.
    pub fn base_dir(self) -> &'static str {
        match self {
            ComponentKind::Udf => paths::UDF_DIR,
            ComponentKind::Sproc => paths::SPROC_DIR,
            ComponentKind::Streamlit => paths::STREAMLIT_DIR,
            ComponentKind::Task => paths::TASK_DIR,
            ComponentKind::Pipe => paths::PIPE_DIR,
        }
    }

    /// Entry file inside the component directory. Pipes are single files
    /// directly under `src/pipe` and have no directory of their own.
    pub fn entry_file(self) -> Option<&'static str> {
        match self {
            ComponentKind::Udf | ComponentKind::Sproc => Some(paths::APP_PY),
            ComponentKind::Streamlit => Some(paths::STREAMLIT_APP_PY),
            ComponentKind::Task => Some(paths::APP_SQL),
            ComponentKind::Pipe => None,
        }
    }

    pub fn component_dir(self, root: &Path, name: &str) -> PathBuf {
        root.join(self.base_dir()).join(name)
    }

    pub fn entity_kind(self) -> Option<EntityKind> {
        match self {
            ComponentKind::Udf => Some(EntityKind::Function),
            ComponentKind::Sproc => Some(EntityKind::Procedure),
            _ => None,
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ComponentKind {
    type Err = SnowdevError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "udf" => Ok(ComponentKind::Udf),
            "sproc" => Ok(ComponentKind::Sproc),
            "streamlit" => Ok(ComponentKind::Streamlit),
            "task" => Ok(ComponentKind::Task),
            "pipe" => Ok(ComponentKind::Pipe),
            _ => Err(SnowdevError::InvalidKind(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// EntityKind
// ---------------------------------------------------------------------------

/// Platform entities that go through shadow-then-promote registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Function,
    Procedure,
}

impl EntityKind {
    /// Object type for `SHOW <..> LIKE`.
    pub fn show_keyword(self) -> &'static str {
        match self {
            EntityKind::Function => "USER FUNCTIONS",
            EntityKind::Procedure => "PROCEDURES",
        }
    }

    /// Object type for `CREATE` and `DROP`.
    pub fn sql_keyword(self) -> &'static str {
        match self {
            EntityKind::Function => "FUNCTION",
            EntityKind::Procedure => "PROCEDURE",
        }
    }

    pub fn component_kind(self) -> ComponentKind {
        match self {
            EntityKind::Function => ComponentKind::Udf,
            EntityKind::Procedure => ComponentKind::Sproc,
        }
    }

    pub fn label(self) -> &'static str {
        self.component_kind().label()
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::Function => "function",
            EntityKind::Procedure => "procedure",
        })
    }
}

// ---------------------------------------------------------------------------
// DeployableUnit
// ---------------------------------------------------------------------------

/// A function or procedure read from `src/<kind>/<name>/`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeployableUnit {
    pub kind: EntityKind,
    pub name: String,
    pub source: PathBuf,
    pub packages: Vec<String>,
    pub imports: Vec<String>,
    pub stage: String,
}

impl DeployableUnit {
    pub fn load(root: &Path, kind: EntityKind, name: &str, stage: &str) -> Result<Self> {
        paths::validate_component_name(name)?;
        let component = kind.component_kind();
        let dir = component.component_dir(root, name);
        let source = dir.join(paths::APP_PY);
        if !source.is_file() {
            return Err(SnowdevError::ComponentNotFound {
                kind: component.label().to_string(),
                path: source.display().to_string(),
            });
        }

        let manifest = dir.join(paths::APP_TOML);
        let packages = if manifest.is_file() {
            packages_from_manifest(&manifest)?
        } else {
            tracing::debug!(path = %manifest.display(), "no manifest, deploying without packages");
            Vec::new()
        };

        let imports = io::read_lines_if_exists(&dir.join(paths::IMPORTS_TXT))?.unwrap_or_default();

        Ok(Self {
            kind,
            name: name.to_string(),
            source,
            packages,
            imports,
            stage: stage.to_string(),
        })
    }

    pub fn dir(&self) -> &Path {
        self.source.parent().unwrap_or(Path::new("."))
    }

    /// Package names without version specifiers.
    pub fn package_names(&self) -> Vec<String> {
        self.packages.iter().map(|p| package_name(p).to_string()).collect()
    }
}

// ---------------------------------------------------------------------------
// Manifest parsing
// ---------------------------------------------------------------------------

/// Read `[tool.poetry.dependencies]` from an `app.toml`, skipping `python`.
pub fn packages_from_manifest(path: &Path) -> Result<Vec<String>> {
    let data = std::fs::read_to_string(path)?;
    let doc: toml::Value = toml::from_str(&data)?;
    let invalid = |reason: &str| SnowdevError::InvalidManifest {
        path: path.display().to_string(),
        reason: reason.to_string(),
    };

    let Some(deps) = doc
        .get("tool")
        .and_then(|t| t.get("poetry"))
        .and_then(|p| p.get("dependencies"))
    else {
        return Ok(Vec::new());
    };
    let deps = deps
        .as_table()
        .ok_or_else(|| invalid("tool.poetry.dependencies must be a table"))?;

    let mut packages = Vec::new();
    for (name, spec) in deps {
        if name == "python" {
            continue;
        }
        let version = match spec {
            toml::Value::String(v) => v.as_str(),
            toml::Value::Table(t) => t.get("version").and_then(|v| v.as_str()).unwrap_or("*"),
            _ => return Err(invalid(&format!("dependency '{name}' has an unsupported value"))),
        };
        packages.push(package_spec(name, version));
    }
    Ok(packages)
}

/// Render a poetry dependency as a platform package spec.
fn package_spec(name: &str, version: &str) -> String {
    let version = version.trim();
    if version.is_empty() || version == "*" {
        return name.to_string();
    }
    if ["==", ">=", "<=", ">", "<"].iter().any(|op| version.starts_with(op)) {
        return format!("{name}{version}");
    }
    if let Some(floor) = version.strip_prefix('^').or_else(|| version.strip_prefix('~')) {
        return format!("{name}>={}", floor.trim_start_matches('='));
    }
    format!("{name}=={version}")
}

/// Strip a version specifier: `pandas==1.5.3` → `pandas`.
pub fn package_name(spec: &str) -> &str {
    let end = spec
        .find(|c: char| matches!(c, '=' | '<' | '>' | '!' | '~' | ' ' | '['))
        .unwrap_or(spec.len());
    &spec[..end]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
