//! Pipes declared in `src/pipe/pipes.yml`, each rendered from `<name>.sql`.
//!
//! Templates use positional placeholders in declaration order:
//! `{0}` name, `{1}` database, `{2}` schema, `{3}` table, `{4}` stage,
//! `{5}` stage_url, `{6}` file_format, `{7}` auto_ingest. `{{` and `}}`
//! produce literal braces.

use crate::error::{Result, SnowdevError};
use crate::session::Session;
use crate::task::split_statements;
use crate::{io, paths};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipeConfig {
    pub name: String,
    pub database: String,
    pub schema: String,
    pub table: String,
    pub stage: String,
    pub stage_url: String,
    pub file_format: String,
    #[serde(default)]
    pub auto_ingest: bool,
}

impl PipeConfig {
    /// Values for `{0}`..`{7}`.
    pub fn fields(&self) -> [String; 8] {
        [
            self.name.clone(),
            self.database.clone(),
            self.schema.clone(),
            self.table.clone(),
            self.stage.clone(),
            self.stage_url.clone(),
            self.file_format.clone(),
            if self.auto_ingest { "TRUE" } else { "FALSE" }.to_string(),
        ]
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipesFile {
    #[serde(default)]
    pub pipes: Vec<PipeConfig>,
}

impl PipesFile {
    /// A missing file is an empty list.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::pipes_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&data)?)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        io::atomic_write(&paths::pipes_path(root), data.as_bytes())
    }

    pub fn get(&self, name: &str) -> Option<&PipeConfig> {
        self.pipes.iter().find(|p| p.name == name)
    }
}

/// Substitute `{N}` placeholders. Unknown or unterminated placeholders are errors.
pub fn render(template: &str, fields: &[String]) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut index = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(d) => index.push(d),
                        None => return Err(format!("unterminated placeholder '{{{index}'")),
                    }
                }
                let value = index
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| fields.get(i))
                    .ok_or_else(|| format!("unknown placeholder '{{{index}}}'"))?;
                out.push_str(value);
            }
            '}' => return Err("unmatched '}' (use '}}' for a literal brace)".to_string()),
            _ => out.push(c),
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, Serialize)]
pub struct PipeRun {
    pub name: String,
    pub statements: Vec<String>,
}

pub fn run_pipe(session: &mut dyn Session, root: &Path, name: &str) -> Result<PipeRun> {
    paths::validate_component_name(name)?;
    let pipes = PipesFile::load(root)?;
    let pipe = pipes
        .get(name)
        .ok_or_else(|| SnowdevError::PipeNotFound(name.to_string()))?;

    let sql_path = paths::pipe_sql_path(root, name);
    if !sql_path.is_file() {
        return Err(SnowdevError::ComponentNotFound {
            kind: "pipe".to_string(),
            path: sql_path.display().to_string(),
        });
    }
    let template = std::fs::read_to_string(&sql_path)?;
    let rendered = render(&template, &pipe.fields()).map_err(|reason| {
        SnowdevError::InvalidManifest {
            path: sql_path.display().to_string(),
            reason,
        }
    })?;
    let statements = split_statements(&rendered);
    if statements.is_empty() {
        return Err(SnowdevError::EmptySql(sql_path.display().to_string()));
    }

    for statement in &statements {
        tracing::info!(pipe = name, %statement, "executing");
        session.sql(statement)?;
    }
    Ok(PipeRun {
        name: name.to_string(),
        statements,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
