//! Runs a function or procedure on the developer's machine through poetry.

use crate::component::{packages_from_manifest, ComponentKind};
use crate::error::{Result, SnowdevError};
use crate::paths;
use std::path::{Path, PathBuf};
use std::process::Command;

pub const POETRY: &str = "poetry";

/// The poetry invocations for one local run, in order.
pub fn plan(packages: &[String]) -> Vec<Vec<String>> {
    let mut steps = vec![vec!["install".to_string()]];
    if !packages.is_empty() {
        let mut pip = vec!["run".to_string(), "pip".to_string(), "install".to_string()];
        pip.extend(packages.iter().cloned());
        steps.push(pip);
    }
    steps.push(vec![
        "run".to_string(),
        "python".to_string(),
        paths::APP_PY.to_string(),
    ]);
    steps
}

fn component_entry(root: &Path, kind: ComponentKind, name: &str) -> Result<PathBuf> {
    paths::validate_component_name(name)?;
    let dir = kind.component_dir(root, name);
    let entry = dir.join(kind.entry_file().unwrap_or(paths::APP_PY));
    if !entry.is_file() {
        return Err(SnowdevError::ComponentNotFound {
            kind: kind.label().to_string(),
            path: entry.display().to_string(),
        });
    }
    Ok(dir)
}

/// Install dependencies and run `app.py` in the component directory with
/// inherited stdio.
pub fn run_locally(root: &Path, kind: ComponentKind, name: &str) -> Result<()> {
    if kind.entity_kind().is_none() {
        return Err(SnowdevError::InvalidKind(format!(
            "{kind} components cannot be run locally"
        )));
    }
    let dir = component_entry(root, kind, name)?;
    let manifest = dir.join(paths::APP_TOML);
    let packages = if manifest.is_file() {
        packages_from_manifest(&manifest)?
    } else {
        Vec::new()
    };

    let poetry = which::which(POETRY).map_err(|_| SnowdevError::ToolNotFound(POETRY.into()))?;
    for args in plan(&packages) {
        let line = format!("{POETRY} {}", args.join(" "));
        tracing::info!(command = %line, dir = %dir.display(), "running");
        let status = Command::new(&poetry)
            .args(&args)
            .current_dir(&dir)
            .env("SNOWDEV_ROOT", root)
            .status()?;
        if !status.success() {
            return Err(SnowdevError::CommandFailed(format!("{line} exited with {status}")));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
