use crate::error::Result;
use crate::session::{PutResult, Session};
use crate::{io, paths};
use std::path::Path;

/// `<database>.<schema>.<stage>`
pub fn qualified_stage(database: &str, schema: &str, stage: &str) -> String {
    format!("{database}.{schema}.{stage}")
}

pub fn stage_exists(session: &mut dyn Session, stage: &str) -> bool {
    match session.sql(&format!("DESC STAGE {stage}")) {
        Ok(_) => true,
        Err(e) => {
            tracing::debug!(%stage, error = %e, "stage not found");
            false
        }
    }
}

pub fn create_stage(session: &mut dyn Session, stage: &str) -> Result<()> {
    session.sql(&format!(
        "CREATE STAGE IF NOT EXISTS {stage} DIRECTORY = (ENABLE = TRUE)"
    ))?;
    Ok(())
}

/// Create `stage` if missing. Returns true if it was created.
pub fn ensure_stage(session: &mut dyn Session, stage: &str) -> Result<bool> {
    if stage_exists(session, stage) {
        return Ok(false);
    }
    tracing::info!(%stage, "creating stage");
    create_stage(session, stage)?;
    Ok(true)
}

/// Upload every file under `dir` to `target`, keeping the relative
/// directory layout: `dir/a/b.txt` lands in `<target>/a`.
pub fn upload_tree(session: &mut dyn Session, dir: &Path, target: &str) -> Result<Vec<PutResult>> {
    let target = target.trim_end_matches('/');
    let mut results = Vec::new();
    for file in io::files_under(dir)? {
        let rel_dir = file
            .parent()
            .and_then(|p| p.strip_prefix(dir).ok())
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default();
        let location = if rel_dir.is_empty() {
            target.to_string()
        } else {
            format!("{target}/{rel_dir}")
        };
        tracing::info!(file = %file.display(), %location, "uploading");
        results.push(session.put(&file, &location)?);
    }
    Ok(results)
}

/// Upload `static/` to `@<stage>/static`, creating the stage first.
pub fn upload_static(session: &mut dyn Session, root: &Path, stage: &str) -> Result<Vec<PutResult>> {
    let dir = paths::static_dir(root);
    if !dir.is_dir() {
        tracing::warn!(path = %dir.display(), "no static directory, nothing to upload");
        return Ok(Vec::new());
    }
    ensure_stage(session, stage)?;
    upload_tree(session, &dir, &format!("@{stage}/static"))
}

/// Upload a component's `uploads/` directory to `@<stage>/<name>`, if present.
pub fn upload_component_files(
    session: &mut dyn Session,
    component_dir: &Path,
    stage: &str,
    name: &str,
) -> Result<Vec<PutResult>> {
    let dir = paths::uploads_dir(component_dir);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    upload_tree(session, &dir, &format!("@{stage}/{name}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
