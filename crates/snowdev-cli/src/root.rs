use snowdev_core::paths;
use std::path::{Path, PathBuf};

/// Resolve the project root.
///
/// Priority:
/// 1. `--root` flag / `SNOWDEV_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `snowdev.yaml`
/// 3. Walk upward from `cwd` looking for `.git/`
/// 4. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_upward(&cwd, |dir| paths::config_path(dir).is_file())
        .or_else(|| find_upward(&cwd, |dir| dir.join(".git").is_dir()))
        .unwrap_or(cwd)
}

fn find_upward(start: &Path, matches: impl Fn(&Path) -> bool) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| matches(dir))
        .map(Path::to_path_buf)
}

/// Load `<root>/.env` into the process environment. Variables already set
/// win; a missing file is fine.
pub fn load_env(root: &Path) {
    let env_path = paths::env_path(root);
    if !env_path.is_file() {
        return;
    }
    if let Err(e) = dotenv::from_path(&env_path) {
        tracing::warn!(path = %env_path.display(), "failed to read .env: {e}");
    }
}
