//! Root directory resolution.
use std::{
    env,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::error::RuntimeError;

/// Returns the absolute directory containing `executable`.
///
/// Symlinks are resolved when possible so that an installed link still points the
/// supervisor at the directory holding its configuration and child.
pub fn root_of(executable: &Path) -> Result<PathBuf, RuntimeError> {
    let resolved = executable
        .canonicalize()
        .unwrap_or_else(|_| executable.to_path_buf());

    let parent = resolved
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| RuntimeError::NoParent(resolved.clone()))?;

    if parent.is_absolute() {
        Ok(parent.to_path_buf())
    } else {
        let cwd = env::current_dir().map_err(RuntimeError::CurrentExe)?;
        Ok(cwd.join(parent))
    }
}

/// Resolves the directory holding the running warden executable.
pub fn resolve_root() -> Result<PathBuf, RuntimeError> {
    let exe = env::current_exe().map_err(RuntimeError::CurrentExe)?;
    root_of(&exe)
}

/// Makes `root` the process working directory.
pub fn enter_root(root: &Path) -> Result<(), RuntimeError> {
    env::set_current_dir(root).map_err(|source| RuntimeError::EnterRoot {
        path: root.to_path_buf(),
        source,
    })?;
    debug!("Working directory set to {}", root.display());
    Ok(())
}
