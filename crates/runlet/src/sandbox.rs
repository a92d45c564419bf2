use std::fs;
use std::path::{Component, Path, PathBuf};

use tempfile::TempDir;

use crate::error::RunError;
use crate::request::{RunMode, RunRequest};

// Removal happens on drop, on every exit path, after the child process has
// been reaped.
pub struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    pub fn create(base: &Path) -> Result<Self, RunError> {
        let dir = tempfile::Builder::new().prefix("runlet-").tempdir_in(base)?;
        Ok(Self { dir })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn stage(&self, request: &RunRequest, entrypoint: &str) -> Result<PathBuf, RunError> {
        match request.mode() {
            RunMode::Files => {
                let files = request.files.as_ref().ok_or(RunError::CodeNotFound)?;
                for (filepath, content) in files {
                    let target = contained_join(self.root(), filepath)?;
                    create_parent_dirs(&target)?;
                    fs::write(&target, content)?;
                }
                contained_join(self.root(), entrypoint)
            }
            RunMode::Code => {
                let code = request.code.as_deref().ok_or(RunError::CodeNotFound)?;
                let target = contained_join(self.root(), entrypoint)?;
                create_parent_dirs(&target)?;
                fs::write(&target, code)?;
                Ok(target)
            }
        }
    }
}

// Lexical containment: absolute paths and any `..` traversal that would
// climb past the sandbox root are rejected before anything touches disk.
pub fn contained_join(root: &Path, relative: &str) -> Result<PathBuf, RunError> {
    let candidate = Path::new(relative);
    if relative.is_empty() || candidate.is_absolute() {
        return Err(RunError::InvalidFilepath);
    }
    let mut resolved: Vec<&std::ffi::OsStr> = Vec::new();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if resolved.pop().is_none() {
                    return Err(RunError::InvalidFilepath);
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(RunError::InvalidFilepath);
            }
        }
    }
    if resolved.is_empty() {
        return Err(RunError::InvalidFilepath);
    }
    let mut target = root.to_path_buf();
    target.extend(resolved);
    Ok(target)
}

fn create_parent_dirs(target: &Path) -> Result<(), RunError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}
