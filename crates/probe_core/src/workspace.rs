//! Private copies of an infrastructure definition.
//!
//! Terraform keeps state next to the definition, so concurrent runs against
//! one directory would share state. Each concurrent run gets its own copy.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{ProbeError, ProbeResult};

/// Names never copied: provider caches and local state.
fn is_local_state(name: &str) -> bool {
    name == ".terraform" || name.starts_with("terraform.tfstate")
}

/// A temporary copy of a definition, removed on drop unless kept.
#[derive(Debug)]
pub struct RunWorkspace {
    dir: TempDir,
    source: PathBuf,
}

impl RunWorkspace {
    /// Copy `source` into a fresh temporary directory, skipping local state.
    pub fn stage(source: &Path) -> ProbeResult<Self> {
        if !source.is_dir() {
            return Err(ProbeError::MissingConfiguration(format!(
                "working directory {} does not exist",
                source.display()
            )));
        }

        let dir = tempfile::Builder::new().prefix("infraprobe-").tempdir()?;
        let mut copied = 0usize;

        let walker = WalkDir::new(source)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| !is_local_state(&e.file_name().to_string_lossy()));

        for entry in walker {
            let entry = entry.map_err(std::io::Error::from)?;
            let relative = entry
                .path()
                .strip_prefix(source)
                .map_err(|e| ProbeError::Config(e.to_string()))?;
            let target = dir.path().join(relative);

            if entry.file_type().is_dir() {
                std::fs::create_dir_all(&target)?;
            } else if entry.file_type().is_file() {
                std::fs::copy(entry.path(), &target)?;
                copied += 1;
            }
        }

        debug!(
            "Staged {} file(s) from {} into {}",
            copied,
            source.display(),
            dir.path().display()
        );
        Ok(Self {
            dir,
            source: source.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Stop managing the copy and leave it on disk.
    pub fn keep(self) -> PathBuf {
        self.dir.keep()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_copies_definition_without_state() {
        let src = TempDir::new().unwrap();
        std::fs::write(src.path().join("main.tf"), "resource {}").unwrap();
        std::fs::create_dir(src.path().join("modules")).unwrap();
        std::fs::write(src.path().join("modules").join("sa.tf"), "module {}").unwrap();
        std::fs::create_dir(src.path().join(".terraform")).unwrap();
        std::fs::write(src.path().join(".terraform").join("plugin"), "bin").unwrap();
        std::fs::write(src.path().join("terraform.tfstate"), "{}").unwrap();
        std::fs::write(src.path().join("terraform.tfstate.backup"), "{}").unwrap();

        let ws = RunWorkspace::stage(src.path()).unwrap();

        assert!(ws.path().join("main.tf").is_file());
        assert!(ws.path().join("modules").join("sa.tf").is_file());
        assert!(!ws.path().join(".terraform").exists());
        assert!(!ws.path().join("terraform.tfstate").exists());
        assert!(!ws.path().join("terraform.tfstate.backup").exists());
        assert_eq!(ws.source(), src.path());
    }

    #[test]
    fn test_workspaces_are_distinct_and_cleaned_up() {
        let src = TempDir::new().unwrap();
        std::fs::write(src.path().join("main.tf"), "").unwrap();

        let a = RunWorkspace::stage(src.path()).unwrap();
        let b = RunWorkspace::stage(src.path()).unwrap();
        assert_ne!(a.path(), b.path());

        let path = a.path().to_path_buf();
        drop(a);
        assert!(!path.exists());
    }

    #[test]
    fn test_kept_workspace_survives() {
        let src = TempDir::new().unwrap();
        std::fs::write(src.path().join("main.tf"), "").unwrap();

        let ws = RunWorkspace::stage(src.path()).unwrap();
        let path = ws.keep();

        assert!(path.join("main.tf").is_file());
        std::fs::remove_dir_all(&path).unwrap();
    }

    #[test]
    fn test_missing_source() {
        let err = RunWorkspace::stage(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, ProbeError::MissingConfiguration(_)));
    }
}
