use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use chrono::Utc;

use crate::config::LanguageConfig;

static WORKSPACE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A private directory holding one request's source and build artifacts
///
/// The directory is removed by [`Workspace::cleanup`] or, failing that, when
/// the value is dropped, so it never outlives the call that allocated it.
#[derive(Debug)]
pub struct Workspace {
    id: String,
    dir: PathBuf,
    source_path: PathBuf,
    artifact_path: PathBuf,
    cleaned: bool,
}

impl Workspace {
    /// Creates a fresh, uniquely named directory under `root`
    pub fn allocate(root: &Path, language: &LanguageConfig) -> Result<Self> {
        fs::create_dir_all(root)
            .with_context(|| format!("Failed to create workspace root {}", root.display()))?;

        let id = format!(
            "{}-{}-{}",
            Utc::now().format("%y%m%d-%H%M%S%3f"),
            std::process::id(),
            WORKSPACE_COUNTER.fetch_add(1, Ordering::Relaxed),
        );
        let dir = root.join(&id);
        // create_dir (not create_dir_all) fails if the name were ever reused
        fs::create_dir(&dir)
            .with_context(|| format!("Failed to create workspace {}", dir.display()))?;

        log::debug!("Allocated workspace {id} for {}", language.name);

        Ok(Self {
            source_path: dir.join(&language.source_file),
            artifact_path: dir.join(&language.artifact),
            id,
            dir,
            cleaned: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    /// Writes the submitted source, terminated by a newline
    pub fn write_source(&self, source: &str) -> Result<()> {
        fs::write(&self.source_path, format!("{source}\n")).with_context(|| {
            format!("Failed to write source to {}", self.source_path.display())
        })?;
        Ok(())
    }

    /// Removes every file produced for this request
    ///
    /// Failures are logged and swallowed.
    pub fn cleanup(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.cleaned {
            return;
        }
        self.cleaned = true;

        match fs::remove_dir_all(&self.dir) {
            Ok(()) => log::debug!("Removed workspace {}", self.id),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Unable to remove workspace {}: {e}", self.dir.display()),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LanguageTable;

    fn test_root(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join("judge_server-workspace-tests")
            .join(format!("{name}-{}", std::process::id()))
    }

    fn java() -> LanguageConfig {
        LanguageTable::default().find("java").unwrap().clone()
    }

    #[test]
    fn test_allocate_creates_distinct_directories() {
        let root = test_root("distinct");
        let a = Workspace::allocate(&root, &java()).unwrap();
        let b = Workspace::allocate(&root, &java()).unwrap();

        assert_ne!(a.dir(), b.dir());
        assert!(a.dir().is_dir());
        assert!(b.dir().is_dir());
        // Same canonical file name, different directories
        assert_eq!(a.source_path().file_name(), b.source_path().file_name());
        assert_eq!(a.source_path(), a.dir().join("Main.java"));
        assert_eq!(a.artifact_path(), a.dir().join("Main.class"));

        a.cleanup();
        b.cleanup();
        let _ = fs::remove_dir(&root);
    }

    #[test]
    fn test_cleanup_removes_everything() {
        let root = test_root("cleanup");
        let workspace = Workspace::allocate(&root, &java()).unwrap();
        workspace.write_source("class Main {}").unwrap();
        fs::write(workspace.artifact_path(), b"bytecode").unwrap();
        let dir = workspace.dir().to_path_buf();

        assert_eq!(
            fs::read_to_string(workspace.source_path()).unwrap(),
            "class Main {}\n"
        );

        workspace.cleanup();
        assert!(!dir.exists());
        let _ = fs::remove_dir(&root);
    }

    #[test]
    fn test_drop_removes_directory() {
        let root = test_root("drop");
        let dir = {
            let workspace = Workspace::allocate(&root, &java()).unwrap();
            workspace.write_source("class Main {}").unwrap();
            workspace.dir().to_path_buf()
        };
        assert!(!dir.exists());
        let _ = fs::remove_dir(&root);
    }

    #[test]
    fn test_cleanup_tolerates_vanished_directory() {
        let root = test_root("vanished");
        let workspace = Workspace::allocate(&root, &java()).unwrap();
        fs::remove_dir_all(workspace.dir()).unwrap();
        workspace.cleanup();
        let _ = fs::remove_dir(&root);
    }
}
