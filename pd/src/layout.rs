//! Package directory layout and host load-path activation

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::debug;

/// Where plugins live under the package root
///
/// ```text
/// <package>/pack/deps/
/// ├── opt/<name>     # installed by `add`, activated on demand
/// └── start/<name>   # always active
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    package: PathBuf,
}

impl Layout {
    pub fn new(package: impl Into<PathBuf>) -> Self {
        Self {
            package: package.into(),
        }
    }

    pub fn package(&self) -> &Path {
        &self.package
    }

    pub fn pack_dir(&self) -> PathBuf {
        self.package.join("pack").join("deps")
    }

    pub fn opt_dir(&self) -> PathBuf {
        self.pack_dir().join("opt")
    }

    pub fn start_dir(&self) -> PathBuf {
        self.pack_dir().join("start")
    }

    /// Install location for a plugin not yet on disk
    pub fn install_path(&self, name: &str) -> PathBuf {
        self.opt_dir().join(name)
    }

    /// Existing directory of a plugin, `opt` first then `start`
    pub fn find(&self, name: &str) -> Option<PathBuf> {
        [self.opt_dir().join(name), self.start_dir().join(name)]
            .into_iter()
            .find(|p| p.is_dir())
    }

    /// Every plugin directory physically present, `opt` entries first
    pub fn list_installed(&self) -> std::io::Result<Vec<PathBuf>> {
        debug!(package = ?self.package, "Layout::list_installed: called");
        let mut dirs = Vec::new();
        for root in [self.opt_dir(), self.start_dir()] {
            if !root.is_dir() {
                continue;
            }
            let mut entries: Vec<PathBuf> = fs::read_dir(&root)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect();
            entries.sort();
            dirs.extend(entries);
        }
        Ok(dirs)
    }
}

/// The host runtime's notion of "active plugin directories"
pub trait LoadPath: Send + Sync {
    /// Make a plugin directory visible to the host; repeated calls are no-ops
    fn activate(&mut self, name: &str, path: &Path);

    fn deactivate(&mut self, name: &str, path: &Path);
}

/// Ordered in-memory load path, shareable between clones
#[derive(Debug, Clone, Default)]
pub struct ActivePaths {
    inner: Arc<Mutex<Vec<PathBuf>>>,
}

impl ActivePaths {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.inner.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.inner.lock().map(|v| v.iter().any(|p| p == path)).unwrap_or(false)
    }
}

impl LoadPath for ActivePaths {
    fn activate(&mut self, name: &str, path: &Path) {
        debug!(%name, ?path, "ActivePaths::activate: called");
        if let Ok(mut paths) = self.inner.lock() {
            if !paths.iter().any(|p| p == path) {
                paths.push(path.to_path_buf());
            }
        }
    }

    fn deactivate(&mut self, name: &str, path: &Path) {
        debug!(%name, ?path, "ActivePaths::deactivate: called");
        if let Ok(mut paths) = self.inner.lock() {
            paths.retain(|p| p != path);
        }
    }
}
