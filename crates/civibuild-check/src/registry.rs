//! Instance existence checks.
//!
//! The provisioning tool keeps one directory per build under a build root,
//! next to a `<name>.sh` settings file. Either one is enough to treat the
//! name as taken.

use crate::error::CheckResult;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Answers whether a named instance is already provisioned.
#[async_trait]
pub trait InstanceRegistry: Send + Sync {
    async fn exists(&self, name: &str) -> CheckResult<bool>;
}

/// Registry backed by the provisioning tool's build directory.
#[derive(Debug, Clone)]
pub struct BuildDirRegistry {
    build_root: PathBuf,
}

impl BuildDirRegistry {
    pub fn new(build_root: impl Into<PathBuf>) -> Self {
        Self {
            build_root: build_root.into(),
        }
    }

    pub fn build_root(&self) -> &Path {
        &self.build_root
    }

    fn markers(&self, name: &str) -> [PathBuf; 2] {
        [
            self.build_root.join(name),
            self.build_root.join(format!("{name}.sh")),
        ]
    }
}

#[async_trait]
impl InstanceRegistry for BuildDirRegistry {
    async fn exists(&self, name: &str) -> CheckResult<bool> {
        for marker in self.markers(name) {
            if tokio::fs::try_exists(&marker).await? {
                debug!(marker = %marker.display(), "instance marker present");
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Registry that never reports an existing instance.
///
/// Used when no build root is known; the precondition is then unchecked.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRegistry;

#[async_trait]
impl InstanceRegistry for NullRegistry {
    async fn exists(&self, _name: &str) -> CheckResult<bool> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_empty_build_root_has_no_instances() {
        let dir = tempdir().unwrap();
        let registry = BuildDirRegistry::new(dir.path());
        assert!(!registry.exists("civibuild-test").await.unwrap());
    }

    #[tokio::test]
    async fn test_build_directory_marks_instance() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("civibuild-test")).unwrap();

        let registry = BuildDirRegistry::new(dir.path());
        assert!(registry.exists("civibuild-test").await.unwrap());
        assert!(!registry.exists("other").await.unwrap());
    }

    #[tokio::test]
    async fn test_settings_file_marks_instance() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("civibuild-test.sh"), b"SITE_TYPE=wp-demo\n").unwrap();

        let registry = BuildDirRegistry::new(dir.path());
        assert!(registry.exists("civibuild-test").await.unwrap());
    }

    #[tokio::test]
    async fn test_null_registry_never_finds_anything() {
        assert!(!NullRegistry.exists("civibuild-test").await.unwrap());
    }
}
