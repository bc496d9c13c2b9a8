//! Check configuration.
//!
//! Layers, lowest precedence first: built-in defaults, an optional JSON file,
//! environment variables. The CLI applies its flags on top.

use crate::error::{CheckError, CheckResult};
use crate::invocation::{CreateSpec, DEFAULT_TOOL};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Provisioning tool binary (name on `PATH` or absolute path).
pub const ENV_TOOL: &str = "CIVIBUILD_BIN";
/// Directory the tool keeps its builds in.
pub const ENV_BUILD_ROOT: &str = "CIVIBUILD_BUILD_ROOT";
/// Bounded wait for `create`, in seconds (`0` waits forever).
pub const ENV_TIMEOUT_SECS: &str = "CIVIBUILD_CHECK_TIMEOUT_SECS";
/// Keep the instance after the run (`1`/`true`).
pub const ENV_KEEP: &str = "CIVIBUILD_CHECK_KEEP";

/// Configuration for one provisioning check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CheckConfig {
    /// Provisioning tool binary.
    pub tool: String,

    /// Parameters of the `create` invocation.
    pub create: CreateSpec,

    /// Build root consulted for pre-existing instances (unchecked when `None`).
    pub build_root: Option<PathBuf>,

    /// Working directory for the tool (inherited when `None`).
    pub working_dir: Option<PathBuf>,

    /// Extra environment for the tool, on top of the inherited environment.
    pub env: BTreeMap<String, String>,

    /// Timeout for `create` in seconds; `0` disables the bound.
    pub timeout_secs: u64,

    /// Timeout for `destroy` in seconds; `0` disables the bound.
    pub teardown_timeout_secs: u64,

    /// Leave the instance in place after the run.
    pub keep_instance: bool,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            tool: DEFAULT_TOOL.to_string(),
            create: CreateSpec::default(),
            build_root: None,
            working_dir: None,
            env: BTreeMap::new(),
            timeout_secs: 3600,
            teardown_timeout_secs: 600,
            keep_instance: false,
        }
    }
}

impl CheckConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> CheckResult<Self> {
        Self::default().with_env_from(|key| std::env::var(key).ok())
    }

    /// Load a JSON config file; missing fields fall back to defaults.
    pub fn from_file(path: &Path) -> CheckResult<Self> {
        let content = std::fs::read(path)?;
        Ok(serde_json::from_slice(&content)?)
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn with_env_from<F>(mut self, lookup: F) -> CheckResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(tool) = lookup(ENV_TOOL) {
            self.tool = tool;
        }
        if let Some(root) = lookup(ENV_BUILD_ROOT) {
            self.build_root = Some(PathBuf::from(root));
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            self.timeout_secs = raw.trim().parse().map_err(|_| {
                CheckError::InvalidConfig(format!("{ENV_TIMEOUT_SECS}={raw:?} is not a number"))
            })?;
        }
        if let Some(raw) = lookup(ENV_KEEP) {
            self.keep_instance = parse_flag(&raw).ok_or_else(|| {
                CheckError::InvalidConfig(format!("{ENV_KEEP}={raw:?} is not a boolean"))
            })?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> CheckResult<()> {
        if self.tool.trim().is_empty() {
            return Err(CheckError::InvalidConfig("tool must not be empty".to_string()));
        }
        self.create.validate()
    }

    /// Bounded wait for `create`.
    pub fn timeout(&self) -> Option<Duration> {
        secs_to_timeout(self.timeout_secs)
    }

    /// Bounded wait for `destroy`.
    pub fn teardown_timeout(&self) -> Option<Duration> {
        secs_to_timeout(self.teardown_timeout_secs)
    }
}

fn secs_to_timeout(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_acceptance_parameters() {
        let cfg = CheckConfig::default();
        assert_eq!(cfg.tool, "civibuild");
        assert_eq!(cfg.create.instance_name, "civibuild-test");
        assert_eq!(cfg.create.build_type, "wp-demo");
        assert_eq!(cfg.create.civi_version, "master");
        assert_eq!(cfg.create.url, "http://civibuild-test.localhost");
        assert!(cfg.create.force);
        assert!(!cfg.keep_instance);
        assert_eq!(cfg.timeout(), Some(Duration::from_secs(3600)));
        cfg.validate().unwrap();
    }

    #[test]
    fn test_env_overrides() {
        let cfg = CheckConfig::default()
            .with_env_from(lookup_from(&[
                (ENV_TOOL, "/opt/buildkit/bin/civibuild"),
                (ENV_BUILD_ROOT, "/opt/buildkit/build"),
                (ENV_TIMEOUT_SECS, "0"),
                (ENV_KEEP, "yes"),
            ]))
            .unwrap();

        assert_eq!(cfg.tool, "/opt/buildkit/bin/civibuild");
        assert_eq!(cfg.build_root, Some(PathBuf::from("/opt/buildkit/build")));
        assert_eq!(cfg.timeout(), None);
        assert!(cfg.keep_instance);
    }

    #[test]
    fn test_bad_env_values_rejected() {
        let err = CheckConfig::default()
            .with_env_from(lookup_from(&[(ENV_TIMEOUT_SECS, "soon")]))
            .unwrap_err();
        assert!(matches!(err, CheckError::InvalidConfig(_)));

        let err = CheckConfig::default()
            .with_env_from(lookup_from(&[(ENV_KEEP, "maybe")]))
            .unwrap_err();
        assert!(matches!(err, CheckError::InvalidConfig(_)));
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("check.json");
        std::fs::write(
            &path,
            br#"{ "timeout_secs": 90, "create": { "instance_name": "ci-run", "build_type": "drupal-demo", "civi_version": "5.70", "url": "http://ci-run.localhost", "force": false } }"#,
        )
        .unwrap();

        let cfg = CheckConfig::from_file(&path).unwrap();
        assert_eq!(cfg.timeout_secs, 90);
        assert_eq!(cfg.tool, "civibuild");
        assert_eq!(cfg.create.instance_name, "ci-run");
        assert!(!cfg.create.force);
    }

    #[test]
    fn test_file_sets_tool_environment() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("check.json");
        std::fs::write(
            &path,
            br#"{ "working_dir": "/opt/buildkit", "env": { "CIVIBUILD_HOME": "/opt/buildkit/build", "AMPHOME": "/var/amp" } }"#,
        )
        .unwrap();

        let cfg = CheckConfig::from_file(&path).unwrap();
        assert_eq!(cfg.working_dir, Some(PathBuf::from("/opt/buildkit")));
        assert_eq!(cfg.env.len(), 2);
        assert_eq!(cfg.env["AMPHOME"], "/var/amp");
        assert!(CheckConfig::default().env.is_empty());
    }

    #[test]
    fn test_malformed_file_is_json_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("check.json");
        std::fs::write(&path, b"{ not json").unwrap();
        assert!(matches!(
            CheckConfig::from_file(&path).unwrap_err(),
            CheckError::Json(_)
        ));
    }

    #[test]
    fn test_empty_tool_invalid() {
        let cfg = CheckConfig {
            tool: String::new(),
            ..CheckConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
