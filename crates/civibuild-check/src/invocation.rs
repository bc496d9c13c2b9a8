//! Invocation construction for the provisioning tool.

use crate::error::{CheckError, CheckResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Default provisioning tool binary.
pub const DEFAULT_TOOL: &str = "civibuild";

/// Default instance name used by the acceptance check.
pub const DEFAULT_INSTANCE_NAME: &str = "civibuild-test";

/// Default provisioning type (site template).
pub const DEFAULT_BUILD_TYPE: &str = "wp-demo";

/// Default CiviCRM version.
pub const DEFAULT_CIVI_VERSION: &str = "master";

/// Default site URL.
pub const DEFAULT_URL: &str = "http://civibuild-test.localhost";

/// Parameters of a `create` invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CreateSpec {
    /// Instance (build) name.
    pub instance_name: String,

    /// Provisioning type passed as `--type`.
    pub build_type: String,

    /// Version passed as `--civi-ver`.
    pub civi_version: String,

    /// Site URL passed as `--url`.
    pub url: String,

    /// Whether to pass `--force`.
    pub force: bool,
}

impl Default for CreateSpec {
    fn default() -> Self {
        Self {
            instance_name: DEFAULT_INSTANCE_NAME.to_string(),
            build_type: DEFAULT_BUILD_TYPE.to_string(),
            civi_version: DEFAULT_CIVI_VERSION.to_string(),
            url: DEFAULT_URL.to_string(),
            force: true,
        }
    }
}

impl CreateSpec {
    /// Reject empty parameters; an empty token would shift every flag after it.
    pub fn validate(&self) -> CheckResult<()> {
        let fields = [
            ("instance_name", &self.instance_name),
            ("build_type", &self.build_type),
            ("civi_version", &self.civi_version),
            ("url", &self.url),
        ];
        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(CheckError::InvalidConfig(format!("{field} must not be empty")));
            }
        }
        Ok(())
    }
}

/// An immutable program + argument vector.
///
/// Never handed to a shell; `Display` exists only for logs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
}

impl Invocation {
    /// Build an invocation from a program and its arguments.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> CheckResult<Self> {
        let program = program.into();
        if program.trim().is_empty() {
            return Err(CheckError::InvalidConfig(
                "program must not be empty".to_string(),
            ));
        }
        Ok(Self { program, args })
    }

    /// `<tool> create <name> [--force] --type <type> --civi-ver <ver> --url <url>`
    pub fn create(tool: &str, spec: &CreateSpec) -> CheckResult<Self> {
        spec.validate()?;

        let mut args = vec!["create".to_string(), spec.instance_name.clone()];
        if spec.force {
            args.push("--force".to_string());
        }
        args.extend([
            "--type".to_string(),
            spec.build_type.clone(),
            "--civi-ver".to_string(),
            spec.civi_version.clone(),
            "--url".to_string(),
            spec.url.clone(),
        ]);

        Self::new(tool, args)
    }

    /// `<tool> destroy <name>`
    pub fn destroy(tool: &str, instance_name: &str) -> CheckResult<Self> {
        if instance_name.trim().is_empty() {
            return Err(CheckError::InvalidConfig(
                "instance_name must not be empty".to_string(),
            ));
        }
        Self::new(tool, vec!["destroy".to_string(), instance_name.to_string()])
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Program followed by arguments.
    pub fn tokens(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }

    /// SHA-256 over the NUL-separated tokens.
    ///
    /// Equal invocations always hash equal; token boundaries are part of the digest.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for token in self.tokens() {
            hasher.update(token.as_bytes());
            hasher.update(b"\0");
        }
        hex::encode(hasher.finalize())
    }
}

impl std::fmt::Display for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tokens().join(" "))
    }
}
