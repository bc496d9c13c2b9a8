//! civibuild-check - acceptance check for `civibuild create`
//!
//! Runs the provisioning tool with a fixed argument vector, waits for it to
//! exit, and passes only when the exit status is 0.
//!
//! - Invocations are argument lists, never shell strings
//! - Pre-existing instances fail fast with a distinct error
//! - The created instance is destroyed on every exit path
//! - `create` runs under a bounded wait

pub mod check;
pub mod config;
pub mod error;
pub mod fakes;
pub mod invocation;
pub mod invoker;
pub mod lease;
pub mod obs;
pub mod registry;
pub mod telemetry;

// Re-export key types
pub use check::{CheckReport, ProvisioningCheck, Verdict};
pub use config::CheckConfig;
pub use error::{CheckError, CheckResult};
pub use invocation::{CreateSpec, Invocation};
pub use invoker::{CommandInvoker, ExecutionResult, ProcessInvoker};
pub use lease::{InstanceLease, TeardownOutcome};
pub use registry::{BuildDirRegistry, InstanceRegistry, NullRegistry};
pub use telemetry::init_tracing;
