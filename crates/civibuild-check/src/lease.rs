//! Scoped ownership of a provisioned instance.
//!
//! A lease is taken before `create` is issued and must be handed back through
//! [`InstanceLease::release`], which runs `destroy`. Async teardown cannot run
//! in `Drop`, so an unreleased lease only logs a warning.

use crate::error::{CheckError, CheckResult};
use crate::invocation::Invocation;
use crate::invoker::CommandInvoker;
use crate::obs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// What happened to the instance at the end of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TeardownOutcome {
    /// `destroy` exited 0.
    Destroyed,
    /// Kept on purpose (`keep_instance`).
    Skipped,
    /// `create` never ran, so there was nothing to destroy.
    NotCreated,
    /// `destroy` could not be run or reported failure.
    Failed { reason: String },
}

impl TeardownOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, TeardownOutcome::Failed { .. })
    }
}

/// Claim on an instance that `create` may have provisioned.
#[derive(Debug)]
pub struct InstanceLease {
    tool: String,
    name: String,
    keep: bool,
    released: bool,
}

impl InstanceLease {
    /// Take a lease on `name`. Call right before issuing `create`.
    pub fn acquire(tool: &str, name: &str, keep: bool) -> Self {
        Self {
            tool: tool.to_string(),
            name: name.to_string(),
            keep,
            released: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Destroy the instance (or skip when kept) and consume the lease.
    ///
    /// Never returns an error; failure is reported as [`TeardownOutcome::Failed`].
    pub async fn release(
        mut self,
        invoker: &dyn CommandInvoker,
        timeout: Option<Duration>,
    ) -> TeardownOutcome {
        self.released = true;

        let outcome = if self.keep {
            TeardownOutcome::Skipped
        } else {
            match self.destroy(invoker, timeout).await {
                Ok(()) => TeardownOutcome::Destroyed,
                Err(e) => TeardownOutcome::Failed {
                    reason: e.to_string(),
                },
            }
        };

        obs::emit_instance_released(&self.name, &outcome);
        outcome
    }

    /// Give the lease back without teardown; `create` never started.
    pub fn abandon(mut self) -> TeardownOutcome {
        self.released = true;
        let outcome = TeardownOutcome::NotCreated;
        obs::emit_instance_released(&self.name, &outcome);
        outcome
    }

    async fn destroy(
        &self,
        invoker: &dyn CommandInvoker,
        timeout: Option<Duration>,
    ) -> CheckResult<()> {
        let invocation = Invocation::destroy(&self.tool, &self.name)?;
        let result = invoker.invoke(&invocation, timeout).await?;
        if result.succeeded() {
            Ok(())
        } else {
            Err(CheckError::ToolFailed {
                status: result.exit_status,
                stderr: result.stderr,
            })
        }
    }
}

impl Drop for InstanceLease {
    fn drop(&mut self) {
        if !self.released && !self.keep {
            warn!(
                event = "instance.leaked",
                instance = %self.name,
                "lease dropped without release; instance may still exist"
            );
        }
    }
}
