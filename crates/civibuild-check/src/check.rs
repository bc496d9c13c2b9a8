//! The provisioning check: run `create`, judge the exit status, tear down.

use crate::config::CheckConfig;
use crate::error::{CheckError, CheckResult};
use crate::invocation::Invocation;
use crate::invoker::{CommandInvoker, ExecutionResult, ProcessInvoker};
use crate::lease::{InstanceLease, TeardownOutcome};
use crate::obs;
use crate::registry::{BuildDirRegistry, InstanceRegistry, NullRegistry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// Pass/fail judgment derived from an exit status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail { status: i32 },
}

impl Verdict {
    /// `Pass` iff `status == 0`. The only way to obtain a `Pass`.
    pub fn from_status(status: i32) -> Self {
        if status == 0 {
            Verdict::Pass
        } else {
            Verdict::Fail { status }
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

/// Everything observed during one completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckReport {
    /// Unique id of this run.
    pub run_id: String,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// The `create` invocation that was executed.
    pub invocation: Invocation,

    /// Digest of the invocation tokens.
    pub invocation_digest: String,

    /// Outcome of the `create` invocation.
    pub result: ExecutionResult,

    /// Judgment on `result.exit_status`.
    pub verdict: Verdict,

    /// What happened to the instance afterwards.
    pub teardown: TeardownOutcome,
}

impl CheckReport {
    /// Turn the report into the check's pass/fail outcome.
    ///
    /// A failing verdict wins over a failed teardown; a failed teardown after
    /// a passing verdict still fails the run.
    pub fn into_result(self) -> CheckResult<CheckReport> {
        if let Verdict::Fail { status } = self.verdict {
            return Err(CheckError::ToolFailed {
                status,
                stderr: self.result.stderr,
            });
        }
        if let TeardownOutcome::Failed { reason } = &self.teardown {
            return Err(CheckError::Teardown {
                name: self.invocation_instance().to_string(),
                reason: reason.clone(),
            });
        }
        Ok(self)
    }

    fn invocation_instance(&self) -> &str {
        self.invocation
            .args()
            .get(1)
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// Acceptance check for the provisioning tool's `create` command.
pub struct ProvisioningCheck {
    config: CheckConfig,
    invocation: Invocation,
    invoker: Arc<dyn CommandInvoker>,
    registry: Arc<dyn InstanceRegistry>,
}

impl ProvisioningCheck {
    /// Build a check with explicit seams. The invocation is fixed here.
    pub fn new(
        config: CheckConfig,
        invoker: Arc<dyn CommandInvoker>,
        registry: Arc<dyn InstanceRegistry>,
    ) -> CheckResult<Self> {
        config.validate()?;
        let invocation = Invocation::create(&config.tool, &config.create)?;
        Ok(Self {
            config,
            invocation,
            invoker,
            registry,
        })
    }

    /// Build a check that spawns real processes.
    ///
    /// Pre-existing instances are detected only when `build_root` is set;
    /// without one a warning is logged and the precondition goes unchecked.
    pub fn from_config(config: CheckConfig) -> CheckResult<Self> {
        let invoker = ProcessInvoker::from_config(&config);
        let registry: Arc<dyn InstanceRegistry> = match &config.build_root {
            Some(root) => Arc::new(BuildDirRegistry::new(root)),
            None => {
                obs::emit_precondition_unchecked(&config.create.instance_name);
                Arc::new(NullRegistry)
            }
        };
        Self::new(config, Arc::new(invoker), registry)
    }

    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    pub fn config(&self) -> &CheckConfig {
        &self.config
    }

    /// Run the check and assert success.
    ///
    /// `Ok` only when `create` exited 0 and teardown did not fail.
    pub async fn run(&self) -> CheckResult<CheckReport> {
        self.run_and_report(|_| {}).await
    }

    /// Like [`run`](Self::run), but hands the report to `on_report` before
    /// judging it, so a failing run's report is still available.
    ///
    /// `on_report` is not called when the run produced no report
    /// (pre-existing instance, spawn failure, timeout).
    pub async fn run_and_report<F>(&self, on_report: F) -> CheckResult<CheckReport>
    where
        F: FnOnce(&CheckReport) + Send,
    {
        let run_id = Uuid::new_v4().to_string();
        let span = obs::check_span(&run_id, &self.config.create.instance_name);

        async {
            let start = Instant::now();
            let outcome = self.execute_as(run_id.clone()).await.and_then(|report| {
                on_report(&report);
                report.into_result()
            });
            let duration_ms = start.elapsed().as_millis() as u64;

            match &outcome {
                Ok(_) => obs::emit_check_finished(&run_id, true, duration_ms),
                Err(e) => {
                    obs::emit_check_failed(&run_id, e.kind(), e);
                    obs::emit_check_finished(&run_id, false, duration_ms);
                }
            }
            outcome
        }
        .instrument(span)
        .await
    }

    /// Run the check and report what happened without asserting.
    ///
    /// A non-zero exit comes back as `Ok` with `Verdict::Fail`. Errors are
    /// reserved for runs with no exit status: precondition violation,
    /// spawn failure, timeout.
    pub async fn execute(&self) -> CheckResult<CheckReport> {
        let run_id = Uuid::new_v4().to_string();
        let span = obs::check_span(&run_id, &self.config.create.instance_name);
        self.execute_as(run_id).instrument(span).await
    }

    async fn execute_as(&self, run_id: String) -> CheckResult<CheckReport> {
        let name = &self.config.create.instance_name;
        let started_at = Utc::now();
        obs::emit_check_started(&run_id, name, &self.invocation.to_string());

        if self.registry.exists(name).await? {
            obs::emit_precondition_violated(&run_id, name);
            return Err(CheckError::InstanceExists { name: name.clone() });
        }

        let lease = InstanceLease::acquire(&self.config.tool, name, self.config.keep_instance);
        let outcome = self
            .invoker
            .invoke(&self.invocation, self.config.timeout())
            .await;

        let result = match outcome {
            Ok(result) => result,
            Err(e @ CheckError::Spawn { .. }) => {
                lease.abandon();
                return Err(e);
            }
            Err(e) => {
                // Timeout or IO failure mid-run: the tool may have created something.
                lease
                    .release(self.invoker.as_ref(), self.config.teardown_timeout())
                    .await;
                return Err(e);
            }
        };
        obs::emit_invocation_finished(&run_id, result.exit_status, result.duration_ms);

        let teardown = lease
            .release(self.invoker.as_ref(), self.config.teardown_timeout())
            .await;

        Ok(CheckReport {
            run_id,
            started_at,
            invocation_digest: self.invocation.digest(),
            invocation: self.invocation.clone(),
            verdict: Verdict::from_status(result.exit_status),
            result,
            teardown,
        })
    }
}
