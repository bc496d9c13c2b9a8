//! Structured observability hooks for the provisioning check lifecycle.
//!
//! This module provides:
//! - A check-scoped tracing span via `check_span`
//! - Emission functions for key lifecycle events: start, invocation, finish, teardown
//!
//! Events are emitted at `info!` level (configurable via `RUST_LOG`).
//! For JSON output, pass `--json` to the CLI.

use crate::lease::TeardownOutcome;
use tracing::{info, warn};

/// Span tagging everything a run logs with its run id and instance name.
///
/// Attach with `tracing::Instrument` so the span survives `.await` points.
pub fn check_span(run_id: &str, instance: &str) -> tracing::Span {
    tracing::info_span!("civibuild.check", run_id = %run_id, instance = %instance)
}

/// Emit event: check started with the command it is about to run.
pub fn emit_check_started(run_id: &str, instance: &str, command: &str) {
    info!(event = "check.started", run_id = %run_id, instance = %instance, command = %command);
}

/// Emit event: the create invocation terminated.
pub fn emit_invocation_finished(run_id: &str, exit_status: i32, duration_ms: u64) {
    info!(
        event = "check.invocation",
        run_id = %run_id,
        exit_status = exit_status,
        duration_ms = duration_ms,
    );
}

/// Emit event: instance already present, provisioning skipped.
pub fn emit_precondition_violated(run_id: &str, instance: &str) {
    warn!(event = "check.instance_exists", run_id = %run_id, instance = %instance);
}

/// Emit event: no build root configured, so a pre-existing instance cannot be detected.
pub fn emit_precondition_unchecked(instance: &str) {
    warn!(
        event = "check.precondition_unchecked",
        instance = %instance,
        "no build root configured; a pre-existing instance will not be detected"
    );
}

/// Emit event: check finished with its verdict.
pub fn emit_check_finished(run_id: &str, passed: bool, duration_ms: u64) {
    info!(
        event = "check.finished",
        run_id = %run_id,
        passed = passed,
        duration_ms = duration_ms,
    );
}

/// Emit event: check failed (warning level).
pub fn emit_check_failed(run_id: &str, kind: &str, error: &dyn std::fmt::Display) {
    warn!(event = "check.failed", run_id = %run_id, kind = %kind, error = %error);
}

/// Emit event: instance released at the end of a run.
pub fn emit_instance_released(instance: &str, outcome: &TeardownOutcome) {
    match outcome {
        TeardownOutcome::Failed { reason } => {
            warn!(event = "instance.released", instance = %instance, outcome = "failed", reason = %reason)
        }
        TeardownOutcome::Destroyed => {
            info!(event = "instance.released", instance = %instance, outcome = "destroyed")
        }
        TeardownOutcome::Skipped => {
            info!(event = "instance.released", instance = %instance, outcome = "skipped")
        }
        TeardownOutcome::NotCreated => {
            info!(event = "instance.released", instance = %instance, outcome = "not_created")
        }
    }
}
