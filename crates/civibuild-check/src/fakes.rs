//! In-memory fakes for the invoker and registry seams (testing only)
//!
//! Provides `ScriptedInvoker` and `MemoryRegistry` that satisfy the trait
//! contracts without spawning processes or touching the filesystem.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{CheckError, CheckResult};
use crate::invocation::Invocation;
use crate::invoker::{CommandInvoker, ExecutionResult};
use crate::registry::InstanceRegistry;

// ---------------------------------------------------------------------------
// ScriptedInvoker
// ---------------------------------------------------------------------------

/// Canned reply for one invocation.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    /// Process ran and exited with `status`.
    Exit {
        status: i32,
        stdout: String,
        stderr: String,
    },
    /// Process outlived the bounded wait.
    Timeout,
    /// Program could not be started.
    SpawnFailure,
}

impl ScriptedOutcome {
    pub fn exit(status: i32) -> Self {
        ScriptedOutcome::Exit {
            status,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn exit_with_stderr(status: i32, stderr: &str) -> Self {
        ScriptedOutcome::Exit {
            status,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }
}

/// Invoker that records each invocation and replies from a queue.
///
/// Once the queue is exhausted every further call exits 0.
#[derive(Debug, Default)]
pub struct ScriptedInvoker {
    outcomes: Mutex<VecDeque<ScriptedOutcome>>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedInvoker {
    pub fn new(outcomes: Vec<ScriptedOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of all recorded invocations in call order.
    pub fn recorded(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandInvoker for ScriptedInvoker {
    async fn invoke(
        &self,
        invocation: &Invocation,
        timeout: Option<Duration>,
    ) -> CheckResult<ExecutionResult> {
        self.calls.lock().unwrap().push(invocation.clone());

        let next = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ScriptedOutcome::exit(0));

        match next {
            ScriptedOutcome::Exit {
                status,
                stdout,
                stderr,
            } => Ok(ExecutionResult {
                exit_status: status,
                stdout,
                stderr,
                duration_ms: 0,
            }),
            ScriptedOutcome::Timeout => Err(CheckError::Timeout {
                limit_ms: timeout.map(|t| t.as_millis() as u64).unwrap_or(0),
            }),
            ScriptedOutcome::SpawnFailure => Err(CheckError::Spawn {
                program: invocation.program().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted spawn failure"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryRegistry
// ---------------------------------------------------------------------------

/// In-memory registry backed by a `HashSet` of instance names.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    names: Mutex<HashSet<String>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instances(names: &[&str]) -> Self {
        Self {
            names: Mutex::new(names.iter().map(|n| n.to_string()).collect()),
        }
    }

    pub fn insert(&self, name: &str) {
        self.names.lock().unwrap().insert(name.to_string());
    }

    pub fn remove(&self, name: &str) {
        self.names.lock().unwrap().remove(name);
    }
}

#[async_trait]
impl InstanceRegistry for MemoryRegistry {
    async fn exists(&self, name: &str) -> CheckResult<bool> {
        Ok(self.names.lock().unwrap().contains(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_invoker_replays_in_order() {
        let invoker = ScriptedInvoker::new(vec![ScriptedOutcome::exit(4), ScriptedOutcome::Timeout]);
        let inv = Invocation::new("civibuild", vec!["show".to_string()]).unwrap();

        let first = invoker.invoke(&inv, None).await.unwrap();
        assert_eq!(first.exit_status, 4);

        let second = invoker
            .invoke(&inv, Some(Duration::from_millis(250)))
            .await
            .unwrap_err();
        assert!(matches!(second, CheckError::Timeout { limit_ms: 250 }));

        let third = invoker.invoke(&inv, None).await.unwrap();
        assert!(third.succeeded());
        assert_eq!(invoker.recorded().len(), 3);
    }

    #[tokio::test]
    async fn test_memory_registry_insert_remove() {
        let registry = MemoryRegistry::new();
        assert!(!registry.exists("a").await.unwrap());
        registry.insert("a");
        assert!(registry.exists("a").await.unwrap());
        registry.remove("a");
        assert!(!registry.exists("a").await.unwrap());
    }
}
