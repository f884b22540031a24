use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use handoff_core::{Handoff, HandoffError};

/// A follow-up the Invoker asked the Dispatcher to create on its behalf
/// (spec.md §4.B Invoker contract: `next_handoff_requests`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextHandoffRequest {
    pub target: String,
    pub summary: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

/// Result handed back by an Invoker after it runs exactly one
/// side-effectful execution of an agent against a handoff (spec.md §4.B).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationResult {
    pub success: bool,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default)]
    pub next_handoff_requests: Vec<NextHandoffRequest>,
}

/// The opaque external execution contract the Dispatcher treats as a
/// black box; implementations are responsible for their own timeouts
/// (spec.md §4.B).
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(&self, agent_name: &str, record: &Handoff) -> Result<InvocationResult, HandoffError>;
}

/// Production Invoker: spawns the configured subprocess per invocation,
/// writes the serialized record to its stdin, and parses its stdout as
/// JSON (spec.md §6 process-level Invoker contract).
pub struct ScriptInvoker {
    command: String,
    args: Vec<String>,
    timeout: std::time::Duration,
}

impl ScriptInvoker {
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: std::time::Duration) -> Self {
        Self {
            command: command.into(),
            args,
            timeout,
        }
    }
}

#[async_trait]
impl Invoker for ScriptInvoker {
    async fn invoke(&self, agent_name: &str, record: &Handoff) -> Result<InvocationResult, HandoffError> {
        let payload = serde_json::to_vec(record)
            .map_err(|e| HandoffError::internal(format!("serialize invoker payload: {e}")))?;

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .env("PROJECT_NAME", &record.project_name)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| HandoffError::InvokerFailure(format!("spawn {agent_name}: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&payload)
                .await
                .map_err(|e| HandoffError::InvokerFailure(format!("write stdin: {e}")))?;
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| HandoffError::InvokerFailure(format!("{agent_name} timed out")))?
            .map_err(|e| HandoffError::InvokerFailure(format!("wait for {agent_name}: {e}")))?;

        if !output.stderr.is_empty() {
            tracing::warn!(
                agent = agent_name,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "invoker stderr"
            );
        }

        if !output.status.success() {
            return Err(HandoffError::InvokerFailure(format!(
                "{agent_name} exited with {:?}",
                output.status.code()
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| HandoffError::InvokerFailure(format!("parse {agent_name} output: {e}")))
    }
}

/// Test-support Invoker with a pre-programmed response, mirroring the
/// reference codebase's in-memory fakes used in place of real network
/// calls (e.g. the mock Redis client tests use throughout this workspace).
#[cfg(feature = "test-support")]
pub struct FakeInvoker {
    result: std::sync::Mutex<Result<InvocationResult, String>>,
}

#[cfg(feature = "test-support")]
impl FakeInvoker {
    pub fn succeeding(output: impl Into<String>) -> Self {
        Self {
            result: std::sync::Mutex::new(Ok(InvocationResult {
                success: true,
                output: output.into(),
                artifacts: Vec::new(),
                next_handoff_requests: Vec::new(),
            })),
        }
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            result: std::sync::Mutex::new(Err(reason.into())),
        }
    }
}

#[cfg(feature = "test-support")]
#[async_trait]
impl Invoker for FakeInvoker {
    async fn invoke(&self, agent_name: &str, _record: &Handoff) -> Result<InvocationResult, HandoffError> {
        match &*self.result.lock().unwrap() {
            Ok(result) => Ok(result.clone()),
            Err(reason) => Err(HandoffError::InvokerFailure(format!("{agent_name}: {reason}"))),
        }
    }
}
