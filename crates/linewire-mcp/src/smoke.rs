//! The scripted smoke sequence: handshake, list everything, call `echo`,
//! shut down.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::client::McpClient;
use crate::types::{
    empty_params, InitializeParams, McpError, McpResult, PromptListResult, ResourceListResult,
    ResourceTemplateListResult, ToolCallResult, ToolListResult,
};

pub const ECHO_TOOL: &str = "echo";
pub const ECHO_MESSAGE: &str = "Hello from test client!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SmokeStep {
    Initialize,
    ListTools,
    ListResources,
    ListResourceTemplates,
    ListPrompts,
    CallEcho,
    Shutdown,
}

impl SmokeStep {
    pub const ALL: [SmokeStep; 7] = [
        SmokeStep::Initialize,
        SmokeStep::ListTools,
        SmokeStep::ListResources,
        SmokeStep::ListResourceTemplates,
        SmokeStep::ListPrompts,
        SmokeStep::CallEcho,
        SmokeStep::Shutdown,
    ];

    pub fn method(self) -> &'static str {
        match self {
            SmokeStep::Initialize => "initialize",
            SmokeStep::ListTools => "tools/list",
            SmokeStep::ListResources => "resources/list",
            SmokeStep::ListResourceTemplates => "resources/templates/list",
            SmokeStep::ListPrompts => "prompts/list",
            SmokeStep::CallEcho => "tools/call",
            SmokeStep::Shutdown => "shutdown",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            SmokeStep::Initialize => "Initialize",
            SmokeStep::ListTools => "List tools",
            SmokeStep::ListResources => "List resources",
            SmokeStep::ListResourceTemplates => "List resource templates",
            SmokeStep::ListPrompts => "List prompts",
            SmokeStep::CallEcho => "Call echo tool",
            SmokeStep::Shutdown => "Shutdown",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub step: SmokeStep,
    pub method: &'static str,
    pub ok: bool,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SmokeReport {
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    pub steps: Vec<StepReport>,
    pub passed: bool,
    pub elapsed_ms: u64,
}

impl SmokeReport {
    pub fn failed_step(&self) -> Option<&StepReport> {
        self.steps.iter().find(|s| !s.ok)
    }

    /// `Ok` when every step ran and passed.
    pub fn into_result(self) -> McpResult<Self> {
        match self.failed_step() {
            Some(step) => Err(McpError::StepFailed {
                step: format!("{} ({})", step.index, step.method),
                reason: step.error.clone().unwrap_or_default(),
            }),
            None => Ok(self),
        }
    }
}

/// Run every step in order, stopping at the first failure. `on_step` sees
/// each report as soon as its step finishes.
pub async fn run_smoke(
    client: &McpClient,
    params: InitializeParams,
    server: Option<String>,
    mut on_step: impl FnMut(&StepReport),
) -> SmokeReport {
    let started_at = Utc::now();
    let started = Instant::now();
    let mut steps = Vec::with_capacity(SmokeStep::ALL.len());
    let mut params = Some(params);

    for (i, step) in SmokeStep::ALL.into_iter().enumerate() {
        tracing::debug!(step = step.method(), "Smoke step {}", i + 1);
        let step_started = Instant::now();
        let outcome = execute(client, step, &mut params).await;

        let report = StepReport {
            index: i + 1,
            step,
            method: step.method(),
            ok: outcome.is_ok(),
            elapsed_ms: millis(step_started.elapsed()),
            error: outcome.as_ref().err().map(ToString::to_string),
            result: outcome.ok(),
        };
        on_step(&report);

        let ok = report.ok;
        steps.push(report);
        if !ok {
            tracing::error!(step = step.method(), "Smoke run stopped");
            break;
        }
    }

    let passed = steps.len() == SmokeStep::ALL.len() && steps.iter().all(|s| s.ok);
    SmokeReport {
        started_at,
        server,
        steps,
        passed,
        elapsed_ms: millis(started.elapsed()),
    }
}

/// Send one step and check the reply has the shape the method promises.
/// The unmodified result is returned for display.
async fn execute(
    client: &McpClient,
    step: SmokeStep,
    params: &mut Option<InitializeParams>,
) -> McpResult<Value> {
    match step {
        SmokeStep::Initialize => {
            let params = params.take().unwrap_or_default();
            client.initialize_raw(params).await
        }
        SmokeStep::ListTools => checked::<ToolListResult>(client, step, empty_params()).await,
        SmokeStep::ListResources => {
            checked::<ResourceListResult>(client, step, empty_params()).await
        }
        SmokeStep::ListResourceTemplates => {
            checked::<ResourceTemplateListResult>(client, step, empty_params()).await
        }
        SmokeStep::ListPrompts => checked::<PromptListResult>(client, step, empty_params()).await,
        SmokeStep::CallEcho => {
            let params = json!({
                "name": ECHO_TOOL,
                "arguments": { "message": ECHO_MESSAGE }
            });
            let raw = checked::<ToolCallResult>(client, step, params).await?;
            if raw.get("isError").and_then(Value::as_bool) == Some(true) {
                return Err(McpError::StepFailed {
                    step: step.method().into(),
                    reason: format!("tool reported an error: {raw}"),
                });
            }
            Ok(raw)
        }
        SmokeStep::Shutdown => client.call_raw(step.method(), Some(empty_params())).await,
    }
}

async fn checked<T: serde::de::DeserializeOwned>(
    client: &McpClient,
    step: SmokeStep,
    params: Value,
) -> McpResult<Value> {
    let raw = client.call_raw(step.method(), Some(params)).await?;
    if let Err(e) = serde_json::from_value::<T>(raw.clone()) {
        return Err(McpError::StepFailed {
            step: step.method().into(),
            reason: format!("unexpected result shape: {e}"),
        });
    }
    Ok(raw)
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
