//! Run driver - turns a hosted assistant run into local tool invocations
//!
//! ```text
//! add message(s) → create run ─┐
//!                              ▼
//!          ┌──────────── poll run ◀──────────────┐
//!          │                   │                 │
//!     completed        requires_action       queued / in_progress
//!          │                   │                 │
//!   latest message    decode + handle every   sleep ──┘
//!          │          pending call, in order
//!          ▼                   │
//!     final text        submit outputs ─────────▶ poll run
//! ```
//!
//! Failed, cancelled, expired and incomplete runs end the drive with
//! [`DriverError::RunFailed`]; no further calls are made against the run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::assistant::{AssistantError, RunService, RunState, RunStatus, ToolOutput};
use crate::config::DriverSettings;
use crate::metrics::{AGENT_RUNS, DRIVE_DURATION, RUN_POLLS, TOOL_CALLS, TOOL_CALL_DURATION};
use crate::progress::ProgressSink;

use super::tools::{AgentKind, DecodeError, ToolError, ToolInvocation};

/// Polling behaviour for [`RunDriver`]
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Delay between status polls; zero polls back-to-back
    pub poll_interval: Duration,
    /// Give up after this many polls (unbounded when `None`)
    pub max_polls: Option<usize>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            max_polls: None,
        }
    }
}

impl From<&DriverSettings> for DriverConfig {
    fn from(settings: &DriverSettings) -> Self {
        Self {
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            max_polls: settings.max_polls,
        }
    }
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("assistant service error: {0}")]
    Assistant(#[from] AssistantError),
    #[error("run ended with status {status}{}", .message.as_deref().map(|m| format!(": {}", m)).unwrap_or_default())]
    RunFailed {
        status: RunStatus,
        message: Option<String>,
    },
    #[error("assistant requested unknown tool {0:?}")]
    UnknownTool(String),
    #[error("invalid arguments for {tool}: {source}")]
    InvalidArguments {
        tool: &'static str,
        source: serde_json::Error,
    },
    #[error("{tool} is not served by the {agent} agent")]
    Unsupported {
        tool: &'static str,
        agent: AgentKind,
    },
    #[error("tool {tool} failed: {source}")]
    Tool {
        tool: &'static str,
        source: ToolError,
    },
    #[error("run completed without an assistant reply")]
    NoAssistantReply,
    #[error("run still pending after {0} polls")]
    PollLimitReached(usize),
}

impl From<DecodeError> for DriverError {
    fn from(e: DecodeError) -> Self {
        match e {
            DecodeError::UnknownTool(name) => DriverError::UnknownTool(name),
            DecodeError::InvalidArguments { tool, source } => {
                DriverError::InvalidArguments { tool, source }
            }
        }
    }
}

impl DriverError {
    fn outcome_label(&self) -> &'static str {
        match self {
            DriverError::RunFailed { status, .. } => status.as_str(),
            _ => "error",
        }
    }
}

/// Local side of an assistant's tools
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute one decoded call and return the text submitted as its output
    async fn handle(&self, call: ToolInvocation) -> Result<String, ToolError>;
}

/// Handler for assistants configured without tools
#[derive(Debug, Clone, Copy)]
pub struct NoTools(pub AgentKind);

#[async_trait]
impl ToolHandler for NoTools {
    async fn handle(&self, call: ToolInvocation) -> Result<String, ToolError> {
        Err(call.unsupported(self.0))
    }
}

/// One serviced tool call
#[derive(Debug, Clone)]
pub struct ToolRecord {
    pub call_id: String,
    pub tool: &'static str,
    pub output: String,
    pub duration_ms: f64,
}

/// Result of a completed drive
#[derive(Debug, Clone)]
pub struct DriveOutcome {
    /// Text of the assistant's final message
    pub text: String,
    pub run_id: String,
    /// Number of status polls issued
    pub polls: usize,
    pub tool_calls: Vec<ToolRecord>,
}

/// Drives assistant runs to completion
pub struct RunDriver {
    runs: Arc<dyn RunService>,
    progress: Arc<dyn ProgressSink>,
    config: DriverConfig,
}

impl RunDriver {
    /// Create a new run driver
    ///
    /// # Arguments
    /// * `runs` - Run service (hosted API or a test fake)
    /// * `progress` - Sink for human-readable progress lines
    /// * `config` - Polling behaviour
    pub fn new(
        runs: Arc<dyn RunService>,
        progress: Arc<dyn ProgressSink>,
        config: DriverConfig,
    ) -> Self {
        Self {
            runs,
            progress,
            config,
        }
    }

    pub fn runs(&self) -> &Arc<dyn RunService> {
        &self.runs
    }

    pub fn progress(&self) -> &dyn ProgressSink {
        self.progress.as_ref()
    }

    /// Append `input` to the thread, run the assistant and return its reply
    pub async fn drive(
        &self,
        agent: AgentKind,
        thread_id: &str,
        assistant_id: &str,
        input: &str,
        handler: &dyn ToolHandler,
    ) -> Result<DriveOutcome, DriverError> {
        self.drive_messages(agent, thread_id, assistant_id, &[input.to_string()], handler)
            .await
    }

    /// Like [`drive`](Self::drive) but appends several user messages, in order,
    /// before starting the run
    pub async fn drive_messages(
        &self,
        agent: AgentKind,
        thread_id: &str,
        assistant_id: &str,
        messages: &[String],
        handler: &dyn ToolHandler,
    ) -> Result<DriveOutcome, DriverError> {
        let started = Instant::now();
        let root_span = info_span!(
            "drive",
            agent = %agent,
            thread_id = %thread_id,
            run_id = tracing::field::Empty,
            otel.name = "drive"
        );

        let result: Result<DriveOutcome, DriverError> = async {
            for message in messages {
                self.runs.add_message(thread_id, message).await?;
            }
            let mut run = self.runs.create_run(thread_id, assistant_id).await?;
            tracing::Span::current().record("run_id", run.id.as_str());
            info!(agent = %agent, run_id = %run.id, "Run created");

            let mut polls = 0usize;
            let mut tool_calls = Vec::new();

            loop {
                match run.state() {
                    RunState::Completed => {
                        let reply = self.runs.latest_message(thread_id).await?;
                        let text = reply
                            .filter(|m| m.is_assistant())
                            .and_then(|m| m.text().map(str::to_string))
                            .ok_or(DriverError::NoAssistantReply)?;
                        info!(
                            agent = %agent,
                            run_id = %run.id,
                            polls,
                            tool_calls = tool_calls.len(),
                            "Run completed"
                        );
                        return Ok(DriveOutcome {
                            text,
                            run_id: run.id,
                            polls,
                            tool_calls,
                        });
                    }
                    RunState::Failed { status, message } => {
                        warn!(agent = %agent, run_id = %run.id, %status, error = ?message, "Run failed");
                        return Err(DriverError::RunFailed { status, message });
                    }
                    RunState::RequiresToolOutputs(calls) => {
                        debug!(run_id = %run.id, pending = calls.len(), "Run requires tool outputs");
                        let mut outputs = Vec::with_capacity(calls.len());
                        for call in calls {
                            let invocation =
                                ToolInvocation::decode(&call.function.name, &call.function.arguments)?;
                            let record = self
                                .service_call(agent, &call.id, invocation, handler)
                                .await?;
                            outputs.push(ToolOutput {
                                tool_call_id: record.call_id.clone(),
                                output: record.output.clone(),
                            });
                            tool_calls.push(record);
                        }
                        run = self
                            .runs
                            .submit_tool_outputs(thread_id, &run.id, &outputs)
                            .await?;
                    }
                    RunState::Pending(status) => {
                        if let Some(max) = self.config.max_polls {
                            if polls >= max {
                                warn!(agent = %agent, run_id = %run.id, polls, "Poll limit reached");
                                return Err(DriverError::PollLimitReached(polls));
                            }
                        }
                        if !self.config.poll_interval.is_zero() {
                            tokio::time::sleep(self.config.poll_interval).await;
                        }
                        polls += 1;
                        RUN_POLLS.with_label_values(&[agent.as_str()]).inc();
                        debug!(run_id = %run.id, %status, polls, "Polling run");
                        run = self.runs.retrieve_run(thread_id, &run.id).await?;
                    }
                }
            }
        }
        .instrument(root_span)
        .await;

        let outcome = match &result {
            Ok(_) => "completed",
            Err(e) => e.outcome_label(),
        };
        AGENT_RUNS.with_label_values(&[agent.as_str(), outcome]).inc();
        DRIVE_DURATION
            .with_label_values(&[agent.as_str()])
            .observe(started.elapsed().as_secs_f64());
        result
    }

    async fn service_call(
        &self,
        agent: AgentKind,
        call_id: &str,
        invocation: ToolInvocation,
        handler: &dyn ToolHandler,
    ) -> Result<ToolRecord, DriverError> {
        let tool = invocation.name();
        let span = info_span!("tool_call", agent = %agent, tool, call_id = %call_id, otel.name = "tool_call");
        let started = Instant::now();

        let result = handler.handle(invocation).instrument(span).await;

        let elapsed = started.elapsed();
        TOOL_CALL_DURATION
            .with_label_values(&[tool])
            .observe(elapsed.as_secs_f64());

        match result {
            Ok(output) => {
                TOOL_CALLS.with_label_values(&[tool, "ok"]).inc();
                info!(tool, call_id = %call_id, output_len = output.len(), "Tool call serviced");
                Ok(ToolRecord {
                    call_id: call_id.to_string(),
                    tool,
                    output,
                    duration_ms: elapsed.as_secs_f64() * 1000.0,
                })
            }
            Err(ToolError::Unsupported { tool, agent }) => {
                TOOL_CALLS.with_label_values(&[tool, "unsupported"]).inc();
                Err(DriverError::Unsupported { tool, agent })
            }
            Err(source) => {
                TOOL_CALLS.with_label_values(&[tool, "error"]).inc();
                warn!(tool, call_id = %call_id, error = %source, "Tool call failed");
                self.progress.notify(&format!("❌ {} failed: {}", tool, source));
                Err(DriverError::Tool { tool, source })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_failed_display() {
        let err = DriverError::RunFailed {
            status: RunStatus::Expired,
            message: None,
        };
        assert_eq!(err.to_string(), "run ended with status expired");
        let err = DriverError::RunFailed {
            status: RunStatus::Failed,
            message: Some("rate limited".to_string()),
        };
        assert_eq!(err.to_string(), "run ended with status failed: rate limited");
    }

    #[test]
    fn test_decode_errors_map_to_driver_errors() {
        let err: DriverError = DecodeError::UnknownTool("nope".to_string()).into();
        assert!(matches!(err, DriverError::UnknownTool(name) if name == "nope"));
    }

    #[test]
    fn test_config_from_settings() {
        let config = DriverConfig::from(&DriverSettings {
            poll_interval_ms: 0,
            max_polls: Some(3),
        });
        assert!(config.poll_interval.is_zero());
        assert_eq!(config.max_polls, Some(3));
    }
}
