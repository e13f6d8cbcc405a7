//! Wire types for the hosted Assistants API (threads, runs, messages)
//!
//! `Run::state` folds the raw status and `required_action` payload into
//! an explicit [`RunState`] so the driver never inspects loose fields.

use serde::{Deserialize, Serialize};

/// Run status values reported by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Expired,
    Incomplete,
    /// Anything newer than this client; polled like `in_progress`
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Expired => "expired",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Unknown => "unknown",
        }
    }

    /// Terminal statuses other than `completed`
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            RunStatus::Failed | RunStatus::Cancelled | RunStatus::Expired | RunStatus::Incomplete
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A run as returned by create/retrieve/submit
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Run {
    pub id: String,
    pub thread_id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub required_action: Option<RequiredAction>,
    #[serde(default)]
    pub last_error: Option<RunError>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RequiredAction {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub submit_tool_outputs: Option<SubmitToolOutputs>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubmitToolOutputs {
    pub tool_calls: Vec<ToolCallRequest>,
}

/// A pending tool call inside `required_action`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub function: FunctionCall,
}

/// Function name plus the LLM-authored JSON arguments (as a string)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// Output for one tool call, submitted back to the run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

/// What the driver should do next with a run
#[derive(Debug, Clone, PartialEq)]
pub enum RunState {
    /// Not finished yet; poll again
    Pending(RunStatus),
    /// The run is blocked on these tool calls (never empty)
    RequiresToolOutputs(Vec<ToolCallRequest>),
    Completed,
    /// Terminal failure with the server's error message, if any
    Failed {
        status: RunStatus,
        message: Option<String>,
    },
}

impl Run {
    pub fn state(&self) -> RunState {
        match self.status {
            RunStatus::Completed => RunState::Completed,
            status if status.is_failure() => RunState::Failed {
                status,
                message: self
                    .last_error
                    .as_ref()
                    .map(|e| e.message.clone())
                    .filter(|m| !m.is_empty()),
            },
            RunStatus::RequiresAction => match &self.required_action {
                Some(action) if action.action_type == "submit_tool_outputs" => {
                    let calls = action
                        .submit_tool_outputs
                        .as_ref()
                        .map(|s| s.tool_calls.clone())
                        .unwrap_or_default();
                    if calls.is_empty() {
                        RunState::Pending(RunStatus::RequiresAction)
                    } else {
                        RunState::RequiresToolOutputs(calls)
                    }
                }
                _ => RunState::Pending(RunStatus::RequiresAction),
            },
            other => RunState::Pending(other),
        }
    }
}

/// A message on a thread
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThreadMessage {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub content: Vec<MessageContent>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MessageContent {
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default)]
    pub text: Option<TextContent>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TextContent {
    pub value: String,
}

impl ThreadMessage {
    pub fn assistant(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: "assistant".to_string(),
            content: vec![MessageContent {
                content_type: "text".to_string(),
                text: Some(TextContent { value: text.into() }),
            }],
        }
    }

    /// Text of the first text block
    pub fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find_map(|c| c.text.as_ref().map(|t| t.value.as_str()))
    }

    pub fn is_assistant(&self) -> bool {
        self.role == "assistant"
    }
}

#[derive(Debug, Deserialize)]
pub struct ListMessagesResponse {
    pub data: Vec<ThreadMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ThreadObject {
    pub id: String,
}
