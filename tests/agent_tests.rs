//! Integration tests for the run driver
//!
//! These tests drive scripted runs through an in-memory run service and
//! check the tool dispatch loop end to end. The live test needs a real
//! assistant and is marked #[ignore].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use medshare::agent::{
    AgentKind, DriverConfig, DriverError, NoTools, RunDriver, ToolError, ToolHandler,
    ToolInvocation,
};
use medshare::assistant::types::{FunctionCall, RequiredAction, RunError, SubmitToolOutputs};
use medshare::assistant::{
    AssistantError, Run, RunService, RunStatus, ThreadMessage, ToolCallRequest, ToolOutput,
};
use medshare::progress::{ProgressSink, RecordingSink};

const PATIENT: &str = "0x1111111111111111111111111111111111111111";
const RECEIVER: &str = "0x2222222222222222222222222222222222222222";

/// Run service that replays a fixed sequence of run states
#[derive(Default)]
struct ScriptedRuns {
    script: Mutex<VecDeque<Run>>,
    reply: Option<ThreadMessage>,
    calls: Mutex<Vec<String>>,
    submitted: Mutex<Vec<Vec<ToolOutput>>>,
}

impl ScriptedRuns {
    fn new(script: Vec<Run>, reply: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            reply: reply.map(|text| ThreadMessage::assistant("msg_1", text)),
            ..Self::default()
        })
    }

    fn log(&self, entry: String) {
        self.calls.lock().unwrap().push(entry);
    }

    fn next(&self) -> Run {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| run(RunStatus::InProgress))
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn submitted(&self) -> Vec<Vec<ToolOutput>> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl RunService for ScriptedRuns {
    async fn create_thread(&self) -> Result<String, AssistantError> {
        self.log("create_thread".to_string());
        Ok("thread_1".to_string())
    }

    async fn add_message(&self, _thread_id: &str, content: &str) -> Result<(), AssistantError> {
        self.log(format!("add_message:{}", content));
        Ok(())
    }

    async fn create_run(&self, _thread_id: &str, assistant_id: &str) -> Result<Run, AssistantError> {
        self.log(format!("create_run:{}", assistant_id));
        Ok(self.next())
    }

    async fn retrieve_run(&self, _thread_id: &str, _run_id: &str) -> Result<Run, AssistantError> {
        self.log("retrieve_run".to_string());
        Ok(self.next())
    }

    async fn latest_message(
        &self,
        _thread_id: &str,
    ) -> Result<Option<ThreadMessage>, AssistantError> {
        self.log("latest_message".to_string());
        Ok(self.reply.clone())
    }

    async fn submit_tool_outputs(
        &self,
        _thread_id: &str,
        _run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run, AssistantError> {
        self.log("submit_tool_outputs".to_string());
        self.submitted.lock().unwrap().push(outputs.to_vec());
        Ok(self.next())
    }
}

fn run(status: RunStatus) -> Run {
    Run {
        id: "run_1".to_string(),
        thread_id: "thread_1".to_string(),
        status,
        required_action: None,
        last_error: None,
    }
}

fn requires(calls: &[(&str, &str, String)]) -> Run {
    Run {
        required_action: Some(RequiredAction {
            action_type: "submit_tool_outputs".to_string(),
            submit_tool_outputs: Some(SubmitToolOutputs {
                tool_calls: calls
                    .iter()
                    .map(|(id, name, arguments)| ToolCallRequest {
                        id: id.to_string(),
                        function: FunctionCall {
                            name: name.to_string(),
                            arguments: arguments.clone(),
                        },
                    })
                    .collect(),
            }),
        }),
        ..run(RunStatus::RequiresAction)
    }
}

fn specific_args() -> String {
    format!(r#"{{"patient": "{}", "receiver": "{}"}}"#, PATIENT, RECEIVER)
}

fn driver(runs: Arc<ScriptedRuns>, progress: Arc<RecordingSink>, max_polls: Option<usize>) -> RunDriver {
    RunDriver::new(
        runs,
        progress,
        DriverConfig {
            poll_interval: Duration::ZERO,
            max_polls,
        },
    )
}

/// Consent-side handler answering lookups with canned text
struct CannedConsentTools;

#[async_trait]
impl ToolHandler for CannedConsentTools {
    async fn handle(&self, call: ToolInvocation) -> Result<String, ToolError> {
        match call {
            ToolInvocation::GetSpecificConsent(args) => Ok(format!("specific for {}", args.patient)),
            ToolInvocation::ValidateReceiver(args) => Ok(format!("receiver is a {}", args.role)),
            ToolInvocation::GetGovernmentConsent(_) => Err(ToolError::NotConfigured("ledger.rpc_url")),
            other => Err(other.unsupported(AgentKind::Consent)),
        }
    }
}

/// Test that a completed run returns the latest assistant reply after
/// appending every message in order
#[tokio::test]
async fn test_completed_run_returns_reply() {
    let runs = ScriptedRuns::new(
        vec![run(RunStatus::Queued), run(RunStatus::InProgress), run(RunStatus::Completed)],
        Some("Data sharing is allowed."),
    );
    let driver = driver(runs.clone(), Arc::new(RecordingSink::new()), None);

    let outcome = driver
        .drive_messages(
            AgentKind::Filtering,
            "thread_1",
            "asst_filter",
            &["requirements".to_string(), "patient file".to_string()],
            &NoTools(AgentKind::Filtering),
        )
        .await
        .unwrap();

    assert_eq!(outcome.text, "Data sharing is allowed.");
    assert_eq!(outcome.run_id, "run_1");
    assert_eq!(outcome.polls, 2);
    assert!(outcome.tool_calls.is_empty());
    assert_eq!(
        runs.calls(),
        vec![
            "add_message:requirements",
            "add_message:patient file",
            "create_run:asst_filter",
            "retrieve_run",
            "retrieve_run",
            "latest_message",
        ]
    );
}

/// Test that every call in a batch is serviced before one submission
#[tokio::test]
async fn test_tool_batch_is_submitted_once() {
    let runs = ScriptedRuns::new(
        vec![
            requires(&[
                ("call_a", "getSpecificConsent", specific_args()),
                (
                    "call_b",
                    "validateReceiver",
                    format!(r#"{{"address": "{}", "role": "hospital"}}"#, RECEIVER),
                ),
            ]),
            run(RunStatus::InProgress),
            run(RunStatus::Completed),
        ],
        Some("Consent found."),
    );
    let driver = driver(runs.clone(), Arc::new(RecordingSink::new()), None);

    let outcome = driver
        .drive(AgentKind::Consent, "thread_1", "asst_consent", "check", &CannedConsentTools)
        .await
        .unwrap();

    let submitted = runs.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(
        submitted[0],
        vec![
            ToolOutput {
                tool_call_id: "call_a".to_string(),
                output: format!("specific for {}", PATIENT),
            },
            ToolOutput {
                tool_call_id: "call_b".to_string(),
                output: "receiver is a hospital".to_string(),
            },
        ]
    );

    assert_eq!(outcome.text, "Consent found.");
    assert_eq!(outcome.polls, 1);
    let tools: Vec<&str> = outcome.tool_calls.iter().map(|r| r.tool).collect();
    assert_eq!(tools, vec!["getSpecificConsent", "validateReceiver"]);
}

/// Test that a failed run surfaces its error and stops talking to the service
#[tokio::test]
async fn test_failed_run_stops() {
    let failed = Run {
        last_error: Some(RunError {
            code: "rate_limit_exceeded".to_string(),
            message: "Rate limit reached".to_string(),
        }),
        ..run(RunStatus::Failed)
    };
    let runs = ScriptedRuns::new(vec![run(RunStatus::InProgress), failed], Some("unused"));
    let driver = driver(runs.clone(), Arc::new(RecordingSink::new()), None);

    let err = driver
        .drive(AgentKind::Regulation, "thread_1", "asst_reg", "hi", &NoTools(AgentKind::Regulation))
        .await
        .unwrap_err();

    match err {
        DriverError::RunFailed { status, message } => {
            assert_eq!(status, RunStatus::Failed);
            assert_eq!(message.as_deref(), Some("Rate limit reached"));
        }
        other => panic!("expected RunFailed, got {:?}", other),
    }
    assert_eq!(runs.calls().last().map(String::as_str), Some("retrieve_run"));
}

/// Test that `incomplete` counts as a terminal failure
#[tokio::test]
async fn test_incomplete_run_is_failure() {
    let runs = ScriptedRuns::new(vec![run(RunStatus::Incomplete)], None);
    let driver = driver(runs, Arc::new(RecordingSink::new()), None);

    let err = driver
        .drive(AgentKind::Consent, "thread_1", "asst_consent", "hi", &CannedConsentTools)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DriverError::RunFailed {
            status: RunStatus::Incomplete,
            message: None
        }
    ));
}

/// Test that a run cancelled after a tool submission stops the drive
#[tokio::test]
async fn test_cancelled_run_stops() {
    let runs = ScriptedRuns::new(
        vec![
            requires(&[("call_a", "getSpecificConsent", specific_args())]),
            run(RunStatus::Cancelled),
            run(RunStatus::Completed),
        ],
        Some("unused"),
    );
    let driver = driver(runs.clone(), Arc::new(RecordingSink::new()), None);

    let err = driver
        .drive(AgentKind::Consent, "thread_1", "asst_consent", "check", &CannedConsentTools)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DriverError::RunFailed {
            status: RunStatus::Cancelled,
            message: None
        }
    ));
    assert_eq!(
        runs.calls(),
        vec!["add_message:check", "create_run:asst_consent", "submit_tool_outputs"]
    );
    assert_eq!(runs.submitted().len(), 1);
}

/// Test that an expired run stops polling
#[tokio::test]
async fn test_expired_run_stops() {
    let runs = ScriptedRuns::new(
        vec![run(RunStatus::Queued), run(RunStatus::Expired), run(RunStatus::Completed)],
        Some("unused"),
    );
    let driver = driver(runs.clone(), Arc::new(RecordingSink::new()), None);

    let err = driver
        .drive(AgentKind::Regulation, "thread_1", "asst_reg", "hi", &NoTools(AgentKind::Regulation))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DriverError::RunFailed {
            status: RunStatus::Expired,
            message: None
        }
    ));
    assert_eq!(
        runs.calls(),
        vec!["add_message:hi", "create_run:asst_reg", "retrieve_run"]
    );
    assert!(runs.submitted().is_empty());
}

/// Test that an unknown tool name aborts the drive without submitting
#[tokio::test]
async fn test_unknown_tool_is_fatal() {
    let runs = ScriptedRuns::new(vec![requires(&[("call_a", "delete_everything", "{}".to_string())])], None);
    let driver = driver(runs.clone(), Arc::new(RecordingSink::new()), None);

    let err = driver
        .drive(AgentKind::Consent, "thread_1", "asst_consent", "hi", &CannedConsentTools)
        .await
        .unwrap_err();

    assert!(matches!(err, DriverError::UnknownTool(ref name) if name == "delete_everything"));
    assert!(runs.submitted().is_empty());
}

/// Test that malformed arguments are rejected at decode time
#[tokio::test]
async fn test_invalid_arguments_are_fatal() {
    let runs = ScriptedRuns::new(
        vec![requires(&[("call_a", "getSpecificConsent", r#"{"patient": 7}"#.to_string())])],
        None,
    );
    let driver = driver(runs.clone(), Arc::new(RecordingSink::new()), None);

    let err = driver
        .drive(AgentKind::Consent, "thread_1", "asst_consent", "hi", &CannedConsentTools)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DriverError::InvalidArguments {
            tool: "getSpecificConsent",
            ..
        }
    ));
    assert!(runs.submitted().is_empty());
}

/// Test that a known tool sent to the wrong agent is rejected
#[tokio::test]
async fn test_tool_not_served_by_agent() {
    let runs = ScriptedRuns::new(
        vec![requires(&[("call_a", "search_web", r#"{"user_query": "GDPR"}"#.to_string())])],
        None,
    );
    let driver = driver(runs.clone(), Arc::new(RecordingSink::new()), None);

    let err = driver
        .drive(AgentKind::Filtering, "thread_1", "asst_filter", "hi", &NoTools(AgentKind::Filtering))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DriverError::Unsupported {
            tool: "search_web",
            agent: AgentKind::Filtering
        }
    ));
    assert!(runs.submitted().is_empty());
}

/// Test that a handler failure aborts the drive and is reported as progress
#[tokio::test]
async fn test_handler_failure_is_reported() {
    let runs = ScriptedRuns::new(
        vec![requires(&[(
            "call_a",
            "getGovernmentConsent",
            format!(r#"{{"country": "Japan", "receiver": "{}"}}"#, RECEIVER),
        )])],
        None,
    );
    let progress = Arc::new(RecordingSink::new());
    let driver = driver(runs.clone(), progress.clone(), None);

    let err = driver
        .drive(AgentKind::Consent, "thread_1", "asst_consent", "hi", &CannedConsentTools)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DriverError::Tool {
            tool: "getGovernmentConsent",
            source: ToolError::NotConfigured("ledger.rpc_url")
        }
    ));
    assert!(runs.submitted().is_empty());
    assert_eq!(
        progress.messages(),
        vec!["❌ getGovernmentConsent failed: ledger.rpc_url is not configured"]
    );
}

/// Test that a run stuck in progress hits the poll limit
#[tokio::test]
async fn test_poll_limit() {
    let runs = ScriptedRuns::new(Vec::new(), None);
    let driver = driver(runs.clone(), Arc::new(RecordingSink::new()), Some(3));

    let err = driver
        .drive(AgentKind::Orchestrator, "thread_1", "asst_orch", "hi", &NoTools(AgentKind::Orchestrator))
        .await
        .unwrap_err();

    assert!(matches!(err, DriverError::PollLimitReached(3)));
    let polls = runs.calls().iter().filter(|c| *c == "retrieve_run").count();
    assert_eq!(polls, 3);
}

/// Test that a completed run without an assistant message is an error
#[tokio::test]
async fn test_missing_reply() {
    let runs = ScriptedRuns::new(vec![run(RunStatus::Completed)], None);
    let driver = driver(runs, Arc::new(RecordingSink::new()), None);

    let err = driver
        .drive(AgentKind::Regulation, "thread_1", "asst_reg", "hi", &NoTools(AgentKind::Regulation))
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::NoAssistantReply));
}

/// Test that the driver hands its progress sink to handlers
#[test]
fn test_progress_sink_is_shared() {
    let progress = Arc::new(RecordingSink::new());
    let driver = driver(ScriptedRuns::new(Vec::new(), None), progress.clone(), None);
    driver.progress().notify("🔍 Searching the web...");
    assert_eq!(progress.messages(), vec!["🔍 Searching the web..."]);
}

/// Test a real round trip against the hosted service
///
/// Needs OPENAI_API_KEY and MEDSHARE_TEST_ASSISTANT (an assistant without tools).
#[tokio::test]
#[ignore]
async fn test_live_round_trip() {
    use medshare::assistant::AssistantsClient;

    let api_key = std::env::var("OPENAI_API_KEY").expect("OPENAI_API_KEY not set");
    let assistant = std::env::var("MEDSHARE_TEST_ASSISTANT").expect("MEDSHARE_TEST_ASSISTANT not set");

    let client: Arc<dyn RunService> =
        Arc::new(AssistantsClient::new("https://api.openai.com/v1", api_key));
    let thread = client.create_thread().await.expect("create thread");
    let driver = RunDriver::new(client, Arc::new(RecordingSink::new()), DriverConfig::default());

    let outcome = driver
        .drive(
            AgentKind::Regulation,
            &thread,
            &assistant,
            "Reply with the single word: ready",
            &NoTools(AgentKind::Regulation),
        )
        .await
        .expect("drive");
    assert!(!outcome.text.is_empty());
}
