//! Prometheus metrics for agent runs, tool calls and ledger writes

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    // ─────────────────────────────────────────────────────────────────────────────
    // Run Driver Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Finished drives by agent and outcome.
    ///
    /// Labels:
    /// - agent: orchestrator, regulation, consent, filtering
    /// - outcome: completed, failed, cancelled, expired, incomplete, error
    pub static ref AGENT_RUNS: CounterVec = register_counter_vec!(
        "medshare_agent_runs_total",
        "Assistant runs driven to a terminal state",
        &["agent", "outcome"]
    ).expect("failed to register AGENT_RUNS metric");

    /// Run status polls by agent.
    pub static ref RUN_POLLS: CounterVec = register_counter_vec!(
        "medshare_run_polls_total",
        "Run status polls issued",
        &["agent"]
    ).expect("failed to register RUN_POLLS metric");

    /// Wall time of a whole drive (message append to final text).
    pub static ref DRIVE_DURATION: HistogramVec = register_histogram_vec!(
        "medshare_drive_duration_seconds",
        "Time from run creation to terminal state",
        &["agent"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    ).expect("failed to register DRIVE_DURATION metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Tool Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Tool invocations by tool name and outcome (ok, error).
    pub static ref TOOL_CALLS: CounterVec = register_counter_vec!(
        "medshare_tool_calls_total",
        "Tool calls serviced for assistant runs",
        &["tool", "outcome"]
    ).expect("failed to register TOOL_CALLS metric");

    pub static ref TOOL_CALL_DURATION: HistogramVec = register_histogram_vec!(
        "medshare_tool_call_duration_seconds",
        "Time spent inside a local tool handler",
        &["tool"],
        vec![0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 120.0]
    ).expect("failed to register TOOL_CALL_DURATION metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Ledger + Eval Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Ledger transactions by contract method and state (submitted, confirmed, reverted).
    pub static ref LEDGER_TRANSACTIONS: CounterVec = register_counter_vec!(
        "medshare_ledger_transactions_total",
        "Ledger transactions sent",
        &["method", "state"]
    ).expect("failed to register LEDGER_TRANSACTIONS metric");

    /// Evaluation requests by provider and outcome.
    pub static ref EVAL_REQUESTS: CounterVec = register_counter_vec!(
        "medshare_eval_requests_total",
        "Evaluation prompts sent to providers",
        &["provider", "outcome"]
    ).expect("failed to register EVAL_REQUESTS metric");
}

/// Render every registered metric in the Prometheus text format
pub fn render() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
