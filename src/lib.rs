//! MedShare - multi-agent cross-border patient data sharing
//!
//! A conversational orchestrator, backed by hosted assistants, decides
//! whether patient data may be shared with a receiver: it asks a
//! regulation agent what the sender's and receiver's laws require, a
//! consent agent whether the ledger holds matching consents, and a
//! filtering agent to strip disallowed data. Approved files are
//! encrypted, pinned to content-addressed storage and announced to the
//! receiver on an Ethereum ledger.
//!
//! # Modules
//!
//! - `agent` - run driver, tool registry, the four agents, sessions
//! - `assistant` - hosted assistant, web search and vector store clients
//! - `ledger` - consent and data registry contracts, consent evaluation
//! - `sharing` - encrypt → pin → ledger write pipeline
//! - `eval` - provider comparison harness
//! - `config` - TOML + environment configuration
//! - `metrics` - Prometheus metrics for observability
//! - `tracing` - tracing subscriber and optional OTLP export
//!
//! # Quick Start
//!
//! ```ignore
//! use medshare::agent::{Orchestrator, Session};
//!
//! let orchestrator = Orchestrator::new(ctx);
//! let mut session = Session::start(runs.as_ref(), Some("patient.txt".into())).await?;
//! let reply = orchestrator.turn(&mut session, "Share my patient's labs with 0xabc...").await?;
//! ```

pub mod agent;
pub mod assistant;
pub mod config;
pub mod eval;
pub mod ledger;
pub mod metrics;
pub mod progress;
pub mod sharing;
pub mod tracing;
pub mod vocab;

// Re-export commonly used types at crate root for convenience
pub use agent::{AgentContext, Orchestrator, RunDriver, Session, SessionStore};
pub use config::AppConfig;
pub use ledger::{EthLedger, Ledger};
