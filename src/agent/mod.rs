//! Multi-agent conversation layer
//!
//! Four hosted assistants cooperate on a data-sharing request:
//! - orchestrator - talks to the user and calls the others as tools
//! - regulation - regulation requirements for a transfer
//! - consent - consent checks against the ledger
//! - filtering - removes disallowed data types from the patient file
//!
//! # Architecture
//!
//! ```text
//! User turn → Orchestrator → RunDriver (orchestrator thread)
//!                  ↓
//!        requires_action: decode ToolInvocation
//!                  ↓
//!        TurnTools ──▶ nested RunDriver drive (sub-agent thread)
//!                  ├──▶ Ledger (consent requests)
//!                  └──▶ DataSharer (encrypt → pin → ledger)
//!                  ↓
//!        submit outputs → poll → completed → reply
//! ```

pub mod consent;
pub mod context;
pub mod driver;
pub mod filtering;
pub mod orchestrator;
pub mod regulation;
pub mod sessions;
pub mod tools;

pub use context::AgentContext;
pub use driver::{DriveOutcome, DriverConfig, DriverError, NoTools, RunDriver, ToolHandler, ToolRecord};
pub use orchestrator::{Orchestrator, TurnTools};
pub use sessions::{AgentThreads, Session, SessionStore, SessionSummary};
pub use tools::{AgentKind, DecodeError, ToolError, ToolInvocation};
