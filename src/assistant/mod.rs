//! Hosted assistant integration
//!
//! Clients for the conversational run service (threads, runs, tool
//! outputs), the search-augmented LLM call, and the regulation vector
//! store.

pub mod client;
pub mod search;
pub mod types;

pub use client::{
    AssistantError, AssistantsClient, HttpFetcher, PageFetcher, RunService, SourceLibrary,
    VectorStoreLibrary,
};
pub use search::{ResponsesSearch, WebSearch};
pub use types::{Run, RunState, RunStatus, ThreadMessage, ToolCallRequest, ToolOutput};
