//! Shared collaborators for the four agents

use std::path::PathBuf;
use std::sync::Arc;

use crate::assistant::{PageFetcher, SourceLibrary, WebSearch};
use crate::config::{AssistantIds, LedgerConfig};
use crate::ledger::{ConfirmationPolicy, Ledger};
use crate::progress::ProgressSink;
use crate::sharing::{AesKey, ContentStore};

use super::driver::RunDriver;

/// Everything the agents need to service a turn
///
/// Optional collaborators are only required by the tools that use them;
/// a tool whose collaborator is missing fails with
/// [`ToolError::NotConfigured`](super::tools::ToolError::NotConfigured).
pub struct AgentContext {
    pub assistants: AssistantIds,
    pub driver: RunDriver,
    pub search: Arc<dyn WebSearch>,
    pub ledger: Arc<dyn Ledger>,
    pub store: Option<Arc<dyn ContentStore>>,
    pub library: Option<Arc<dyn SourceLibrary>>,
    pub fetcher: Arc<dyn PageFetcher>,
    pub aes_key: Option<AesKey>,
    pub confirmation: ConfirmationPolicy,
    /// Filtered patient file written by the filtering agent and read by
    /// the sharing pipeline
    pub output_path: PathBuf,
}

impl AgentContext {
    pub fn progress(&self) -> &dyn ProgressSink {
        self.driver.progress()
    }
}

impl From<&LedgerConfig> for ConfirmationPolicy {
    fn from(config: &LedgerConfig) -> Self {
        Self {
            enabled: config.await_confirmation,
            poll_interval: config.confirmation_poll(),
            attempts: config.confirmation_attempts,
        }
    }
}
