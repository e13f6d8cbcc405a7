//! Orchestrator agent
//!
//! Each user turn is one run on the orchestrator thread. The orchestrator
//! delegates to the regulation, consent and filtering agents (each a
//! nested drive on its own thread), sends consent requests to the ledger,
//! and finally runs the sharing pipeline.
//!
//! ```text
//! user turn → orchestrator run
//!                 │ run_regulation_agent_tool  → regulation run (search_web)
//!                 │ run_consent_agent_tool     → consent run (ledger reads)
//!                 │ run_data_filtering_tool    → filtering run → output file
//!                 │ request*Consent            → ledger write
//!                 │ data_sharing_tool          → encrypt → pin → ledger write
//!                 ▼
//!             reply text
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, info_span, warn, Instrument};

use crate::assistant::search::{
    format_numbered_urls, more_sources_instructions, parse_numbered_urls, SEARCH_INPUT,
};
use crate::ledger::{self, parse_address, TxOutcome};
use crate::sharing::DataSharer;
use crate::vocab::{DataType, Purpose};

use super::context::AgentContext;
use super::driver::{DriverError, ToolHandler};
use super::sessions::{AgentThreads, Session};
use super::tools::{AgentKind, ToolError, ToolInvocation};
use super::{consent, filtering, regulation};

/// Drives user turns through the orchestrator assistant
pub struct Orchestrator {
    ctx: Arc<AgentContext>,
}

impl Orchestrator {
    pub fn new(ctx: Arc<AgentContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &AgentContext {
        &self.ctx
    }

    /// Run one user turn and record it on the session
    pub async fn turn(&self, session: &mut Session, user_input: &str) -> Result<String, DriverError> {
        let span = info_span!("turn", session_id = %session.id, otel.name = "turn");
        let handler = TurnTools {
            ctx: &self.ctx,
            threads: &session.threads,
            user_input,
            input_file: session.input_file.clone(),
        };
        let outcome = self
            .ctx
            .driver
            .drive(
                AgentKind::Orchestrator,
                &session.threads.orchestrator,
                &self.ctx.assistants.orchestrator,
                user_input,
                &handler,
            )
            .instrument(span)
            .await?;
        info!(session_id = %session.id, tool_calls = outcome.tool_calls.len(), "Turn completed");
        session.record_turn(user_input, outcome.text.clone());
        Ok(outcome.text)
    }
}

/// Orchestrator tools for a single turn
///
/// Explanation tools forward the raw user turn, so the handler is built
/// per turn.
pub struct TurnTools<'a> {
    pub ctx: &'a AgentContext,
    pub threads: &'a AgentThreads,
    pub user_input: &'a str,
    pub input_file: Option<PathBuf>,
}

#[async_trait]
impl ToolHandler for TurnTools<'_> {
    async fn handle(&self, call: ToolInvocation) -> Result<String, ToolError> {
        let ctx = self.ctx;
        match call {
            ToolInvocation::RunRegulationAgent(args) => {
                Ok(regulation::run(ctx, &self.threads.regulation, &args).await?)
            }
            ToolInvocation::RunConsentAgent(args) => {
                Ok(consent::run(ctx, &self.threads.consent, &args).await?)
            }
            ToolInvocation::RunDataFiltering(args) => {
                let input = self.input_file()?;
                let requirements = filtering::filtering_query(&args);
                filtering::filter(ctx, &self.threads.filtering, &requirements, input).await
            }
            ToolInvocation::ExplainRegulation => {
                Ok(regulation::explain(ctx, &self.threads.regulation, self.user_input).await?)
            }
            ToolInvocation::ExplainConsent => {
                Ok(consent::explain(ctx, &self.threads.consent, self.user_input).await?)
            }
            ToolInvocation::ExplainFiltering => {
                let input = self.input_file()?;
                filtering::explain(ctx, &self.threads.filtering, self.user_input, input).await
            }
            ToolInvocation::RefineFiltering(args) => {
                filtering::refine(ctx, &self.threads.filtering, &args.user_request).await
            }
            ToolInvocation::RequestGovernmentConsent(args) => {
                ctx.progress().notify("🌐 Requesting government consent...");
                let receiver = parse_address(&args.receiver)?;
                let government = ctx.ledger.government_address(&args.country).await?;
                let hash = ctx
                    .ledger
                    .request_government_consent(
                        government,
                        receiver,
                        &type_codes(&args.data_types),
                        &purpose_codes(&args.purposes),
                    )
                    .await?;
                let outcome =
                    ledger::settle(ctx.ledger.as_ref(), "requestGovernmentConsent", hash, ctx.confirmation)
                        .await?;
                Ok(consent_request_sent(&outcome))
            }
            ToolInvocation::RequestPatientConsent(args) => {
                ctx.progress().notify("🌐 Requesting patient consent...");
                let patient = parse_address(&args.patient)?;
                let receiver = parse_address(&args.receiver)?;
                let hash = ctx
                    .ledger
                    .request_patient_consent(
                        patient,
                        receiver,
                        &type_codes(&args.data_types),
                        &purpose_codes(&args.purposes),
                    )
                    .await?;
                let outcome =
                    ledger::settle(ctx.ledger.as_ref(), "requestPatientConsent", hash, ctx.confirmation)
                        .await?;
                Ok(consent_request_sent(&outcome))
            }
            ToolInvocation::ShareData(args) => {
                ctx.progress().notify("📨 Sharing patient data...");
                let receiver = parse_address(&args.receiver_address)?;
                let store = ctx.store.as_deref().ok_or(ToolError::NotConfigured("storage"))?;
                let key = ctx
                    .aes_key
                    .as_ref()
                    .ok_or(ToolError::NotConfigured("sharing.aes_key"))?;
                let sharer = DataSharer {
                    ledger: ctx.ledger.as_ref(),
                    store,
                    progress: ctx.progress(),
                    key,
                    confirmation: ctx.confirmation,
                };
                let receipt = sharer.share(receiver, &ctx.output_path).await?;
                ctx.progress().notify("📨 Data shared successfully via blockchain!");
                Ok(receipt.message())
            }
            ToolInvocation::UploadWebSources(args) => {
                ctx.progress().notify("🗃️ Adding retrieved regulations to the database...");
                Ok(self.upload_sources(&args.urls).await)
            }
            ToolInvocation::RequestMoreSources(args) => {
                ctx.progress()
                    .notify("🔍 Searching the web for additional regulatory sources...");
                let instructions =
                    more_sources_instructions(&args.query, &args.previous_urls, &args.user_response);
                let reply = ctx.search.search(&instructions, SEARCH_INPUT).await?;
                let urls = parse_numbered_urls(&reply);
                if urls.is_empty() {
                    Ok(format!("New URLs: {}", reply.trim()))
                } else {
                    Ok(format!("New URLs:\n{}", format_numbered_urls(&urls)))
                }
            }
            other => Err(other.unsupported(AgentKind::Orchestrator)),
        }
    }
}

impl TurnTools<'_> {
    fn input_file(&self) -> Result<&std::path::Path, ToolError> {
        self.input_file.as_deref().ok_or(ToolError::NoInputFile)
    }

    /// Fetch every approved URL into the regulation store
    ///
    /// Failures are reported to the orchestrator as tool output rather
    /// than ending the turn.
    async fn upload_sources(&self, urls: &str) -> String {
        let library = match self.ctx.library.as_deref() {
            Some(library) => library,
            None => return "❌ Failed to save sources: no regulation store is configured.".to_string(),
        };
        let urls = source_urls(urls);
        if urls.is_empty() {
            return "❌ Failed to save sources: no URLs were given.".to_string();
        }

        let mut failures = Vec::new();
        for url in &urls {
            let span = info_span!("upload_source", url = %url);
            let saved = async {
                let page = self.ctx.fetcher.fetch(url).await?;
                library.add_document(&document_name(url), page).await
            }
            .instrument(span)
            .await;
            match saved {
                Ok(file_id) => info!(%url, %file_id, "Regulation source stored"),
                Err(e) => {
                    warn!(%url, error = %e, "Failed to store regulation source");
                    failures.push(format!("{} ({})", url, e));
                }
            }
        }

        if failures.is_empty() {
            "✅ Files saved to database successfully.".to_string()
        } else {
            format!("❌ Failed to save {} of {} sources: {}", failures.len(), urls.len(), failures.join("; "))
        }
    }
}

fn type_codes(types: &[DataType]) -> Vec<u8> {
    types.iter().map(|t| t.code()).collect()
}

fn purpose_codes(purposes: &[Purpose]) -> Vec<u8> {
    purposes.iter().map(|p| p.code()).collect()
}

fn consent_request_sent(outcome: &TxOutcome) -> String {
    format!(
        "📤 Consent request sent via blockchain. Transaction hash: {}",
        outcome.hash_hex()
    )
}

/// URLs from a numbered list, or any whitespace-separated http(s) tokens
pub fn source_urls(text: &str) -> Vec<String> {
    let numbered = parse_numbered_urls(text);
    if !numbered.is_empty() {
        return numbered;
    }
    text.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| t.starts_with("http://") || t.starts_with("https://"))
        .map(str::to_string)
        .collect()
}

/// File name for a stored page, derived from its URL
pub fn document_name(url: &str) -> String {
    let stem: String = url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    format!("{}.html", stem.trim_matches('_'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_urls_numbered() {
        let text = "1- https://www.hhs.gov/hipaa\n\n2- https://laws.justice.gc.ca/eng/acts/P-8.6/";
        assert_eq!(
            source_urls(text),
            vec!["https://www.hhs.gov/hipaa", "https://laws.justice.gc.ca/eng/acts/P-8.6/"]
        );
    }

    #[test]
    fn test_source_urls_plain_list() {
        assert_eq!(
            source_urls("https://a.gov/x, https://b.ca/y not-a-url"),
            vec!["https://a.gov/x", "https://b.ca/y"]
        );
        assert!(source_urls("none here").is_empty());
    }

    #[test]
    fn test_document_name() {
        assert_eq!(document_name("https://www.hhs.gov/hipaa/index.html"), "www.hhs.gov_hipaa_index.html.html");
        assert_eq!(document_name("https://a.gov/x/"), "a.gov_x.html");
    }

    #[test]
    fn test_codes() {
        assert_eq!(type_codes(&[DataType::LabResults, DataType::All]), vec![2, 7]);
        assert_eq!(purpose_codes(&[Purpose::Treatment]), vec![Purpose::Treatment.code()]);
    }
}
