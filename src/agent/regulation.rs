//! Regulatory compliance agent
//!
//! Answers "what do the sender's and receiver's regulations require for
//! this transfer" from its vector store. When the store has nothing
//! relevant the assistant calls `search_web`, which returns candidate
//! source URLs for the user to approve.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::info;

use crate::assistant::search::{
    format_numbered_urls, parse_numbered_urls, regulation_search_instructions, SEARCH_INPUT,
};
use crate::assistant::WebSearch;
use crate::progress::ProgressSink;

use super::context::AgentContext;
use super::driver::{DriverError, ToolHandler};
use super::tools::{AgentKind, RegulationQueryArgs, ToolError, ToolInvocation};

lazy_static! {
    static ref FILE_CITATION: Regex = Regex::new(r"【\d+:\d+†.*?】").expect("valid citation regex");
}

/// Natural-language request sent to the regulation assistant
pub fn regulation_query(args: &RegulationQueryArgs) -> String {
    format!(
        "I want the regulation requirements for sharing patient data from {} to a {} in {} for {} purposes",
        args.sender_country, args.receiver_role, args.receiver_country, args.purpose
    )
}

/// Drop file-search citation markers (`【4:0†source】`) for display
pub fn strip_citations(text: &str) -> String {
    FILE_CITATION.replace_all(text, "").into_owned()
}

/// Render a search reply as the `search_web` tool output
pub fn search_output(reply: &str) -> String {
    let urls = parse_numbered_urls(reply);
    if urls.is_empty() {
        format!("URLs retrieved from the web: {}", reply.trim())
    } else {
        format!("URLs retrieved from the web:\n{}", format_numbered_urls(&urls))
    }
}

/// Tools owned by the regulation assistant
pub struct RegulationTools<'a> {
    pub search: &'a dyn WebSearch,
    pub progress: &'a dyn ProgressSink,
}

#[async_trait]
impl ToolHandler for RegulationTools<'_> {
    async fn handle(&self, call: ToolInvocation) -> Result<String, ToolError> {
        match call {
            ToolInvocation::SearchWeb(args) => {
                self.progress
                    .notify("🌐 No stored regulations matched, searching the web for sources...");
                let instructions = regulation_search_instructions(&args.user_query);
                let reply = self.search.search(&instructions, SEARCH_INPUT).await?;
                Ok(search_output(&reply))
            }
            other => Err(other.unsupported(AgentKind::Regulation)),
        }
    }
}

/// Ask for the regulation requirements of a transfer
pub async fn run(
    ctx: &AgentContext,
    thread_id: &str,
    args: &RegulationQueryArgs,
) -> Result<String, DriverError> {
    let query = regulation_query(args);
    info!(%query, "Regulation query");
    ctx.progress()
        .notify("📘 Calling Regulatory Compliance Agent to determine regulation requirements...");
    ctx.progress()
        .notify("🔍 Retrieving regulations of sender and receiver countries...");

    let outcome = converse(ctx, thread_id, &query).await?;
    ctx.progress()
        .notify("✅ Regulatory Compliance Agent response received");
    Ok(outcome)
}

/// Forward a follow-up question to the regulation thread
pub async fn explain(ctx: &AgentContext, thread_id: &str, question: &str) -> Result<String, DriverError> {
    ctx.progress()
        .notify("📘 Calling the Regulatory Compliance Agent to clarify data sharing rules...");
    converse(ctx, thread_id, question).await
}

async fn converse(ctx: &AgentContext, thread_id: &str, input: &str) -> Result<String, DriverError> {
    let tools = RegulationTools {
        search: ctx.search.as_ref(),
        progress: ctx.progress(),
    };
    let outcome = ctx
        .driver
        .drive(
            AgentKind::Regulation,
            thread_id,
            &ctx.assistants.regulation,
            input,
            &tools,
        )
        .await?;
    ctx.progress().notify(&strip_citations(&outcome.text));
    Ok(outcome.text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::AssistantError;
    use crate::progress::RecordingSink;

    struct CannedSearch(&'static str);

    #[async_trait]
    impl WebSearch for CannedSearch {
        async fn search(&self, instructions: &str, _input: &str) -> Result<String, AssistantError> {
            assert!(instructions.contains("hospital in Canada"));
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn test_regulation_query_text() {
        let args = RegulationQueryArgs {
            sender_country: "US".to_string(),
            receiver_role: "hospital".to_string(),
            receiver_country: "Canada".to_string(),
            purpose: "Treatment".to_string(),
        };
        assert_eq!(
            regulation_query(&args),
            "I want the regulation requirements for sharing patient data from US to a hospital in Canada for Treatment purposes"
        );
    }

    #[test]
    fn test_strip_citations() {
        assert_eq!(
            strip_citations("Consent is required【4:0†hipaa.pdf】. Anonymize【12:3†pipeda.pdf】."),
            "Consent is required. Anonymize."
        );
    }

    #[test]
    fn test_search_output_renumbers() {
        let reply = "Here you go:\n1. https://a.gov/x\n\n2) https://b.ca/y.";
        assert_eq!(
            search_output(reply),
            "URLs retrieved from the web:\n1- https://a.gov/x\n2- https://b.ca/y\n"
        );
        assert_eq!(search_output("nothing found"), "URLs retrieved from the web: nothing found");
    }

    #[tokio::test]
    async fn test_search_web_tool() {
        let search = CannedSearch("1- https://www.hhs.gov/hipaa\n\n2- https://laws.justice.gc.ca/pipeda");
        let progress = RecordingSink::new();
        let tools = RegulationTools {
            search: &search,
            progress: &progress,
        };
        let call = ToolInvocation::decode(
            "search_web",
            r#"{"user_query": "sharing from US to a hospital in Canada"}"#,
        )
        .unwrap();
        let output = tools.handle(call).await.unwrap();
        assert!(output.starts_with("URLs retrieved from the web:"));
        assert!(output.contains("2- https://laws.justice.gc.ca/pipeda"));
    }

    #[tokio::test]
    async fn test_rejects_foreign_tools() {
        let search = CannedSearch("");
        let progress = RecordingSink::new();
        let tools = RegulationTools {
            search: &search,
            progress: &progress,
        };
        let call = ToolInvocation::decode("getSpecificConsent", r#"{"patient": "0x0", "receiver": "0x0"}"#)
            .unwrap();
        assert!(matches!(
            tools.handle(call).await,
            Err(ToolError::Unsupported { tool: "getSpecificConsent", agent: AgentKind::Regulation })
        ));
    }
}
