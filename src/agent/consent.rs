//! Consent verification agent
//!
//! The assistant reasons over consent records it pulls from the ledger
//! through read-only tools. Every tool output is either a JSON list of
//! consent rows or a JSON-encoded "no consent" sentence.

use async_trait::async_trait;
use tracing::info;

use crate::ledger::{lookup, parse_address, Ledger};
use crate::progress::ProgressSink;

use super::context::AgentContext;
use super::driver::{DriverError, ToolHandler};
use super::tools::{AgentKind, ConsentQueryArgs, ToolError, ToolInvocation};

/// Natural-language request sent to the consent assistant
pub fn consent_query(args: &ConsentQueryArgs) -> String {
    format!(
        "We want to share patient data.\n\
         The sender is in {}, and the receiver is a {} located in {} with Ethereum address {}.\n\
         The purpose of sharing is: {}.\n\
         The patient's Ethereum address is {}.\n\
         According to the regulation, the consent requirement is: {}.\n\n\
         Please check if valid consent exists and whether it satisfies this requirement and validate the receiver. \
         If valid consent(s) exist, please return the full details of all the consent(s) that apply to this case.",
        args.sender_country,
        args.receiver_role,
        args.receiver_country,
        args.receiver_address,
        args.purposes,
        args.patient_address,
        args.consent_requirements,
    )
}

/// Read-only ledger tools owned by the consent assistant
pub struct ConsentTools<'a> {
    pub ledger: &'a dyn Ledger,
    pub progress: &'a dyn ProgressSink,
}

#[async_trait]
impl ToolHandler for ConsentTools<'_> {
    async fn handle(&self, call: ToolInvocation) -> Result<String, ToolError> {
        let output = match call {
            ToolInvocation::GetSpecificConsent(args) => {
                self.progress.notify("🔍 Searching for valid patient consent...");
                let patient = parse_address(&args.patient)?;
                let receiver = parse_address(&args.receiver)?;
                lookup::specific_consent(self.ledger, patient, receiver).await?
            }
            ToolInvocation::GetGovernmentConsent(args) => {
                self.progress.notify("🔍 Searching for valid government consent...");
                let receiver = parse_address(&args.receiver)?;
                lookup::government_consent(self.ledger, &args.country, receiver).await?
            }
            ToolInvocation::GetRoleConsents { category, args } => {
                let patient = parse_address(&args.patient)?;
                lookup::role_consents(self.ledger, patient, category).await?
            }
            ToolInvocation::ValidateReceiver(args) => {
                self.progress.notify("⚙️ Validating the receiver...");
                let address = parse_address(&args.address)?;
                lookup::validate_receiver(self.ledger, address, &args.role).await?
            }
            other => return Err(other.unsupported(AgentKind::Consent)),
        };
        Ok(output)
    }
}

/// Ask whether valid consent exists for a transfer
pub async fn run(
    ctx: &AgentContext,
    thread_id: &str,
    args: &ConsentQueryArgs,
) -> Result<String, DriverError> {
    let query = consent_query(args);
    info!(patient = %args.patient_address, receiver = %args.receiver_address, "Consent query");
    ctx.progress()
        .notify("🔐 Calling Consent Verification Agent to validate required consents...");
    let reply = converse(ctx, thread_id, &query).await?;
    ctx.progress()
        .notify("✅ Consent Verification Agent response received");
    Ok(reply)
}

/// Forward a follow-up question to the consent thread
pub async fn explain(ctx: &AgentContext, thread_id: &str, question: &str) -> Result<String, DriverError> {
    ctx.progress()
        .notify("🔐 Routing your question to the Consent Verification Agent for clarification...");
    converse(ctx, thread_id, question).await
}

async fn converse(ctx: &AgentContext, thread_id: &str, input: &str) -> Result<String, DriverError> {
    let tools = ConsentTools {
        ledger: ctx.ledger.as_ref(),
        progress: ctx.progress(),
    };
    let outcome = ctx
        .driver
        .drive(AgentKind::Consent, thread_id, &ctx.assistants.consent, input, &tools)
        .await?;
    ctx.progress().notify(&outcome.text);
    Ok(outcome.text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consent_query_text() {
        let args = ConsentQueryArgs {
            sender_country: "US".to_string(),
            receiver_role: "hospital".to_string(),
            receiver_country: "Canada".to_string(),
            receiver_address: "0xabc".to_string(),
            purposes: "Treatment".to_string(),
            patient_address: "0xdef".to_string(),
            consent_requirements: "Broad Consent".to_string(),
        };
        let query = consent_query(&args);
        assert!(query.starts_with("We want to share patient data.\nThe sender is in US, and the receiver is a hospital located in Canada with Ethereum address 0xabc.\n"));
        assert!(query.contains("The purpose of sharing is: Treatment.\n"));
        assert!(query.contains("The patient's Ethereum address is 0xdef.\n"));
        assert!(query.contains("the consent requirement is: Broad Consent.\n\nPlease check"));
        assert!(query.ends_with("that apply to this case."));
    }
}
