//! Typed tool registry
//!
//! Every tool an assistant may call is a variant of [`ToolInvocation`]
//! with its own argument struct. Raw `(name, arguments-json)` pairs from
//! a run are decoded once, at the dispatch boundary; handlers only ever
//! see typed values.

use std::fmt;

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use thiserror::Error;

use crate::assistant::AssistantError;
use crate::ledger::{ConsentCategory, LedgerError};
use crate::sharing::{CryptoError, SharingError, StorageError};
use crate::vocab::{DataType, Purpose};

use super::driver::DriverError;

/// The four hosted assistants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentKind {
    Orchestrator,
    Regulation,
    Consent,
    Filtering,
}

impl AgentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentKind::Orchestrator => "orchestrator",
            AgentKind::Regulation => "regulation",
            AgentKind::Consent => "consent",
            AgentKind::Filtering => "filtering",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unknown tool {0:?}")]
    UnknownTool(String),
    #[error("invalid arguments for {tool}: {source}")]
    InvalidArguments {
        tool: &'static str,
        source: serde_json::Error,
    },
}

/// Failure inside a tool handler
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{tool} is not served by the {agent} agent")]
    Unsupported {
        tool: &'static str,
        agent: AgentKind,
    },
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("assistant error: {0}")]
    Assistant(#[from] AssistantError),
    #[error(transparent)]
    Sharing(#[from] SharingError),
    #[error("invalid sharing key: {0}")]
    Crypto(#[from] CryptoError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("{path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("no patient data file is attached to this session")]
    NoInputFile,
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error("sub-agent failed: {0}")]
    Agent(#[source] Box<DriverError>),
}

impl From<DriverError> for ToolError {
    fn from(e: DriverError) -> Self {
        ToolError::Agent(Box::new(e))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Argument structs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegulationQueryArgs {
    pub sender_country: String,
    pub receiver_role: String,
    pub receiver_country: String,
    #[serde(deserialize_with = "text_or_list")]
    pub purpose: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConsentQueryArgs {
    pub sender_country: String,
    pub receiver_role: String,
    pub receiver_country: String,
    pub receiver_address: String,
    #[serde(deserialize_with = "text_or_list")]
    pub purposes: String,
    pub patient_address: String,
    #[serde(deserialize_with = "text_or_list")]
    pub consent_requirements: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FilteringArgs {
    #[serde(deserialize_with = "text_or_list")]
    pub allowed_data_types: String,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub anonymization_required: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModificationArgs {
    pub user_request: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GovernmentConsentArgs {
    pub receiver: String,
    pub country: String,
    #[serde(rename = "dataTypes")]
    pub data_types: Vec<DataType>,
    pub purposes: Vec<Purpose>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PatientConsentArgs {
    pub patient: String,
    pub receiver: String,
    #[serde(rename = "dataTypes")]
    pub data_types: Vec<DataType>,
    pub purposes: Vec<Purpose>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ShareArgs {
    pub receiver_address: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UploadSourcesArgs {
    #[serde(deserialize_with = "lines_or_list")]
    pub urls: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MoreSourcesArgs {
    pub query: String,
    #[serde(deserialize_with = "lines_or_list")]
    pub previous_urls: String,
    pub user_response: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchArgs {
    pub user_query: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PatientReceiverArgs {
    pub patient: String,
    pub receiver: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CountryReceiverArgs {
    pub country: String,
    pub receiver: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PatientArgs {
    pub patient: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ValidateReceiverArgs {
    pub address: String,
    pub role: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Invocation
// ─────────────────────────────────────────────────────────────────────────────

/// A decoded tool call
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocation {
    // orchestrator
    RunRegulationAgent(RegulationQueryArgs),
    RunConsentAgent(ConsentQueryArgs),
    RunDataFiltering(FilteringArgs),
    ExplainRegulation,
    ExplainConsent,
    ExplainFiltering,
    RefineFiltering(ModificationArgs),
    RequestGovernmentConsent(GovernmentConsentArgs),
    RequestPatientConsent(PatientConsentArgs),
    ShareData(ShareArgs),
    UploadWebSources(UploadSourcesArgs),
    RequestMoreSources(MoreSourcesArgs),
    // regulation
    SearchWeb(SearchArgs),
    // consent
    GetSpecificConsent(PatientReceiverArgs),
    GetGovernmentConsent(CountryReceiverArgs),
    GetRoleConsents {
        category: ConsentCategory,
        args: PatientArgs,
    },
    ValidateReceiver(ValidateReceiverArgs),
}

impl ToolInvocation {
    /// Every wire name, grouped by serving agent
    pub const NAMES: [&'static str; 20] = [
        "run_regulation_agent_tool",
        "run_consent_agent_tool",
        "run_data_filtering_tool",
        "run_regulation_agent_tool_for_explanation",
        "run_consent_agent_tool_for_explanation",
        "run_data_filtering_tool_for_explanation",
        "run_data_filtering_tool_for_extra_modifications",
        "requestGovernmentConsent",
        "requestPatientConsent",
        "data_sharing_tool",
        "upload_web_sources_to_database",
        "request_more_sources",
        "search_web",
        "getSpecificConsent",
        "getGovernmentConsent",
        "getUniversalConsents",
        "getHospitalConsents",
        "getResearchLabConsents",
        "getInsuranceCompanyConsents",
        "validateReceiver",
    ];

    /// Decode a raw call; an empty argument string counts as `{}`
    pub fn decode(name: &str, arguments: &str) -> Result<Self, DecodeError> {
        let arguments = if arguments.trim().is_empty() {
            "{}"
        } else {
            arguments
        };

        let invocation = match name {
            "run_regulation_agent_tool" => Self::RunRegulationAgent(args(name, arguments)?),
            "run_consent_agent_tool" => Self::RunConsentAgent(args(name, arguments)?),
            "run_data_filtering_tool" => Self::RunDataFiltering(args(name, arguments)?),
            "run_regulation_agent_tool_for_explanation" => Self::ExplainRegulation,
            "run_consent_agent_tool_for_explanation" => Self::ExplainConsent,
            "run_data_filtering_tool_for_explanation" => Self::ExplainFiltering,
            "run_data_filtering_tool_for_extra_modifications" => {
                Self::RefineFiltering(args(name, arguments)?)
            }
            "requestGovernmentConsent" => Self::RequestGovernmentConsent(args(name, arguments)?),
            "requestPatientConsent" => Self::RequestPatientConsent(args(name, arguments)?),
            "data_sharing_tool" => Self::ShareData(args(name, arguments)?),
            "upload_web_sources_to_database" => Self::UploadWebSources(args(name, arguments)?),
            "request_more_sources" => Self::RequestMoreSources(args(name, arguments)?),
            "search_web" => Self::SearchWeb(args(name, arguments)?),
            "getSpecificConsent" => Self::GetSpecificConsent(args(name, arguments)?),
            "getGovernmentConsent" => Self::GetGovernmentConsent(args(name, arguments)?),
            "getUniversalConsents" => Self::GetRoleConsents {
                category: ConsentCategory::Universal,
                args: args(name, arguments)?,
            },
            "getHospitalConsents" => Self::GetRoleConsents {
                category: ConsentCategory::Hospital,
                args: args(name, arguments)?,
            },
            "getResearchLabConsents" => Self::GetRoleConsents {
                category: ConsentCategory::ResearchLab,
                args: args(name, arguments)?,
            },
            "getInsuranceCompanyConsents" => Self::GetRoleConsents {
                category: ConsentCategory::InsuranceCompany,
                args: args(name, arguments)?,
            },
            "validateReceiver" => Self::ValidateReceiver(args(name, arguments)?),
            other => return Err(DecodeError::UnknownTool(other.to_string())),
        };
        Ok(invocation)
    }

    /// Wire name of this invocation
    pub fn name(&self) -> &'static str {
        match self {
            Self::RunRegulationAgent(_) => "run_regulation_agent_tool",
            Self::RunConsentAgent(_) => "run_consent_agent_tool",
            Self::RunDataFiltering(_) => "run_data_filtering_tool",
            Self::ExplainRegulation => "run_regulation_agent_tool_for_explanation",
            Self::ExplainConsent => "run_consent_agent_tool_for_explanation",
            Self::ExplainFiltering => "run_data_filtering_tool_for_explanation",
            Self::RefineFiltering(_) => "run_data_filtering_tool_for_extra_modifications",
            Self::RequestGovernmentConsent(_) => "requestGovernmentConsent",
            Self::RequestPatientConsent(_) => "requestPatientConsent",
            Self::ShareData(_) => "data_sharing_tool",
            Self::UploadWebSources(_) => "upload_web_sources_to_database",
            Self::RequestMoreSources(_) => "request_more_sources",
            Self::SearchWeb(_) => "search_web",
            Self::GetSpecificConsent(_) => "getSpecificConsent",
            Self::GetGovernmentConsent(_) => "getGovernmentConsent",
            Self::GetRoleConsents { category, .. } => match category {
                ConsentCategory::Universal => "getUniversalConsents",
                ConsentCategory::Hospital => "getHospitalConsents",
                ConsentCategory::ResearchLab => "getResearchLabConsents",
                ConsentCategory::InsuranceCompany => "getInsuranceCompanyConsents",
            },
            Self::ValidateReceiver(_) => "validateReceiver",
        }
    }

    /// The agent whose assistant is configured with this tool
    pub fn agent(&self) -> AgentKind {
        match self {
            Self::SearchWeb(_) => AgentKind::Regulation,
            Self::GetSpecificConsent(_)
            | Self::GetGovernmentConsent(_)
            | Self::GetRoleConsents { .. }
            | Self::ValidateReceiver(_) => AgentKind::Consent,
            _ => AgentKind::Orchestrator,
        }
    }

    /// Error for a handler asked to serve a tool it does not own
    pub fn unsupported(&self, agent: AgentKind) -> ToolError {
        ToolError::Unsupported {
            tool: self.name(),
            agent,
        }
    }
}

fn args<T: DeserializeOwned>(name: &str, arguments: &str) -> Result<T, DecodeError> {
    serde_json::from_str(arguments).map_err(|source| DecodeError::InvalidArguments {
        tool: static_name(name),
        source,
    })
}

fn static_name(name: &str) -> &'static str {
    ToolInvocation::NAMES
        .iter()
        .find(|n| **n == name)
        .copied()
        .unwrap_or("unknown")
}

// ─────────────────────────────────────────────────────────────────────────────
// Lenient field decoders for LLM-authored arguments
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum TextOrList {
    Text(String),
    List(Vec<serde_json::Value>),
}

impl TextOrList {
    fn join(self, sep: &str) -> String {
        match self {
            TextOrList::Text(s) => s,
            TextOrList::List(items) => items
                .into_iter()
                .map(|v| match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(sep),
        }
    }
}

fn text_or_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(TextOrList::deserialize(deserializer)?.join(", "))
}

fn lines_or_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(TextOrList::deserialize(deserializer)?.join("\n"))
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Bool(b) => Ok(b),
        serde_json::Value::Null => Ok(false),
        serde_json::Value::Number(n) => Ok(n.as_f64().map(|v| v != 0.0).unwrap_or(false)),
        serde_json::Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "required" | "1" => Ok(true),
            "false" | "no" | "not required" | "0" | "" => Ok(false),
            other => Err(de::Error::custom(format!("expected a boolean, got {:?}", other))),
        },
        other => Err(de::Error::custom(format!("expected a boolean, got {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_every_known_name() {
        for name in ToolInvocation::NAMES {
            match ToolInvocation::decode(name, "{}") {
                Ok(inv) => assert_eq!(inv.name(), name),
                Err(DecodeError::InvalidArguments { tool, .. }) => assert_eq!(tool, name),
                Err(e) => panic!("{} should be known: {}", name, e),
            }
        }
    }

    #[test]
    fn test_unknown_tool() {
        assert!(matches!(
            ToolInvocation::decode("delete_everything", "{}"),
            Err(DecodeError::UnknownTool(name)) if name == "delete_everything"
        ));
    }

    #[test]
    fn test_consent_request_codes_and_labels() {
        let inv = ToolInvocation::decode(
            "requestPatientConsent",
            r#"{"patient":"0xabc","receiver":"0xdef","dataTypes":[2,"Genomic Data"],"purposes":["Research"]}"#,
        )
        .unwrap();
        let ToolInvocation::RequestPatientConsent(args) = inv else {
            panic!("wrong variant");
        };
        assert_eq!(args.data_types, vec![DataType::LabResults, DataType::Genomic]);
        assert_eq!(args.purposes, vec![Purpose::Research]);
    }

    #[test]
    fn test_consent_request_accepts_float_codes() {
        let inv = ToolInvocation::decode(
            "requestGovernmentConsent",
            r#"{"receiver":"0xdef","country":"Germany","dataTypes":[2.0],"purposes":[1.0]}"#,
        )
        .unwrap();
        let ToolInvocation::RequestGovernmentConsent(args) = inv else {
            panic!("wrong variant");
        };
        assert_eq!(args.data_types, vec![DataType::LabResults]);
        assert_eq!(args.purposes, vec![Purpose::Treatment]);

        assert!(matches!(
            ToolInvocation::decode(
                "requestGovernmentConsent",
                r#"{"receiver":"0xdef","country":"Germany","dataTypes":[2.5],"purposes":[1]}"#,
            ),
            Err(DecodeError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn test_filtering_args_are_lenient() {
        let inv = ToolInvocation::decode(
            "run_data_filtering_tool",
            r#"{"allowed_data_types":["Lab & Test Results","Genomic Data"],"anonymization_required":"yes"}"#,
        )
        .unwrap();
        assert_eq!(
            inv,
            ToolInvocation::RunDataFiltering(FilteringArgs {
                allowed_data_types: "Lab & Test Results, Genomic Data".to_string(),
                anonymization_required: true,
            })
        );
    }

    #[test]
    fn test_explanation_tools_ignore_arguments() {
        assert_eq!(
            ToolInvocation::decode("run_consent_agent_tool_for_explanation", "").unwrap(),
            ToolInvocation::ExplainConsent
        );
    }

    #[test]
    fn test_serving_agent() {
        let search = ToolInvocation::decode("search_web", r#"{"user_query":"GDPR"}"#).unwrap();
        assert_eq!(search.agent(), AgentKind::Regulation);
        let role = ToolInvocation::decode("getHospitalConsents", r#"{"patient":"0x1"}"#).unwrap();
        assert_eq!(role.agent(), AgentKind::Consent);
        assert_eq!(role.name(), "getHospitalConsents");
    }
}
