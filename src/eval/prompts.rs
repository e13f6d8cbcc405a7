//! Evaluation suites: system prompts, input columns and answer extraction

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde_json::{json, Value};

use crate::vocab::{data_type_list, purpose_list};

use super::parse::{as_text, extract_json, parse_consent, parse_system_level};

/// One CSV row, keyed by header
pub type Row = HashMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suite {
    /// Consent verdicts for a request plus a list of consents
    Consent,
    /// Orchestrator field extraction from a user request
    Extraction,
    /// Four regulation questions for a sender/receiver pair
    Regulation,
    /// Filtered patient file
    Filtering,
    /// Full orchestrator plan: route, tool calls and user questions
    SystemLevel,
}

impl Suite {
    pub fn as_str(self) -> &'static str {
        match self {
            Suite::Consent => "consent",
            Suite::Extraction => "extraction",
            Suite::Regulation => "regulation",
            Suite::Filtering => "filtering",
            Suite::SystemLevel => "system-level",
        }
    }

    /// Columns every input row must carry
    pub fn required_columns(self) -> &'static [&'static str] {
        match self {
            Suite::Consent | Suite::Extraction | Suite::SystemLevel => &["case"],
            Suite::Regulation => &["Sender", "Receiver"],
            Suite::Filtering => &["Case", "File", "Allowed Data Types", "Anonymization Required"],
        }
    }

    /// Column holding the row id, when the suite has one
    pub fn id_column(self) -> &'static str {
        match self {
            Suite::Filtering => "Case",
            _ => "id",
        }
    }

    pub fn system_prompt(self) -> String {
        match self {
            Suite::Consent => consent_prompt(),
            Suite::Extraction => EXTRACTION_PROMPT.to_string(),
            Suite::Regulation => REGULATION_PROMPT.to_string(),
            Suite::Filtering => filtering_prompt(),
            Suite::SystemLevel => SYSTEM_LEVEL_PROMPT.to_string(),
        }
    }

    /// Reply budget for providers that require one
    pub fn max_tokens(self) -> u32 {
        match self {
            Suite::SystemLevel => 2048,
            _ => 1024,
        }
    }

    /// Result columns written after `extracted`
    pub fn extra_columns(self) -> &'static [&'static str] {
        match self {
            Suite::SystemLevel => &["route", "calls", "questions"],
            _ => &[],
        }
    }

    /// Values for [`extra_columns`](Self::extra_columns), one entry per
    /// line; blank when nothing was extracted
    pub fn extra_values(self, extracted: &str) -> Vec<String> {
        match self {
            Suite::SystemLevel => match parse_system_level(extracted) {
                Some(plan) => vec![
                    plan.route.join("\n"),
                    plan.calls.iter().map(as_text).collect::<Vec<_>>().join("\n"),
                    plan.questions.join("\n"),
                ],
                None => vec![String::new(); 3],
            },
            _ => Vec::new(),
        }
    }

    /// User message for one row
    pub fn user_prompt(self, row: &Row) -> String {
        let col = |name: &str| row.get(name).map(|v| v.trim()).unwrap_or_default();
        match self {
            Suite::Consent | Suite::Extraction | Suite::SystemLevel => col("case").to_string(),
            Suite::Regulation => format!(
                "Sender Country: {}\nReceiver Country: {}\n\nAnswer in JSON:",
                col("Sender"),
                col("Receiver")
            ),
            Suite::Filtering => format!(
                "Patient File:\n{}\n\nAllowed Data Types: {}\nAnonymization Required: {}",
                col("File"),
                col("Allowed Data Types"),
                truthy(col("Anonymization Required"))
            ),
        }
    }

    /// Normalized answer pulled from a raw reply, or `None` when the
    /// reply holds no usable answer
    pub fn extract(self, raw: &str) -> Option<String> {
        match self {
            Suite::Consent => parse_consent(raw).map(|answer| {
                json!({
                    "valid": answer.valid,
                    "allowed_data_types": answer.allowed_data_types,
                })
                .to_string()
            }),
            Suite::Extraction | Suite::Regulation => extract_json(raw).map(|v| v.to_string()),
            Suite::SystemLevel => parse_system_level(raw).map(|plan| {
                json!({
                    "route": plan.route,
                    "calls": plan.calls,
                    "questions": plan.questions,
                })
                .to_string()
            }),
            Suite::Filtering => {
                let text = raw.trim();
                (!text.is_empty()).then(|| text.to_string())
            }
        }
    }
}

impl fmt::Display for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Suite {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "consent" => Ok(Suite::Consent),
            "extraction" => Ok(Suite::Extraction),
            "regulation" => Ok(Suite::Regulation),
            "filtering" => Ok(Suite::Filtering),
            "system-level" | "system_level" | "systemlevel" => Ok(Suite::SystemLevel),
            other => Err(format!(
                "unknown suite {:?} (expected consent, extraction, regulation, filtering or system-level)",
                other
            )),
        }
    }
}

fn truthy(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "true" | "yes" | "1" | "required"
    )
}

fn consent_prompt() -> String {
    format!(
        "You are a healthcare consent validation assistant.\n\
         You will be given a data sharing request and a list of available consents.\n\
         Decide whether valid consent exists that satisfies the regulatory requirements for the request.\n\n\
         Check every consent:\n\
         1. Specific consent: receiver Ethereum address and requested purpose match, and the consent is active.\n\
         2. Hospital / research lab / insurance company consents (chosen by receiver role): receiver country and purpose match, and the consent is active.\n\
         3. Universal consent: valid for any receiver role; receiver country and purpose match, and the consent is active.\n\
         4. Government consent: only when the regulation requires it; an active government consent for the purpose must exist.\n\n\
         Sharing is valid if at least one matching patient consent of the required kind exists, plus government consent when required.\n\
         Merge the allowed data types of every valid consent. When government consent is required, \
         the final types are the intersection of the patient-approved and government-approved types.\n\n\
         Respond only with this JSON and no explanation:\n\
         {{\"valid\": true or false, \"allowed_data_types\": [\"...\"]}}\n\n\
         Data types: {}\nPurposes: {}\n",
        data_type_list(),
        purpose_list()
    )
}

fn filtering_prompt() -> String {
    format!(
        "You are a Data Filtering Agent preparing free-text patient records for compliant cross-border sharing.\n\n\
         You will receive a patient file, the allowed data types and whether anonymization is required.\n\
         Keep only information belonging to the allowed data types and remove everything else without summarizing it.\n\
         When a paragraph mixes types, keep only the allowed portions.\n\
         If anonymization is required, replace names, dates of birth, addresses, phone numbers, \
         email addresses and record identifiers with generic placeholders.\n\n\
         Data types: {}\n\n\
         Return only the filtered patient file.",
        data_type_list()
    )
}

const EXTRACTION_PROMPT: &str = r#"You are the Orchestrator Agent in a healthcare data-sharing system.
Read the user's request and extract these fields:

1- receiver_type: one of hospital, research lab, insurance company
2- receiver_country
3- sender_country
4- receiver_eth_address
5- patient_eth_address
6- purpose: one of treatment, research, insurance claim, clinical trial, commercial use

Rules:
- Extract only what is stated. Return "missing" for fields that are not mentioned.
- Do not guess or infer.
- Copy Ethereum addresses exactly, preserving case.

Respond only with:
{
  "receiver_type": "...",
  "receiver_country": "...",
  "sender_country": "...",
  "receiver_eth_address": "...",
  "patient_eth_address": "...",
  "purpose": "..."
}"#;

const REGULATION_PROMPT: &str = r#"You are a Healthcare Data Regulation Assistant. Decide how healthcare data may be shared from the sender country to the receiver country.

Answer four questions:
1. Is anonymization required? "Yes" if either country requires it for cross-border sharing, otherwise "No".
2. What type of patient consent is required? The most restrictive of None, Broad, Specific or Explicit across both countries.
3. Is government or authority approval required? "Yes" if either country requires approval from a government, health authority, data protection authority or regulator, otherwise "No".
4. Which data types and purposes are allowed by both countries? Leave out anything restricted by either.

Respond only with:
{
  "anonymization_required": "Yes" or "No",
  "patient_consent_required": "...",
  "government_approval_required": "Yes" or "No",
  "allowed_data_and_purposes": ["..."]
}"#;

const SYSTEM_LEVEL_PROMPT: &str = r#"You are the Orchestrator Agent.
Your role is to control the execution of the healthcare data-sharing workflow by:
1- Understanding the user's request
2- Deciding the correct sequence of steps (route)
3- Choosing the correct tools to call and passing the right parameters
4- Involving the human user when necessary
5- Ensuring compliance with regulations and consent requirements

Available Tools
- run_regulation_agent(sender_country, receiver_country, receiver_role, purpose)
  Retrieves regulatory sharing requirements (consent type, allowed data types, anonymization requirement).

- run_consent_agent(patient_address, receiver_address, receiver_role, receiver_country, sender_country, purpose, consent_requirement)
  Validates patient/government consent and verifies the receiver.

- run_filtering_agent(allowed_data_types, anonymization_required)
  Filters unallowed data types and anonymizes if needed.

- request_patient_consent(patient, receiver, data_types, purpose)
  Requests consent from the patient or government authority.

- share_data(receiver_address)
  Encrypts and shares the data on the blockchain.

- web_search_for_regulations(sender_country, receiver_country)
  Searches the web for regulations when not found in the vector store.

Core Workflow Steps

1- Input Processing & Understanding:
1.1. Extract all relevant details:
- Sender country
- Receiver country
- Receiver role (hospital, research lab, insurance company)
- Purpose of sharing (treatment, research, insurance claim, clinical trial, commercial use)
- Patient Ethereum address
- Receiver Ethereum address
1.2. Identify any missing parameters for required tool calls.

2- Regulation Retrieval:
- Always call run_regulation_agent(...) first.
- If regulations are missing from the vector store, call web_search_for_regulations(...) and ask the user to approve the sources, then re-run run_regulation_agent(...).
- If regulations prohibit sharing, stop the process.

3- Consent Validation:
- If regulations require consent, call run_consent_agent(...).
- If consent is missing or invalid, ask the user whether to call request_patient_consent(...).
- If the user declines, stop the process.

4- Data Filtering:
- If regulations allow all data types and anonymization is not required, skip filtering.
- Otherwise call run_filtering_agent(...) with the allowed data types and anonymization requirement.
- After filtering/anonymization, ask the user to approve the final file. If rejected, stop the process.

5- Data Sharing:
- If all previous steps succeed, call share_data(receiver_address) to send the file.

Human-in-the-Loop Triggers:
Ask the user for input or approval in these situations:
- Missing any required parameter for a tool call
- Approval of web search sources for regulations
- Decision to request consent when it's missing or invalid
- Approval of the final filtered/anonymized file

Output for Evaluation
For each scenario, output:
1- Route: ordered list of steps taken
2- Calls: list of function calls with parameters (use "<ASK_USER>" for missing ones)
3- Questions: list of questions to ask the user before proceeding

Output Format
For each scenario, return a JSON object:
{
  "route": [],
  "calls": [],
  "questions": []
}"#;

/// Parsed extraction answer as a map, for callers that compare fields
pub fn extraction_fields(extracted: &str) -> Option<HashMap<String, String>> {
    let value: Value = serde_json::from_str(extracted).ok()?;
    let object = value.as_object()?;
    Some(
        object
            .iter()
            .map(|(k, v)| {
                let v = v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string());
                (k.clone(), v)
            })
            .collect(),
    )
}
