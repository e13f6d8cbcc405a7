//! Best-effort JSON extraction from model free text
//!
//! Models wrap JSON in ```json fences, prepend chatter, or emit
//! something that isn't JSON at all. Nothing here re-prompts: text
//! with no parseable object yields `None`.

use serde_json::Value;

/// Remove a surrounding ```json (or bare ```) fence
pub fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// First JSON object found in `text`
///
/// Tries the whole (unfenced) text first, then scans for balanced
/// `{...}` spans and returns the first that parses.
pub fn extract_json(text: &str) -> Option<Value> {
    let content = strip_fence(text);
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(content) {
        return Some(value);
    }

    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in content.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        if let Ok(value @ Value::Object(_)) = serde_json::from_str(&content[s..=i]) {
                            return Some(value);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    None
}

/// `{"valid": .., "allowed_data_types": [..]}` verdict from a consent reply
#[derive(Debug, Clone, PartialEq)]
pub struct ConsentAnswer {
    pub valid: Option<bool>,
    pub allowed_data_types: Vec<String>,
}

pub fn parse_consent(text: &str) -> Option<ConsentAnswer> {
    let value = extract_json(text)?;
    let valid = value.get("valid").and_then(Value::as_bool);
    let allowed_data_types = value
        .get("allowed_data_types")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    Some(ConsentAnswer {
        valid,
        allowed_data_types,
    })
}

/// Route, tool calls and user questions from a system-level reply
#[derive(Debug, Clone, PartialEq)]
pub struct SystemLevelAnswer {
    pub route: Vec<String>,
    /// Calls as the model wrote them, strings or `{name, parameters}` objects
    pub calls: Vec<Value>,
    pub questions: Vec<String>,
}

pub fn parse_system_level(text: &str) -> Option<SystemLevelAnswer> {
    let value = extract_json(text)?;
    if ["route", "calls", "questions"]
        .iter()
        .all(|key| value.get(key).is_none())
    {
        return None;
    }
    let list = |key: &str| -> Vec<Value> {
        value
            .get(key)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    };
    Some(SystemLevelAnswer {
        route: list("route").iter().map(as_text).collect(),
        calls: list("calls"),
        questions: list("questions").iter().map(as_text).collect(),
    })
}

/// String values unquoted, anything else as compact JSON
pub fn as_text(value: &Value) -> String {
    value
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fenced_json() {
        let text = "```json\n{\"valid\": true, \"allowed_data_types\": [\"Genomic Data\"]}\n```";
        let answer = parse_consent(text).unwrap();
        assert_eq!(answer.valid, Some(true));
        assert_eq!(answer.allowed_data_types, vec!["Genomic Data"]);
    }

    #[test]
    fn test_json_after_chatter() {
        let text = r#"Sure! Here is the result: {"receiver_type": "hospital", "note": "uses {braces}"} Hope it helps."#;
        let value = extract_json(text).unwrap();
        assert_eq!(value["receiver_type"], "hospital");
        assert_eq!(value["note"], "uses {braces}");
    }

    #[test]
    fn test_not_json() {
        assert!(extract_json("I cannot determine this.").is_none());
        assert!(extract_json("{not: valid}").is_none());
        assert!(extract_json("[1, 2, 3]").is_none());
        assert!(parse_consent("").is_none());
    }

    #[test]
    fn test_system_level_plan() {
        let text = r#"```json
{
  "route": ["Regulation Retrieval", "Consent Validation", "Data Sharing"],
  "calls": [
    {"name": "run_regulation_agent", "parameters": {"sender_country": "Germany", "receiver_country": "US"}},
    "share_data(receiver_address=<ASK_USER>)"
  ],
  "questions": ["What is the receiver's Ethereum address?"]
}
```"#;
        let plan = parse_system_level(text).unwrap();
        assert_eq!(
            plan.route,
            vec!["Regulation Retrieval", "Consent Validation", "Data Sharing"]
        );
        assert_eq!(plan.calls.len(), 2);
        assert_eq!(plan.calls[0]["parameters"]["receiver_country"], "US");
        assert_eq!(as_text(&plan.calls[1]), "share_data(receiver_address=<ASK_USER>)");
        assert_eq!(plan.questions, vec!["What is the receiver's Ethereum address?"]);
    }

    #[test]
    fn test_system_level_needs_plan_keys() {
        assert!(parse_system_level(r#"{"valid": true}"#).is_none());
        let plan = parse_system_level(r#"{"route": ["Regulation Retrieval"]}"#).unwrap();
        assert!(plan.calls.is_empty());
        assert!(plan.questions.is_empty());
        assert_eq!(as_text(&json!({"a": 1})), r#"{"a":1}"#);
    }

    #[test]
    fn test_invalid_verdict_without_types() {
        let answer = parse_consent(r#"{"valid": false}"#).unwrap();
        assert_eq!(answer.valid, Some(false));
        assert!(answer.allowed_data_types.is_empty());
    }
}
