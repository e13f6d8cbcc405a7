//! Consent lookups as the consent assistant sees them
//!
//! Each lookup reads the ledger and reshapes rows into JSON objects keyed
//! by human field names, with codes rendered through the shared
//! vocabulary. When nothing matches, the output is a JSON-encoded
//! sentinel sentence instead of an empty list, so an assistant reading
//! the tool output can tell "no consent" apart from a malformed reply.

use alloy::primitives::Address;
use serde_json::{json, Map, Value};

use super::{
    ConsentCategory, GovernmentConsentRow, Ledger, LedgerError, RoleConsentRow,
    SpecificConsentRow,
};
use crate::vocab::{DataType, Purpose};

pub const NO_SPECIFIC_CONSENT: &str = "No specific consent available for the specific receiver";
pub const NO_GOVERNMENT_CONSENT: &str =
    "No government consent available for the specific receiver";

/// Sentinel for an empty role-consent list
pub fn no_role_consents(category: ConsentCategory) -> String {
    format!("No {} consents available for this patient", category.label())
}

/// Parsed form of a lookup tool output
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutput {
    /// The sentinel sentence: the ledger had nothing for this query
    NoData(String),
    Rows(Vec<Map<String, Value>>),
}

impl LookupOutput {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        match serde_json::from_str::<Value>(text)? {
            Value::String(s) => Ok(LookupOutput::NoData(s)),
            other => {
                let rows: Vec<Map<String, Value>> = serde_json::from_value(other)?;
                Ok(LookupOutput::Rows(rows))
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            LookupOutput::NoData(_) => true,
            LookupOutput::Rows(rows) => rows.is_empty(),
        }
    }
}

fn describe_types(codes: &[u8]) -> Vec<String> {
    codes.iter().map(|&c| DataType::describe_code(c)).collect()
}

fn describe_purposes(codes: &[u8]) -> Vec<String> {
    codes.iter().map(|&c| Purpose::describe_code(c)).collect()
}

fn sentinel(text: &str) -> String {
    Value::String(text.to_string()).to_string()
}

/// A single zeroed, inactive row is how the contract says "nothing here"
fn is_placeholder(receiver: Address, active: bool) -> bool {
    receiver == Address::ZERO && !active
}

pub fn format_specific(rows: &[SpecificConsentRow]) -> String {
    if rows.is_empty() || (rows.len() == 1 && is_placeholder(rows[0].receiver, rows[0].active)) {
        return sentinel(NO_SPECIFIC_CONSENT);
    }
    let list: Vec<Value> = rows
        .iter()
        .map(|r| {
            json!({
                "Receiver Address": r.receiver.to_checksum(None),
                "Data Types": describe_types(&r.data_types),
                "Purposes": describe_purposes(&r.purposes),
                "Anonymity": r.anonymity,
                "Duration": r.duration,
                "Active": r.active,
                "ConsentID": r.consent_id,
            })
        })
        .collect();
    Value::Array(list).to_string()
}

pub fn format_government(rows: &[GovernmentConsentRow]) -> String {
    if rows.is_empty() || (rows.len() == 1 && is_placeholder(rows[0].receiver, rows[0].active)) {
        return sentinel(NO_GOVERNMENT_CONSENT);
    }
    let list: Vec<Value> = rows
        .iter()
        .map(|r| {
            json!({
                "Data Types": describe_types(&r.data_types),
                "Purposes": describe_purposes(&r.purposes),
                "Receiver Address": r.receiver.to_checksum(None),
                "Active": r.active,
                "ConsentID": r.consent_id,
            })
        })
        .collect();
    Value::Array(list).to_string()
}

pub fn format_role(category: ConsentCategory, rows: &[RoleConsentRow]) -> String {
    if rows.is_empty() {
        return sentinel(&no_role_consents(category));
    }
    let list: Vec<Value> = rows
        .iter()
        .map(|r| {
            json!({
                "Data Types": describe_types(&r.data_types),
                "Purposes": describe_purposes(&r.purposes),
                "Receiver Locations": r.receiver_locations,
                "Anonymity": r.anonymity,
                "Duration": r.duration,
                "Active": r.active,
                "ConsentID": r.consent_id,
            })
        })
        .collect();
    Value::Array(list).to_string()
}

pub async fn specific_consent(
    ledger: &dyn Ledger,
    patient: Address,
    receiver: Address,
) -> Result<String, LedgerError> {
    let rows = ledger.specific_consents(patient, receiver).await?;
    Ok(format_specific(&rows))
}

/// Resolve the country's government, then read its consents for `receiver`
pub async fn government_consent(
    ledger: &dyn Ledger,
    country: &str,
    receiver: Address,
) -> Result<String, LedgerError> {
    let government = match ledger.government_address(country).await {
        Ok(address) => address,
        Err(LedgerError::UnknownGovernment(_)) => return Ok(sentinel(NO_GOVERNMENT_CONSENT)),
        Err(e) => return Err(e),
    };
    let rows = ledger.government_consents(government, receiver).await?;
    Ok(format_government(&rows))
}

pub async fn role_consents(
    ledger: &dyn Ledger,
    patient: Address,
    category: ConsentCategory,
) -> Result<String, LedgerError> {
    let rows = ledger.role_consents(patient, category).await?;
    Ok(format_role(category, &rows))
}

/// Check that `address` is registered and holds `role`
///
/// The role is compared verbatim against the registry; no case folding.
pub async fn validate_receiver(
    ledger: &dyn Ledger,
    address: Address,
    role: &str,
) -> Result<String, LedgerError> {
    if !ledger.is_registered(address).await? {
        return Ok("Receiver is invalid because it is not registered".to_string());
    }
    let actual = ledger.user_role(address).await?;
    if actual == role {
        Ok("Receiver validated successfully".to_string())
    } else {
        Ok(format!(
            "Receiver is invalid because you are assuming the receiver is a {}, but it is actually a {}",
            role, actual
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hospital_row() -> RoleConsentRow {
        RoleConsentRow {
            data_types: vec![2, 3],
            purposes: vec![1],
            receiver_locations: vec!["US".to_string()],
            anonymity: false,
            duration: 0,
            active: true,
            consent_id: 4,
        }
    }

    #[test]
    fn test_sentinel_and_empty_list_are_distinguishable() {
        let sentinel = LookupOutput::parse(&format_role(ConsentCategory::Hospital, &[])).unwrap();
        let empty = LookupOutput::parse("[]").unwrap();
        assert_ne!(sentinel, empty);
        assert_eq!(
            sentinel,
            LookupOutput::NoData("No hospital consents available for this patient".to_string())
        );
        assert_eq!(empty, LookupOutput::Rows(vec![]));
    }

    #[test]
    fn test_role_rows_render_labels() {
        let out = format_role(ConsentCategory::Hospital, &[hospital_row()]);
        let LookupOutput::Rows(rows) = LookupOutput::parse(&out).unwrap() else {
            panic!("expected rows");
        };
        assert_eq!(rows[0]["Data Types"], json!(["Lab & Test Results", "Genomic Data"]));
        assert_eq!(rows[0]["Purposes"], json!(["Treatment"]));
        assert_eq!(rows[0]["Receiver Locations"], json!(["US"]));
        assert_eq!(rows[0]["ConsentID"], json!(4));
    }

    #[test]
    fn test_single_placeholder_row_is_sentinel() {
        let placeholder = SpecificConsentRow {
            receiver: Address::ZERO,
            data_types: vec![],
            purposes: vec![],
            anonymity: false,
            duration: 0,
            active: false,
            consent_id: 0,
        };
        assert_eq!(
            LookupOutput::parse(&format_specific(&[placeholder])).unwrap(),
            LookupOutput::NoData(NO_SPECIFIC_CONSENT.to_string())
        );
    }

    #[test]
    fn test_unknown_codes_are_described() {
        let mut row = hospital_row();
        row.data_types = vec![9];
        let out = format_role(ConsentCategory::Universal, &[row]);
        assert!(out.contains("Unknown(9)"));
    }
}
