//! Integration tests for consent lookups and local consent evaluation
//!
//! Everything runs against an in-memory ledger.

mod common;

use serde_json::json;

use common::{government_consent, hospital_consent, FakeLedger, GERMANY, PATIENT, RECEIVER};
use medshare::agent::consent::ConsentTools;
use medshare::agent::{ToolHandler, ToolInvocation};
use medshare::ledger::lookup::{self, LookupOutput, NO_GOVERNMENT_CONSENT};
use medshare::ledger::policy::{ConsentEvaluator, ConsentRequest, ConsentSnapshot, ConsentVerdict};
use medshare::ledger::ConsentCategory;
use medshare::progress::RecordingSink;
use medshare::vocab::{ConsentRequirement, DataType, Purpose, ReceiverRole};

const NOW: u64 = 1_760_000_000;

fn hospital_request(government_required: bool) -> ConsentRequest {
    ConsentRequest {
        patient: PATIENT,
        receiver: RECEIVER,
        receiver_role: ReceiverRole::Hospital,
        receiver_country: "US".to_string(),
        sender_country: "Germany".to_string(),
        purpose: Purpose::Treatment,
        requirement: ConsentRequirement::Broad,
        government_required,
    }
}

fn ledger_with_hospital_consent() -> FakeLedger {
    FakeLedger {
        roles: vec![(ConsentCategory::Hospital, vec![hospital_consent(&[2, 3], &[1], "US")])],
        governments: vec![("Germany".to_string(), GERMANY)],
        government_rows: vec![government_consent(&[2], &[1])],
        ..FakeLedger::default()
    }
}

async fn verdict(ledger: &FakeLedger, request: &ConsentRequest) -> ConsentVerdict {
    let snapshot = ConsentSnapshot::fetch(ledger, request).await.unwrap();
    ConsentEvaluator.evaluate(request, &snapshot, NOW)
}

/// Test that a matching hospital consent allows its data types
#[tokio::test]
async fn test_hospital_consent_without_government() {
    let ledger = ledger_with_hospital_consent();
    let verdict = verdict(&ledger, &hospital_request(false)).await;
    assert_eq!(
        verdict,
        ConsentVerdict {
            valid: true,
            allowed_data_types: vec![DataType::LabResults, DataType::Genomic],
        }
    );
}

/// Test that government approval narrows the patient's types to the intersection
#[tokio::test]
async fn test_government_approval_intersects() {
    let ledger = ledger_with_hospital_consent();
    let verdict = verdict(&ledger, &hospital_request(true)).await;
    assert_eq!(
        verdict,
        ConsentVerdict {
            valid: true,
            allowed_data_types: vec![DataType::LabResults],
        }
    );
}

/// Test that a required but unregistered government means no approval
#[tokio::test]
async fn test_unknown_government_denies() {
    let mut ledger = ledger_with_hospital_consent();
    ledger.governments.clear();
    let verdict = verdict(&ledger, &hospital_request(true)).await;
    assert!(!verdict.valid);
    assert!(verdict.allowed_data_types.is_empty());
}

/// Test that universal consents count for any receiver role
#[tokio::test]
async fn test_universal_consent_covers_research_lab() {
    let ledger = FakeLedger {
        roles: vec![(ConsentCategory::Universal, vec![hospital_consent(&[4], &[6], "US")])],
        ..FakeLedger::default()
    };
    let mut request = hospital_request(false);
    request.receiver_role = ReceiverRole::ResearchLab;
    request.purpose = Purpose::Research;

    let verdict = verdict(&ledger, &request).await;
    assert_eq!(verdict.allowed_data_types, vec![DataType::MentalHealth]);
}

/// Test that lookups answer with a sentinel when the ledger has nothing
#[tokio::test]
async fn test_lookups_without_rows_return_sentinels() {
    let ledger = FakeLedger::default();

    let out = lookup::role_consents(&ledger, PATIENT, ConsentCategory::InsuranceCompany)
        .await
        .unwrap();
    assert_eq!(
        LookupOutput::parse(&out).unwrap(),
        LookupOutput::NoData("No insurance company consents available for this patient".to_string())
    );

    let out = lookup::government_consent(&ledger, "Atlantis", RECEIVER)
        .await
        .unwrap();
    assert_eq!(
        LookupOutput::parse(&out).unwrap(),
        LookupOutput::NoData(NO_GOVERNMENT_CONSENT.to_string())
    );
}

/// Test that government lookups resolve the country before reading rows
#[tokio::test]
async fn test_government_lookup_renders_rows() {
    let ledger = ledger_with_hospital_consent();
    let out = lookup::government_consent(&ledger, "Germany", RECEIVER)
        .await
        .unwrap();
    let LookupOutput::Rows(rows) = LookupOutput::parse(&out).unwrap() else {
        panic!("expected rows, got {}", out);
    };
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["Data Types"], json!(["Lab & Test Results"]));
    assert_eq!(rows[0]["Purposes"], json!(["Treatment"]));
    assert_eq!(rows[0]["ConsentID"], json!(7));
}

/// Test every receiver validation outcome
#[tokio::test]
async fn test_validate_receiver() {
    let ledger = FakeLedger {
        users: vec![(RECEIVER, "hospital".to_string())],
        ..FakeLedger::default()
    };

    assert_eq!(
        lookup::validate_receiver(&ledger, RECEIVER, "hospital").await.unwrap(),
        "Receiver validated successfully"
    );
    assert_eq!(
        lookup::validate_receiver(&ledger, RECEIVER, "research lab").await.unwrap(),
        "Receiver is invalid because you are assuming the receiver is a research lab, but it is actually a hospital"
    );
    assert_eq!(
        lookup::validate_receiver(&ledger, PATIENT, "hospital").await.unwrap(),
        "Receiver is invalid because it is not registered"
    );
}

/// Test the consent assistant's tools end to end through decoding
#[tokio::test]
async fn test_consent_tools_serve_lookups() {
    let ledger = ledger_with_hospital_consent();
    let progress = RecordingSink::new();
    let tools = ConsentTools {
        ledger: &ledger,
        progress: &progress,
    };

    let call = ToolInvocation::decode(
        "getHospitalConsents",
        &format!(r#"{{"patient": "{:#x}"}}"#, PATIENT),
    )
    .unwrap();
    let out = tools.handle(call).await.unwrap();
    let LookupOutput::Rows(rows) = LookupOutput::parse(&out).unwrap() else {
        panic!("expected rows, got {}", out);
    };
    assert_eq!(rows[0]["Data Types"], json!(["Lab & Test Results", "Genomic Data"]));
    assert_eq!(rows[0]["Receiver Locations"], json!(["US"]));

    let call = ToolInvocation::decode(
        "getSpecificConsent",
        &format!(r#"{{"patient": "{:#x}", "receiver": "{:#x}"}}"#, PATIENT, RECEIVER),
    )
    .unwrap();
    let out = tools.handle(call).await.unwrap();
    assert!(LookupOutput::parse(&out).unwrap().is_empty());

    assert_eq!(
        progress.messages(),
        vec!["🔍 Searching for valid patient consent..."]
    );
}

/// Test that a malformed address fails the tool call
#[tokio::test]
async fn test_consent_tools_reject_bad_address() {
    let ledger = FakeLedger::default();
    let progress = RecordingSink::new();
    let tools = ConsentTools {
        ledger: &ledger,
        progress: &progress,
    };
    let call = ToolInvocation::decode(
        "validateReceiver",
        r#"{"address": "0xnot-an-address", "role": "hospital"}"#,
    )
    .unwrap();
    assert!(tools.handle(call).await.is_err());
}
