//! Local consent evaluation
//!
//! Applies the same rules the consent assistant is instructed to follow,
//! over a snapshot of ledger rows, so a verdict can be computed (and
//! tested) without a hosted model.
//!
//! ```text
//!   specific ──┐
//!   role     ──┼── patient types ──┐
//!   universal──┘                   ├── ∩ ── allowed types ── verdict
//!   government (when required) ────┘
//! ```

use std::collections::BTreeSet;

use alloy::primitives::Address;
use serde::Serialize;
use tracing::debug;

use super::{
    ConsentCategory, GovernmentConsentRow, Ledger, LedgerError, RoleConsentRow,
    SpecificConsentRow,
};
use crate::vocab::{ConsentRequirement, DataType, Purpose, ReceiverRole};

/// What is being asked for
#[derive(Debug, Clone)]
pub struct ConsentRequest {
    pub patient: Address,
    pub receiver: Address,
    pub receiver_role: ReceiverRole,
    pub receiver_country: String,
    /// Country whose government must approve, when approval is required
    pub sender_country: String,
    pub purpose: Purpose,
    pub requirement: ConsentRequirement,
    pub government_required: bool,
}

/// Ledger rows relevant to one request
#[derive(Debug, Clone, Default)]
pub struct ConsentSnapshot {
    pub specific: Vec<SpecificConsentRow>,
    /// Consents for the receiver's role (hospital, research lab, ...)
    pub role: Vec<RoleConsentRow>,
    pub universal: Vec<RoleConsentRow>,
    pub government: Vec<GovernmentConsentRow>,
}

impl ConsentSnapshot {
    /// Read every list the evaluator may need for `request`
    pub async fn fetch(ledger: &dyn Ledger, request: &ConsentRequest) -> Result<Self, LedgerError> {
        let specific = ledger
            .specific_consents(request.patient, request.receiver)
            .await?;
        let role = ledger
            .role_consents(request.patient, ConsentCategory::for_role(request.receiver_role))
            .await?;
        let universal = ledger
            .role_consents(request.patient, ConsentCategory::Universal)
            .await?;

        let government = if request.government_required {
            match ledger.government_address(&request.sender_country).await {
                Ok(gov) => ledger.government_consents(gov, request.receiver).await?,
                Err(LedgerError::UnknownGovernment(country)) => {
                    debug!(%country, "No government registered; treating as no approval");
                    Vec::new()
                }
                Err(e) => return Err(e),
            }
        } else {
            Vec::new()
        };

        Ok(Self {
            specific,
            role,
            universal,
            government,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsentVerdict {
    pub valid: bool,
    pub allowed_data_types: Vec<DataType>,
}

impl ConsentVerdict {
    fn invalid() -> Self {
        Self {
            valid: false,
            allowed_data_types: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConsentEvaluator;

impl ConsentEvaluator {
    /// Evaluate `request` against `snapshot` at unix time `now`
    pub fn evaluate(
        &self,
        request: &ConsentRequest,
        snapshot: &ConsentSnapshot,
        now: u64,
    ) -> ConsentVerdict {
        let patient_types: BTreeSet<DataType> = match request.requirement {
            ConsentRequirement::None => DataType::CONCRETE.into_iter().collect(),
            requirement => {
                let mut types = BTreeSet::new();
                for row in snapshot
                    .specific
                    .iter()
                    .filter(|r| specific_matches(r, request, now))
                {
                    types.extend(expand_codes(&row.data_types));
                }
                if requirement == ConsentRequirement::Broad {
                    for row in snapshot
                        .role
                        .iter()
                        .chain(snapshot.universal.iter())
                        .filter(|r| role_matches(r, request, now))
                    {
                        types.extend(expand_codes(&row.data_types));
                    }
                }
                types
            }
        };

        let allowed: BTreeSet<DataType> = if request.government_required {
            let government_types: BTreeSet<DataType> = snapshot
                .government
                .iter()
                .filter(|r| government_matches(r, request))
                .flat_map(|r| expand_codes(&r.data_types))
                .collect();
            patient_types.intersection(&government_types).copied().collect()
        } else {
            patient_types
        };

        if allowed.is_empty() {
            return ConsentVerdict::invalid();
        }

        let allowed_data_types = if DataType::CONCRETE.iter().all(|d| allowed.contains(d)) {
            vec![DataType::All]
        } else {
            allowed.into_iter().collect()
        };
        ConsentVerdict {
            valid: true,
            allowed_data_types,
        }
    }
}

fn expand_codes(codes: &[u8]) -> Vec<DataType> {
    codes
        .iter()
        .filter_map(|&c| DataType::from_code(c))
        .flat_map(DataType::expand)
        .collect()
}

fn covers_purpose(codes: &[u8], requested: Purpose) -> bool {
    codes
        .iter()
        .filter_map(|&c| Purpose::from_code(c))
        .any(|p| p.covers(requested))
}

fn unexpired(duration: u64, now: u64) -> bool {
    duration == 0 || duration > now
}

fn specific_matches(row: &SpecificConsentRow, request: &ConsentRequest, now: u64) -> bool {
    row.active
        && row.receiver == request.receiver
        && covers_purpose(&row.purposes, request.purpose)
        && unexpired(row.duration, now)
}

fn role_matches(row: &RoleConsentRow, request: &ConsentRequest, now: u64) -> bool {
    let country = request.receiver_country.trim();
    row.active
        && row
            .receiver_locations
            .iter()
            .any(|loc| loc.trim().eq_ignore_ascii_case(country))
        && covers_purpose(&row.purposes, request.purpose)
        && unexpired(row.duration, now)
}

fn government_matches(row: &GovernmentConsentRow, request: &ConsentRequest) -> bool {
    row.active && row.receiver == request.receiver && covers_purpose(&row.purposes, request.purpose)
}
