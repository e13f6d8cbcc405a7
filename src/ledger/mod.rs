//! Consent and data-sharing ledger
//!
//! [`Ledger`] is the typed read/write surface over the two on-chain
//! registries (consents, and users/public keys/shared data). Rows use
//! the raw ledger codes for data types and purposes; `lookup` reshapes
//! them for the consent assistant and `policy` evaluates them locally.

pub mod eth;
pub mod lookup;
pub mod policy;

use std::time::Duration;

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::metrics::LEDGER_TRANSACTIONS;
use crate::vocab::ReceiverRole;

pub use eth::EthLedger;

/// Transaction hash
pub type TxHash = B256;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid address {0:?}")]
    InvalidAddress(String),
    #[error("invalid ledger configuration: {0}")]
    Config(String),
    #[error("ledger call {method} failed: {message}")]
    Call { method: &'static str, message: String },
    #[error("no government registered for {0}")]
    UnknownGovernment(String),
    #[error("transaction {hash} for {method} was mined but reverted")]
    Reverted { method: &'static str, hash: TxHash },
}

impl LedgerError {
    pub(crate) fn call(method: &'static str, err: impl std::fmt::Display) -> Self {
        LedgerError::Call {
            method,
            message: err.to_string(),
        }
    }
}

/// Parse a hex address without enforcing checksum case
pub fn parse_address(raw: &str) -> Result<Address, LedgerError> {
    raw.trim()
        .parse::<Address>()
        .map_err(|_| LedgerError::InvalidAddress(raw.to_string()))
}

/// Patient consent granted to one receiver address
#[derive(Debug, Clone, PartialEq)]
pub struct SpecificConsentRow {
    pub receiver: Address,
    pub data_types: Vec<u8>,
    pub purposes: Vec<u8>,
    pub anonymity: bool,
    /// Expiry as a unix timestamp; zero means no expiry
    pub duration: u64,
    pub active: bool,
    pub consent_id: u64,
}

/// Patient consent granted to a receiver class in listed countries
#[derive(Debug, Clone, PartialEq)]
pub struct RoleConsentRow {
    pub data_types: Vec<u8>,
    pub purposes: Vec<u8>,
    pub receiver_locations: Vec<String>,
    pub anonymity: bool,
    pub duration: u64,
    pub active: bool,
    pub consent_id: u64,
}

/// Government approval for a receiver
#[derive(Debug, Clone, PartialEq)]
pub struct GovernmentConsentRow {
    pub data_types: Vec<u8>,
    pub purposes: Vec<u8>,
    pub receiver: Address,
    pub active: bool,
    pub consent_id: u64,
}

/// Which role-consent list to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentCategory {
    Universal,
    Hospital,
    ResearchLab,
    InsuranceCompany,
}

impl ConsentCategory {
    pub fn for_role(role: ReceiverRole) -> Self {
        match role {
            ReceiverRole::Hospital => ConsentCategory::Hospital,
            ReceiverRole::ResearchLab => ConsentCategory::ResearchLab,
            ReceiverRole::InsuranceCompany => ConsentCategory::InsuranceCompany,
        }
    }

    /// Human label used in "not found" messages
    pub fn label(self) -> &'static str {
        match self {
            ConsentCategory::Universal => "universal",
            ConsentCategory::Hospital => "hospital",
            ConsentCategory::ResearchLab => "research lab",
            ConsentCategory::InsuranceCompany => "insurance company",
        }
    }
}

/// State of a submitted transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    /// Accepted by the node; finality not awaited
    Submitted { hash: TxHash },
    /// Mined in `block` without reverting
    Confirmed { hash: TxHash, block: Option<u64> },
}

impl TxOutcome {
    pub fn hash(&self) -> TxHash {
        match self {
            TxOutcome::Submitted { hash } | TxOutcome::Confirmed { hash, .. } => *hash,
        }
    }

    /// `0x`-prefixed hex hash
    pub fn hash_hex(&self) -> String {
        format!("{:#x}", self.hash())
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, TxOutcome::Confirmed { .. })
    }
}

/// Receipt data for a mined transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub block: Option<u64>,
    pub success: bool,
}

/// Typed access to the consent and data registries
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn specific_consents(
        &self,
        patient: Address,
        receiver: Address,
    ) -> Result<Vec<SpecificConsentRow>, LedgerError>;

    async fn role_consents(
        &self,
        patient: Address,
        category: ConsentCategory,
    ) -> Result<Vec<RoleConsentRow>, LedgerError>;

    async fn government_address(&self, country: &str) -> Result<Address, LedgerError>;

    async fn government_consents(
        &self,
        government: Address,
        receiver: Address,
    ) -> Result<Vec<GovernmentConsentRow>, LedgerError>;

    async fn is_registered(&self, user: Address) -> Result<bool, LedgerError>;

    async fn user_role(&self, user: Address) -> Result<String, LedgerError>;

    /// DER-encoded RSA public key registered for `user`
    async fn public_key(&self, user: Address) -> Result<Vec<u8>, LedgerError>;

    async fn request_government_consent(
        &self,
        government: Address,
        receiver: Address,
        data_types: &[u8],
        purposes: &[u8],
    ) -> Result<TxHash, LedgerError>;

    async fn request_patient_consent(
        &self,
        patient: Address,
        receiver: Address,
        data_types: &[u8],
        purposes: &[u8],
    ) -> Result<TxHash, LedgerError>;

    async fn share_data(&self, receiver: Address, payload: Vec<u8>) -> Result<TxHash, LedgerError>;

    /// Receipt for `hash`, or `None` while it is still pending
    async fn receipt(&self, hash: TxHash) -> Result<Option<Receipt>, LedgerError>;
}

/// How long to wait for a receipt before settling for `Submitted`
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationPolicy {
    pub enabled: bool,
    pub poll_interval: Duration,
    pub attempts: u32,
}

impl ConfirmationPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            poll_interval: Duration::ZERO,
            attempts: 0,
        }
    }
}

/// Turn a fresh submission into a [`TxOutcome`], polling for a receipt
/// when the policy asks for it
///
/// A mined receipt reporting failure is an error, never an outcome.
pub async fn settle(
    ledger: &dyn Ledger,
    method: &'static str,
    hash: TxHash,
    policy: ConfirmationPolicy,
) -> Result<TxOutcome, LedgerError> {
    LEDGER_TRANSACTIONS.with_label_values(&[method, "submitted"]).inc();
    if !policy.enabled {
        return Ok(TxOutcome::Submitted { hash });
    }

    for attempt in 1..=policy.attempts {
        if let Some(receipt) = ledger.receipt(hash).await? {
            debug!(method, tx = %hash, attempt, success = receipt.success, "Transaction mined");
            if !receipt.success {
                LEDGER_TRANSACTIONS.with_label_values(&[method, "reverted"]).inc();
                warn!(method, tx = %hash, block = ?receipt.block, "Transaction reverted");
                return Err(LedgerError::Reverted { method, hash });
            }
            LEDGER_TRANSACTIONS.with_label_values(&[method, "confirmed"]).inc();
            return Ok(TxOutcome::Confirmed {
                hash,
                block: receipt.block,
            });
        }
        tokio::time::sleep(policy.poll_interval).await;
    }

    warn!(method, tx = %hash, "No receipt before confirmation attempts ran out");
    Ok(TxOutcome::Submitted { hash })
}
