//! Encrypt-and-share pipeline
//!
//! ```text
//!   key_fetch ──▶ encrypt ──▶ upload ──▶ wrap_key ──▶ ledger_write ──▶ done
//! ```
//!
//! Stages run strictly in order. The first failure aborts the pipeline
//! with a [`SharingError`] naming the stage; completed stages are not
//! undone and nothing is retried.

pub mod crypto;
pub mod ipfs;

use std::fmt;
use std::path::Path;

use alloy::primitives::Address;
use thiserror::Error;
use tracing::{info, info_span, Instrument};

use crate::ledger::{self, ConfirmationPolicy, Ledger, LedgerError, TxOutcome};
use crate::progress::ProgressSink;

pub use crypto::{AesKey, CryptoError};
pub use ipfs::{ContentStore, PinataClient, StorageError};

/// Pipeline position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharingStage {
    KeyFetch,
    Encrypt,
    Upload,
    WrapKey,
    LedgerWrite,
    Done,
}

impl SharingStage {
    pub fn as_str(self) -> &'static str {
        match self {
            SharingStage::KeyFetch => "key_fetch",
            SharingStage::Encrypt => "encrypt",
            SharingStage::Upload => "upload",
            SharingStage::WrapKey => "wrap_key",
            SharingStage::LedgerWrite => "ledger_write",
            SharingStage::Done => "done",
        }
    }

    pub fn next(self) -> Self {
        match self {
            SharingStage::KeyFetch => SharingStage::Encrypt,
            SharingStage::Encrypt => SharingStage::Upload,
            SharingStage::Upload => SharingStage::WrapKey,
            SharingStage::WrapKey => SharingStage::LedgerWrite,
            SharingStage::LedgerWrite | SharingStage::Done => SharingStage::Done,
        }
    }

    /// Progress line shown when the stage starts
    fn announcement(self) -> Option<&'static str> {
        match self {
            SharingStage::KeyFetch => Some("🔑 Getting receiver public key from blockchain..."),
            SharingStage::Encrypt => Some("🔐 Encrypting patient file with receiver key..."),
            SharingStage::Upload => Some("🌐 Uploading encrypted file to IPFS..."),
            SharingStage::LedgerWrite => Some("⛓️ Writing transaction to blockchain..."),
            SharingStage::WrapKey | SharingStage::Done => None,
        }
    }
}

impl fmt::Display for SharingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StageFailure {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("receiver has no public key registered")]
    NoPublicKey,
}

#[derive(Debug, Error)]
#[error("data sharing failed at {stage}: {cause}")]
pub struct SharingError {
    pub stage: SharingStage,
    #[source]
    pub cause: StageFailure,
}

/// What a successful share produced
#[derive(Debug, Clone)]
pub struct ShareReceipt {
    pub cid: String,
    pub outcome: TxOutcome,
}

impl ShareReceipt {
    /// Tool output reported back to the orchestrator
    pub fn message(&self) -> String {
        format!(
            "📤 Data is sent to receiver via blockchain. Transaction hash: {}",
            self.outcome.hash_hex()
        )
    }
}

/// Runs the sharing pipeline against injected collaborators
pub struct DataSharer<'a> {
    pub ledger: &'a dyn Ledger,
    pub store: &'a dyn ContentStore,
    pub progress: &'a dyn ProgressSink,
    pub key: &'a AesKey,
    pub confirmation: ConfirmationPolicy,
}

impl DataSharer<'_> {
    /// Encrypt the file at `path` and share it with `receiver`
    pub async fn share(&self, receiver: Address, path: &Path) -> Result<ShareReceipt, SharingError> {
        let span = info_span!("share_data", receiver = %receiver, otel.name = "share_data");
        async {
            let mut stage = SharingStage::KeyFetch;
            let at = |stage: SharingStage| move |e: StageFailure| SharingError { stage, cause: e };

            self.announce(stage);
            let receiver_key = self
                .ledger
                .public_key(receiver)
                .await
                .map_err(StageFailure::from)
                .map_err(at(stage))?;
            if receiver_key.is_empty() {
                return Err(at(stage)(StageFailure::NoPublicKey));
            }

            stage = stage.next();
            self.announce(stage);
            let plaintext = tokio::fs::read(path).await.map_err(|source| {
                at(stage)(StageFailure::Io {
                    path: path.display().to_string(),
                    source,
                })
            })?;
            let armored = crypto::encrypt(self.key, &plaintext)
                .map(|framed| crypto::armor(&framed))
                .map_err(StageFailure::from)
                .map_err(at(stage))?;

            stage = stage.next();
            self.announce(stage);
            let cid = self
                .store
                .put("encrypted-data", armored.as_bytes())
                .await
                .map_err(StageFailure::from)
                .map_err(at(stage))?;

            stage = stage.next();
            let wrapped = crypto::wrap_cid(&receiver_key, &cid)
                .map_err(StageFailure::from)
                .map_err(at(stage))?;

            stage = stage.next();
            self.announce(stage);
            let hash = self
                .ledger
                .share_data(receiver, wrapped.into_bytes())
                .await
                .map_err(StageFailure::from)
                .map_err(at(stage))?;
            let outcome = ledger::settle(self.ledger, "shareData", hash, self.confirmation)
                .await
                .map_err(StageFailure::from)
                .map_err(at(stage))?;

            info!(%cid, tx = %outcome.hash_hex(), confirmed = outcome.is_confirmed(), "Data shared");
            Ok(ShareReceipt { cid, outcome })
        }
        .instrument(span)
        .await
    }

    fn announce(&self, stage: SharingStage) {
        if let Some(line) = stage.announcement() {
            self.progress.notify(line);
        }
    }
}
