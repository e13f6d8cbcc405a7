//! Ethereum JSON-RPC implementation of [`Ledger`]
//!
//! Contract bindings are generated with alloy's `sol!` macro. Writes are
//! signed locally with the configured sender key and submitted as raw
//! transactions; the returned hash is all a write waits for.

use alloy::network::{EthereumWallet, ReceiptResponse};
use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use async_trait::async_trait;
use tracing::{debug, info};

use super::{
    parse_address, ConsentCategory, GovernmentConsentRow, Ledger, LedgerError, Receipt,
    RoleConsentRow, SpecificConsentRow, TxHash,
};
use crate::config::LedgerConfig;

sol! {
    #[sol(rpc)]
    interface ConsentRegistry {
        struct SpecificConsent {
            address receiver;
            uint8[] dataTypes;
            uint8[] purposes;
            bool anonymity;
            uint256 duration;
            bool active;
            uint256 consentId;
        }

        struct RoleConsent {
            uint8[] dataTypes;
            uint8[] purposes;
            string[] receiverLocations;
            bool anonymity;
            uint256 duration;
            bool active;
            uint256 consentId;
        }

        struct GovernmentConsent {
            uint8[] dataTypes;
            uint8[] purposes;
            address receiver;
            bool active;
            uint256 consentId;
        }

        function getSpecificConsents(address patient, address receiver) external view returns (SpecificConsent[] memory);
        function getUniversalConsents(address patient) external view returns (RoleConsent[] memory);
        function getHospitalConsents(address patient) external view returns (RoleConsent[] memory);
        function getLabConsents(address patient) external view returns (RoleConsent[] memory);
        function getInsuranceConsents(address patient) external view returns (RoleConsent[] memory);
        function getGovernmentConsents(address government, address receiver) external view returns (GovernmentConsent[] memory);
        function requestGovernmentConsent(address government, address receiver, uint8[] dataTypes, uint8[] purposes) external;
        function requestPatientConsent(address patient, address receiver, uint8[] dataTypes, uint8[] purposes) external;
    }
}

sol! {
    #[sol(rpc)]
    interface DataRegistry {
        function getGovernmentAddress(string country) external view returns (address);
        function isUserRegistered(address user) external view returns (bool);
        function getUserRole(address user) external view returns (string memory);
        function getUserPublicKey(address user) external view returns (bytes memory);
        function shareData(address receiver, bytes data) external;
    }
}

fn to_u64(value: U256) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

impl From<ConsentRegistry::SpecificConsent> for SpecificConsentRow {
    fn from(c: ConsentRegistry::SpecificConsent) -> Self {
        Self {
            receiver: c.receiver,
            data_types: c.dataTypes,
            purposes: c.purposes,
            anonymity: c.anonymity,
            duration: to_u64(c.duration),
            active: c.active,
            consent_id: to_u64(c.consentId),
        }
    }
}

impl From<ConsentRegistry::RoleConsent> for RoleConsentRow {
    fn from(c: ConsentRegistry::RoleConsent) -> Self {
        Self {
            data_types: c.dataTypes,
            purposes: c.purposes,
            receiver_locations: c.receiverLocations,
            anonymity: c.anonymity,
            duration: to_u64(c.duration),
            active: c.active,
            consent_id: to_u64(c.consentId),
        }
    }
}

impl From<ConsentRegistry::GovernmentConsent> for GovernmentConsentRow {
    fn from(c: ConsentRegistry::GovernmentConsent) -> Self {
        Self {
            data_types: c.dataTypes,
            purposes: c.purposes,
            receiver: c.receiver,
            active: c.active,
            consent_id: to_u64(c.consentId),
        }
    }
}

/// Ledger bound to the consent and data registry contracts
pub struct EthLedger {
    provider: DynProvider,
    consent: ConsentRegistry::ConsentRegistryInstance<DynProvider>,
    data: DataRegistry::DataRegistryInstance<DynProvider>,
    sender: Option<Address>,
}

impl EthLedger {
    /// Connect to the RPC endpoint named in `config`
    ///
    /// Without a sender key the ledger is read-only and writes fail with
    /// [`LedgerError::Config`].
    pub fn connect(config: &LedgerConfig) -> Result<Self, LedgerError> {
        if config.rpc_url.is_empty() {
            return Err(LedgerError::Config("ledger.rpc_url is not set".to_string()));
        }
        let url = config
            .rpc_url
            .parse()
            .map_err(|e| LedgerError::Config(format!("invalid rpc_url: {}", e)))?;

        let (provider, sender) = if config.sender_key.is_empty() {
            (ProviderBuilder::new().connect_http(url).erased(), None)
        } else {
            let signer: PrivateKeySigner = config
                .sender_key
                .trim()
                .trim_start_matches("0x")
                .parse()
                .map_err(|e| LedgerError::Config(format!("invalid sender key: {}", e)))?;
            let sender = signer.address();
            let provider = ProviderBuilder::new()
                .wallet(EthereumWallet::from(signer))
                .connect_http(url)
                .erased();
            (provider, Some(sender))
        };

        let consent_address = parse_address(&config.consent_contract)?;
        let data_address = parse_address(&config.data_contract)?;
        info!(
            consent_contract = %consent_address,
            data_contract = %data_address,
            sender = ?sender,
            "Ledger connected"
        );

        Ok(Self {
            consent: ConsentRegistry::new(consent_address, provider.clone()),
            data: DataRegistry::new(data_address, provider.clone()),
            provider,
            sender,
        })
    }

    fn require_signer(&self) -> Result<Address, LedgerError> {
        self.sender
            .ok_or_else(|| LedgerError::Config("ledger.sender_key is required for writes".to_string()))
    }
}

#[async_trait]
impl Ledger for EthLedger {
    async fn specific_consents(
        &self,
        patient: Address,
        receiver: Address,
    ) -> Result<Vec<SpecificConsentRow>, LedgerError> {
        let rows = self
            .consent
            .getSpecificConsents(patient, receiver)
            .call()
            .await
            .map_err(|e| LedgerError::call("getSpecificConsents", e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn role_consents(
        &self,
        patient: Address,
        category: ConsentCategory,
    ) -> Result<Vec<RoleConsentRow>, LedgerError> {
        let rows = match category {
            ConsentCategory::Universal => self
                .consent
                .getUniversalConsents(patient)
                .call()
                .await
                .map_err(|e| LedgerError::call("getUniversalConsents", e))?,
            ConsentCategory::Hospital => self
                .consent
                .getHospitalConsents(patient)
                .call()
                .await
                .map_err(|e| LedgerError::call("getHospitalConsents", e))?,
            ConsentCategory::ResearchLab => self
                .consent
                .getLabConsents(patient)
                .call()
                .await
                .map_err(|e| LedgerError::call("getLabConsents", e))?,
            ConsentCategory::InsuranceCompany => self
                .consent
                .getInsuranceConsents(patient)
                .call()
                .await
                .map_err(|e| LedgerError::call("getInsuranceConsents", e))?,
        };
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn government_address(&self, country: &str) -> Result<Address, LedgerError> {
        let government = self
            .data
            .getGovernmentAddress(country.to_string())
            .call()
            .await
            .map_err(|e| LedgerError::call("getGovernmentAddress", e))?;
        if government == Address::ZERO {
            return Err(LedgerError::UnknownGovernment(country.to_string()));
        }
        Ok(government)
    }

    async fn government_consents(
        &self,
        government: Address,
        receiver: Address,
    ) -> Result<Vec<GovernmentConsentRow>, LedgerError> {
        let rows = self
            .consent
            .getGovernmentConsents(government, receiver)
            .call()
            .await
            .map_err(|e| LedgerError::call("getGovernmentConsents", e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn is_registered(&self, user: Address) -> Result<bool, LedgerError> {
        self.data
            .isUserRegistered(user)
            .call()
            .await
            .map_err(|e| LedgerError::call("isUserRegistered", e))
    }

    async fn user_role(&self, user: Address) -> Result<String, LedgerError> {
        self.data
            .getUserRole(user)
            .call()
            .await
            .map_err(|e| LedgerError::call("getUserRole", e))
    }

    async fn public_key(&self, user: Address) -> Result<Vec<u8>, LedgerError> {
        let key = self
            .data
            .getUserPublicKey(user)
            .call()
            .await
            .map_err(|e| LedgerError::call("getUserPublicKey", e))?;
        Ok(key.to_vec())
    }

    async fn request_government_consent(
        &self,
        government: Address,
        receiver: Address,
        data_types: &[u8],
        purposes: &[u8],
    ) -> Result<TxHash, LedgerError> {
        let from = self.require_signer()?;
        let pending = self
            .consent
            .requestGovernmentConsent(government, receiver, data_types.to_vec(), purposes.to_vec())
            .from(from)
            .send()
            .await
            .map_err(|e| LedgerError::call("requestGovernmentConsent", e))?;
        let hash = *pending.tx_hash();
        debug!(tx = %hash, %government, %receiver, "Government consent requested");
        Ok(hash)
    }

    async fn request_patient_consent(
        &self,
        patient: Address,
        receiver: Address,
        data_types: &[u8],
        purposes: &[u8],
    ) -> Result<TxHash, LedgerError> {
        let from = self.require_signer()?;
        let pending = self
            .consent
            .requestPatientConsent(patient, receiver, data_types.to_vec(), purposes.to_vec())
            .from(from)
            .send()
            .await
            .map_err(|e| LedgerError::call("requestPatientConsent", e))?;
        let hash = *pending.tx_hash();
        debug!(tx = %hash, %patient, %receiver, "Patient consent requested");
        Ok(hash)
    }

    async fn share_data(&self, receiver: Address, payload: Vec<u8>) -> Result<TxHash, LedgerError> {
        let from = self.require_signer()?;
        let pending = self
            .data
            .shareData(receiver, Bytes::from(payload))
            .from(from)
            .send()
            .await
            .map_err(|e| LedgerError::call("shareData", e))?;
        let hash = *pending.tx_hash();
        debug!(tx = %hash, %receiver, "Shared data reference written");
        Ok(hash)
    }

    async fn receipt(&self, hash: TxHash) -> Result<Option<Receipt>, LedgerError> {
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| LedgerError::call("eth_getTransactionReceipt", e))?;
        Ok(receipt.map(|r| Receipt {
            block: ReceiptResponse::block_number(&r),
            success: ReceiptResponse::status(&r),
        }))
    }
}
