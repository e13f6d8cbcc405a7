//! In-memory collaborators shared by the integration tests

#![allow(dead_code)]

use std::sync::Mutex;

use alloy::primitives::{Address, B256};
use async_trait::async_trait;

use medshare::ledger::{
    ConsentCategory, GovernmentConsentRow, Ledger, LedgerError, Receipt, RoleConsentRow,
    SpecificConsentRow, TxHash,
};
use medshare::sharing::{ContentStore, StorageError};

pub const PATIENT: Address = Address::repeat_byte(0x11);
pub const RECEIVER: Address = Address::repeat_byte(0x22);
pub const GERMANY: Address = Address::repeat_byte(0x33);

/// A ledger write the fake accepted
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    GovernmentRequest {
        government: Address,
        receiver: Address,
        data_types: Vec<u8>,
        purposes: Vec<u8>,
    },
    PatientRequest {
        patient: Address,
        receiver: Address,
        data_types: Vec<u8>,
        purposes: Vec<u8>,
    },
    Share {
        receiver: Address,
        payload: Vec<u8>,
    },
}

/// Ledger backed by plain vectors
#[derive(Default)]
pub struct FakeLedger {
    pub specific: Vec<SpecificConsentRow>,
    pub roles: Vec<(ConsentCategory, Vec<RoleConsentRow>)>,
    pub governments: Vec<(String, Address)>,
    pub government_rows: Vec<GovernmentConsentRow>,
    pub users: Vec<(Address, String)>,
    pub public_keys: Vec<(Address, Vec<u8>)>,
    /// Block number reported for every receipt; pending forever when `None`
    pub mined_in: Option<u64>,
    /// Mined receipts report a revert
    pub reverted: bool,
    pub writes: Mutex<Vec<Write>>,
}

impl FakeLedger {
    pub fn writes(&self) -> Vec<Write> {
        self.writes.lock().unwrap().clone()
    }

    fn record(&self, write: Write) -> TxHash {
        let mut writes = self.writes.lock().unwrap();
        writes.push(write);
        B256::repeat_byte(writes.len() as u8)
    }
}

#[async_trait]
impl Ledger for FakeLedger {
    async fn specific_consents(
        &self,
        _patient: Address,
        receiver: Address,
    ) -> Result<Vec<SpecificConsentRow>, LedgerError> {
        Ok(self
            .specific
            .iter()
            .filter(|r| r.receiver == receiver)
            .cloned()
            .collect())
    }

    async fn role_consents(
        &self,
        _patient: Address,
        category: ConsentCategory,
    ) -> Result<Vec<RoleConsentRow>, LedgerError> {
        Ok(self
            .roles
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    async fn government_address(&self, country: &str) -> Result<Address, LedgerError> {
        self.governments
            .iter()
            .find(|(c, _)| c == country)
            .map(|(_, address)| *address)
            .ok_or_else(|| LedgerError::UnknownGovernment(country.to_string()))
    }

    async fn government_consents(
        &self,
        _government: Address,
        receiver: Address,
    ) -> Result<Vec<GovernmentConsentRow>, LedgerError> {
        Ok(self
            .government_rows
            .iter()
            .filter(|r| r.receiver == receiver)
            .cloned()
            .collect())
    }

    async fn is_registered(&self, user: Address) -> Result<bool, LedgerError> {
        Ok(self.users.iter().any(|(a, _)| *a == user))
    }

    async fn user_role(&self, user: Address) -> Result<String, LedgerError> {
        Ok(self
            .users
            .iter()
            .find(|(a, _)| *a == user)
            .map(|(_, role)| role.clone())
            .unwrap_or_default())
    }

    async fn public_key(&self, user: Address) -> Result<Vec<u8>, LedgerError> {
        Ok(self
            .public_keys
            .iter()
            .find(|(a, _)| *a == user)
            .map(|(_, key)| key.clone())
            .unwrap_or_default())
    }

    async fn request_government_consent(
        &self,
        government: Address,
        receiver: Address,
        data_types: &[u8],
        purposes: &[u8],
    ) -> Result<TxHash, LedgerError> {
        Ok(self.record(Write::GovernmentRequest {
            government,
            receiver,
            data_types: data_types.to_vec(),
            purposes: purposes.to_vec(),
        }))
    }

    async fn request_patient_consent(
        &self,
        patient: Address,
        receiver: Address,
        data_types: &[u8],
        purposes: &[u8],
    ) -> Result<TxHash, LedgerError> {
        Ok(self.record(Write::PatientRequest {
            patient,
            receiver,
            data_types: data_types.to_vec(),
            purposes: purposes.to_vec(),
        }))
    }

    async fn share_data(&self, receiver: Address, payload: Vec<u8>) -> Result<TxHash, LedgerError> {
        Ok(self.record(Write::Share { receiver, payload }))
    }

    async fn receipt(&self, _hash: TxHash) -> Result<Option<Receipt>, LedgerError> {
        Ok(self.mined_in.map(|block| Receipt {
            block: Some(block),
            success: !self.reverted,
        }))
    }
}

/// Content store keeping every payload in memory
#[derive(Default)]
pub struct MemoryStore {
    pub fail: bool,
    pub puts: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemoryStore {
    pub fn puts(&self) -> Vec<(String, Vec<u8>)> {
        self.puts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn put(&self, name: &str, bytes: &[u8]) -> Result<String, StorageError> {
        if self.fail {
            return Err(StorageError::Api {
                status: 401,
                message: "invalid API key".to_string(),
            });
        }
        self.puts
            .lock()
            .unwrap()
            .push((name.to_string(), bytes.to_vec()));
        Ok("bafkreigh2akiscaildcqabsyg3dfr6chu3fgpregiymsck7e7aqa4s52zy".to_string())
    }
}

pub fn hospital_consent(data_types: &[u8], purposes: &[u8], country: &str) -> RoleConsentRow {
    RoleConsentRow {
        data_types: data_types.to_vec(),
        purposes: purposes.to_vec(),
        receiver_locations: vec![country.to_string()],
        anonymity: false,
        duration: 0,
        active: true,
        consent_id: 1,
    }
}

pub fn government_consent(data_types: &[u8], purposes: &[u8]) -> GovernmentConsentRow {
    GovernmentConsentRow {
        data_types: data_types.to_vec(),
        purposes: purposes.to_vec(),
        receiver: RECEIVER,
        active: true,
        consent_id: 7,
    }
}
