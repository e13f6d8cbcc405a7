//! Symmetric file encryption and receiver key wrapping
//!
//! Files are encrypted with AES-CBC/PKCS#7 under a pre-shared key and a
//! fresh random IV, framed as `IV || ciphertext` and armored as base64
//! text before upload. The storage layer base64-encodes that text once
//! more, so a pinned `encrypted_data` value is doubly encoded and
//! [`open_pinned`] undoes both layers. The content identifier
//! of the uploaded ciphertext is then encrypted to the receiver's RSA key
//! with PKCS#1 v1.5.

use aes::{Aes128, Aes192, Aes256};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use thiserror::Error;

pub const IV_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("AES key must be 16, 24 or 32 bytes, got {0}")]
    KeyLength(usize),
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("ciphertext is too short or badly padded")]
    Decrypt,
    #[error("receiver public key is not valid DER: {0}")]
    PublicKey(String),
    #[error("rsa error: {0}")]
    Rsa(#[from] rsa::Error),
    #[error("wrapped value is not UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Pre-shared AES key
#[derive(Clone)]
pub struct AesKey(Vec<u8>);

impl AesKey {
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        match bytes.len() {
            16 | 24 | 32 => Ok(Self(bytes)),
            n => Err(CryptoError::KeyLength(n)),
        }
    }

    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        Self::new(STANDARD.decode(encoded.trim())?)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for AesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AesKey({} bytes)", self.0.len())
    }
}

macro_rules! cbc_encrypt {
    ($cipher:ty, $key:expr, $iv:expr, $data:expr) => {
        cbc::Encryptor::<$cipher>::new_from_slices($key, $iv)
            .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>($data))
            .map_err(|_| CryptoError::KeyLength($key.len()))
    };
}

macro_rules! cbc_decrypt {
    ($cipher:ty, $key:expr, $iv:expr, $data:expr) => {
        cbc::Decryptor::<$cipher>::new_from_slices($key, $iv)
            .map_err(|_| CryptoError::KeyLength($key.len()))?
            .decrypt_padded_vec_mut::<Pkcs7>($data)
            .map_err(|_| CryptoError::Decrypt)
    };
}

/// Encrypt `plaintext`, returning `IV || ciphertext`
pub fn encrypt(key: &AesKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);

    let key = key.as_bytes();
    let ciphertext = match key.len() {
        16 => cbc_encrypt!(Aes128, key, &iv, plaintext),
        24 => cbc_encrypt!(Aes192, key, &iv, plaintext),
        _ => cbc_encrypt!(Aes256, key, &iv, plaintext),
    }?;

    let mut framed = Vec::with_capacity(IV_LEN + ciphertext.len());
    framed.extend_from_slice(&iv);
    framed.extend_from_slice(&ciphertext);
    Ok(framed)
}

/// Inverse of [`encrypt`]
pub fn decrypt(key: &AesKey, framed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if framed.len() < IV_LEN * 2 {
        return Err(CryptoError::Decrypt);
    }
    let (iv, ciphertext) = framed.split_at(IV_LEN);
    let key = key.as_bytes();
    match key.len() {
        16 => cbc_decrypt!(Aes128, key, iv, ciphertext),
        24 => cbc_decrypt!(Aes192, key, iv, ciphertext),
        _ => cbc_decrypt!(Aes256, key, iv, ciphertext),
    }
}

/// Base64 text of `IV || ciphertext`, the form handed to storage
pub fn armor(framed: &[u8]) -> String {
    STANDARD.encode(framed)
}

/// Recover `IV || ciphertext` from a pinned `encrypted_data` value
pub fn open_pinned(encrypted_data: &str) -> Result<Vec<u8>, CryptoError> {
    let armored = String::from_utf8(STANDARD.decode(encrypted_data.trim())?)?;
    Ok(STANDARD.decode(armored.trim())?)
}

/// Load a receiver key stored as SPKI DER, falling back to PKCS#1 DER
pub fn public_key_from_der(der: &[u8]) -> Result<RsaPublicKey, CryptoError> {
    RsaPublicKey::from_public_key_der(der)
        .or_else(|_| RsaPublicKey::from_pkcs1_der(der))
        .map_err(|e| CryptoError::PublicKey(e.to_string()))
}

/// RSA-encrypt `cid` to the receiver and base64 the result
pub fn wrap_cid(receiver_key_der: &[u8], cid: &str) -> Result<String, CryptoError> {
    let key = public_key_from_der(receiver_key_der)?;
    let wrapped = key.encrypt(&mut OsRng, Pkcs1v15Encrypt, cid.as_bytes())?;
    Ok(STANDARD.encode(wrapped))
}

/// Receiver-side inverse of [`wrap_cid`]
pub fn unwrap_cid(private_key: &RsaPrivateKey, wrapped: &str) -> Result<String, CryptoError> {
    let ciphertext = STANDARD.decode(wrapped.trim())?;
    let cid = private_key.decrypt(Pkcs1v15Encrypt, &ciphertext)?;
    Ok(String::from_utf8(cid)?)
}
