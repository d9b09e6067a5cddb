//! Fernet authenticated encryption.
//!
//! Tokens use the standard Fernet layout so files written here can be read by
//! any other Fernet implementation holding the same key:
//!
//! ```text
//! 0x80 | timestamp (u64 BE) | IV (16) | AES-128-CBC ciphertext | HMAC-SHA256 (32)
//! ```
//!
//! The whole token is base64url encoded. The 32-byte key is split into a
//! signing half and an encryption half.

use aes::Aes128;
use base64::{Engine as _, engine::general_purpose::URL_SAFE};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type HmacSha256 = Hmac<Sha256>;

/// Fernet format version byte.
const VERSION: u8 = 0x80;

/// Raw key length before encoding.
pub const KEY_LENGTH: usize = 32;

const HALF_KEY: usize = KEY_LENGTH / 2;
const IV_LENGTH: usize = 16;
const TAG_LENGTH: usize = 32;
const HEADER_LENGTH: usize = 1 + 8 + IV_LENGTH;

/// Tokens stamped further than this into the future are rejected by TTL checks.
const MAX_CLOCK_SKEW_SECS: u64 = 60;

/// Errors produced by the Fernet layer.
///
/// Every decryption failure maps to `InvalidToken`; callers learn nothing about
/// which check failed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FernetError {
    /// Key is not base64url of exactly 32 bytes.
    #[error("Invalid Fernet key")]
    InvalidKey,

    /// Token failed to decode, authenticate or decrypt.
    #[error("Invalid token")]
    InvalidToken,
}

/// A decoded Fernet key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Fernet {
    signing_key: [u8; HALF_KEY],
    encryption_key: [u8; HALF_KEY],
}

impl Fernet {
    /// Builds a cipher from the base64url key text.
    ///
    /// Surrounding ASCII whitespace is ignored, so a key file with a trailing
    /// newline still works.
    pub fn new(encoded_key: &[u8]) -> Result<Self, FernetError> {
        let trimmed = encoded_key.trim_ascii();
        let mut raw = URL_SAFE
            .decode(trimmed)
            .map_err(|_| FernetError::InvalidKey)?;

        if raw.len() != KEY_LENGTH {
            raw.zeroize();
            return Err(FernetError::InvalidKey);
        }

        let mut signing_key = [0u8; HALF_KEY];
        let mut encryption_key = [0u8; HALF_KEY];
        signing_key.copy_from_slice(&raw[..HALF_KEY]);
        encryption_key.copy_from_slice(&raw[HALF_KEY..]);
        raw.zeroize();

        Ok(Self {
            signing_key,
            encryption_key,
        })
    }

    /// Generates a fresh random key in its encoded form.
    #[must_use]
    pub fn generate_key() -> String {
        let mut raw = [0u8; KEY_LENGTH];
        OsRng.fill_bytes(&mut raw);
        let encoded = URL_SAFE.encode(raw);
        raw.zeroize();
        encoded
    }

    /// Encrypts `plaintext` into an encoded token, stamped with the current time.
    #[must_use]
    pub fn encrypt(&self, plaintext: &[u8]) -> String {
        let mut iv = [0u8; IV_LENGTH];
        OsRng.fill_bytes(&mut iv);
        self.encrypt_with(plaintext, now_secs(), iv)
    }

    fn encrypt_with(&self, plaintext: &[u8], timestamp: u64, iv: [u8; IV_LENGTH]) -> String {
        let ciphertext = Aes128CbcEnc::new(&self.encryption_key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut token = Vec::with_capacity(HEADER_LENGTH + ciphertext.len() + TAG_LENGTH);
        token.push(VERSION);
        token.extend_from_slice(&timestamp.to_be_bytes());
        token.extend_from_slice(&iv);
        token.extend_from_slice(&ciphertext);

        let tag = self.sign(&token);
        token.extend_from_slice(&tag);

        URL_SAFE.encode(token)
    }

    /// Decrypts a token without checking its age.
    pub fn decrypt(&self, token: &[u8]) -> Result<Vec<u8>, FernetError> {
        self.decrypt_checked(token, None)
    }

    /// Decrypts a token, rejecting it if it is older than `ttl_secs`.
    pub fn decrypt_with_ttl(&self, token: &[u8], ttl_secs: u64) -> Result<Vec<u8>, FernetError> {
        self.decrypt_checked(token, Some(ttl_secs))
    }

    fn decrypt_checked(&self, token: &[u8], ttl_secs: Option<u64>) -> Result<Vec<u8>, FernetError> {
        let data = URL_SAFE
            .decode(token.trim_ascii())
            .map_err(|_| FernetError::InvalidToken)?;

        if data.len() < HEADER_LENGTH + TAG_LENGTH || data[0] != VERSION {
            return Err(FernetError::InvalidToken);
        }

        let (signed, tag) = data.split_at(data.len() - TAG_LENGTH);

        let mut timestamp_bytes = [0u8; 8];
        timestamp_bytes.copy_from_slice(&signed[1..9]);
        let timestamp = u64::from_be_bytes(timestamp_bytes);

        if let Some(ttl) = ttl_secs {
            let now = now_secs();
            if timestamp.saturating_add(ttl) < now
                || timestamp > now.saturating_add(MAX_CLOCK_SKEW_SECS)
            {
                return Err(FernetError::InvalidToken);
            }
        }

        self.verify(signed, tag)?;

        let iv = &signed[9..HEADER_LENGTH];
        let ciphertext = &signed[HEADER_LENGTH..];
        if ciphertext.is_empty() || ciphertext.len() % IV_LENGTH != 0 {
            return Err(FernetError::InvalidToken);
        }

        Aes128CbcDec::new_from_slices(&self.encryption_key, iv)
            .map_err(|_| FernetError::InvalidToken)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| FernetError::InvalidToken)
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length.
        match <HmacSha256 as Mac>::new_from_slice(&self.signing_key) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC-SHA256 accepts 16-byte keys"),
        }
    }

    fn sign(&self, data: &[u8]) -> [u8; TAG_LENGTH] {
        let mut mac = self.mac();
        mac.update(data);
        mac.finalize().into_bytes().into()
    }

    fn verify(&self, data: &[u8], tag: &[u8]) -> Result<(), FernetError> {
        let mut mac = self.mac();
        mac.update(data);
        mac.verify_slice(tag).map_err(|_| FernetError::InvalidToken)
    }
}

impl std::fmt::Debug for Fernet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Fernet { .. }")
    }
}

fn now_secs() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}
