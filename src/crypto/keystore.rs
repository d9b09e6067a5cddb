//! Encryption key management.
//!
//! A single key is derived from an operator passphrase the first time it is
//! needed and written to the key file. Every later run reads the key file back
//! verbatim.
//!
//! The salt used for derivation is random and is not stored anywhere, so the
//! key cannot be re-derived from the passphrase alone. Once created, the key
//! file is the only durable secret: losing it makes every encrypted file
//! unrecoverable.

use std::cell::OnceCell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use base64::{Engine as _, engine::general_purpose::URL_SAFE};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use thiserror::Error;
use tracing::info;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::fernet::{self, Fernet};
use crate::prompt::SecretPrompt;

/// PBKDF2 iteration count for key derivation.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Salt length for key derivation.
pub const SALT_LENGTH: usize = 16;

/// Prompt shown when a new key has to be created.
const NEW_KEY_PROMPT: &str = "New encryption key password: ";

/// Errors that can occur while obtaining the encryption key.
#[derive(Debug, Error)]
pub enum KeyError {
    /// Key file could not be read or written.
    #[error("Key file error: {0}")]
    Io(#[from] io::Error),

    /// Reading the passphrase from the operator failed.
    #[error("Could not read passphrase: {0}")]
    Prompt(io::Error),

    /// Operator entered an empty passphrase.
    #[error("Passphrase must not be empty")]
    EmptyPassphrase,
}

/// Encoded key material, exactly as stored in the key file.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey(Vec<u8>);

impl EncryptionKey {
    /// Wraps raw key file contents.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Generates a random key that has no passphrase behind it.
    #[must_use]
    pub fn generate() -> Self {
        Self(Fernet::generate_key().into_bytes())
    }

    /// Returns the key bytes as stored on disk.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Builds the Fernet cipher for this key.
    pub fn cipher(&self) -> Result<Fernet, fernet::FernetError> {
        Fernet::new(&self.0)
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// Derives a Fernet key from a passphrase and salt with PBKDF2-HMAC-SHA256.
#[must_use]
pub fn derive_key(passphrase: &[u8], salt: &[u8]) -> EncryptionKey {
    let mut raw = Zeroizing::new([0u8; fernet::KEY_LENGTH]);
    pbkdf2::pbkdf2_hmac::<Sha256>(passphrase, salt, PBKDF2_ITERATIONS, raw.as_mut_slice());
    EncryptionKey(URL_SAFE.encode(&raw[..]).into_bytes())
}

/// Returns the key stored at `key_path`, creating it first if it does not exist.
///
/// An existing key file is returned unchanged, without validation and without
/// prompting. Otherwise the operator is asked for a passphrase, a fresh salt is
/// drawn and the derived key is written to `key_path`.
pub fn derive_or_load(key_path: &Path, prompt: &dyn SecretPrompt) -> Result<EncryptionKey, KeyError> {
    if key_path.is_file() {
        info!("Using existing key '{}' for encryption/decryption", key_path.display());
        return Ok(EncryptionKey(fs::read(key_path)?));
    }

    info!(
        "No key found at '{}', creating a new key",
        key_path.display()
    );

    let passphrase = Zeroizing::new(prompt.read_secret(NEW_KEY_PROMPT).map_err(KeyError::Prompt)?);
    if passphrase.is_empty() {
        return Err(KeyError::EmptyPassphrase);
    }

    let mut salt = [0u8; SALT_LENGTH];
    OsRng.fill_bytes(&mut salt);

    let key = derive_key(passphrase.as_bytes(), &salt);
    super::write_private(key_path, key.as_bytes())?;

    info!("Stored encryption key as '{}'", key_path.display());
    Ok(key)
}

/// Lazily materialized, cached access to the key at a fixed path.
///
/// The key is loaded or created on first use and kept for the lifetime of the
/// store.
pub struct KeyStore {
    path: PathBuf,
    prompt: Box<dyn SecretPrompt>,
    cached: OnceCell<EncryptionKey>,
}

impl KeyStore {
    /// Creates a key store for the key file at `path`.
    #[must_use]
    pub fn new(path: PathBuf, prompt: Box<dyn SecretPrompt>) -> Self {
        assert!(!path.as_os_str().is_empty(), "key path must not be empty");

        Self {
            path,
            prompt,
            cached: OnceCell::new(),
        }
    }

    /// Returns the key file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if the key file exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Returns the cached key, loading or creating it on first call.
    pub fn key(&self) -> Result<&EncryptionKey, KeyError> {
        if let Some(key) = self.cached.get() {
            return Ok(key);
        }

        let key = derive_or_load(&self.path, self.prompt.as_ref())?;
        Ok(self.cached.get_or_init(|| key))
    }
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore")
            .field("path", &self.path)
            .field("loaded", &self.cached.get().is_some())
            .finish()
    }
}
