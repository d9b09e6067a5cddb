//! Encrypted file storage.
//!
//! Each logical dataset lives in its own file under a base directory. The file
//! holds a single Fernet token whose plaintext is the JSON form of the value.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use super::keystore::{EncryptionKey, KeyError, KeyStore};
use super::literal;
use super::write_private;

/// Maximum encrypted file size accepted on read (16MB).
const MAX_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// Errors that can occur during encrypted storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The encryption key could not be obtained.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// No file exists for the requested name.
    #[error("No encrypted file at '{}'", .0.display())]
    NotFound(PathBuf),

    /// The file failed authentication: wrong key or corrupted contents.
    #[error("Encrypted file is corrupt or was written with a different key")]
    CorruptOrWrongKey,

    /// The key file does not hold a usable key.
    #[error("Key file does not contain a valid encryption key")]
    InvalidKey,

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// File too large.
    #[error("File too large (max {MAX_FILE_SIZE} bytes)")]
    FileTooLarge,

    /// Value could not be serialized.
    #[error("Serialization error: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Decrypted payload did not match the expected structure.
    #[error("Decrypted data has unexpected layout: {0}")]
    Deserialize(#[source] serde_json::Error),
}

/// Encrypts the JSON form of `value` into a token.
pub fn seal<T: Serialize + ?Sized>(key: &EncryptionKey, value: &T) -> Result<String, StoreError> {
    let cipher = key.cipher().map_err(|_| StoreError::InvalidKey)?;
    let plaintext = zeroize::Zeroizing::new(serde_json::to_vec(value).map_err(StoreError::Serialize)?);
    Ok(cipher.encrypt(&plaintext))
}

/// Authenticates and decrypts a token, then parses the plaintext.
///
/// The plaintext is JSON, or for older files a Python literal list of
/// string-valued dicts. Never returns data from a token that fails
/// authentication.
pub fn open<T: DeserializeOwned>(key: &EncryptionKey, token: &[u8]) -> Result<T, StoreError> {
    let cipher = key.cipher().map_err(|_| StoreError::InvalidKey)?;
    let plaintext = zeroize::Zeroizing::new(
        cipher
            .decrypt(token)
            .map_err(|_| StoreError::CorruptOrWrongKey)?,
    );

    let json_err = match serde_json::from_slice(&plaintext) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    let legacy = std::str::from_utf8(&plaintext)
        .ok()
        .and_then(literal::parse_records);
    match legacy {
        Some(records) => {
            debug!("Read payload in Python literal layout");
            serde_json::from_value(records).map_err(StoreError::Deserialize)
        }
        None => Err(StoreError::Deserialize(json_err)),
    }
}

/// Named encrypted files under a base directory, sharing one key.
#[derive(Debug)]
pub struct EncryptedStore {
    base_path: PathBuf,
    keys: KeyStore,
}

impl EncryptedStore {
    /// Creates a store rooted at `base_path`.
    #[must_use]
    pub fn new(base_path: PathBuf, keys: KeyStore) -> Self {
        Self { base_path, keys }
    }

    /// Returns the base directory.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Returns the key store backing this store.
    #[must_use]
    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    /// Returns the file path for a dataset name.
    #[must_use]
    pub fn path_for(&self, name: &str) -> PathBuf {
        assert!(!name.is_empty(), "dataset name must not be empty");
        self.base_path.join(name)
    }

    /// Returns true if a file exists for `name`.
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).is_file()
    }

    /// Encrypts `value` and replaces the file for `name` with it.
    pub fn write<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<(), StoreError> {
        let key = self.keys.key()?;
        let token = seal(key, value)?;
        let path = self.path_for(name);

        write_private(&path, token.as_bytes())?;
        debug!("Wrote {} bytes to '{}'", token.len(), path.display());
        Ok(())
    }

    /// Reads, authenticates and decrypts the file for `name`.
    pub fn read<T: DeserializeOwned>(&self, name: &str) -> Result<T, StoreError> {
        let key = self.keys.key()?;
        let path = self.path_for(name);

        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(path));
            }
            Err(e) => return Err(e.into()),
        };
        if metadata.len() > MAX_FILE_SIZE {
            return Err(StoreError::FileTooLarge);
        }

        let token = fs::read(&path)?;
        debug!("Read {} bytes from '{}'", token.len(), path.display());
        open(key, &token)
    }
}
