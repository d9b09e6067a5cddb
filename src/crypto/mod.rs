//! At-rest encryption for the device inventory.
//!
//! - `fernet`: the authenticated token format
//! - `keystore`: passphrase-derived key, persisted once to the key file
//! - `store`: encrypt/decrypt one serialized value per named file
//! - `literal`: strict reader for inventories written as Python literals

pub mod fernet;
pub mod keystore;
mod literal;
pub mod store;

pub use fernet::{Fernet, FernetError};
pub use keystore::{EncryptionKey, KeyError, KeyStore, derive_or_load};
pub use store::{EncryptedStore, StoreError};

use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Writes `contents` to `path` via a temp file and rename.
///
/// Creates missing parent directories and restricts the result to the owner
/// on Unix.
pub(crate) fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp_path = path.with_extension("tmp");

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    {
        let mut file = options.open(&temp_path)?;

        // `mode` only applies to newly created files; a stale temp file keeps its own.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
        }

        file.write_all(contents)?;
        file.sync_all()?;
    }

    fs::rename(&temp_path, path)
}
