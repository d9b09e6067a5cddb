//! ndct
//!
//! Network device connection tool: an encrypted device inventory plus
//! reachability-gated SSH sessions.
//!
//! # Architecture
//!
//! - **Crypto Module**: Fernet tokens, passphrase-derived key file, encrypted files
//! - **Registry Module**: In-memory device list persisted as one encrypted file
//! - **Connection Module**: Reachability probes and SSH sessions
//! - **CLI Module**: Command parsing and execution
//!
//! # Usage
//!
//! ```no_run
//! use ndct::crypto::{EncryptedStore, KeyStore};
//! use ndct::prompt::TerminalPrompt;
//! use ndct::registry::DeviceRegistry;
//!
//! let keys = KeyStore::new("key.key".into(), Box::new(TerminalPrompt));
//! let mut registry = DeviceRegistry::new(EncryptedStore::new("db".into(), keys));
//! registry.load().expect("Failed to load devices");
//! for name in registry.names() {
//!     println!("{}", name);
//! }
//! ```

// Clippy configuration - allow common patterns
#![allow(clippy::unnested_or_patterns)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::similar_names)]

pub mod cli;
pub mod config;
pub mod connection;
pub mod crypto;
pub mod device;
pub mod logging;
pub mod prompt;
pub mod registry;

// Re-export main types
pub use config::Config;
pub use connection::{ConnectionManager, ProbeOutcome, Prober, SshClient, SshSession};
pub use crypto::{EncryptedStore, KeyStore};
pub use device::{Device, DeviceType};
pub use registry::DeviceRegistry;
