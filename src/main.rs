//! ndct - Main entry point.
//!
//! Network device connection tool: keeps an encrypted inventory of devices
//! and opens reachability-gated SSH sessions to them.
//!
//! Run `ndct --help` for the command list.
//!
//! Environment:
//!   NDCT_CONFIG        Config file path (default: ~/.ndctrc)
//!   NDCT_PASSPHRASE    Key passphrase for non-interactive use
//!   RUST_LOG           Overrides the configured log level

use std::env;
use std::io;
use std::process;

use ndct::cli::{self, Command};
use ndct::config::{Config, ProbeKind};
use ndct::connection::{ConnectionManager, IcmpProber, Prober, Ssh2Client, TcpProber};
use ndct::crypto::{EncryptedStore, KeyStore};
use ndct::logging;
use ndct::prompt::{FixedPrompt, SecretPrompt, TerminalPrompt};
use ndct::registry::DeviceRegistry;

/// Environment variable supplying the key passphrase.
const PASSPHRASE_ENV: &str = "NDCT_PASSPHRASE";

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().skip(1).collect();
    let command = Command::parse(&args)?;

    // Version and help don't need config or storage
    if matches!(command, Command::Version | Command::Help) {
        return cli::run_static(&command, &mut io::stdout()).map_err(Into::into);
    }

    let config = Config::load()?;
    if let Err(e) = logging::init(&config.log_config) {
        eprintln!("Warning: file logging disabled: {}", e);
    }
    tracing::debug!("Config loaded from {}", config.config_path.display());

    let key_prompt: Box<dyn SecretPrompt> = match env::var(PASSPHRASE_ENV) {
        Ok(passphrase) if !passphrase.is_empty() => Box::new(FixedPrompt::new(passphrase)),
        _ => Box::new(TerminalPrompt),
    };
    let keys = KeyStore::new(config.key_path.clone(), key_prompt);
    let store = EncryptedStore::new(config.db_path.clone(), keys);
    let mut registry = DeviceRegistry::new(store);

    let prober: Box<dyn Prober + Send + Sync> = match config.probe {
        ProbeKind::Icmp => Box::new(IcmpProber::new(config.probe_timeout)),
        ProbeKind::Tcp => Box::new(TcpProber::new(config.ssh_port, config.probe_timeout)),
    };
    let client = Ssh2Client::new(config.ssh_port, config.ssh_timeout);
    let manager = ConnectionManager::new(prober, client);

    let mut stdout = io::stdout();
    cli::run(command, &mut registry, &manager, &TerminalPrompt, &mut stdout)?;
    Ok(())
}
