//! Command-line interface.
//!
//! Usage: ndct <COMMAND>
//!
//! Commands:
//!   device add <name> <ip> <user> <os>   Add a device (password is prompted)
//!   device remove <name>                 Remove a device
//!   device list                          List devices
//!   device show <name>                   Show one device
//!   connect <name> [command...]          Connect, optionally run a command
//!   probe [name...]                      Check reachability
//!   key init                             Create the encryption key
//!   --version, -v                        Show version
//!   --help, -h                           Show this help

use std::io::{self, Write};

use thiserror::Error;

use crate::connection::{ConnectionManager, Prober, SessionError, SshClient};
use crate::crypto::{KeyError, StoreError};
use crate::device::{Device, DeviceError};
use crate::prompt::SecretPrompt;
use crate::registry::{DeviceRegistry, RegistryError};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Usage text.
pub const USAGE: &str = "\
Usage: ndct <COMMAND>

Commands:
  device add <name> <ip> <user> <os>   Add a device (password is prompted)
  device remove <name>                 Remove a device
  device list                          List devices
  device show <name>                   Show one device
  connect <name> [command...]          Connect, optionally run a command
  probe [name...]                      Check reachability
  key init                             Create the encryption key
  --version, -v                        Show version
  --help, -h                           Show this help
";

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Add a device.
    AddDevice {
        /// Device name.
        name: String,
        /// Address.
        address: String,
        /// Username.
        username: String,
        /// OS type.
        os_type: String,
    },
    /// Remove a device.
    RemoveDevice(String),
    /// List devices.
    ListDevices,
    /// Show one device.
    ShowDevice(String),
    /// Connect to a device, running an optional command.
    Connect {
        /// Device name.
        name: String,
        /// Command to run once connected.
        command: Option<String>,
    },
    /// Probe the named devices, or all of them.
    Probe(Vec<String>),
    /// Make sure the encryption key exists.
    InitKey,
    /// Print version.
    Version,
    /// Print usage.
    Help,
}

/// CLI errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Arguments did not form a valid command.
    #[error("{0}\n\n{USAGE}")]
    Usage(String),

    /// Registry operation failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Encrypted storage failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Key could not be obtained.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// Device data was invalid.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// SSH session failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Named device does not exist.
    #[error("Device '{0}' not found")]
    UnknownDevice(String),

    /// Writing output or reading input failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Command {
    /// Parses arguments (without the program name).
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self, CliError> {
        let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();

        match args.as_slice() {
            [] | ["--help" | "-h" | "help"] => Ok(Self::Help),
            ["--version" | "-v" | "version"] => Ok(Self::Version),
            ["device", "add", name, address, username, os_type] => Ok(Self::AddDevice {
                name: (*name).to_string(),
                address: (*address).to_string(),
                username: (*username).to_string(),
                os_type: (*os_type).to_string(),
            }),
            ["device", "add", ..] => Err(usage("device add takes <name> <ip> <user> <os>")),
            ["device", "remove" | "rm", name] => Ok(Self::RemoveDevice((*name).to_string())),
            ["device", "list" | "ls"] => Ok(Self::ListDevices),
            ["device", "show", name] => Ok(Self::ShowDevice((*name).to_string())),
            ["connect", name, rest @ ..] => Ok(Self::Connect {
                name: (*name).to_string(),
                command: if rest.is_empty() {
                    None
                } else {
                    Some(rest.join(" "))
                },
            }),
            ["probe", names @ ..] => Ok(Self::Probe(
                names.iter().map(|n| (*n).to_string()).collect(),
            )),
            ["key", "init"] => Ok(Self::InitKey),
            [other, ..] => Err(usage(&format!("Unknown command: {}", other))),
        }
    }
}

fn usage(message: &str) -> CliError {
    CliError::Usage(message.to_string())
}

/// Handles commands that need no storage or network (help and version).
///
/// Other commands are ignored.
pub fn run_static(command: &Command, out: &mut dyn Write) -> Result<(), CliError> {
    match command {
        Command::Help => write!(out, "{USAGE}")?,
        Command::Version => writeln!(out, "ndct v{VERSION}")?,
        _ => {}
    }
    Ok(())
}

/// Executes a command against the registry and connection manager.
///
/// Commands that change the registry load it first and save it afterwards.
pub fn run<P, C>(
    command: Command,
    registry: &mut DeviceRegistry,
    manager: &ConnectionManager<P, C>,
    prompt: &dyn SecretPrompt,
    out: &mut dyn Write,
) -> Result<(), CliError>
where
    P: Prober + Sync,
    C: SshClient,
{
    match command {
        Command::Help | Command::Version => run_static(&command, out)?,
        Command::InitKey => {
            let keys = registry.store().keys();
            keys.key()?;
            writeln!(out, "Encryption key ready at {}", keys.path().display())?;
        }
        Command::AddDevice {
            name,
            address,
            username,
            os_type,
        } => {
            registry.load()?;
            if registry.contains(&name) {
                return Err(RegistryError::DuplicateName(name).into());
            }
            let password = prompt.read_secret("Device password: ")?;
            let device = Device::new(name, address, username, password, os_type)?;
            let name = device.name.clone();
            registry.add(device)?;
            registry.save()?;
            writeln!(out, "Added {}", name)?;
        }
        Command::RemoveDevice(name) => {
            registry.load()?;
            registry.remove(&name)?;
            registry.save()?;
            writeln!(out, "Removed {}", name)?;
        }
        Command::ListDevices => {
            registry.load()?;
            if registry.is_empty() {
                writeln!(out, "No devices")?;
            }
            for device in registry.iter() {
                writeln!(
                    out,
                    "{:<20} {:<40} {}",
                    device.name, device.address, device.os_type
                )?;
            }
        }
        Command::ShowDevice(name) => {
            registry.load()?;
            let device = registry
                .get(&name)
                .ok_or_else(|| CliError::UnknownDevice(name.clone()))?;
            writeln!(out, "name:     {}", device.name)?;
            writeln!(out, "ip:       {}", device.address)?;
            writeln!(out, "user:     {}", device.username)?;
            writeln!(out, "password: ********")?;
            writeln!(out, "os:       {}", device.os_type)?;
        }
        Command::Connect { name, command } => {
            registry.load()?;
            let device = registry
                .get(&name)
                .ok_or_else(|| CliError::UnknownDevice(name.clone()))?;

            let Some(mut connection) = manager.open(device)? else {
                writeln!(out, "[{}] Not reachable", name)?;
                return Ok(());
            };
            writeln!(out, "[{}] Connected", name)?;

            let output = match command {
                Some(cmd) => connection.send_command(&cmd).map(Some),
                None => Ok(None),
            };
            manager.close(&mut connection)?;

            if let Some(output) = output? {
                write!(out, "{}", output)?;
            }
            writeln!(out, "[{}] Disconnected", name)?;
        }
        Command::Probe(names) => {
            registry.load()?;
            let devices: Vec<Device> = if names.is_empty() {
                registry.iter().cloned().collect()
            } else {
                names
                    .iter()
                    .map(|n| {
                        registry
                            .get(n)
                            .cloned()
                            .ok_or_else(|| CliError::UnknownDevice(n.clone()))
                    })
                    .collect::<Result<_, _>>()?
            };

            for (name, outcome) in manager.probe_many(&devices) {
                writeln!(out, "{:<20} {}", name, outcome.as_str())?;
            }
        }
    }

    Ok(())
}
