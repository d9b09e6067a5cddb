//! Reachability probes.
//!
//! A probe answers a single question about an address: reachable or not.
//! Probe failures of any kind (timeout, unknown host, missing `ping` binary)
//! are reported as [`ProbeOutcome::Unreachable`].

use std::net::{TcpStream, ToSocketAddrs};
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::{debug, warn};

/// Default probe timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Result of a reachability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The host answered.
    Reachable,
    /// The probe timed out or the host could not be reached.
    Unreachable,
}

impl ProbeOutcome {
    /// Returns true if the host answered.
    #[must_use]
    pub fn is_reachable(&self) -> bool {
        matches!(self, Self::Reachable)
    }

    /// Returns a display string for the outcome.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reachable => "Reachable",
            Self::Unreachable => "Unreachable",
        }
    }
}

/// Checks whether an address is reachable.
pub trait Prober {
    /// Sends `count` probes to `address`.
    fn probe(&self, address: &str, count: u32) -> ProbeOutcome;
}

impl<P: Prober + ?Sized> Prober for Box<P> {
    fn probe(&self, address: &str, count: u32) -> ProbeOutcome {
        (**self).probe(address, count)
    }
}

/// ICMP echo through the system `ping` command.
#[derive(Debug, Clone)]
pub struct IcmpProber {
    timeout: Duration,
}

impl IcmpProber {
    /// Creates a prober with the given per-echo timeout.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Builds the platform `ping` invocation.
    fn command(&self, address: &str, count: u32) -> Command {
        let mut cmd = Command::new("ping");

        #[cfg(windows)]
        {
            let millis = self.timeout.as_millis().max(1);
            cmd.args(["-n", &count.to_string(), "-w", &millis.to_string()]);
        }

        #[cfg(target_os = "macos")]
        {
            let millis = self.timeout.as_millis().max(1);
            cmd.args(["-c", &count.to_string(), "-W", &millis.to_string()]);
        }

        #[cfg(all(unix, not(target_os = "macos")))]
        {
            let secs = self.timeout.as_secs().max(1);
            cmd.args(["-c", &count.to_string(), "-W", &secs.to_string()]);
        }

        cmd.arg(address);
        cmd
    }
}

impl Default for IcmpProber {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

impl Prober for IcmpProber {
    fn probe(&self, address: &str, count: u32) -> ProbeOutcome {
        // Addresses starting with '-' would be read as ping options.
        if address.is_empty() || address.starts_with('-') {
            return ProbeOutcome::Unreachable;
        }

        let status = self
            .command(address, count.max(1))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => ProbeOutcome::Reachable,
            Ok(status) => {
                debug!("ping {} exited with {}", address, status);
                ProbeOutcome::Unreachable
            }
            Err(e) => {
                warn!("Failed to run ping for {}: {}", address, e);
                ProbeOutcome::Unreachable
            }
        }
    }
}

/// TCP connect probe against a fixed port.
///
/// Works without ICMP privileges and through firewalls that drop echo.
#[derive(Debug, Clone)]
pub struct TcpProber {
    port: u16,
    timeout: Duration,
}

impl TcpProber {
    /// Creates a prober for `port` with a connect timeout.
    #[must_use]
    pub fn new(port: u16, timeout: Duration) -> Self {
        assert!(port > 0, "port must be greater than 0");
        Self { port, timeout }
    }
}

impl Prober for TcpProber {
    fn probe(&self, address: &str, count: u32) -> ProbeOutcome {
        let addrs: Vec<_> = match (address, self.port).to_socket_addrs() {
            Ok(addrs) => addrs.collect(),
            Err(e) => {
                debug!("Could not resolve {}: {}", address, e);
                return ProbeOutcome::Unreachable;
            }
        };

        for _ in 0..count.max(1) {
            for addr in &addrs {
                if TcpStream::connect_timeout(addr, self.timeout).is_ok() {
                    return ProbeOutcome::Reachable;
                }
            }
        }

        ProbeOutcome::Unreachable
    }
}
