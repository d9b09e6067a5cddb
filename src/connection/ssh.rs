//! SSH client backed by libssh2.
//!
//! The connection layer only needs two things from an SSH client: open an
//! authenticated session and disconnect it. [`SshClient`] and [`SshSession`]
//! capture that; [`Ssh2Client`] implements them with the `ssh2` crate.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use ssh2::{Channel, Session};
use thiserror::Error;
use tracing::debug;

use crate::device::DeviceType;

/// Default SSH port.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Default connect and I/O timeout.
pub const DEFAULT_SSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum command output kept in memory (4MB).
const MAX_OUTPUT_SIZE: u64 = 4 * 1024 * 1024;

/// Errors raised while establishing, using or tearing down a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// TCP connection failed.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// SSH handshake failed.
    #[error("SSH handshake failed: {0}")]
    Handshake(String),

    /// Server rejected the credentials.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Opening a channel or running a command failed.
    #[error("Channel error: {0}")]
    Channel(String),

    /// Disconnect failed.
    #[error("Disconnect failed: {0}")]
    Disconnect(String),
}

/// Everything needed to open a session to one device.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionTarget<'a> {
    /// Address or hostname.
    pub address: &'a str,
    /// Login username.
    pub username: &'a str,
    /// Login password.
    pub password: &'a str,
    /// Dialect of the remote side.
    pub device_type: DeviceType,
}

impl std::fmt::Debug for SessionTarget<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTarget")
            .field("address", &self.address)
            .field("username", &self.username)
            .field("device_type", &self.device_type)
            .finish_non_exhaustive()
    }
}

/// An open SSH session.
pub trait SshSession {
    /// Runs a command and returns its output.
    fn send_command(&mut self, command: &str) -> Result<String, SessionError>;

    /// Terminates the session.
    fn disconnect(&mut self) -> Result<(), SessionError>;
}

/// Opens SSH sessions.
pub trait SshClient {
    /// Session type produced by this client.
    type Session: SshSession;

    /// Connects and authenticates.
    fn connect(&self, target: &SessionTarget<'_>) -> Result<Self::Session, SessionError>;
}

/// Password-authenticated SSH client.
#[derive(Debug, Clone)]
pub struct Ssh2Client {
    port: u16,
    timeout: Duration,
}

impl Ssh2Client {
    /// Creates a client for `port` with a connect/IO timeout.
    #[must_use]
    pub fn new(port: u16, timeout: Duration) -> Self {
        assert!(port > 0, "port must be greater than 0");
        Self { port, timeout }
    }

    fn open_tcp(&self, address: &str) -> Result<TcpStream, SessionError> {
        let addrs = (address, self.port)
            .to_socket_addrs()
            .map_err(|e| SessionError::Connect(format!("{}: {}", address, e)))?;

        let mut last_error = format!("{}: no addresses resolved", address);
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(tcp) => {
                    set_io_timeouts(&tcp, self.timeout)
                        .map_err(|e| SessionError::Connect(format!("{}: {}", addr, e)))?;
                    return Ok(tcp);
                }
                Err(e) => last_error = format!("{}: {}", addr, e),
            }
        }

        Err(SessionError::Connect(last_error))
    }
}

impl Default for Ssh2Client {
    fn default() -> Self {
        Self::new(DEFAULT_SSH_PORT, DEFAULT_SSH_TIMEOUT)
    }
}

impl SshClient for Ssh2Client {
    type Session = Ssh2Session;

    fn connect(&self, target: &SessionTarget<'_>) -> Result<Ssh2Session, SessionError> {
        let tcp = self.open_tcp(target.address)?;

        let mut session = Session::new().map_err(|e| SessionError::Handshake(e.to_string()))?;
        session.set_timeout(u32::try_from(self.timeout.as_millis()).unwrap_or(u32::MAX));
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| SessionError::Handshake(e.to_string()))?;

        session
            .userauth_password(target.username, target.password)
            .map_err(|e| SessionError::Auth(e.to_string()))?;
        if !session.authenticated() {
            return Err(SessionError::Auth("server did not accept password".to_string()));
        }

        debug!(
            "Authenticated to {} as {} ({})",
            target.address, target.username, target.device_type
        );

        Ok(Ssh2Session {
            session,
            device_type: target.device_type.clone(),
            connected: true,
        })
    }
}

/// Session opened by [`Ssh2Client`].
pub struct Ssh2Session {
    session: Session,
    device_type: DeviceType,
    connected: bool,
}

impl Ssh2Session {
    /// Returns the dialect this session was opened with.
    #[must_use]
    pub fn device_type(&self) -> &DeviceType {
        &self.device_type
    }

    fn channel(&self) -> Result<Channel, SessionError> {
        self.session
            .channel_session()
            .map_err(|e| SessionError::Channel(e.to_string()))
    }

    /// Runs a command on an exec channel.
    fn exec(&self, command: &str) -> Result<String, SessionError> {
        let mut channel = self.channel()?;
        channel
            .exec(command)
            .map_err(|e| SessionError::Channel(e.to_string()))?;
        read_and_close(channel)
    }

    /// Runs a command through an interactive shell, disabling paging first.
    fn shell(&self, command: &str) -> Result<String, SessionError> {
        let mut channel = self.channel()?;
        channel
            .request_pty("vt100", None, None)
            .map_err(|e| SessionError::Channel(e.to_string()))?;
        channel
            .shell()
            .map_err(|e| SessionError::Channel(e.to_string()))?;

        let mut script = String::new();
        if let Some(paging) = self.device_type.paging_command() {
            script.push_str(paging);
            script.push('\n');
        }
        script.push_str(command);
        script.push_str("\nexit\n");

        channel
            .write_all(script.as_bytes())
            .map_err(|e| SessionError::Channel(e.to_string()))?;
        channel
            .send_eof()
            .map_err(|e| SessionError::Channel(e.to_string()))?;
        read_and_close(channel)
    }
}

impl std::fmt::Debug for Ssh2Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ssh2Session")
            .field("device_type", &self.device_type)
            .field("connected", &self.connected)
            .finish_non_exhaustive()
    }
}

impl SshSession for Ssh2Session {
    fn send_command(&mut self, command: &str) -> Result<String, SessionError> {
        if !self.connected {
            return Err(SessionError::Channel("session is disconnected".to_string()));
        }

        if self.device_type.is_network_cli() {
            self.shell(command)
        } else {
            self.exec(command)
        }
    }

    fn disconnect(&mut self) -> Result<(), SessionError> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;
        self.session
            .disconnect(None, "Closed by ndct", None)
            .map_err(|e| SessionError::Disconnect(e.to_string()))
    }
}

/// Applies `timeout` to reads and writes on `tcp`. A zero timeout is rejected.
fn set_io_timeouts(tcp: &TcpStream, timeout: Duration) -> std::io::Result<()> {
    tcp.set_read_timeout(Some(timeout))?;
    tcp.set_write_timeout(Some(timeout))
}

fn read_and_close(channel: Channel) -> Result<String, SessionError> {
    let mut output = Vec::new();
    let mut limited = channel.take(MAX_OUTPUT_SIZE);
    limited
        .read_to_end(&mut output)
        .map_err(|e| SessionError::Channel(e.to_string()))?;

    let mut channel = limited.into_inner();
    channel
        .wait_close()
        .map_err(|e| SessionError::Channel(e.to_string()))?;
    Ok(String::from_utf8_lossy(&output).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_target_debug_hides_password() {
        let target = SessionTarget {
            address: "10.0.0.1",
            username: "admin",
            password: "hunter2",
            device_type: DeviceType::CiscoIos,
        };
        let debug = format!("{target:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("CiscoIos"));
    }

    #[test]
    fn test_io_timeouts_applied_and_zero_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let tcp = TcpStream::connect(listener.local_addr().unwrap()).unwrap();

        set_io_timeouts(&tcp, Duration::from_millis(750)).unwrap();
        assert_eq!(tcp.read_timeout().unwrap(), Some(Duration::from_millis(750)));
        assert_eq!(tcp.write_timeout().unwrap(), Some(Duration::from_millis(750)));

        assert!(set_io_timeouts(&tcp, Duration::ZERO).is_err());
    }

    #[test]
    fn test_connect_refused_is_connect_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = Ssh2Client::new(port, Duration::from_millis(300));
        let target = SessionTarget {
            address: "127.0.0.1",
            username: "admin",
            password: "pw",
            device_type: DeviceType::Linux,
        };

        let err = client.connect(&target).unwrap_err();
        assert!(matches!(err, SessionError::Connect(_)), "got {err:?}");
    }

    #[test]
    fn test_non_ssh_server_fails_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let _ = stream.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n");
            }
        });

        let client = Ssh2Client::new(port, Duration::from_secs(2));
        let target = SessionTarget {
            address: "127.0.0.1",
            username: "admin",
            password: "pw",
            device_type: DeviceType::Linux,
        };

        let err = client.connect(&target).unwrap_err();
        assert!(matches!(err, SessionError::Handshake(_)), "got {err:?}");
        let _ = server.join();
    }
}
