//! Reachability-gated SSH connections.
//!
//! Each attempt follows `Idle -> Probing -> {Connected | Unreachable}`, and a
//! connected session moves to `Closed` when closed. A session is never
//! attempted against a host the probe reports as unreachable.

pub mod probe;
pub mod ssh;

pub use probe::{IcmpProber, ProbeOutcome, Prober, TcpProber};
pub use ssh::{SessionError, SessionTarget, Ssh2Client, Ssh2Session, SshClient, SshSession};

use std::thread;

use tracing::{debug, info};

use crate::device::Device;

/// Probes sent per reachability check.
const PROBE_COUNT: u32 = 1;

/// Maximum probes in flight during [`ConnectionManager::probe_many`].
const MAX_PARALLEL_PROBES: usize = 16;

/// State of a connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Nothing attempted yet.
    Idle,
    /// Reachability probe in progress.
    Probing,
    /// Session established.
    Connected,
    /// Probe failed; no session was attempted.
    Unreachable,
    /// Session was closed.
    Closed,
}

impl ConnectionState {
    /// Returns a display string for the state.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Probing => "Probing",
            Self::Connected => "Connected",
            Self::Unreachable => "Unreachable",
            Self::Closed => "Closed",
        }
    }
}

/// A session opened for one device.
#[derive(Debug)]
pub struct Connection<S> {
    device: String,
    state: ConnectionState,
    session: Option<S>,
}

impl<S: SshSession> Connection<S> {
    /// Name of the device this connection belongs to.
    #[must_use]
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns true until the connection is closed.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Mutable access to the underlying session while open.
    pub fn session_mut(&mut self) -> Option<&mut S> {
        self.session.as_mut()
    }

    /// Runs a command on the open session.
    pub fn send_command(&mut self, command: &str) -> Result<String, SessionError> {
        match self.session.as_mut() {
            Some(session) => session.send_command(command),
            None => Err(SessionError::Channel(format!(
                "[{}] connection is closed",
                self.device
            ))),
        }
    }
}

/// Opens and closes sessions, gated on a reachability probe.
#[derive(Debug)]
pub struct ConnectionManager<P, C> {
    prober: P,
    client: C,
}

impl<P: Prober, C: SshClient> ConnectionManager<P, C> {
    /// Creates a manager from a prober and an SSH client.
    #[must_use]
    pub fn new(prober: P, client: C) -> Self {
        Self { prober, client }
    }

    /// Returns the prober.
    #[must_use]
    pub fn prober(&self) -> &P {
        &self.prober
    }

    /// Returns the SSH client.
    #[must_use]
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Probes `device` and, if it answers, opens an SSH session to it.
    ///
    /// Returns `Ok(None)` when the device is unreachable; the SSH client is
    /// not touched in that case. Session errors are returned as the client
    /// reported them.
    pub fn open(&self, device: &Device) -> Result<Option<Connection<C::Session>>, SessionError> {
        let mut state = ConnectionState::Idle;
        transition(&device.name, &mut state, ConnectionState::Probing);

        if !self.prober.probe(&device.address, PROBE_COUNT).is_reachable() {
            transition(&device.name, &mut state, ConnectionState::Unreachable);
            info!(device = %device.name, "[{}] Not reachable", device.name);
            return Ok(None);
        }

        info!(device = %device.name, "[{}] Reachable, getting connection...", device.name);

        let target = SessionTarget {
            address: &device.address,
            username: &device.username,
            password: &device.password,
            device_type: device.device_type(),
        };
        let session = self.client.connect(&target)?;

        transition(&device.name, &mut state, ConnectionState::Connected);
        info!(device = %device.name, "[{}] Connected", device.name);

        Ok(Some(Connection {
            device: device.name.clone(),
            state,
            session: Some(session),
        }))
    }

    /// Disconnects an open connection.
    ///
    /// Closing a connection that is already closed does nothing and returns
    /// `Ok(())`. The connection is marked closed even if the disconnect itself
    /// fails.
    pub fn close(&self, connection: &mut Connection<C::Session>) -> Result<(), SessionError> {
        let Some(mut session) = connection.session.take() else {
            debug!(device = %connection.device, "[{}] Already closed", connection.device);
            return Ok(());
        };

        let result = session.disconnect();
        transition(&connection.device, &mut connection.state, ConnectionState::Closed);
        result?;

        info!(device = %connection.device, "[{}] Disconnected", connection.device);
        Ok(())
    }

    /// Probes several devices concurrently without opening sessions.
    ///
    /// Results are returned in input order.
    pub fn probe_many(&self, devices: &[Device]) -> Vec<(String, ProbeOutcome)>
    where
        P: Sync,
    {
        let mut results = Vec::with_capacity(devices.len());

        for chunk in devices.chunks(MAX_PARALLEL_PROBES) {
            let outcomes: Vec<ProbeOutcome> = thread::scope(|scope| {
                let handles: Vec<_> = chunk
                    .iter()
                    .map(|device| {
                        let prober = &self.prober;
                        scope.spawn(move || prober.probe(&device.address, PROBE_COUNT))
                    })
                    .collect();

                handles
                    .into_iter()
                    .map(|handle| handle.join().unwrap_or(ProbeOutcome::Unreachable))
                    .collect()
            });

            for (device, outcome) in chunk.iter().zip(outcomes) {
                debug!(device = %device.name, "[{}] {}", device.name, outcome.as_str());
                results.push((device.name.clone(), outcome));
            }
        }

        results
    }
}

fn transition(device: &str, state: &mut ConnectionState, next: ConnectionState) {
    debug!(device = %device, "[{}] {} -> {}", device, state.as_str(), next.as_str());
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::rc::Rc;

    struct StaticProber {
        reachable: HashSet<String>,
    }

    impl StaticProber {
        fn new(reachable: &[&str]) -> Self {
            Self {
                reachable: reachable.iter().map(|s| (*s).to_string()).collect(),
            }
        }
    }

    impl Prober for StaticProber {
        fn probe(&self, address: &str, _count: u32) -> ProbeOutcome {
            if self.reachable.contains(address) {
                ProbeOutcome::Reachable
            } else {
                ProbeOutcome::Unreachable
            }
        }
    }

    #[derive(Debug, Default)]
    struct Log {
        connects: Vec<(String, String, String, String)>,
        disconnects: usize,
    }

    struct FakeClient {
        log: Rc<RefCell<Log>>,
        fail_auth: bool,
        fail_disconnect: bool,
    }

    #[derive(Debug)]
    struct FakeSession {
        log: Rc<RefCell<Log>>,
        fail_disconnect: bool,
    }

    impl SshSession for FakeSession {
        fn send_command(&mut self, command: &str) -> Result<String, SessionError> {
            Ok(format!("output of {command}"))
        }

        fn disconnect(&mut self) -> Result<(), SessionError> {
            self.log.borrow_mut().disconnects += 1;
            if self.fail_disconnect {
                return Err(SessionError::Disconnect("socket reset".to_string()));
            }
            Ok(())
        }
    }

    impl SshClient for FakeClient {
        type Session = FakeSession;

        fn connect(&self, target: &SessionTarget<'_>) -> Result<FakeSession, SessionError> {
            self.log.borrow_mut().connects.push((
                target.address.to_string(),
                target.username.to_string(),
                target.password.to_string(),
                target.device_type.to_string(),
            ));
            if self.fail_auth {
                return Err(SessionError::Auth("bad password".to_string()));
            }
            Ok(FakeSession {
                log: Rc::clone(&self.log),
                fail_disconnect: self.fail_disconnect,
            })
        }
    }

    fn manager(reachable: &[&str], fail_auth: bool) -> (ConnectionManager<StaticProber, FakeClient>, Rc<RefCell<Log>>) {
        let log = Rc::new(RefCell::new(Log::default()));
        let client = FakeClient {
            log: Rc::clone(&log),
            fail_auth,
            fail_disconnect: false,
        };
        (ConnectionManager::new(StaticProber::new(reachable), client), log)
    }

    fn device(name: &str, ip: &str) -> Device {
        Device::new(name, ip, "admin", "pw", "cisco_ios").unwrap()
    }

    #[test]
    fn test_unreachable_never_connects() {
        let (mgr, log) = manager(&[], false);

        let conn = mgr.open(&device("r1", "10.0.0.1")).unwrap();

        assert!(conn.is_none());
        assert!(log.borrow().connects.is_empty());
    }

    #[test]
    fn test_reachable_connects_with_device_credentials() {
        let (mgr, log) = manager(&["10.0.0.1"], false);

        let conn = mgr.open(&device("r1", "10.0.0.1")).unwrap().unwrap();

        assert_eq!(conn.state(), ConnectionState::Connected);
        assert_eq!(conn.device(), "r1");
        assert_eq!(
            log.borrow().connects,
            vec![(
                "10.0.0.1".to_string(),
                "admin".to_string(),
                "pw".to_string(),
                "cisco_ios".to_string()
            )]
        );
    }

    #[test]
    fn test_auth_failure_propagates() {
        let (mgr, _log) = manager(&["10.0.0.1"], true);

        let err = mgr.open(&device("r1", "10.0.0.1")).unwrap_err();

        assert!(matches!(err, SessionError::Auth(ref msg) if msg == "bad password"));
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mgr, log) = manager(&["10.0.0.1"], false);
        let mut conn = mgr.open(&device("r1", "10.0.0.1")).unwrap().unwrap();

        mgr.close(&mut conn).unwrap();
        mgr.close(&mut conn).unwrap();

        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(!conn.is_open());
        assert_eq!(log.borrow().disconnects, 1);
    }

    #[test]
    fn test_failed_disconnect_still_closes() {
        let log = Rc::new(RefCell::new(Log::default()));
        let client = FakeClient {
            log: Rc::clone(&log),
            fail_auth: false,
            fail_disconnect: true,
        };
        let mgr = ConnectionManager::new(StaticProber::new(&["10.0.0.1"]), client);
        let mut conn = mgr.open(&device("r1", "10.0.0.1")).unwrap().unwrap();

        let result = mgr.close(&mut conn);

        assert!(matches!(result, Err(SessionError::Disconnect(ref msg)) if msg == "socket reset"));
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(!conn.is_open());

        mgr.close(&mut conn).unwrap();
        assert_eq!(log.borrow().disconnects, 1);
    }

    #[test]
    fn test_send_command_after_close_fails() {
        let (mgr, _log) = manager(&["10.0.0.1"], false);
        let mut conn = mgr.open(&device("r1", "10.0.0.1")).unwrap().unwrap();

        assert_eq!(conn.send_command("show version").unwrap(), "output of show version");
        mgr.close(&mut conn).unwrap();
        assert!(matches!(conn.send_command("show version"), Err(SessionError::Channel(_))));
    }

    struct SyncProber;

    impl Prober for SyncProber {
        fn probe(&self, address: &str, _count: u32) -> ProbeOutcome {
            if address.ends_with(".1") {
                ProbeOutcome::Reachable
            } else {
                ProbeOutcome::Unreachable
            }
        }
    }

    #[test]
    fn test_probe_many_keeps_order() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mgr = ConnectionManager::new(
            SyncProber,
            FakeClient {
                log: Rc::clone(&log),
                fail_auth: false,
                fail_disconnect: false,
            },
        );
        let devices: Vec<Device> = (0..40)
            .map(|i| device(&format!("d{i}"), &format!("10.0.{i}.{}", i % 2)))
            .collect();

        let results = mgr.probe_many(&devices);

        assert_eq!(results.len(), 40);
        for (i, (name, outcome)) in results.iter().enumerate() {
            assert_eq!(name, &format!("d{i}"));
            assert_eq!(outcome.is_reachable(), i % 2 == 1);
        }
        assert!(log.borrow().connects.is_empty());
    }
}
