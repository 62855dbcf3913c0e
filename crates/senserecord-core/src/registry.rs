//! Registry of live sessions for long-running front-ends
//!
//! Each board identity maps to at most one [`RecordingSession`], held behind
//! its own mutex so every operation on a board is serialized while different
//! boards proceed independently. The registry is an owned value: construct
//! one per server process and hand it to request handlers.
//!
//! Connecting to a board happens under a per-identity gate, never under the
//! map lock. Session construction and throwaway status probes for the same
//! identity take the same gate, so a board never has two connections open.

use crate::catalog::{self, DeviceSpec};
use crate::driver::DeviceDriver;
use crate::error::{SessionError, SessionResult};
use crate::params::ConnectionParams;
use crate::session::{RecordingSession, SessionStatus};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared handle to a tracked session
pub type SharedSession = Arc<Mutex<RecordingSession>>;

type Gate = Arc<Mutex<()>>;

/// Keyed collection of live sessions, one per board identity
pub struct SessionRegistry {
    driver: Arc<dyn DeviceDriver>,
    sessions: Mutex<BTreeMap<&'static str, SharedSession>>,
    gates: Mutex<BTreeMap<&'static str, Gate>>,
}

fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Neither map holds invariants a panicking holder could break
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SessionRegistry {
    pub fn new(driver: Arc<dyn DeviceDriver>) -> Self {
        Self {
            driver,
            sessions: Mutex::new(BTreeMap::new()),
            gates: Mutex::new(BTreeMap::new()),
        }
    }

    /// Driver used for new sessions
    pub fn driver(&self) -> &dyn DeviceDriver {
        self.driver.as_ref()
    }

    fn map(&self) -> MutexGuard<'_, BTreeMap<&'static str, SharedSession>> {
        relock(&self.sessions)
    }

    fn gate(&self, device: &'static DeviceSpec) -> Gate {
        Arc::clone(relock(&self.gates).entry(device.name).or_default())
    }

    fn resolve(identity: &str) -> SessionResult<&'static DeviceSpec> {
        catalog::resolve(identity).ok_or_else(|| SessionError::UnknownDevice(identity.to_string()))
    }

    /// Return the tracked session for `identity`, creating it if needed
    ///
    /// An existing session keeps the connection params it was created with;
    /// `connection_params` only apply to a new session.
    pub fn get_or_create(
        &self,
        identity: &str,
        connection_params: ConnectionParams,
    ) -> SessionResult<SharedSession> {
        let device = Self::resolve(identity)?;
        if let Some(existing) = self.get(device.name) {
            return Ok(existing);
        }

        let gate = self.gate(device);
        let _slot = relock(&gate);
        // Another caller may have finished construction while we waited
        if let Some(existing) = self.get(device.name) {
            return Ok(existing);
        }

        let session = RecordingSession::new(device, connection_params, self.driver.as_ref())?;
        let shared = Arc::new(Mutex::new(session));
        self.map().insert(device.name, Arc::clone(&shared));
        tracing::info!(board = device.name, "Session registered");
        Ok(shared)
    }

    /// Current status of `identity`, probing the board
    ///
    /// A tracked session is pinged in place. An untracked board gets a
    /// throwaway session that is never registered and is dropped before the
    /// gate opens again.
    pub fn probe(
        &self,
        identity: &str,
        connection_params: ConnectionParams,
    ) -> SessionResult<SessionStatus> {
        let device = Self::resolve(identity)?;
        let gate = self.gate(device);
        let _slot = relock(&gate);

        if let Some(session) = self.get(device.name) {
            let mut guard = lock_session(&session);
            guard.ping();
            return Ok(guard.status());
        }
        let session = RecordingSession::new(device, connection_params, self.driver.as_ref())?;
        Ok(session.status())
    }

    /// Tracked session for `identity`, if any
    pub fn get(&self, identity: &str) -> Option<SharedSession> {
        self.map().get(identity).cloned()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.map().contains_key(identity)
    }

    /// Stop tracking `identity`
    pub fn remove(&self, identity: &str) -> Option<SharedSession> {
        let removed = self.map().remove(identity);
        if removed.is_some() {
            tracing::info!(board = identity, "Session removed from registry");
        }
        removed
    }

    /// Tracked identities in sorted order
    pub fn identities(&self) -> Vec<&'static str> {
        self.map().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }

    /// Status of every tracked session without probing the boards
    pub fn snapshot(&self) -> Vec<(&'static str, SessionStatus)> {
        let sessions: Vec<_> = self
            .map()
            .iter()
            .map(|(name, s)| (*name, Arc::clone(s)))
            .collect();
        sessions
            .into_iter()
            .map(|(name, s)| (name, lock_session(&s).status()))
            .collect()
    }
}

/// Lock a session, recovering from a poisoned mutex
///
/// Session methods leave the state consistent before any call that can
/// panic, so the inner value is still usable.
pub fn lock_session(session: &SharedSession) -> MutexGuard<'_, RecordingSession> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}
