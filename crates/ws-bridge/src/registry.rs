use std::fmt;
use std::sync::{Mutex, PoisonError};

use crate::peer::PeerHandle;

/// The two fixed endpoints of the bridge. Never extended at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The loopback-restricted sender side.
    Device,
    /// The LAN-reachable receiver side.
    Client,
}

impl Role {
    /// The role a connection of this role forwards to.
    pub fn opposite(self) -> Role {
        match self {
            Role::Device => Role::Client,
            Role::Client => Role::Device,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Device => "device",
            Role::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-wide registry holding at most one active connection per role.
///
/// Slots are overwritten whenever a new connection for their role is
/// accepted, and are never cleared when a connection ends. A slot says
/// nothing about whether its occupant is still usable — forwarders re-check
/// [`PeerHandle::is_open`] at send time rather than trusting the slot.
pub struct ConnectionRegistry {
    device: Mutex<Option<PeerHandle>>,
    client: Mutex<Option<PeerHandle>>,
}

impl ConnectionRegistry {
    /// Create a registry with both slots empty.
    pub fn new() -> Self {
        Self {
            device: Mutex::new(None),
            client: Mutex::new(None),
        }
    }

    fn slot(&self, role: Role) -> &Mutex<Option<PeerHandle>> {
        match role {
            Role::Device => &self.device,
            Role::Client => &self.client,
        }
    }

    /// Install `peer` as the active connection for `role`, returning the
    /// displaced occupant if the slot was taken.
    ///
    /// The displaced connection is not closed and its relay loop is not
    /// notified; it keeps running against its own socket until that socket
    /// closes.
    pub fn install(&self, role: Role, peer: PeerHandle) -> Option<PeerHandle> {
        self.slot(role)
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(peer)
    }

    /// The current occupant of `role`'s slot, if any. Never blocks beyond a
    /// momentary uncontended lock and never fails.
    pub fn peer(&self, role: Role) -> Option<PeerHandle> {
        self.slot(role)
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
