//! Authority context handed to every component at construction.
//!
//! Nothing in the core asks "am I the host?" through global state; each
//! component receives a copy of this value instead.

use crate::error::AuthorityError;
use crate::world::ConnectionId;

/// Which peer this process is, and which peer holds authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorityContext {
    /// True on the single peer allowed to write replicated values.
    pub is_authority: bool,
    /// Connection id of this peer.
    pub local_connection: ConnectionId,
    /// Connection id of the host (equal to `local_connection` on the host).
    pub host_connection: ConnectionId,
}

impl AuthorityContext {
    /// Context for the authoritative peer.
    pub const fn host(connection: ConnectionId) -> Self {
        Self {
            is_authority: true,
            local_connection: connection,
            host_connection: connection,
        }
    }

    /// Context for a non-authoritative peer connected to `host`.
    pub const fn client(connection: ConnectionId, host: ConnectionId) -> Self {
        Self {
            is_authority: false,
            local_connection: connection,
            host_connection: host,
        }
    }

    /// Fails with [`AuthorityError::NotHost`] unless this peer is the host.
    /// Every refusal is logged at warn.
    pub fn ensure_authority(&self, operation: &'static str) -> Result<(), AuthorityError> {
        if self.is_authority {
            return Ok(());
        }
        let err = AuthorityError::NotHost {
            operation,
            connection: self.local_connection,
        };
        tracing::warn!("[authority] {}", err);
        Err(err)
    }

    /// Whether `connection` refers to this peer.
    pub fn is_local(&self, connection: ConnectionId) -> bool {
        self.local_connection == connection
    }
}
