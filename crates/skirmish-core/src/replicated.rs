//! Single-writer, multi-reader replicated values.
//!
//! The host mutates a [`Replicated`] through [`Replicated::set`]; every peer,
//! the host included, observes the write as a [`ValueChange`] drained from the
//! value. Non-host peers receive writes through [`Replicated::apply_remote`].
//!
//! Every host write bumps a version. Writes waiting to be put on the wire sit
//! in an outbox until the replication sweep takes them, so a burst of writes
//! within one tick is replicated in full and in order.

use crate::authority::AuthorityContext;
use crate::error::AuthorityError;
use crate::world::ConnectionId;

/// Monotonic per-value write counter.
pub type ReplicaVersion = u32;

/// Notification of a replicated write.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueChange<T> {
    pub previous: T,
    pub next: T,
    pub version: ReplicaVersion,
}

/// A value with host-only writes and change notification on every peer.
#[derive(Debug, Clone)]
pub struct Replicated<T: Clone + PartialEq> {
    value: T,
    version: ReplicaVersion,
    is_writer: bool,
    local_connection: ConnectionId,
    changes: Vec<ValueChange<T>>,
    outbox: Vec<(ReplicaVersion, T)>,
}

impl<T: Clone + PartialEq> Replicated<T> {
    /// Creates a value owned by whichever role `authority` describes.
    pub fn new(value: T, authority: &AuthorityContext) -> Self {
        Self {
            value,
            version: 0,
            is_writer: authority.is_authority,
            local_connection: authority.local_connection,
            changes: Vec::new(),
            outbox: Vec::new(),
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn version(&self) -> ReplicaVersion {
        self.version
    }

    /// Whether this instance lives on the host.
    pub fn is_writer(&self) -> bool {
        self.is_writer
    }

    /// Host-side write.
    ///
    /// Writing the current value is a no-op and returns `Ok(false)`. On a
    /// non-host peer the value is left untouched and an error is returned.
    pub fn set(&mut self, value: T) -> Result<bool, AuthorityError> {
        if !self.is_writer {
            let err = AuthorityError::NotHost {
                operation: "write a replicated value",
                connection: self.local_connection,
            };
            tracing::warn!("[replica] {}", err);
            return Err(err);
        }
        if self.value == value {
            return Ok(false);
        }

        self.version = self.version.wrapping_add(1);
        let previous = std::mem::replace(&mut self.value, value);
        self.changes.push(ValueChange {
            previous,
            next: self.value.clone(),
            version: self.version,
        });
        self.outbox.push((self.version, self.value.clone()));
        Ok(true)
    }

    /// Applies a write received from the host.
    ///
    /// Versions that are not newer than the held one are dropped, which keeps
    /// the observed sequence in host order even if a stale frame shows up.
    /// Returns whether the write was applied.
    pub fn apply_remote(&mut self, version: ReplicaVersion, value: T) -> bool {
        if self.is_writer {
            tracing::warn!("[replica] Ignoring remote write on the authoritative copy");
            return false;
        }
        if version <= self.version {
            tracing::debug!(
                "[replica] Dropping stale write v{} (holding v{})",
                version,
                self.version
            );
            return false;
        }

        self.version = version;
        let previous = std::mem::replace(&mut self.value, value);
        if previous != self.value {
            self.changes.push(ValueChange {
                previous,
                next: self.value.clone(),
                version,
            });
        }
        true
    }

    /// Takes pending change notifications, oldest first.
    pub fn drain_changes(&mut self) -> Vec<ValueChange<T>> {
        std::mem::take(&mut self.changes)
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Takes host writes that still need to be replicated, oldest first.
    pub fn take_outbox(&mut self) -> Vec<(ReplicaVersion, T)> {
        std::mem::take(&mut self.outbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> AuthorityContext {
        AuthorityContext::host(1)
    }

    fn client() -> AuthorityContext {
        AuthorityContext::client(2, 1)
    }

    #[test]
    fn test_host_observes_own_write_synchronously() {
        let mut value = Replicated::new(1u32, &host());
        assert_eq!(value.set(5), Ok(true));

        assert_eq!(*value.get(), 5);
        let changes = value.drain_changes();
        assert_eq!(
            changes,
            vec![ValueChange {
                previous: 1,
                next: 5,
                version: 1
            }]
        );
        assert_eq!(value.take_outbox(), vec![(1, 5)]);
    }

    #[test]
    fn test_non_host_write_is_rejected() {
        let mut value = Replicated::new(1u32, &client());

        assert!(value.set(9).is_err());
        assert_eq!(*value.get(), 1);
        assert_eq!(value.version(), 0);
        assert!(!value.has_changes());
        assert!(value.take_outbox().is_empty());
    }

    #[test]
    fn test_same_value_write_is_noop() {
        let mut value = Replicated::new(3u32, &host());
        assert_eq!(value.set(3), Ok(false));
        assert_eq!(value.version(), 0);
        assert!(value.drain_changes().is_empty());
    }

    #[test]
    fn test_every_write_in_a_burst_is_replicated() {
        let mut host_value = Replicated::new(0u32, &host());
        let mut peer_value = Replicated::new(0u32, &client());

        host_value.set(1).unwrap();
        host_value.set(2).unwrap();
        host_value.set(3).unwrap();

        for (version, v) in host_value.take_outbox() {
            peer_value.apply_remote(version, v);
        }

        let seen: Vec<u32> = peer_value.drain_changes().into_iter().map(|c| c.next).collect();
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn test_stale_remote_write_is_dropped() {
        let mut value = Replicated::new(0u32, &client());
        assert!(value.apply_remote(2, 20));
        assert!(!value.apply_remote(1, 10));
        assert!(!value.apply_remote(2, 30));

        assert_eq!(*value.get(), 20);
        assert_eq!(value.drain_changes().len(), 1);
    }

    #[test]
    fn test_authoritative_copy_ignores_remote_writes() {
        let mut value = Replicated::new(0u32, &host());
        assert!(!value.apply_remote(5, 50));
        assert_eq!(*value.get(), 0);
    }
}
