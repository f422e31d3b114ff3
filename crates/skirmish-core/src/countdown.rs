//! Pre-match countdown.
//!
//! The host writes a deadline once; peers compute `deadline - now` from their
//! own clock instead of receiving per-tick updates.

use std::time::Duration;

use crate::authority::AuthorityContext;
use crate::error::AuthorityError;
use crate::replicated::Replicated;

#[derive(Debug)]
pub struct CountdownCoordinator {
    authority: AuthorityContext,
    deadline: Replicated<Option<Duration>>,
    /// Set when the running countdown fired; cleared by the next start.
    fired: bool,
}

impl CountdownCoordinator {
    pub fn new(authority: AuthorityContext) -> Self {
        Self {
            deadline: Replicated::new(None, &authority),
            authority,
            fired: false,
        }
    }

    /// Starts (or restarts) the countdown. Returns the deadline.
    pub fn start(&mut self, now: Duration, duration: Duration) -> Result<Duration, AuthorityError> {
        self.authority.ensure_authority("start countdown")?;
        let deadline = now + duration;
        self.deadline.set(Some(deadline))?;
        self.fired = false;
        tracing::info!("[countdown] Started, fires at {:?}", deadline);
        Ok(deadline)
    }

    /// Cancels a running countdown. Returns whether anything was cancelled.
    ///
    /// Only possible before the deadline; once fired the countdown cannot be
    /// taken back.
    pub fn cancel(&mut self, now: Duration) -> Result<bool, AuthorityError> {
        self.authority.ensure_authority("cancel countdown")?;
        match *self.deadline.get() {
            Some(deadline) if !self.fired && now < deadline => {
                self.deadline.set(None)?;
                tracing::info!("[countdown] Cancelled with {:?} left", deadline - now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Host tick. Returns true exactly once per started countdown, on the
    /// first tick at or past the deadline.
    pub fn tick(&mut self, now: Duration) -> bool {
        if !self.authority.is_authority || self.fired {
            return false;
        }
        let Some(deadline) = *self.deadline.get() else {
            return false;
        };
        if now < deadline {
            return false;
        }

        self.fired = true;
        if let Err(err) = self.deadline.set(None) {
            tracing::warn!("[countdown] Failed to clear deadline: {}", err);
        }
        tracing::info!("[countdown] Reached zero");
        true
    }

    pub fn is_running(&self) -> bool {
        self.deadline.get().is_some()
    }

    pub fn deadline(&self) -> Option<Duration> {
        *self.deadline.get()
    }

    /// Time left as seen by this peer's clock.
    pub fn remaining(&self, now: Duration) -> Option<Duration> {
        self.deadline.get().map(|d| d.saturating_sub(now))
    }

    pub(crate) fn replica_mut(&mut self) -> &mut Replicated<Option<Duration>> {
        &mut self.deadline
    }
}
