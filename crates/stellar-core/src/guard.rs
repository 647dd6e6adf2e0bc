//! Claim-and-apply for state transitions.
//!
//! A transition is written as a closure that reads current state and
//! either reports the transition as already done or proposes a
//! [`ChangeSet`] whose checks encode its precondition. The guard commits
//! that change set. When the commit conflicts, the closure runs again on
//! fresh state: if someone else completed the transition it now reports
//! [`Attempt::Done`] and the caller gets [`Claim::AlreadyDone`]. A conflict
//! on an unrelated row of the same change set (another transition touched
//! the same planet) is re-evaluated a bounded number of times.

use crate::error::StoreError;
use crate::store::{ChangeSet, CommitOutcome, Store};

/// What one evaluation of a transition found.
#[derive(Debug)]
pub enum Attempt<T> {
    /// The precondition no longer holds; nothing to do.
    Done,
    /// Commit these changes; `T` is handed back on success.
    Commit(ChangeSet, T),
}

/// Result of a guarded transition. Only `Applied` changed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim<T> {
    Applied(T),
    /// Another worker already performed the transition.
    AlreadyDone,
    /// Kept losing to concurrent writers without the transition being
    /// done. Nothing was written.
    Contended,
}

/// Default number of evaluations before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

#[derive(Debug, Clone, Copy)]
pub struct IdempotencyGuard {
    max_attempts: u32,
}

impl Default for IdempotencyGuard {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl IdempotencyGuard {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Run `attempt` until its change set commits, the transition turns
    /// out to be done, or the attempts are used up.
    pub fn run<T, E>(
        &self,
        store: &dyn Store,
        what: &str,
        mut attempt: impl FnMut() -> Result<Attempt<T>, E>,
    ) -> Result<Claim<T>, E>
    where
        E: From<StoreError>,
    {
        for n in 1..=self.max_attempts {
            let (changes, value) = match attempt()? {
                Attempt::Done => {
                    tracing::debug!(transition = what, attempt = n, "transition already done");
                    return Ok(Claim::AlreadyDone);
                }
                Attempt::Commit(changes, value) => (changes, value),
            };
            match store.commit(changes)? {
                CommitOutcome::Applied => return Ok(Claim::Applied(value)),
                CommitOutcome::Conflict => {
                    tracing::debug!(transition = what, attempt = n, "claim conflicted, re-reading");
                }
            }
        }
        tracing::warn!(transition = what, attempts = self.max_attempts, "transition contended");
        Ok(Claim::Contended)
    }
}
