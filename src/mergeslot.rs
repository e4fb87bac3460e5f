//! Merge slot: an at-most-one-holder coordination primitive.
//!
//! A merge slot is a single well-known entity, conventionally named
//! `<prefix>-merge-slot`, that competing agents or clones use to serialize
//! conflict resolution. It is not a lock in the OS sense — it is advisory,
//! and persisted in the same database as everything else so any client of
//! the workspace (daemon-routed or direct-mode) observes the same state.
//!
//! FIFO fairness is advisory only: the slot exposes its waiter queue, and
//! it is up to cooperating agents to honor ordering when deciding who
//! acquires next. See `SPEC_FULL.md` §4.H.

use crate::error::{BeadsError, Result};
use crate::storage::{MergeSlotRow, SqliteStorage};

/// Derive the well-known slot id for a workspace from its issue prefix.
///
/// Beads issue ids look like `<prefix>-<suffix>`; the merge slot for a
/// workspace with prefix `bd` is `bd-merge-slot`.
#[must_use]
pub fn slot_id_for_prefix(prefix: &str) -> String {
    format!("{prefix}-merge-slot")
}

/// Snapshot of a merge slot's state, as returned by `Check`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotStatus {
    pub available: bool,
    pub holder: String,
    pub waiters: Vec<String>,
}

impl From<MergeSlotRow> for SlotStatus {
    fn from(row: MergeSlotRow) -> Self {
        Self {
            available: row.is_available(),
            holder: row.holder,
            waiters: row.waiters,
        }
    }
}

/// Outcome of an `Acquire` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The caller now holds the slot.
    Acquired,
    /// The slot was already held; the caller was not enqueued (`wait` was
    /// false, or it was already the holder/waiter).
    Held,
    /// The slot was already held; the caller was enqueued at the given
    /// (1-based) position in the waiter list.
    Enqueued { position: usize },
}

/// Handle over one merge slot in one workspace's store.
///
/// Grounded on the same "domain wrapper over the transactional store"
/// shape as `crate::config`'s wrapper over `get_config`/`set_config`.
pub struct MergeSlot {
    slot_id: String,
}

impl MergeSlot {
    #[must_use]
    pub fn new(slot_id: impl Into<String>) -> Self {
        Self {
            slot_id: slot_id.into(),
        }
    }

    #[must_use]
    pub fn for_prefix(prefix: &str) -> Self {
        Self::new(slot_id_for_prefix(prefix))
    }

    #[must_use]
    pub fn slot_id(&self) -> &str {
        &self.slot_id
    }

    /// Idempotently create the slot in `status=open, holder="", waiters=[]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store operation fails.
    pub fn create(&self, storage: &mut SqliteStorage) -> Result<SlotStatus> {
        Ok(storage.ensure_merge_slot(&self.slot_id)?.into())
    }

    /// Return the current state, creating the slot first if it doesn't
    /// exist yet (a `Check` on a brand-new workspace should never fail).
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store operation fails.
    pub fn check(&self, storage: &mut SqliteStorage) -> Result<SlotStatus> {
        if let Some(row) = storage.get_merge_slot(&self.slot_id)? {
            return Ok(row.into());
        }
        self.create(storage)
    }

    /// Attempt to acquire the slot for `requester`.
    ///
    /// If the slot is available, it transitions to `held` and this returns
    /// `Acquired`. If it is already held, and `wait` is true, `requester` is
    /// appended to the waiter queue (deduplicated) and this returns
    /// `Enqueued`; with `wait` false it returns `Held` without mutating the
    /// waiter list. The caller decides whether to poll or give up — the
    /// slot has no notion of timeouts or callbacks.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store operation fails.
    pub fn acquire(
        &self,
        storage: &mut SqliteStorage,
        requester: &str,
        wait: bool,
    ) -> Result<AcquireOutcome> {
        storage.ensure_merge_slot(&self.slot_id)?;
        let row = storage.acquire_merge_slot(&self.slot_id, requester, wait)?;

        if row.holder == requester && row.status == "held" {
            return Ok(AcquireOutcome::Acquired);
        }
        if !wait {
            return Ok(AcquireOutcome::Held);
        }
        row.waiters
            .iter()
            .position(|w| w == requester)
            .map_or(Ok(AcquireOutcome::Held), |idx| {
                Ok(AcquireOutcome::Enqueued { position: idx + 1 })
            })
    }

    /// Release the slot.
    ///
    /// If `expected_holder` is given, it must match the current holder or
    /// this fails with [`BeadsError::MergeSlotHeld`]. The waiter list
    /// survives the release unchanged — it is the cooperating agents'
    /// responsibility to have the next waiter call `acquire`.
    ///
    /// # Errors
    ///
    /// Returns an error if `expected_holder` does not match, or the
    /// underlying store operation fails.
    pub fn release(
        &self,
        storage: &mut SqliteStorage,
        expected_holder: Option<&str>,
    ) -> Result<SlotStatus> {
        Ok(storage.release_merge_slot(&self.slot_id, expected_holder)?.into())
    }
}

/// Attempt to acquire `slot`, returning `Ok(true)` iff the caller now holds
/// it. Convenience wrapper for callers that don't care about queue position.
///
/// # Errors
///
/// Returns an error if the underlying store operation fails.
pub fn try_acquire(
    storage: &mut SqliteStorage,
    slot_id: &str,
    requester: &str,
) -> Result<bool> {
    match MergeSlot::new(slot_id).acquire(storage, requester, false)? {
        AcquireOutcome::Acquired => Ok(true),
        AcquireOutcome::Held | AcquireOutcome::Enqueued { .. } => Ok(false),
    }
}

/// Release `slot_id`, requiring `holder` to currently own it.
///
/// # Errors
///
/// Returns [`BeadsError::MergeSlotHeld`] if `holder` does not currently hold
/// the slot, or another error if the store operation fails.
pub fn release(storage: &mut SqliteStorage, slot_id: &str, holder: &str) -> Result<()> {
    MergeSlot::new(slot_id).release(storage, Some(holder)).map(|_| ())
}
