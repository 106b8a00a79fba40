//! Outbound message table.
//!
//! Holds every submitted message until its confirmation arrives.  The
//! entry is removed (and the message handle dropped, which releases it)
//! only from [`Outbox::resolve`], which the session calls from inside the
//! confirmation callback.

use heapless::Vec;

use super::message::TrackingId;

/// Hard upper bound on unconfirmed messages.
pub const OUTBOX_CAPACITY: usize = 16;

pub struct Outbox<M> {
    pending: Vec<(TrackingId, M), OUTBOX_CAPACITY>,
    counter: u32,
    limit: usize,
}

impl<M> Outbox<M> {
    /// `limit` is clamped to `1..=OUTBOX_CAPACITY`.
    pub fn new(limit: usize) -> Self {
        Self {
            pending: Vec::new(),
            counter: 0,
            limit: limit.clamp(1, OUTBOX_CAPACITY),
        }
    }

    /// Assign the next tracking id.  Starts at 1 and wraps on overflow.
    pub fn next_id(&mut self) -> TrackingId {
        self.counter = self.counter.wrapping_add(1);
        TrackingId(self.counter)
    }

    /// Last id handed out (0 before the first send).
    pub fn last_id(&self) -> TrackingId {
        TrackingId(self.counter)
    }

    pub fn is_full(&self) -> bool {
        self.pending.len() >= self.limit
    }

    /// Park `message` until its confirmation.  Gives the message back if
    /// the table is full.
    pub fn insert(&mut self, id: TrackingId, message: M) -> Result<(), M> {
        if self.is_full() {
            return Err(message);
        }
        self.pending.push((id, message)).map_err(|(_, m)| m)
    }

    pub fn get(&self, id: TrackingId) -> Option<&M> {
        self.pending.iter().find(|(t, _)| *t == id).map(|(_, m)| m)
    }

    /// Remove and return the message for `id`.  `None` for unknown or
    /// already resolved ids.
    pub fn resolve(&mut self, id: TrackingId) -> Option<M> {
        let idx = self.pending.iter().position(|(t, _)| *t == id)?;
        Some(self.pending.swap_remove(idx).1)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
