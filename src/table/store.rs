//! Shared state of the table
//!
//! `StateStore` owns the N philosopher states behind one lock. Reads and
//! writes only happen through a `StoreGuard`, so holding the lock is enforced
//! by the type system rather than by convention. Every write marks the
//! `RunControl` dirty so the broadcaster knows there is something new to show.

use crate::core::errors::{DiningError, Result};
use crate::table::state::{self, PhilState, Ring, Snapshot};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, Notify};
use tracing::debug;

/// Process-wide run flags: `terminate` and `dirty`
///
/// Neither flag needs the store lock. `terminate` only ever goes from false
/// to true; `dirty` is set by writers and cleared by the single broadcaster.
#[derive(Debug, Default)]
pub struct RunControl {
    terminate: AtomicBool,
    dirty: AtomicBool,
    changed: Notify,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask everybody to stop. Returns true only for the call that flipped the flag.
    pub fn request_terminate(&self) -> bool {
        let first = !self.terminate.swap(true, Ordering::AcqRel);
        if first {
            self.changed.notify_one();
        }
        first
    }

    pub fn is_terminated(&self) -> bool {
        self.terminate.load(Ordering::Acquire)
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
        self.changed.notify_one();
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Clear the dirty flag, returning whether it was set
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    /// Wait until the table is dirty or termination was requested.
    ///
    /// Meant for a single waiter. A notification that arrives while nobody
    /// waits is kept as a permit, so a change between the flag check and the
    /// await is never lost.
    pub async fn changed(&self) {
        loop {
            if self.is_dirty() || self.is_terminated() {
                return;
            }
            self.changed.notified().await;
        }
    }
}

/// N philosopher states guarded by a single lock
#[derive(Debug)]
pub struct StateStore {
    states: Mutex<Vec<PhilState>>,
    ring: Ring,
    control: Arc<RunControl>,
}

impl StateStore {
    /// Every philosopher starts out thinking. A table needs at least one seat.
    pub fn new(actors: usize, control: Arc<RunControl>) -> Result<Self> {
        if actors == 0 {
            return Err(DiningError::configuration_field(
                "a table needs at least one philosopher",
                "actors",
            ));
        }
        Ok(Self {
            states: Mutex::new(vec![PhilState::Thinking; actors]),
            ring: Ring::new(actors),
            control,
        })
    }

    pub fn ring(&self) -> Ring {
        self.ring
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn control(&self) -> &Arc<RunControl> {
        &self.control
    }

    /// Acquire the exclusion lock
    pub async fn lock(&self) -> StoreGuard<'_> {
        StoreGuard {
            states: self.states.lock().await,
            ring: self.ring,
            control: &self.control,
        }
    }

    /// Copy all states under the lock
    pub async fn snapshot(&self, sequence: u64) -> Snapshot {
        let guard = self.states.lock().await;
        Snapshot::new(sequence, guard.clone())
    }
}

/// Exclusive access to the table; dropping it releases the lock
pub struct StoreGuard<'a> {
    states: MutexGuard<'a, Vec<PhilState>>,
    ring: Ring,
    control: &'a RunControl,
}

impl StoreGuard<'_> {
    pub fn ring(&self) -> Ring {
        self.ring
    }

    pub fn read(&self, id: usize) -> PhilState {
        self.states[id]
    }

    pub fn write(&mut self, id: usize, state: PhilState) {
        let previous = std::mem::replace(&mut self.states[id], state);
        debug!(philosopher = id, from = %previous, to = %state, "state change");
        debug_assert!(
            state != PhilState::Eating
                || self.ring.len() == 1
                || (self.states[self.ring.left(id)] != PhilState::Eating
                    && self.states[self.ring.right(id)] != PhilState::Eating),
            "philosopher {} started eating next to an eating neighbor",
            id
        );
        self.control.mark_dirty();
    }

    /// True when no two neighbors are eating
    pub fn is_safe(&self) -> bool {
        state::safe(&self.states)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_initial_state_is_thinking() {
        let store = StateStore::new(4, Arc::new(RunControl::new())).unwrap();
        let snap = store.snapshot(0).await;
        assert_eq!(snap.states, vec![PhilState::Thinking; 4]);
        assert!(!store.control().is_dirty());
    }

    #[tokio::test]
    async fn test_write_marks_dirty() {
        let control = Arc::new(RunControl::new());
        let store = StateStore::new(3, control.clone()).unwrap();
        {
            let mut guard = store.lock().await;
            guard.write(1, PhilState::Hungry);
            assert_eq!(guard.read(1), PhilState::Hungry);
        }
        assert!(control.take_dirty());
        assert!(!control.take_dirty());
    }

    #[test]
    fn test_empty_table_rejected() {
        let err = StateStore::new(0, Arc::new(RunControl::new())).unwrap_err();
        match err {
            DiningError::InvalidConfiguration { field, .. } => {
                assert_eq!(field.as_deref(), Some("actors"))
            }
            other => panic!("unexpected error {}", other),
        }
    }

    #[tokio::test]
    async fn test_terminate_flips_once() {
        let control = RunControl::new();
        assert!(control.request_terminate());
        assert!(!control.request_terminate());
        assert!(control.is_terminated());
    }

    #[tokio::test]
    async fn test_changed_wakes_on_dirty() {
        let control = Arc::new(RunControl::new());
        let waiter = {
            let control = control.clone();
            tokio::spawn(async move { control.changed().await })
        };
        tokio::task::yield_now().await;
        control.mark_dirty();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_changed_keeps_early_notification() {
        let control = RunControl::new();
        control.request_terminate();
        tokio::time::timeout(Duration::from_secs(1), control.changed())
            .await
            .expect("terminated control must not block");
    }
}
