//! Fork arbitration
//!
//! A philosopher never picks up forks one at a time. It announces that it is
//! hungry, and the arbiter promotes it to eating only when neither neighbor
//! is eating; the promotion happens under the store lock in one step. Since a
//! hungry philosopher holds no fork there is no hold-and-wait, and therefore
//! no circular wait.
//!
//! The promotion check runs in exactly three places: when a philosopher gets
//! hungry (for itself) and when it stops eating (for its left, then its right
//! neighbor). After every critical section each hungry philosopher has at
//! least one eating neighbor, which is what guarantees it will be woken.

use crate::table::state::PhilState;
use crate::table::store::{StateStore, StoreGuard};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::debug;

/// Per-philosopher request and meal counters
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArbiterStats {
    /// Times each philosopher became hungry
    pub requests: Vec<u64>,
    /// Times each philosopher was promoted to eating
    pub meals: Vec<u64>,
}

impl ArbiterStats {
    pub fn total_meals(&self) -> u64 {
        self.meals.iter().sum()
    }
}

#[derive(Debug, Default)]
struct Seat {
    /// Single-permit wake signal: set by a promotion, consumed by `wait_turn`
    wake: Notify,
    requests: AtomicU64,
    promotions: AtomicU64,
}

/// The take/put-forks algorithm over a `StateStore`
#[derive(Debug)]
pub struct Arbiter {
    store: Arc<StateStore>,
    seats: Vec<Seat>,
}

impl Arbiter {
    pub fn new(store: Arc<StateStore>) -> Self {
        let seats = (0..store.len()).map(|_| Seat::default()).collect();
        Self { store, seats }
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn len(&self) -> usize {
        self.seats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }

    /// Take both forks. Returns once `id` is eating.
    pub async fn request(&self, id: usize) {
        if !self.begin_request(id).await {
            debug!(philosopher = id, "waiting for neighbors");
        }
        self.wait_turn(id).await;
    }

    /// Announce hunger and try to eat right away, without waiting.
    ///
    /// Returns whether `id` was promoted immediately. Either way the wake
    /// signal is (or will be) fired, so every call must be followed by
    /// exactly one `wait_turn(id)`.
    pub async fn begin_request(&self, id: usize) -> bool {
        let mut guard = self.store.lock().await;
        guard.write(id, PhilState::Hungry);
        self.seats[id].requests.fetch_add(1, Ordering::Relaxed);
        self.try_promote(&mut guard, id)
    }

    /// Block until `id` has been promoted
    pub async fn wait_turn(&self, id: usize) {
        self.seats[id].wake.notified().await;
    }

    /// Put both forks down and let hungry neighbors eat.
    ///
    /// Releasing a philosopher that is already thinking leaves it thinking
    /// but still re-checks both neighbors.
    pub async fn release(&self, id: usize) {
        let mut guard = self.store.lock().await;
        guard.write(id, PhilState::Thinking);
        let ring = guard.ring();
        self.try_promote(&mut guard, ring.left(id));
        self.try_promote(&mut guard, ring.right(id));
    }

    /// Run the promotion check over every seat. Returns how many were promoted.
    pub async fn sweep(&self) -> usize {
        let mut guard = self.store.lock().await;
        (0..self.seats.len())
            .filter(|&id| self.try_promote(&mut guard, id))
            .count()
    }

    /// Promote `id` to eating if it is hungry and neither neighbor eats.
    fn try_promote(&self, guard: &mut StoreGuard<'_>, id: usize) -> bool {
        let ring = guard.ring();
        // With one seat both neighbors are `id` itself, which is hungry
        // here, so a philosopher never blocks on its own state.
        if guard.read(id) == PhilState::Hungry
            && guard.read(ring.left(id)) != PhilState::Eating
            && guard.read(ring.right(id)) != PhilState::Eating
        {
            guard.write(id, PhilState::Eating);
            let seat = &self.seats[id];
            seat.promotions.fetch_add(1, Ordering::Relaxed);
            seat.wake.notify_one();
            debug!(philosopher = id, "promoted");
            true
        } else {
            false
        }
    }

    pub fn stats(&self) -> ArbiterStats {
        ArbiterStats {
            requests: self
                .seats
                .iter()
                .map(|s| s.requests.load(Ordering::Relaxed))
                .collect(),
            meals: self
                .seats
                .iter()
                .map(|s| s.promotions.load(Ordering::Relaxed))
                .collect(),
        }
    }
}
