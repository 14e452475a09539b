//! Philosopher states, the seating ring and snapshots

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a philosopher is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhilState {
    #[default]
    Thinking,
    /// Waiting for both forks; holds neither
    Hungry,
    /// Holds both forks
    Eating,
}

impl PhilState {
    /// Single-letter code used by the table view
    pub fn letter(self) -> char {
        match self {
            Self::Thinking => 'T',
            Self::Hungry => 'H',
            Self::Eating => 'E',
        }
    }

    /// First-person status line used by the per-philosopher view
    pub fn sentence(self) -> &'static str {
        match self {
            Self::Thinking => "I am thinking right now",
            Self::Hungry => "I am hungry right now",
            Self::Eating => "I am eating right now",
        }
    }
}

impl fmt::Display for PhilState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Thinking => "thinking",
            Self::Hungry => "hungry",
            Self::Eating => "eating",
        };
        f.write_str(name)
    }
}

/// Seating of `len` philosophers around a round table.
///
/// Philosopher `i` shares a fork with `left(i)` and one with `right(i)`.
/// With a single philosopher both neighbors are the philosopher itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ring {
    len: usize,
}

impl Ring {
    /// `len` must be at least 1; `StateStore::new` rejects an empty table
    pub(crate) fn new(len: usize) -> Self {
        debug_assert!(len > 0, "a ring needs at least one seat");
        Self { len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn left(&self, id: usize) -> usize {
        (id + self.len - 1) % self.len
    }

    pub fn right(&self, id: usize) -> usize {
        (id + 1) % self.len
    }
}

/// Point-in-time copy of every philosopher's state, indexed by id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Position of this snapshot in the broadcaster's output
    pub sequence: u64,
    pub states: Vec<PhilState>,
}

impl Snapshot {
    pub fn new(sequence: u64, states: Vec<PhilState>) -> Self {
        Self { sequence, states }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn get(&self, id: usize) -> Option<PhilState> {
        self.states.get(id).copied()
    }

    /// `(id, state)` pairs in seat order
    pub fn iter(&self) -> impl Iterator<Item = (usize, PhilState)> + '_ {
        self.states.iter().copied().enumerate()
    }

    /// Ids of the philosophers currently eating
    pub fn eating(&self) -> Vec<usize> {
        self.iter()
            .filter(|(_, s)| *s == PhilState::Eating)
            .map(|(id, _)| id)
            .collect()
    }

    /// True when no two neighbors are eating at once
    pub fn is_safe(&self) -> bool {
        safe(&self.states)
    }
}

/// Checks the table invariant over a full state vector
pub(crate) fn safe(states: &[PhilState]) -> bool {
    if states.len() < 2 {
        return true;
    }
    let ring = Ring::new(states.len());
    states.iter().enumerate().all(|(id, s)| {
        *s != PhilState::Eating || states[ring.right(id)] != PhilState::Eating
    })
}
