//! The table: philosopher states, the exclusion lock guarding them and the
//! fork arbitration algorithm built on top.

pub mod state;
pub mod store;
pub mod arbiter;

pub use state::{PhilState, Ring, Snapshot};
pub use store::{RunControl, StateStore, StoreGuard};
pub use arbiter::{Arbiter, ArbiterStats};
