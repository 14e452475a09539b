//! Simulation lifecycle: startup, stop requests and shutdown.

pub mod coordinator;

pub use coordinator::*;
