// Core infrastructure modules
pub mod core {
    pub mod errors;
    pub mod config;
    pub mod delay;
}

pub mod table;        // States, exclusion lock and fork arbitration
pub mod philosopher;  // Per-philosopher life cycle
pub mod broadcast;    // Snapshot delivery to observers
pub mod coord;        // Startup and shutdown

// Re-exports for convenience
pub use core::errors::{DiningError, Result};
pub use core::config::{TableConfig, TableConfigBuilder};
pub use core::delay::{DelayPolicy, FixedDelay, Phase, UniformDelay};
pub use table::{Arbiter, ArbiterStats, PhilState, Ring, RunControl, Snapshot, StateStore};
pub use philosopher::Philosopher;
pub use broadcast::{
    pipe_path, watch, ChannelObserver, ConsoleObserver, LineObserver, Observer, ObserverFrame,
    PipeSet, SnapshotBroadcaster, EXIT_MARKER,
};
pub use coord::{Coordinator, ShutdownReport, SimulationHandle, StopHandle};
