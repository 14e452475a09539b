pub mod observer;
pub mod broadcaster;
pub mod pipes;

pub use observer::{ChannelObserver, ConsoleObserver, LineObserver, Observer, ObserverFrame, EXIT_MARKER};
pub use broadcaster::SnapshotBroadcaster;
pub use pipes::{pipe_path, watch, PipeSet};
