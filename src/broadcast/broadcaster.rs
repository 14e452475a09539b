//! Snapshot broadcaster
//!
//! Sleeps until the table changes or termination is requested, copies the
//! states and hands the copy to every observer. Observer failures are logged
//! and never stop the broadcaster.

use crate::broadcast::observer::Observer;
use crate::table::{RunControl, StateStore};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct SnapshotBroadcaster {
    store: Arc<StateStore>,
    control: Arc<RunControl>,
    observers: Vec<Arc<dyn Observer>>,
    sequence: u64,
}

impl SnapshotBroadcaster {
    pub fn new(store: Arc<StateStore>, observers: Vec<Arc<dyn Observer>>) -> Self {
        let control = store.control().clone();
        Self {
            store,
            control,
            observers,
            sequence: 0,
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Run until termination. Returns the number of snapshots published.
    pub async fn run(mut self) -> u64 {
        info!(observers = self.observers.len(), "broadcaster started");
        loop {
            self.control.changed().await;

            if self.control.take_dirty() {
                self.publish_snapshot().await;
            }

            if self.control.is_terminated() {
                self.publish_termination().await;
                break;
            }
        }
        info!(published = self.sequence, "broadcaster stopped");
        self.sequence
    }

    async fn publish_snapshot(&mut self) {
        let snapshot = self.store.snapshot(self.sequence).await;
        self.sequence += 1;
        debug!(sequence = snapshot.sequence, "publishing snapshot");

        let results = join_all(self.observers.iter().map(|o| o.publish(&snapshot))).await;
        for (observer, result) in self.observers.iter().zip(results) {
            if let Err(e) = result {
                warn!(observer = %observer.name(), error = %e, "snapshot not delivered");
            }
        }
    }

    async fn publish_termination(&self) {
        let results = join_all(self.observers.iter().map(|o| o.publish_termination())).await;
        for (observer, result) in self.observers.iter().zip(results) {
            if let Err(e) = result {
                warn!(observer = %observer.name(), error = %e, "termination not delivered");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::{DiningError, Result};
    use crate::table::{PhilState, Snapshot};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        snapshots: Mutex<Vec<Snapshot>>,
        terminations: Mutex<u32>,
    }

    #[async_trait]
    impl Observer for Recorder {
        fn name(&self) -> String {
            "recorder".to_string()
        }

        async fn publish(&self, snapshot: &Snapshot) -> Result<()> {
            self.snapshots.lock().await.push(snapshot.clone());
            Ok(())
        }

        async fn publish_termination(&self) -> Result<()> {
            *self.terminations.lock().await += 1;
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl Observer for Broken {
        fn name(&self) -> String {
            "broken".to_string()
        }

        async fn publish(&self, _snapshot: &Snapshot) -> Result<()> {
            Err(DiningError::task_failed("broken", "always fails"))
        }

        async fn publish_termination(&self) -> Result<()> {
            Err(DiningError::task_failed("broken", "always fails"))
        }
    }

    fn store(actors: usize) -> Arc<StateStore> {
        Arc::new(StateStore::new(actors, Arc::new(RunControl::new())).unwrap())
    }

    #[tokio::test]
    async fn test_publishes_change_then_terminates() {
        let store = store(2);
        let recorder = Arc::new(Recorder::default());
        let observers: Vec<Arc<dyn Observer>> = vec![recorder.clone()];
        let task = tokio::spawn(SnapshotBroadcaster::new(store.clone(), observers).run());

        store.lock().await.write(1, PhilState::Hungry);
        while recorder.snapshots.lock().await.is_empty() {
            tokio::task::yield_now().await;
        }
        store.control().request_terminate();

        let published = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("broadcaster should stop on terminate")
            .unwrap();
        assert_eq!(published, 1);

        let snapshots = recorder.snapshots.lock().await;
        assert_eq!(snapshots[0].states, vec![PhilState::Thinking, PhilState::Hungry]);
        assert_eq!(snapshots[0].sequence, 0);
        assert_eq!(*recorder.terminations.lock().await, 1);
    }

    #[tokio::test]
    async fn test_idle_table_publishes_nothing() {
        let store = store(3);
        let recorder = Arc::new(Recorder::default());
        let observers: Vec<Arc<dyn Observer>> = vec![recorder.clone()];
        let task = tokio::spawn(SnapshotBroadcaster::new(store.clone(), observers).run());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(recorder.snapshots.lock().await.is_empty());

        store.control().request_terminate();
        assert_eq!(task.await.unwrap(), 0);
        assert_eq!(*recorder.terminations.lock().await, 1);
    }

    #[tokio::test]
    async fn test_failing_observer_does_not_block_others() {
        let store = store(1);
        let recorder = Arc::new(Recorder::default());
        let observers: Vec<Arc<dyn Observer>> = vec![Arc::new(Broken), recorder.clone()];
        let broadcaster = SnapshotBroadcaster::new(store.clone(), observers);
        assert_eq!(broadcaster.observer_count(), 2);

        store.lock().await.write(0, PhilState::Eating);
        store.control().request_terminate();
        broadcaster.run().await;

        // dirty and terminate were both set: the last change still goes out
        assert_eq!(recorder.snapshots.lock().await.len(), 1);
        assert_eq!(*recorder.terminations.lock().await, 1);
    }
}
