//! Philosopher life cycle: think, get hungry, eat, put the forks down.
//!
//! The only place a philosopher looks at the terminate flag is the top of the
//! think phase, so a stop request lets every philosopher finish the cycle it
//! is in (including waiting to be promoted) before it leaves the table.

use crate::core::delay::{pause, DelayPolicy, Phase};
use crate::table::{Arbiter, RunControl};
use std::sync::Arc;
use tokio::sync::Barrier;
use tracing::{debug, info, info_span, Instrument};

pub struct Philosopher {
    id: usize,
    arbiter: Arc<Arbiter>,
    control: Arc<RunControl>,
    delays: Arc<dyn DelayPolicy>,
    seated: Option<Arc<Barrier>>,
}

impl Philosopher {
    pub fn new(
        id: usize,
        arbiter: Arc<Arbiter>,
        control: Arc<RunControl>,
        delays: Arc<dyn DelayPolicy>,
    ) -> Self {
        Self {
            id,
            arbiter,
            control,
            delays,
            seated: None,
        }
    }

    /// Wait on `barrier` after entering the loop, so the caller can tell
    /// when everybody is seated
    pub fn with_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.seated = Some(barrier);
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Run until termination is observed. Returns the number of meals eaten.
    pub async fn run(self) -> u64 {
        let span = info_span!("philosopher", id = self.id);
        self.dine().instrument(span).await
    }

    async fn dine(self) -> u64 {
        info!("sat down");
        if let Some(barrier) = &self.seated {
            barrier.wait().await;
        }

        let mut meals = 0;
        while !self.control.is_terminated() {
            pause(self.delays.delay(self.id, Phase::Think)).await;

            self.arbiter.request(self.id).await;
            meals += 1;
            debug!(meals, "eating");

            pause(self.delays.delay(self.id, Phase::Eat)).await;
            self.arbiter.release(self.id).await;
        }

        info!(meals, "left the table");
        meals
    }
}
