//! Think and eat durations
//!
//! The simulated work a philosopher does is a pause of random length. The
//! source of those lengths is a `DelayPolicy` so tests can run with fixed or
//! zero delays instead of real seconds.

use crate::core::config::TableConfig;
use std::time::Duration;

/// Which part of the life cycle a delay is drawn for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Think,
    Eat,
}

/// Source of think/eat durations
pub trait DelayPolicy: Send + Sync {
    /// Duration philosopher `id` spends in `phase` this cycle
    fn delay(&self, id: usize, phase: Phase) -> Duration;
}

/// Uniformly distributed delays over inclusive ranges
#[derive(Debug, Clone)]
pub struct UniformDelay {
    think: (Duration, Duration),
    eat: (Duration, Duration),
}

impl UniformDelay {
    pub fn new(think: (Duration, Duration), eat: (Duration, Duration)) -> Self {
        Self { think, eat }
    }

    pub fn from_config(config: &TableConfig) -> Self {
        Self::new(
            (config.think_min, config.think_max),
            (config.eat_min, config.eat_max),
        )
    }

    fn draw(range: (Duration, Duration)) -> Duration {
        let (min, max) = range;
        if max <= min {
            return min;
        }
        let lo = min.as_nanos().min(u64::MAX as u128) as u64;
        let hi = max.as_nanos().min(u64::MAX as u128) as u64;
        Duration::from_nanos(fastrand::u64(lo..=hi))
    }
}

impl DelayPolicy for UniformDelay {
    fn delay(&self, _id: usize, phase: Phase) -> Duration {
        match phase {
            Phase::Think => Self::draw(self.think),
            Phase::Eat => Self::draw(self.eat),
        }
    }
}

/// The same delay for every phase; `FixedDelay::zero()` for tests
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedDelay(pub Duration);

impl FixedDelay {
    pub fn zero() -> Self {
        Self(Duration::ZERO)
    }
}

impl DelayPolicy for FixedDelay {
    fn delay(&self, _id: usize, _phase: Phase) -> Duration {
        self.0
    }
}

/// Suspend for `duration`. A zero duration still yields to the scheduler.
pub async fn pause(duration: Duration) {
    if duration.is_zero() {
        tokio::task::yield_now().await;
    } else {
        tokio::time::sleep(duration).await;
    }
}
