//! Leaky bucket used as a meter.
//!
//! Each admitted request raises the bucket level by one and a background task
//! lowers it by one every leak interval. Requests arriving while the bucket is
//! full are rejected outright; nothing is queued or delayed.

use std::num::NonZeroU64;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace};

use super::strategy::{Admission, AdmissionStrategy};

/// A leaky bucket meter with a fixed capacity and leak interval.
///
/// The level is only ever touched under a single lock, so an admission's
/// capacity check and increment can't interleave with another admission or
/// with a leak tick.
pub struct Meter {
    /// Admitted requests that have not leaked yet
    level: Mutex<u64>,
    /// Level at which requests start being rejected
    capacity: u64,
    /// Time between leak ticks
    leak_rate: Duration,
    /// Background task driving `leak`
    leaker: JoinHandle<()>,
}

impl Meter {
    /// Create a meter and spawn its leak task on the current tokio runtime.
    ///
    /// The first leak tick fires one full `leak_rate` after construction.
    /// The task stops when the returned meter is dropped.
    ///
    /// # Panics
    ///
    /// Panics if `leak_rate` is zero or if called outside a tokio runtime.
    pub fn start(capacity: NonZeroU64, leak_rate: Duration) -> Arc<Self> {
        assert!(!leak_rate.is_zero(), "leak rate must be non-zero");

        Arc::new_cyclic(|meter| Self {
            level: Mutex::new(0),
            capacity: capacity.get(),
            leak_rate,
            leaker: tokio::spawn(leak_loop(meter.clone(), leak_rate)),
        })
    }

    /// Admit one request if the bucket has room.
    ///
    /// Returns [`Admission::Rejected`] without touching the level when the
    /// bucket is full.
    pub fn try_admit(&self) -> Admission {
        let mut level = self.level.lock();
        if *level >= self.capacity {
            let current = *level;
            drop(level);
            debug!(level = current, capacity = self.capacity, "Meter full, rejecting request");
            return Admission::Rejected;
        }
        *level += 1;
        let current = *level;
        drop(level);

        trace!(level = current, capacity = self.capacity, "Request admitted");
        Admission::Admitted
    }

    /// Remove one unit from the bucket. A no-op when it is already empty;
    /// missed leaks are not banked.
    pub fn leak(&self) {
        let mut level = self.level.lock();
        if *level == 0 {
            return;
        }
        *level -= 1;
        let current = *level;
        drop(level);

        trace!(level = current, "Meter leaked");
    }

    /// Current bucket level.
    pub fn level(&self) -> u64 {
        *self.level.lock()
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn leak_rate(&self) -> Duration {
        self.leak_rate
    }
}

impl Drop for Meter {
    fn drop(&mut self) {
        self.leaker.abort();
    }
}

impl std::fmt::Debug for Meter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Meter")
            .field("level", &self.level())
            .field("capacity", &self.capacity)
            .field("leak_rate", &self.leak_rate)
            .finish()
    }
}

#[async_trait]
impl AdmissionStrategy for Meter {
    async fn admit(&self) -> Admission {
        self.try_admit()
    }

    fn name(&self) -> &'static str {
        "meter"
    }
}

/// Leak one unit per tick for as long as the meter is alive.
async fn leak_loop(meter: Weak<Meter>, leak_rate: Duration) {
    let mut ticker = interval_at(Instant::now() + leak_rate, leak_rate);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match meter.upgrade() {
            Some(meter) => meter.leak(),
            None => break,
        }
    }

    debug!("Leak task stopped");
}
