//! Clock driving the CLI's loops, either fast-forwarded or real time.

use std::sync::Arc;
use std::time::Duration;

use rewind_common::clock::{Clock, ManualClock, MonotonicClock};

/// Poll granularity of the CLI loops.
pub const POLL_NS: u64 = 1_000_000;

pub enum SimClock {
    /// Jumps ahead instantly.
    Manual(Arc<ManualClock>),
    /// Sleeps on the tokio runtime.
    Real(Arc<MonotonicClock>),
}

impl SimClock {
    pub fn new(realtime: bool) -> Self {
        if realtime {
            Self::Real(Arc::new(MonotonicClock::start()))
        } else {
            Self::Manual(Arc::new(ManualClock::new(
                rewind_common::clock::NSEC_PER_SEC,
            )))
        }
    }

    pub fn shared(&self) -> Arc<dyn Clock> {
        match self {
            Self::Manual(clock) => clock.clone(),
            Self::Real(clock) => clock.clone(),
        }
    }

    pub fn now_ns(&self) -> u64 {
        match self {
            Self::Manual(clock) => clock.now_ns(),
            Self::Real(clock) => clock.now_ns(),
        }
    }

    /// Let one poll interval pass.
    pub async fn poll(&self) {
        match self {
            Self::Manual(clock) => {
                clock.advance(POLL_NS);
            }
            Self::Real(_) => tokio::time::sleep(Duration::from_nanos(POLL_NS)).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_poll_advances_one_interval() {
        let clock = SimClock::new(false);
        let before = clock.now_ns();
        clock.poll().await;
        assert_eq!(clock.now_ns() - before, POLL_NS);
        assert_eq!(clock.shared().now_ns(), clock.now_ns());
    }
}
