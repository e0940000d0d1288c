//! Cancellable scheduled re-attempt

use std::time::Duration;

use tokio::time::{Instant, sleep_until};

/// A pending timer for one scheduled re-attempt.
///
/// Created when a connection attempt fails; consumed by
/// [`RetryTicket::fired`], so it fires at most once. Dropping an unfired
/// ticket cancels the re-attempt.
#[derive(Debug)]
pub(crate) struct RetryTicket {
    deadline: Instant,
}

impl RetryTicket {
    /// Schedules a ticket to fire after `delay`.
    pub(crate) fn after(delay: Duration) -> Self {
        Self {
            deadline: Instant::now() + delay,
        }
    }

    /// Resolves once the scheduled delay has elapsed.
    pub(crate) async fn fired(self) {
        sleep_until(self.deadline).await;
    }
}
