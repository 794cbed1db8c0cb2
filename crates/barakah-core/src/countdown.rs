//! Client-side resend countdown shown after a code is sent.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::otp::VerificationOutcome;

/// Seconds a user waits before another code can be requested.
pub const RESEND_COOLDOWN: Duration = Duration::from_secs(60);
const TICK: Duration = Duration::from_secs(1);

/// Counts down whole seconds on a background task and publishes the
/// remaining value through a watch channel.
///
/// Dropping the countdown stops the task.
pub struct ResendCountdown {
    remaining: Arc<watch::Sender<u32>>,
    task: JoinHandle<()>,
}

impl ResendCountdown {
    pub fn start_default() -> Self {
        Self::start(RESEND_COOLDOWN, TICK)
    }

    /// Start counting `total` down in steps of `tick`.
    pub fn start(total: Duration, tick: Duration) -> Self {
        let steps = (total.as_millis() / tick.as_millis().max(1)) as u32;
        let (tx, _rx) = watch::channel(steps);
        let remaining = Arc::new(tx);

        let sender = Arc::clone(&remaining);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            // First tick completes immediately
            interval.tick().await;
            for left in (0..steps).rev() {
                interval.tick().await;
                sender.send_replace(left);
            }
        });

        Self { remaining, task }
    }

    pub fn remaining(&self) -> u32 {
        *self.remaining.borrow()
    }

    pub fn can_resend(&self) -> bool {
        self.remaining() == 0
    }

    pub fn subscribe(&self) -> watch::Receiver<u32> {
        self.remaining.subscribe()
    }

    /// Stop counting and allow a resend immediately.
    pub fn cancel(&self) {
        self.task.abort();
        self.remaining.send_replace(0);
    }

    /// React to a verification result. A code that can no longer succeed
    /// ends the wait.
    pub fn observe(&self, outcome: &VerificationOutcome) {
        if outcome.ends_code() {
            self.cancel();
        }
    }

    /// Resolve once a resend is allowed.
    pub async fn finished(&self) {
        let mut rx = self.remaining.subscribe();
        // The sender lives in self, so the channel cannot close here
        let _ = rx.wait_for(|left| *left == 0).await;
    }
}

impl Drop for ResendCountdown {
    fn drop(&mut self) {
        self.task.abort();
    }
}
