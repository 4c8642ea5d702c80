//! Reconnect delay policy.

use std::time::Duration;

use rand::Rng;

/// Capped exponential backoff.
///
/// The delay for attempt `n` is `base * 2^(n-1)`, capped, then jittered
/// by +-25% so clients sharing a relay do not reconnect in lockstep.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Delay before reconnect attempt `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let raw = self.base.saturating_mul(1u32 << exp).min(self.cap);
        jitter(raw)
    }
}

fn jitter(delay: Duration) -> Duration {
    let millis = delay.as_millis() as u64;
    let spread = millis / 4;
    if spread == 0 {
        return delay;
    }
    let offset = rand::thread_rng().gen_range(0..=spread * 2);
    Duration::from_millis(millis - spread + offset)
}
