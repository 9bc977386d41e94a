//! Bounded exponential backoff shared by every adapter's reconnect loop
//! Starts small, doubles on every failure, never exceeds a configured cap.

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            current: base,
        }
    }

    /// Davis/Campbell network and serial reconnects: 5s base, 30s cap.
    pub fn network() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(30))
    }

    /// Snow-gauge gRPC reconnects: 1s base, 30s cap.
    pub fn grpc() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }

    /// The delay to sleep before the *next* retry, then doubles (capped)
    /// for the retry after that.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.cap);
        delay
    }

    /// Reset to the base delay after a successful connection.
    pub fn reset(&mut self) {
        self.current = self.base;
    }
}
