use time::{OffsetDateTime, UtcOffset};
use tokio::time::Instant;

/// Source of wall-clock time for timestamps and reminder evaluation.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;

    fn offset(&self) -> UtcOffset {
        self.now().offset()
    }
}

/// The system clock, expressed in the local offset when it can be determined.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
        OffsetDateTime::now_utc().to_offset(offset)
    }
}

/// A wall clock pinned to `anchor` at creation that then advances with tokio's
/// clock. Under paused tokio time it moves only when the runtime does.
#[derive(Debug, Clone, Copy)]
pub struct AnchoredClock {
    anchor: OffsetDateTime,
    started: Instant,
}

impl AnchoredClock {
    pub fn new(anchor: OffsetDateTime) -> Self {
        Self {
            anchor,
            started: Instant::now(),
        }
    }
}

impl Clock for AnchoredClock {
    fn now(&self) -> OffsetDateTime {
        self.anchor + self.started.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::{AnchoredClock, Clock};
    use std::time::Duration;
    use time::macros::datetime;

    #[tokio::test(start_paused = true)]
    async fn anchored_clock_follows_tokio_time() {
        let clock = AnchoredClock::new(datetime!(2025-12-20 08:00 UTC));
        assert_eq!(clock.now(), datetime!(2025-12-20 08:00 UTC));

        tokio::time::sleep(Duration::from_secs(90)).await;
        assert_eq!(clock.now(), datetime!(2025-12-20 08:01:30 UTC));
    }
}
