use chrono::{DateTime, TimeZone, Utc};

/// Returns the current wall-clock time as milliseconds since Unix epoch.
pub fn physical_now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Converts stored milliseconds back into a UTC timestamp.
pub fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// A millisecond clock that never runs backwards, even if the wall clock does.
pub struct MonotonicClock {
    last_ms: i64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { last_ms: 0 }
    }

    /// Next timestamp, never earlier than any previous tick.
    pub fn tick(&mut self) -> DateTime<Utc> {
        let now = physical_now_ms();
        if now > self.last_ms {
            self.last_ms = now;
        }
        self.stamp()
    }

    /// Next timestamp that is also not earlier than `prev`.
    pub fn tick_after(&mut self, prev: DateTime<Utc>) -> DateTime<Utc> {
        let now = physical_now_ms().max(prev.timestamp_millis());
        if now > self.last_ms {
            self.last_ms = now;
        }
        self.stamp()
    }

    fn stamp(&self) -> DateTime<Utc> {
        // last_ms only ever holds values produced by chrono, so it is in range.
        from_millis(self.last_ms).unwrap_or_else(Utc::now)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}
