//! Partitions a lookback interval into fixed-size query batches

use crate::error::{Error, Result};

/// Chronological sequence of half-open `[start, end)` ranges of
/// `batch_hours` width covering `[now - lookback_hours * 3600, now]`.
/// The final range is clamped short so the sequence never reaches past `now`.
#[derive(Debug, Clone)]
pub struct BatchWindows {
    next_start: i64,
    end: i64,
    batch_secs: i64,
}

impl BatchWindows {
    /// Fails fast with `InvalidConfiguration` on a zero lookback or batch
    /// size; either would otherwise make the sequence empty or endless.
    pub fn new(lookback_hours: u64, batch_hours: u64, now: i64) -> Result<Self> {
        if lookback_hours == 0 || batch_hours == 0 {
            return Err(Error::InvalidConfiguration(format!(
                "lookback_hours ({lookback_hours}) and batch_hours ({batch_hours}) must both be positive"
            )));
        }
        Ok(Self {
            next_start: now - lookback_hours as i64 * 3600,
            end: now,
            batch_secs: batch_hours as i64 * 3600,
        })
    }
}

impl Iterator for BatchWindows {
    type Item = (i64, i64);

    fn next(&mut self) -> Option<(i64, i64)> {
        if self.next_start >= self.end {
            return None;
        }
        let start = self.next_start;
        let end = (start + self.batch_secs).min(self.end);
        self.next_start = end;
        Some((start, end))
    }
}
