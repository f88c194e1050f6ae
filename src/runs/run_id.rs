// src/runs/run_id.rs

use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::types::RunId;

/// Timestamp layout of generated ids; sorts lexicographically by time.
const RUN_ID_FORMAT: &str = "%Y%m%dT%H%M%S%3f";

/// Hands out strictly increasing, timestamp-derived run identifiers.
///
/// Two requests landing in the same millisecond get consecutive
/// milliseconds instead of the same id.
#[derive(Debug, Default)]
pub struct RunIdGenerator {
    last_millis: Mutex<i64>,
}

impl RunIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> RunId {
        self.next_at(Utc::now())
    }

    pub fn next_at(&self, now: DateTime<Utc>) -> RunId {
        let mut last = self.last_millis.lock().unwrap_or_else(|e| e.into_inner());

        let mut millis = now.timestamp_millis();
        if millis <= *last {
            millis = *last + 1;
        }
        *last = millis;

        let stamp = DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or(now);
        RunId::from_generated(stamp.format(RUN_ID_FORMAT).to_string())
    }
}
