//! The admin-controlled brainstorm countdown gating note submission.
//!
//! Deliberately never persisted: a server restart always resets to
//! inactive, because the activity window has no meaning across meetings.
//! Expiry is cooperative -- each peer compares the current time against
//! `end_time`; the server never auto-transitions to inactive.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::types::{Timestamp, UserId};

/// Countdown state broadcast to every participant on each transition and
/// replayed as a snapshot (`session-sync`) to newly connected clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrainstormTimer {
    pub is_active: bool,
    pub end_time: Option<Timestamp>,
    pub started_by: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimerError {
    #[error("a brainstorm window is already active")]
    AlreadyActive,
    #[error("no brainstorm window is active")]
    NotActive,
    #[error("window duration must be positive, got {0} minutes")]
    InvalidDuration(i64),
}

impl BrainstormTimer {
    /// Start a countdown ending `minutes` from `now`. Only valid while
    /// inactive. Returns the computed end time.
    pub fn start(
        &mut self,
        now: Timestamp,
        minutes: i64,
        started_by: UserId,
    ) -> Result<Timestamp, TimerError> {
        if self.is_active {
            return Err(TimerError::AlreadyActive);
        }
        if minutes <= 0 {
            return Err(TimerError::InvalidDuration(minutes));
        }
        let end = now + Duration::minutes(minutes);
        self.is_active = true;
        self.end_time = Some(end);
        self.started_by = Some(started_by);
        Ok(end)
    }

    /// Push the existing end time out by `minutes` (not `now + minutes`).
    /// Only valid while active. Returns the new end time.
    pub fn extend(&mut self, minutes: i64) -> Result<Timestamp, TimerError> {
        if minutes <= 0 {
            return Err(TimerError::InvalidDuration(minutes));
        }
        match self.end_time {
            Some(end) if self.is_active => {
                let new_end = end + Duration::minutes(minutes);
                self.end_time = Some(new_end);
                Ok(new_end)
            }
            _ => Err(TimerError::NotActive),
        }
    }

    /// Force the countdown inactive. Valid in any state.
    pub fn end(&mut self) {
        self.is_active = false;
        self.end_time = None;
        self.started_by = None;
    }

    /// Note submission is open iff the window is active and `now` is
    /// before the end time. Derived, never stored.
    pub fn can_add_notes(&self, now: Timestamp) -> bool {
        match self.end_time {
            Some(end) => self.is_active && now < end,
            None => false,
        }
    }
}
