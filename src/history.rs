//! Bounded per-channel message backlog for the WebSocket gateway.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

/// How the backlog is bounded.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HistoryMode {
    /// Keep the most recent `size` events.
    #[default]
    Count,
    /// Keep events newer than `size` seconds.
    Time,
}

/// A ring of recent events, replayed to newly connected clients.
pub struct RelayHistory {
    size: usize,
    mode: HistoryMode,
    events: VecDeque<(DateTime<Utc>, String)>,
}

impl RelayHistory {
    pub fn new(size: usize, mode: HistoryMode) -> Self {
        RelayHistory {
            size,
            mode,
            events: VecDeque::new(),
        }
    }

    /// Record an event, expiring old ones according to the mode.
    pub fn push(&mut self, event: String) {
        self.push_at(Utc::now(), event);
    }

    fn push_at(&mut self, now: DateTime<Utc>, event: String) {
        self.events.push_back((now, event));
        match self.mode {
            HistoryMode::Count => {
                while self.events.len() > self.size {
                    self.events.pop_front();
                }
            }
            HistoryMode::Time => {
                let cutoff = now - Duration::seconds(self.size as i64);
                while self
                    .events
                    .front()
                    .is_some_and(|(stamp, _)| *stamp < cutoff)
                {
                    self.events.pop_front();
                }
            }
        }
    }

    /// Events oldest-first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.events.iter().map(|(_, event)| event.as_str())
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_mode_keeps_last_n() {
        let mut history = RelayHistory::new(3, HistoryMode::Count);
        for i in 0..5 {
            history.push(format!("event {}", i));
        }
        let events: Vec<&str> = history.iter().collect();
        assert_eq!(events, vec!["event 2", "event 3", "event 4"]);
    }

    #[test]
    fn time_mode_expires_old_events() {
        let mut history = RelayHistory::new(60, HistoryMode::Time);
        let start = Utc::now();
        history.push_at(start, "old".into());
        history.push_at(start + Duration::seconds(30), "mid".into());
        // Two minutes later, only the newest event is within the window.
        history.push_at(start + Duration::seconds(120), "new".into());
        let events: Vec<&str> = history.iter().collect();
        assert_eq!(events, vec!["new"]);
    }

    #[test]
    fn empty_history() {
        let history = RelayHistory::new(10, HistoryMode::Count);
        assert!(history.is_empty());
        assert_eq!(history.iter().count(), 0);
    }
}
