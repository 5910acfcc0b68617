use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{DeviceId, ExampleData, LocationSample};

/// Current position plus the trail of accepted samples, oldest first.
///
/// `current` is the last history entry, or the default position while the
/// history is empty.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackState {
    current: LocationSample,
    history: Vec<LocationSample>,
}

impl TrackState {
    pub fn empty(default_position: LocationSample) -> Self {
        Self {
            current: default_position,
            history: vec![],
        }
    }

    /// Keeps the newest `max_history_length` samples of `history`.
    pub fn from_history(
        default_position: LocationSample,
        history: Vec<LocationSample>,
        max_history_length: Option<usize>,
    ) -> Self {
        let mut state = Self::empty(default_position);
        state.history = history;
        state.evict(max_history_length);
        if let Some(last) = state.history.last() {
            state.current = last.clone();
        }
        state
    }

    /// Appends `sample` and makes it the current position, dropping the
    /// oldest entries beyond `max_history_length`. A sample evicted right
    /// away leaves `current` untouched.
    pub fn appended(
        mut self,
        sample: LocationSample,
        max_history_length: Option<usize>,
    ) -> Self {
        self.history.push(sample);
        self.evict(max_history_length);
        if let Some(last) = self.history.last() {
            self.current = last.clone();
        }
        self
    }

    fn evict(&mut self, max_history_length: Option<usize>) {
        if let Some(max) = max_history_length {
            if self.history.len() > max {
                let excess = self.history.len() - max;
                self.history.drain(..excess);
            }
        }
    }

    pub fn current(&self) -> &LocationSample {
        &self.current
    }

    pub fn history(&self) -> &[LocationSample] {
        &self.history
    }

    pub fn last_appended(&self) -> Option<&LocationSample> {
        self.history.last()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Idle,
    Connecting,
    Streaming,
    Retrying,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Retrying => "retrying",
            Self::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

/// Read-only copy of the tracker published to views.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackSnapshot {
    pub device: Option<DeviceId>,
    pub session: SessionState,
    pub reconnects: u32,
    #[serde(flatten)]
    pub track: TrackState,
}

impl ExampleData for TrackSnapshot {
    fn example_data() -> Self {
        let sample = LocationSample::example_data();
        Self {
            device: DeviceId::new("356938035643809"),
            session: SessionState::Streaming,
            reconnects: 0,
            track: TrackState::empty(sample.clone()).appended(sample, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(latitude: f64) -> LocationSample {
        LocationSample::new(latitude, 85.0).unwrap()
    }

    #[test]
    fn current_follows_last_appended() {
        let state = TrackState::empty(sample(0.0));
        assert_eq!(state.current(), &sample(0.0));
        assert!(state.history().is_empty());

        let state = state.appended(sample(1.0), None).appended(sample(2.0), None);
        assert_eq!(state.history(), &[sample(1.0), sample(2.0)]);
        assert_eq!(state.current(), &sample(2.0));
    }

    #[test]
    fn evicts_oldest_first() {
        let state = (1..=5).fold(TrackState::empty(sample(0.0)), |state, i| {
            state.appended(sample(i as f64), Some(3))
        });
        assert_eq!(state.history(), &[sample(3.0), sample(4.0), sample(5.0)]);
        assert_eq!(state.current(), &sample(5.0));

        let seeded = TrackState::from_history(
            sample(0.0),
            vec![sample(1.0), sample(2.0), sample(3.0)],
            Some(2),
        );
        assert_eq!(seeded.history(), &[sample(2.0), sample(3.0)]);
        assert_eq!(seeded.current(), &sample(3.0));
    }

    #[test]
    fn zero_length_history_keeps_default() {
        let state = TrackState::empty(sample(0.0)).appended(sample(1.0), Some(0));
        assert!(state.history().is_empty());
        assert_eq!(state.current(), &sample(0.0));
    }

    #[test]
    fn snapshot_flattens_track() {
        let json = serde_json::to_value(TrackSnapshot::example_data()).unwrap();
        assert_eq!(json["session"], "streaming");
        assert_eq!(json["device"], "356938035643809");
        assert_eq!(json["current"]["latitude"], 27.66525);
        assert_eq!(json["history"].as_array().unwrap().len(), 1);
    }
}
