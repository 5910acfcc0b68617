use std::time::Duration;

use model::{LocationSample, Timestamp, TrackState};
use utility::geo;

/// Discards a sample that repeats the last appended one.
#[derive(Debug, Clone, PartialEq)]
pub struct DedupeWindow {
    pub max_age: Duration,
    pub max_distance_m: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReducerConfig {
    pub default_position: LocationSample,
    pub max_history_length: Option<usize>,
    pub dedupe: Option<DedupeWindow>,
    pub resume_from_cache: bool,
}

impl Default for ReducerConfig {
    fn default() -> Self {
        Self {
            default_position: default_position(),
            max_history_length: None,
            dedupe: None,
            resume_from_cache: true,
        }
    }
}

pub fn default_position() -> LocationSample {
    LocationSample::new(27.66525, 85.26676).expect("default position is in range")
}

/// Result of folding one sample into the track.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Appended(TrackState),
    Discarded(TrackState),
}

impl Applied {
    pub fn into_state(self) -> TrackState {
        match self {
            Self::Appended(state) | Self::Discarded(state) => state,
        }
    }

    pub fn is_appended(&self) -> bool {
        matches!(self, Self::Appended(_))
    }
}

/// Folds decoded samples into the track. Pure: persisting the result is left
/// to the caller.
#[derive(Debug, Clone)]
pub struct Reducer {
    config: ReducerConfig,
}

impl Reducer {
    pub fn new(config: ReducerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReducerConfig {
        &self.config
    }

    /// Seeds the track from a previously persisted history, if enabled.
    pub fn init(&self, cached: Vec<LocationSample>) -> TrackState {
        let history = if self.config.resume_from_cache {
            cached
        } else {
            vec![]
        };
        TrackState::from_history(
            self.config.default_position.clone(),
            history,
            self.config.max_history_length,
        )
    }

    pub fn apply(&self, state: TrackState, sample: LocationSample) -> Applied {
        if let (Some(window), Some(last)) = (&self.config.dedupe, state.last_appended()) {
            if window.is_duplicate(last, &sample) {
                return Applied::Discarded(state);
            }
        }
        Applied::Appended(state.appended(sample, self.config.max_history_length))
    }
}

impl DedupeWindow {
    fn is_duplicate(&self, last: &LocationSample, next: &LocationSample) -> bool {
        let distance_m = geo::haversine_distance(
            last.latitude(),
            last.longitude(),
            next.latitude(),
            next.longitude(),
        ) * 1000.0;
        distance_m <= self.max_distance_m
            && self.within_age(last.timestamp(), next.timestamp())
    }

    fn within_age(&self, last: Option<&Timestamp>, next: Option<&Timestamp>) -> bool {
        match (last, next) {
            (None, None) => true,
            (Some(Timestamp::Structured(last)), Some(Timestamp::Structured(next))) => {
                (*next - *last)
                    .abs()
                    .to_std()
                    .map(|elapsed| elapsed <= self.max_age)
                    .unwrap_or(false)
            }
            (Some(last), Some(next)) => match (last.time_of_day(), next.time_of_day()) {
                (Some(last), Some(next)) => (next - last)
                    .abs()
                    .to_std()
                    .map(|elapsed| elapsed <= self.max_age)
                    .unwrap_or(false),
                _ => last == next,
            },
            _ => false,
        }
    }
}
