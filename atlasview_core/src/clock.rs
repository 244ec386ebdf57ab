//! Shared clock state and the clock synchronizer.
//!
//! The viewer owns one [`ClockState`]; layers carrying a [`ClockConfig`]
//! overwrite it through [`ClockSynchronizer::apply`] as a single write.

use crate::error::ClockApplyError;
use crate::time_interval::parse_iso8601;
use crate::viewer::SharedClock;
use atlasview_env::AtlasContext;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// How the clock advances on each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClockStep {
    /// `multiplier` seconds per tick, regardless of elapsed time
    TickDependent,
    /// Wall-clock elapsed time; multiplier ignored
    SystemClock,
    /// Wall-clock elapsed time scaled by the multiplier
    #[default]
    SystemClockMultiplier,
}

impl FromStr for ClockStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TICK_DEPENDENT" => Ok(ClockStep::TickDependent),
            "SYSTEM_CLOCK" => Ok(ClockStep::SystemClock),
            "SYSTEM_CLOCK_MULTIPLIER" => Ok(ClockStep::SystemClockMultiplier),
            _ => Err(format!("Unknown clock step: {}", s)),
        }
    }
}

/// Behaviour when the current time reaches the start/stop bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClockRange {
    #[default]
    Unbounded,
    Clamped,
    LoopStop,
}

impl FromStr for ClockRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNBOUNDED" => Ok(ClockRange::Unbounded),
            "CLAMPED" => Ok(ClockRange::Clamped),
            "LOOP_STOP" => Ok(ClockRange::LoopStop),
            _ => Err(format!("Unknown clock range: {}", s)),
        }
    }
}

/// Per-layer clock configuration as it appears in a descriptor.
///
/// Timestamps and mode names stay as strings until applied so that a bad
/// value rejects only the apply, not the whole descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClockConfig {
    pub start_time: Option<String>,
    pub stop_time: Option<String>,
    pub current_time: Option<String>,
    pub clock_range: Option<String>,
    pub multiplier: Option<f64>,
    pub clock_step: Option<String>,
    pub can_animate: Option<bool>,
    pub should_animate: Option<bool>,
}

/// Snapshot of the shared simulation clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockState {
    pub start: DateTime<Utc>,
    /// Absent until a layer or media duration provides one
    pub stop: Option<DateTime<Utc>>,
    pub current: DateTime<Utc>,
    /// Signed; the sign is the playback direction
    pub multiplier: f64,
    pub step: ClockStep,
    pub range: ClockRange,
    pub can_animate: bool,
    pub should_animate: bool,
}

impl ClockState {
    /// A stopped clock parked at `now`.
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            start: now,
            stop: None,
            current: now,
            multiplier: 1.0,
            step: ClockStep::default(),
            range: ClockRange::default(),
            can_animate: true,
            should_animate: false,
        }
    }

    pub fn is_animating(&self) -> bool {
        self.can_animate && self.should_animate
    }

    /// Advances `current` by one tick that took `elapsed` of wall time.
    ///
    /// # Returns
    /// The new current time.
    pub fn advance(&mut self, elapsed: Duration) -> DateTime<Utc> {
        if !self.is_animating() {
            return self.current;
        }

        let seconds = match self.step {
            ClockStep::TickDependent => self.multiplier,
            ClockStep::SystemClock => elapsed.as_secs_f64(),
            ClockStep::SystemClockMultiplier => elapsed.as_secs_f64() * self.multiplier,
        };
        let delta = TimeDelta::nanoseconds((seconds * 1e9).round() as i64);
        let mut next = self.current.checked_add_signed(delta).unwrap_or(self.current);

        if let Some(stop) = self.stop {
            match self.range {
                ClockRange::Unbounded => {}
                ClockRange::Clamped => {
                    if next < self.start {
                        next = self.start;
                    } else if next > stop {
                        next = stop;
                    }
                }
                ClockRange::LoopStop => {
                    let forward = seconds >= 0.0;
                    if forward && next > stop {
                        next = self.start;
                    } else if !forward && next < self.start {
                        next = stop;
                    }
                }
            }
        }

        self.current = next;
        next
    }

    /// Position of `current` within `[start, stop]` as a fraction.
    pub fn timeline_fraction(&self) -> Option<f64> {
        let stop = self.stop?;
        let span = (stop - self.start).num_milliseconds() as f64;
        if span <= 0.0 {
            return None;
        }
        Some((self.current - self.start).num_milliseconds() as f64 / span)
    }

    /// The instant at `fraction` of the way from start to stop.
    pub fn time_at_fraction(&self, fraction: f64) -> Option<DateTime<Utc>> {
        let stop = self.stop?;
        let span = (stop - self.start).num_milliseconds() as f64;
        let offset = TimeDelta::milliseconds((span * fraction).round() as i64);
        self.start.checked_add_signed(offset)
    }

    /// Flips the playback direction, keeping the speed.
    pub fn reverse(&mut self) {
        self.multiplier = -self.multiplier;
    }
}

/// Writes layer clock configurations to the shared clock.
pub struct ClockSynchronizer<C: AtlasContext> {
    ctx: Arc<C>,
}

impl<C: AtlasContext> ClockSynchronizer<C> {
    pub fn new(ctx: Arc<C>) -> Self {
        Self { ctx }
    }

    /// Current wall time according to the context.
    pub fn now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.ctx.system_time())
    }

    /// Computes the clock state a configuration describes, without writing it.
    ///
    /// Open start defaults to now, open stop to start + 1 day, open current to
    /// start. Unknown step/range names fall back to the defaults.
    pub fn resolve(&self, config: Option<&ClockConfig>) -> Result<ClockState, ClockApplyError> {
        let empty = ClockConfig::default();
        let config = config.unwrap_or(&empty);

        let start = match &config.start_time {
            Some(value) => timestamp("startTime", value)?,
            None => self.now(),
        };
        let stop = match &config.stop_time {
            Some(value) => timestamp("stopTime", value)?,
            None => start + TimeDelta::days(1),
        };
        let current = match &config.current_time {
            Some(value) => timestamp("currentTime", value)?,
            None => start,
        };
        if stop < start {
            return Err(ClockApplyError::InvertedRange {
                start: start.to_rfc3339(),
                stop: stop.to_rfc3339(),
            });
        }

        let range = config
            .clock_range
            .as_deref()
            .and_then(|name| name.parse().ok())
            .unwrap_or_default();
        let step = config
            .clock_step
            .as_deref()
            .and_then(|name| name.parse().ok())
            .unwrap_or_default();

        Ok(ClockState {
            start,
            stop: Some(stop),
            current,
            multiplier: config.multiplier.unwrap_or(1.0),
            step,
            range,
            can_animate: config.can_animate.unwrap_or(true),
            should_animate: config.should_animate.unwrap_or(true),
        })
    }

    /// Applies `config` to the shared clock in one write and re-fits the
    /// timeline. On error the clock is untouched.
    pub fn apply<S>(&self, clock: &S, config: Option<&ClockConfig>) -> Result<ClockState, ClockApplyError>
    where
        S: SharedClock + ?Sized,
    {
        let state = self.resolve(config)?;
        clock.set_clock(state.clone());
        if let Some(stop) = state.stop {
            clock.fit_timeline(state.start, stop);
        }
        debug!(start = %state.start, stop = ?state.stop, "Applied clock settings");
        Ok(state)
    }

    /// [`apply`](Self::apply), logging instead of returning the error.
    pub fn apply_logged<S>(&self, clock: &S, key: &str, config: Option<&ClockConfig>) -> bool
    where
        S: SharedClock + ?Sized,
    {
        match self.apply(clock, config) {
            Ok(_) => true,
            Err(e) => {
                error!(layer = key, error = %e, "Failed to apply clock settings");
                false
            }
        }
    }
}

fn timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>, ClockApplyError> {
    parse_iso8601(value).map_err(|e| ClockApplyError::BadTimestamp {
        field,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewer::{ListenerId, TickListener};
    use atlasview_env::TokioContext;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingClock {
        state: Mutex<Option<ClockState>>,
        fitted: Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
    }

    impl SharedClock for RecordingClock {
        fn clock(&self) -> ClockState {
            self.state
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| ClockState::at(DateTime::<Utc>::UNIX_EPOCH))
        }

        fn set_clock(&self, state: ClockState) {
            *self.state.lock().unwrap() = Some(state);
        }

        fn fit_timeline(&self, start: DateTime<Utc>, stop: DateTime<Utc>) {
            self.fitted.lock().unwrap().push((start, stop));
        }

        fn add_tick_listener(&self, _listener: TickListener) -> ListenerId {
            ListenerId::new()
        }

        fn remove_tick_listener(&self, _id: ListenerId) -> bool {
            false
        }
    }

    fn utc(s: &str) -> DateTime<Utc> {
        parse_iso8601(s).unwrap()
    }

    fn sync() -> ClockSynchronizer<TokioContext> {
        ClockSynchronizer::new(TokioContext::shared())
    }

    #[test]
    fn test_defaults_from_start_only() {
        let config = ClockConfig {
            start_time: Some("2024-03-01T00:00:00Z".into()),
            ..Default::default()
        };
        let state = sync().resolve(Some(&config)).unwrap();

        assert_eq!(state.start, utc("2024-03-01T00:00:00Z"));
        assert_eq!(state.stop, Some(utc("2024-03-02T00:00:00Z")));
        assert_eq!(state.current, state.start);
        assert_eq!(state.multiplier, 1.0);
        assert_eq!(state.step, ClockStep::SystemClockMultiplier);
        assert_eq!(state.range, ClockRange::Unbounded);
        assert!(state.can_animate && state.should_animate);
    }

    #[test]
    fn test_open_start_uses_context_now() {
        let s = sync();
        let before = s.now();
        let state = s.resolve(None).unwrap();
        assert!(state.start >= before);
        assert_eq!(state.stop.unwrap() - state.start, TimeDelta::days(1));
    }

    #[test]
    fn test_unknown_mode_names_fall_back() {
        let config = ClockConfig {
            start_time: Some("2024-03-01".into()),
            clock_range: Some("BOUNCE".into()),
            clock_step: Some("TICK_DEPENDENT".into()),
            multiplier: Some(-60.0),
            ..Default::default()
        };
        let state = sync().resolve(Some(&config)).unwrap();
        assert_eq!(state.range, ClockRange::Unbounded);
        assert_eq!(state.step, ClockStep::TickDependent);
        assert_eq!(state.multiplier, -60.0);
    }

    #[test]
    fn test_apply_is_atomic_on_bad_timestamp() {
        let clock = RecordingClock::default();
        let s = sync();
        let good = ClockConfig {
            start_time: Some("2024-03-01T00:00:00Z".into()),
            ..Default::default()
        };
        s.apply(&clock, Some(&good)).unwrap();
        let before = clock.clock();

        let bad = ClockConfig {
            start_time: Some("2024-05-01T00:00:00Z".into()),
            stop_time: Some("not a date".into()),
            ..Default::default()
        };
        assert!(matches!(
            s.apply(&clock, Some(&bad)),
            Err(ClockApplyError::BadTimestamp { field: "stopTime", .. })
        ));
        assert_eq!(clock.clock(), before);
        assert_eq!(clock.fitted.lock().unwrap().len(), 1);
        assert!(!s.apply_logged(&clock, "bad", Some(&bad)));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let config = ClockConfig {
            start_time: Some("2024-03-02".into()),
            stop_time: Some("2024-03-01".into()),
            ..Default::default()
        };
        assert!(matches!(
            sync().resolve(Some(&config)),
            Err(ClockApplyError::InvertedRange { .. })
        ));
    }

    #[test]
    fn test_apply_fits_timeline() {
        let clock = RecordingClock::default();
        let config = ClockConfig {
            start_time: Some("2024-03-01".into()),
            stop_time: Some("2024-03-05".into()),
            current_time: Some("2024-03-03".into()),
            ..Default::default()
        };
        sync().apply(&clock, Some(&config)).unwrap();
        assert_eq!(clock.clock().current, utc("2024-03-03"));
        assert_eq!(
            clock.fitted.lock().unwrap()[0],
            (utc("2024-03-01"), utc("2024-03-05"))
        );
    }

    fn running(range: ClockRange, step: ClockStep, multiplier: f64) -> ClockState {
        ClockState {
            start: utc("2024-01-01T00:00:00Z"),
            stop: Some(utc("2024-01-01T00:01:00Z")),
            current: utc("2024-01-01T00:00:30Z"),
            multiplier,
            step,
            range,
            can_animate: true,
            should_animate: true,
        }
    }

    #[test]
    fn test_advance_step_modes() {
        let mut c = running(ClockRange::Unbounded, ClockStep::SystemClockMultiplier, 10.0);
        assert_eq!(c.advance(Duration::from_secs(1)), utc("2024-01-01T00:00:40Z"));

        let mut c = running(ClockRange::Unbounded, ClockStep::SystemClock, 10.0);
        assert_eq!(c.advance(Duration::from_secs(1)), utc("2024-01-01T00:00:31Z"));

        let mut c = running(ClockRange::Unbounded, ClockStep::TickDependent, 5.0);
        assert_eq!(c.advance(Duration::from_secs(3)), utc("2024-01-01T00:00:35Z"));

        let mut paused = running(ClockRange::Unbounded, ClockStep::SystemClock, 1.0);
        paused.should_animate = false;
        assert_eq!(paused.advance(Duration::from_secs(5)), utc("2024-01-01T00:00:30Z"));
    }

    #[test]
    fn test_advance_range_modes() {
        let mut c = running(ClockRange::Clamped, ClockStep::SystemClockMultiplier, 1.0);
        assert_eq!(c.advance(Duration::from_secs(60)), utc("2024-01-01T00:01:00Z"));

        let mut c = running(ClockRange::Clamped, ClockStep::SystemClockMultiplier, -1.0);
        assert_eq!(c.advance(Duration::from_secs(60)), utc("2024-01-01T00:00:00Z"));

        let mut c = running(ClockRange::LoopStop, ClockStep::SystemClockMultiplier, 1.0);
        assert_eq!(c.advance(Duration::from_secs(45)), utc("2024-01-01T00:00:00Z"));

        let mut c = running(ClockRange::LoopStop, ClockStep::SystemClockMultiplier, -1.0);
        assert_eq!(c.advance(Duration::from_secs(45)), utc("2024-01-01T00:01:00Z"));

        let mut c = running(ClockRange::Unbounded, ClockStep::SystemClockMultiplier, 1.0);
        assert_eq!(c.advance(Duration::from_secs(45)), utc("2024-01-01T00:01:15Z"));
    }

    #[test]
    fn test_timeline_fraction_round_trip() {
        let mut c = running(ClockRange::Unbounded, ClockStep::SystemClock, 1.0);
        approx::assert_relative_eq!(c.timeline_fraction().unwrap(), 0.5);
        assert_eq!(c.time_at_fraction(0.25), Some(utc("2024-01-01T00:00:15Z")));

        c.reverse();
        assert_eq!(c.multiplier, -1.0);
        c.stop = None;
        assert!(c.timeline_fraction().is_none());
    }
}
