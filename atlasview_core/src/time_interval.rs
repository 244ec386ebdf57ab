//! Time-interval collections for time-dimensioned raster services.
//!
//! A collection is expanded from a recurring ISO-8601 interval such as
//! `2024-01-01/2024-01-10/P1D` and queried against the shared clock to pick
//! the time dimension of each tile request.

use crate::error::IntervalError;
use chrono::{DateTime, Months, NaiveDate, NaiveDateTime, SecondsFormat, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{error, warn};

/// Upper bound on expanded dates, guards against `PT1S` over a century.
pub const MAX_INTERVAL_DATES: usize = 100_000;

/// Per-interval payload produced by a data callback.
pub type IntervalData = BTreeMap<String, String>;

/// Parses an ISO-8601 date or date-time into UTC.
///
/// Accepts RFC 3339 (`2024-01-01T06:00:00Z`, offsets), offset-less
/// date-times (taken as UTC) and plain dates (midnight UTC).
pub fn parse_iso8601(value: &str) -> Result<DateTime<Utc>, IntervalError> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    Err(IntervalError::BadDate(value.to_string()))
}

/// Formats a timestamp the way interval data carries it.
pub fn format_iso8601(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// An ISO-8601 duration (`PnYnMnWnDTnHnMnS`).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IsoDuration {
    pub months: u32,
    pub days: i64,
    pub seconds: f64,
}

impl IsoDuration {
    pub fn parse(value: &str) -> Result<Self, IntervalError> {
        let bad = || IntervalError::BadDuration(value.to_string());
        let body = value.trim().strip_prefix('P').ok_or_else(bad)?;
        if body.is_empty() {
            return Err(bad());
        }

        let mut duration = IsoDuration::default();
        let mut in_time = false;
        let mut number = String::new();
        let mut seen_any = false;

        for c in body.chars() {
            match c {
                'T' if !in_time && number.is_empty() => in_time = true,
                '0'..='9' | '.' | ',' => number.push(if c == ',' { '.' } else { c }),
                unit => {
                    let amount: f64 = number.parse().map_err(|_| bad())?;
                    number.clear();
                    seen_any = true;
                    // Calendar units must be whole and fit the field they land in.
                    let whole = || -> Result<u32, IntervalError> {
                        if amount.fract() != 0.0 || amount > f64::from(u32::MAX) {
                            return Err(bad());
                        }
                        Ok(amount as u32)
                    };
                    let add_months = |months: u32, n: u32| months.checked_add(n).ok_or_else(bad);
                    let add_days = |days: i64, n: i64| days.checked_add(n).ok_or_else(bad);
                    match (in_time, unit) {
                        (false, 'Y') => {
                            let months = whole()?.checked_mul(12).ok_or_else(bad)?;
                            duration.months = add_months(duration.months, months)?;
                        }
                        (false, 'M') => duration.months = add_months(duration.months, whole()?)?,
                        (false, 'W') => duration.days = add_days(duration.days, i64::from(whole()?) * 7)?,
                        (false, 'D') => duration.days = add_days(duration.days, i64::from(whole()?))?,
                        (true, 'H') => duration.seconds += amount * 3600.0,
                        (true, 'M') => duration.seconds += amount * 60.0,
                        (true, 'S') => duration.seconds += amount,
                        _ => return Err(bad()),
                    }
                }
            }
        }

        if !number.is_empty() || !seen_any || !duration.seconds.is_finite() || duration.is_zero() {
            return Err(bad());
        }
        Ok(duration)
    }

    pub fn is_zero(&self) -> bool {
        self.months == 0 && self.days == 0 && self.seconds == 0.0
    }

    /// Adds this duration to `time`; calendar months first, then days and
    /// seconds.
    pub fn add_to(&self, time: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let time = time.checked_add_months(Months::new(self.months))?;
        let time = time.checked_add_signed(TimeDelta::try_days(self.days)?)?;
        let nanos = (self.seconds * 1e9).round() as i64;
        time.checked_add_signed(TimeDelta::nanoseconds(nanos))
    }
}

/// One interval; an absent bound is unbounded on that side.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeInterval {
    pub start: Option<DateTime<Utc>>,
    pub stop: Option<DateTime<Utc>>,
    pub is_start_included: bool,
    pub is_stop_included: bool,
    pub data: Option<IntervalData>,
}

impl TimeInterval {
    pub fn contains(&self, time: &DateTime<Utc>) -> bool {
        let after_start = match &self.start {
            None => true,
            Some(start) => time > start || (time == start && self.is_start_included),
        };
        let before_stop = match &self.stop {
            None => true,
            Some(stop) => time < stop || (time == stop && self.is_stop_included),
        };
        after_start && before_stop
    }
}

/// Named per-interval data callbacks. The registry is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataCallback {
    /// `Time` = stop of the first interval, start of every other one
    StopTimeForFirst,
    /// Diagnostic placeholder
    Dummy,
}

impl DataCallback {
    pub fn lookup(name: &str) -> Option<Self> {
        match name {
            "dataCallback" => Some(DataCallback::StopTimeForFirst),
            "dummyCallback" => Some(DataCallback::Dummy),
            _ => None,
        }
    }

    pub fn data_for(&self, interval: &TimeInterval, index: usize) -> IntervalData {
        let mut data = IntervalData::new();
        match self {
            DataCallback::StopTimeForFirst => {
                let bound = if index == 0 { interval.stop } else { interval.start };
                if let Some(time) = bound {
                    data.insert("Time".to_string(), format_iso8601(&time));
                }
            }
            DataCallback::Dummy => {
                data.insert(
                    "Info".to_string(),
                    format!("Dummy callback for interval {index}"),
                );
            }
        }
        data
    }
}

/// Descriptor-level specification of a time-interval collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimeIntervalSpec {
    pub method: Option<String>,
    pub iso8601: Option<String>,
    pub leading_interval: Option<bool>,
    pub trailing_interval: Option<bool>,
    pub is_stop_included: Option<bool>,
    pub data_callback: Option<String>,
}

/// Ordered, non-overlapping intervals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeIntervalCollection {
    intervals: Vec<TimeInterval>,
}

impl TimeIntervalCollection {
    /// Builds a collection from a descriptor spec.
    ///
    /// Returns `Ok(None)` when the spec names no method or an unsupported
    /// one (logged); an unknown data-callback name is logged and ignored.
    pub fn from_spec(spec: &TimeIntervalSpec) -> Result<Option<Self>, IntervalError> {
        let method = match spec.method.as_deref() {
            Some(method) => method,
            None => {
                warn!("time-interval spec has no method, skipping");
                return Ok(None);
            }
        };
        if method != "fromIso8601" {
            warn!(method, "unsupported time-interval method");
            return Ok(None);
        }

        let callback = spec.data_callback.as_deref().and_then(|name| {
            let found = DataCallback::lookup(name);
            if found.is_none() {
                error!(callback = name, "data callback not found in registry");
            }
            found
        });

        let iso = spec
            .iso8601
            .as_deref()
            .ok_or_else(|| IntervalError::BadInterval(String::new()))?;
        let dates = expand_iso8601(iso)?;

        Ok(Some(Self::from_dates(
            &dates,
            spec.leading_interval.unwrap_or(true),
            spec.trailing_interval.unwrap_or(true),
            spec.is_stop_included.unwrap_or(false),
            callback,
        )))
    }

    /// Builds consecutive intervals between `dates`.
    pub fn from_dates(
        dates: &[DateTime<Utc>],
        leading: bool,
        trailing: bool,
        is_stop_included: bool,
        callback: Option<DataCallback>,
    ) -> Self {
        let mut intervals = Vec::new();
        let mut push = |mut interval: TimeInterval| {
            if let Some(cb) = callback {
                interval.data = Some(cb.data_for(&interval, intervals.len()));
            }
            intervals.push(interval);
        };

        if let (Some(first), Some(last)) = (dates.first(), dates.last()) {
            if leading {
                push(TimeInterval {
                    start: None,
                    stop: Some(*first),
                    is_start_included: true,
                    is_stop_included: false,
                    data: None,
                });
            }

            let spans = dates.len().saturating_sub(1);
            for (i, pair) in dates.windows(2).enumerate() {
                push(TimeInterval {
                    start: Some(pair[0]),
                    stop: Some(pair[1]),
                    is_start_included: true,
                    is_stop_included: i + 1 == spans && is_stop_included,
                    data: None,
                });
            }

            if trailing {
                push(TimeInterval {
                    start: Some(*last),
                    stop: None,
                    is_start_included: spans == 0 || !is_stop_included,
                    is_stop_included: true,
                    data: None,
                });
            }
        }

        Self { intervals }
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimeInterval> {
        self.intervals.iter()
    }

    pub fn get(&self, index: usize) -> Option<&TimeInterval> {
        self.intervals.get(index)
    }

    /// The interval containing `time`, if any.
    pub fn find_at(&self, time: &DateTime<Utc>) -> Option<&TimeInterval> {
        self.intervals.iter().find(|interval| interval.contains(time))
    }
}

/// Expands `[R[n]/]start/stop[/period]` or `Rn/start/period` into the
/// ordered list of boundary dates.
pub fn expand_iso8601(iso: &str) -> Result<Vec<DateTime<Utc>>, IntervalError> {
    let bad = || IntervalError::BadInterval(iso.to_string());
    let mut parts: Vec<&str> = iso.trim().split('/').collect();

    let mut repetitions: Option<usize> = None;
    if let Some(first) = parts.first() {
        if let Some(count) = first.strip_prefix('R') {
            if !count.is_empty() {
                repetitions = Some(count.parse().map_err(|_| bad())?);
            }
            parts.remove(0);
        }
    }

    let (start, stop, period) = match parts.as_slice() {
        [start, last] if last.starts_with('P') => {
            (parse_iso8601(start)?, None, Some(IsoDuration::parse(last)?))
        }
        [start, stop] => (parse_iso8601(start)?, Some(parse_iso8601(stop)?), None),
        [start, stop, period] => (
            parse_iso8601(start)?,
            Some(parse_iso8601(stop)?),
            Some(IsoDuration::parse(period)?),
        ),
        _ => return Err(bad()),
    };

    if let Some(stop) = stop {
        if stop <= start {
            return Err(bad());
        }
    }

    let period = match period {
        Some(period) => period,
        None => return Ok(vec![start, stop.ok_or_else(bad)?]),
    };
    if stop.is_none() && repetitions.is_none() {
        return Err(bad());
    }

    let mut dates = vec![start];
    let mut current = start;
    loop {
        if let Some(n) = repetitions {
            if dates.len() > n {
                break;
            }
        }
        let next = period.add_to(current).ok_or_else(bad)?;
        if let Some(stop) = stop {
            if next >= stop {
                break;
            }
        }
        if dates.len() >= MAX_INTERVAL_DATES {
            return Err(IntervalError::TooManyIntervals {
                limit: MAX_INTERVAL_DATES,
            });
        }
        dates.push(next);
        current = next;
    }

    if let Some(stop) = stop {
        let capped = repetitions.is_some_and(|n| dates.len() > n);
        if !capped {
            dates.push(stop);
        }
    }
    Ok(dates)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        parse_iso8601(s).unwrap()
    }

    #[test]
    fn test_parse_date_forms() {
        assert_eq!(utc("2024-01-01"), utc("2024-01-01T00:00:00Z"));
        assert_eq!(utc("2024-01-01T06:30"), utc("2024-01-01T06:30:00Z"));
        assert_eq!(utc("2024-01-01T02:00:00+02:00"), utc("2024-01-01T00:00:00Z"));
        assert!(parse_iso8601("yesterday").is_err());
    }

    #[test]
    fn test_duration_parsing() {
        assert_eq!(IsoDuration::parse("P1D").unwrap().days, 1);
        assert_eq!(IsoDuration::parse("P1Y2M").unwrap().months, 14);
        assert_eq!(IsoDuration::parse("P2W").unwrap().days, 14);
        assert_eq!(IsoDuration::parse("PT1H30M").unwrap().seconds, 5400.0);
        assert_eq!(IsoDuration::parse("PT0.5S").unwrap().seconds, 0.5);
        assert!(IsoDuration::parse("P").is_err());
        assert!(IsoDuration::parse("P0D").is_err());
        assert!(IsoDuration::parse("1D").is_err());
        assert!(IsoDuration::parse("P1H").is_err());
    }

    #[test]
    fn test_oversized_durations_are_errors() {
        let endless_seconds = format!("PT{}S", "9".repeat(400));
        for value in ["P9999999999999999999Y", "P400000000Y", "P4294967295M1M", endless_seconds.as_str()] {
            assert!(
                matches!(IsoDuration::parse(value), Err(IntervalError::BadDuration(_))),
                "{value} parsed"
            );
        }
        assert_eq!(IsoDuration::parse("P357913941Y").unwrap().months, 4_294_967_292);
    }

    #[test]
    fn test_oversized_period_in_collection_is_an_error() {
        let spec = TimeIntervalSpec {
            method: Some("fromIso8601".into()),
            iso8601: Some("2024-01-01/2024-01-03/P300000000Y2000000000M".into()),
            ..Default::default()
        };
        assert!(TimeIntervalCollection::from_spec(&spec).is_err());
    }

    #[test]
    fn test_month_duration_is_calendar_aware() {
        let d = IsoDuration::parse("P1M").unwrap();
        assert_eq!(d.add_to(utc("2024-01-31")).unwrap(), utc("2024-02-29"));
    }

    #[test]
    fn test_expand_start_stop_period() {
        let dates = expand_iso8601("2024-01-01/2024-01-04/P1D").unwrap();
        assert_eq!(
            dates,
            vec![utc("2024-01-01"), utc("2024-01-02"), utc("2024-01-03"), utc("2024-01-04")]
        );
    }

    #[test]
    fn test_expand_uneven_period_ends_on_stop() {
        let dates = expand_iso8601("2024-01-01/2024-01-04/P2D").unwrap();
        assert_eq!(dates, vec![utc("2024-01-01"), utc("2024-01-03"), utc("2024-01-04")]);
    }

    #[test]
    fn test_expand_repetitions() {
        let dates = expand_iso8601("R3/2024-01-01T00:00:00Z/PT6H").unwrap();
        assert_eq!(dates.len(), 4);
        assert_eq!(dates[3], utc("2024-01-01T18:00:00Z"));

        let capped = expand_iso8601("R2/2024-01-01/2024-01-10/P1D").unwrap();
        assert_eq!(capped, vec![utc("2024-01-01"), utc("2024-01-02"), utc("2024-01-03")]);
    }

    #[test]
    fn test_expand_rejects_bad_input() {
        assert!(expand_iso8601("2024-01-02/2024-01-01").is_err());
        assert!(expand_iso8601("2024-01-01/P1D").is_err());
        assert!(expand_iso8601("2024-01-01").is_err());
        assert_eq!(
            expand_iso8601("2000-01-01/2100-01-01/PT1S"),
            Err(IntervalError::TooManyIntervals { limit: MAX_INTERVAL_DATES })
        );
    }

    #[test]
    fn test_collection_defaults_lead_and_trail() {
        let spec = TimeIntervalSpec {
            method: Some("fromIso8601".into()),
            iso8601: Some("2024-01-01/2024-01-03/P1D".into()),
            ..Default::default()
        };
        let c = TimeIntervalCollection::from_spec(&spec).unwrap().unwrap();

        // leading + 2 spans + trailing
        assert_eq!(c.len(), 4);
        assert!(c.get(0).unwrap().start.is_none());
        assert!(c.get(3).unwrap().stop.is_none());

        let at_second_day = c.find_at(&utc("2024-01-02")).unwrap();
        assert_eq!(at_second_day.start, Some(utc("2024-01-02")));

        // isStopIncluded=false: the final date belongs to the trailing interval
        let at_end = c.find_at(&utc("2024-01-03")).unwrap();
        assert!(at_end.stop.is_none());
    }

    #[test]
    fn test_stop_time_callback_data() {
        let spec = TimeIntervalSpec {
            method: Some("fromIso8601".into()),
            iso8601: Some("2024-01-01/2024-01-03/P1D".into()),
            leading_interval: Some(false),
            trailing_interval: Some(false),
            data_callback: Some("dataCallback".into()),
            ..Default::default()
        };
        let c = TimeIntervalCollection::from_spec(&spec).unwrap().unwrap();
        assert_eq!(c.len(), 2);
        assert_eq!(c.get(0).unwrap().data.as_ref().unwrap()["Time"], "2024-01-02T00:00:00Z");
        assert_eq!(c.get(1).unwrap().data.as_ref().unwrap()["Time"], "2024-01-02T00:00:00Z");
    }

    #[test]
    fn test_unknown_callback_is_ignored_and_unknown_method_yields_none() {
        let spec = TimeIntervalSpec {
            method: Some("fromIso8601".into()),
            iso8601: Some("2024-01-01/2024-01-02".into()),
            data_callback: Some("nope".into()),
            ..Default::default()
        };
        let c = TimeIntervalCollection::from_spec(&spec).unwrap().unwrap();
        assert!(c.iter().all(|i| i.data.is_none()));

        let other = TimeIntervalSpec {
            method: Some("fromJulianDateArray".into()),
            ..Default::default()
        };
        assert!(TimeIntervalCollection::from_spec(&other).unwrap().is_none());
        assert!(TimeIntervalCollection::from_spec(&TimeIntervalSpec::default()).unwrap().is_none());
    }

    #[test]
    fn test_dummy_callback_counts_leading_interval() {
        let c = TimeIntervalCollection::from_dates(
            &[utc("2024-01-01"), utc("2024-01-02")],
            true,
            false,
            false,
            Some(DataCallback::Dummy),
        );
        assert_eq!(c.get(1).unwrap().data.as_ref().unwrap()["Info"], "Dummy callback for interval 1");
    }
}
