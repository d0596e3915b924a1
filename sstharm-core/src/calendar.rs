//! Calendar-typed timestamps for CF time axes
//!
//! Climate archives encode time against several calendars. Observational
//! products use the real (proleptic Gregorian) calendar, while models commonly
//! use a 365-day (no-leap) or a 360-day calendar in which every month has 30
//! days. A timestamp is only meaningful together with its calendar, so
//! [`CfDateTime`] carries the [`CalendarKind`] it was decoded in.
//!
//! Only three calendar families are supported downstream (see [`Calendar`]).
//! Other CF calendars can still be decoded, but [`detect_calendar`] rejects them.
//!
//! ```rust
//! use sstharm_core::calendar::{decode_cf_times, detect_calendar, Calendar};
//!
//! let times = decode_cf_times("days since 1850-01-01", "360_day", &[0.0, 30.0]).unwrap();
//! assert_eq!(times[1].month(), 2);
//! assert_eq!(detect_calendar(&times).unwrap(), Calendar::Day360);
//! ```

use crate::errors::{HarmonizeError, HarmonizeResult};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

const SECONDS_PER_DAY: i64 = 86_400;

/// Cumulative day count before each month in a 365-day year.
const CUMULATIVE_DAYS: [u32; 13] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334, 365];
/// Cumulative day count before each month in a 366-day year.
const CUMULATIVE_DAYS_LEAP: [u32; 13] = [0, 31, 60, 91, 121, 152, 182, 213, 244, 274, 305, 335, 366];

/// A CF calendar name, as found in the `calendar` attribute of a time variable.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarKind {
    Standard,
    Gregorian,
    ProlepticGregorian,
    NoLeap,
    Day365,
    AllLeap,
    Day366,
    Julian,
    Day360,
}

impl CalendarKind {
    /// Parse a CF calendar attribute value (case-insensitive)
    pub fn from_cf_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "standard" => Some(Self::Standard),
            "gregorian" => Some(Self::Gregorian),
            "proleptic_gregorian" => Some(Self::ProlepticGregorian),
            "noleap" | "no_leap" => Some(Self::NoLeap),
            "365_day" => Some(Self::Day365),
            "all_leap" => Some(Self::AllLeap),
            "366_day" => Some(Self::Day366),
            "julian" => Some(Self::Julian),
            "360_day" => Some(Self::Day360),
            _ => None,
        }
    }

    pub fn cf_name(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Gregorian => "gregorian",
            Self::ProlepticGregorian => "proleptic_gregorian",
            Self::NoLeap => "noleap",
            Self::Day365 => "365_day",
            Self::AllLeap => "all_leap",
            Self::Day366 => "366_day",
            Self::Julian => "julian",
            Self::Day360 => "360_day",
        }
    }

    /// The supported calendar family this kind belongs to, if any.
    pub fn family(&self) -> Option<Calendar> {
        match self {
            Self::Standard | Self::Gregorian | Self::ProlepticGregorian => Some(Calendar::Standard),
            Self::NoLeap | Self::Day365 => Some(Calendar::NoLeap),
            Self::Day360 => Some(Calendar::Day360),
            Self::AllLeap | Self::Day366 | Self::Julian => None,
        }
    }

    fn is_real_calendar(&self) -> bool {
        matches!(
            self,
            Self::Standard | Self::Gregorian | Self::ProlepticGregorian
        )
    }

    fn is_leap_year(&self, year: i32) -> bool {
        match self {
            Self::Standard | Self::Gregorian | Self::ProlepticGregorian => {
                (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
            }
            Self::Julian => year.rem_euclid(4) == 0,
            Self::AllLeap | Self::Day366 => true,
            Self::NoLeap | Self::Day365 | Self::Day360 => false,
        }
    }

    /// Number of days in `month` of `year`.
    pub fn days_in_month(&self, year: i32, month: u32) -> u32 {
        if *self == Self::Day360 {
            return 30;
        }
        let table = if self.is_leap_year(year) {
            &CUMULATIVE_DAYS_LEAP
        } else {
            &CUMULATIVE_DAYS
        };
        table[month as usize] - table[month as usize - 1]
    }

    /// Days elapsed from 0000-01-01 to the given date in this calendar.
    fn ordinal_days(&self, year: i32, month: u32, day: u32) -> HarmonizeResult<i64> {
        let y = year as i64;
        let within_year = |leap: bool| {
            let table = if leap {
                &CUMULATIVE_DAYS_LEAP
            } else {
                &CUMULATIVE_DAYS
            };
            (table[month as usize - 1] + day - 1) as i64
        };
        let days = match self {
            Self::Standard | Self::Gregorian | Self::ProlepticGregorian => {
                let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
                    HarmonizeError::InvalidDate(format!("{year:04}-{month:02}-{day:02}"))
                })?;
                // chrono counts from 0001-01-01 as day 1; shift to a year-0 origin.
                date.num_days_from_ce() as i64 + 365
            }
            Self::NoLeap | Self::Day365 => y * 365 + within_year(false),
            Self::AllLeap | Self::Day366 => y * 366 + within_year(true),
            Self::Day360 => y * 360 + (month as i64 - 1) * 30 + day as i64 - 1,
            Self::Julian => {
                y * 365 + (y + 3).div_euclid(4) + within_year(self.is_leap_year(year))
            }
        };
        Ok(days)
    }

    /// Inverse of [`ordinal_days`](Self::ordinal_days).
    fn date_from_ordinal(&self, days: i64) -> HarmonizeResult<(i32, u32, u32)> {
        let split_year = |day_of_year: u32, leap: bool| {
            let table = if leap {
                &CUMULATIVE_DAYS_LEAP
            } else {
                &CUMULATIVE_DAYS
            };
            let month = (1..=12)
                .find(|m| day_of_year < table[*m as usize])
                .unwrap_or(12);
            (month, day_of_year - table[month as usize - 1] + 1)
        };
        let (year, month, day) = match self {
            Self::Standard | Self::Gregorian | Self::ProlepticGregorian => {
                let date = i32::try_from(days - 365)
                    .ok()
                    .and_then(NaiveDate::from_num_days_from_ce_opt)
                    .ok_or_else(|| HarmonizeError::InvalidDate(format!("day number {days}")))?;
                (date.year() as i64, date.month(), date.day())
            }
            Self::NoLeap | Self::Day365 => {
                let (m, d) = split_year(days.rem_euclid(365) as u32, false);
                (days.div_euclid(365), m, d)
            }
            Self::AllLeap | Self::Day366 => {
                let (m, d) = split_year(days.rem_euclid(366) as u32, true);
                (days.div_euclid(366), m, d)
            }
            Self::Day360 => {
                let rem = days.rem_euclid(360) as u32;
                (days.div_euclid(360), rem / 30 + 1, rem % 30 + 1)
            }
            Self::Julian => {
                // 1461-day cycles starting on a leap year
                let cycle = days.div_euclid(1461);
                let mut rem = days.rem_euclid(1461);
                let mut year = cycle * 4;
                for length in [366, 365, 365, 365] {
                    if rem < length {
                        break;
                    }
                    rem -= length;
                    year += 1;
                }
                let (m, d) = split_year(rem as u32, year.rem_euclid(4) == 0);
                (year, m, d)
            }
        };
        let year = i32::try_from(year)
            .map_err(|_| HarmonizeError::InvalidDate(format!("year {year} out of range")))?;
        Ok((year, month, day))
    }
}

impl fmt::Display for CalendarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cf_name())
    }
}

/// The three calendar families a time axis may resolve to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Calendar {
    /// Proleptic Gregorian-like real calendar
    Standard,
    /// 365-day calendar without leap years
    NoLeap,
    /// 360-day calendar with 30-day months
    Day360,
}

impl Calendar {
    /// The CF calendar kind used when building timestamps in this family.
    pub fn kind(&self) -> CalendarKind {
        match self {
            Calendar::Standard => CalendarKind::ProlepticGregorian,
            Calendar::NoLeap => CalendarKind::NoLeap,
            Calendar::Day360 => CalendarKind::Day360,
        }
    }

    /// Last valid day of December.
    pub fn last_day_of_year(&self) -> u32 {
        match self {
            Calendar::Day360 => 30,
            _ => 31,
        }
    }
}

impl fmt::Display for Calendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Calendar::Standard => write!(f, "Standard"),
            Calendar::NoLeap => write!(f, "365Day"),
            Calendar::Day360 => write!(f, "360Day"),
        }
    }
}

/// A validated date-time in a specific CF calendar.
///
/// Ordering compares the civil fields; it is only meaningful between
/// timestamps of the same calendar.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CfDateTime {
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
    calendar: CalendarKind,
}

impl CfDateTime {
    pub fn new(
        calendar: CalendarKind,
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
    ) -> HarmonizeResult<Self> {
        let invalid = || {
            HarmonizeError::InvalidDate(format!(
                "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02} ({calendar})"
            ))
        };
        if !(1..=12).contains(&month) || hour > 23 || minute > 59 || second > 59 {
            return Err(invalid());
        }
        if day == 0 || day > calendar.days_in_month(year, month) {
            return Err(invalid());
        }
        if calendar.is_real_calendar() && NaiveDate::from_ymd_opt(year, month, day).is_none() {
            return Err(invalid());
        }
        Ok(Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
            calendar,
        })
    }

    /// Midnight on the given date
    pub fn ymd(calendar: CalendarKind, year: i32, month: u32, day: u32) -> HarmonizeResult<Self> {
        Self::new(calendar, year, month, day, 0, 0, 0)
    }

    pub fn calendar(&self) -> CalendarKind {
        self.calendar
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn day(&self) -> u32 {
        self.day
    }

    /// Civil fields `(year, month, day, hour, minute, second)`, ignoring the
    /// calendar tag. Use this to compare `standard` against
    /// `proleptic_gregorian` timestamps of the same family.
    pub fn civil(&self) -> (i32, u32, u32, u32, u32, u32) {
        (
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
        )
    }

    /// Seconds since 0000-01-01T00:00:00 in this timestamp's calendar
    pub fn seconds_since_origin(&self) -> HarmonizeResult<i64> {
        let days = self.calendar.ordinal_days(self.year, self.month, self.day)?;
        Ok(days * SECONDS_PER_DAY
            + (self.hour as i64) * 3600
            + (self.minute as i64) * 60
            + self.second as i64)
    }

    /// Shift by a signed number of seconds, staying in the same calendar.
    pub fn add_seconds(&self, seconds: i64) -> HarmonizeResult<Self> {
        let total = self
            .seconds_since_origin()?
            .checked_add(seconds)
            .ok_or_else(|| HarmonizeError::InvalidDate(format!("{self} + {seconds} s")))?;
        let days = total.div_euclid(SECONDS_PER_DAY);
        let secs = total.rem_euclid(SECONDS_PER_DAY) as u32;
        let (year, month, day) = self.calendar.date_from_ordinal(days)?;
        Self::new(
            self.calendar,
            year,
            month,
            day,
            secs / 3600,
            (secs % 3600) / 60,
            secs % 60,
        )
    }
}

impl fmt::Display for CfDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

fn parse_reference(units: &str, calendar: CalendarKind) -> HarmonizeResult<(i64, CfDateTime)> {
    let bad_units = || HarmonizeError::InvalidTimeUnits(units.to_string());
    let mut tokens = units.split_whitespace();
    let step = match tokens.next().map(|t| t.to_ascii_lowercase()).as_deref() {
        Some("days" | "day" | "d") => SECONDS_PER_DAY,
        Some("hours" | "hour" | "hr" | "h") => 3600,
        Some("minutes" | "minute" | "min") => 60,
        Some("seconds" | "second" | "sec" | "s") => 1,
        _ => return Err(bad_units()),
    };
    if tokens.next().map(|t| t.to_ascii_lowercase()).as_deref() != Some("since") {
        return Err(bad_units());
    }
    let stamp = tokens.next().ok_or_else(bad_units)?;
    let (date, inline_time) = match stamp.split_once('T') {
        Some((date, time)) => (date, Some(time)),
        None => (stamp, None),
    };
    let time = inline_time.or_else(|| tokens.next());

    let date_parts = date
        .splitn(3, '-')
        .map(|p| p.parse::<i64>().map_err(|_| bad_units()))
        .collect::<HarmonizeResult<Vec<_>>>()?;
    if date_parts.len() != 3 {
        return Err(bad_units());
    }
    let mut clock = [0u32; 3];
    if let Some(time) = time {
        for (slot, part) in clock.iter_mut().zip(time.trim_end_matches('Z').split(':')) {
            // fractional seconds are truncated
            let whole = part.split('.').next().unwrap_or(part);
            *slot = whole.parse::<u32>().map_err(|_| bad_units())?;
        }
    }
    let reference = CfDateTime::new(
        calendar,
        date_parts[0] as i32,
        date_parts[1] as u32,
        date_parts[2] as u32,
        clock[0],
        clock[1],
        clock[2],
    )?;
    Ok((step, reference))
}

/// Decode numeric CF time offsets into calendar-typed timestamps.
///
/// Largest offset magnitude that converts to `i64` seconds without saturating
const MAX_OFFSET_SECONDS: f64 = 9.0e18;

/// `units` follows the CF form `<unit> since <reference>` and `calendar` is the
/// value of the time variable's `calendar` attribute. Unknown calendar names are
/// a [`HarmonizeError::CalendarDetection`] failure.
pub fn decode_cf_times(
    units: &str,
    calendar: &str,
    offsets: &[f64],
) -> HarmonizeResult<Vec<CfDateTime>> {
    let kind = CalendarKind::from_cf_name(calendar).ok_or_else(|| {
        HarmonizeError::CalendarDetection(format!("unknown calendar attribute `{calendar}`"))
    })?;
    let (step, reference) = parse_reference(units, kind)?;
    offsets
        .iter()
        .map(|offset| {
            let seconds = (offset * step as f64).round();
            if !seconds.is_finite() || seconds.abs() >= MAX_OFFSET_SECONDS {
                return Err(HarmonizeError::InvalidDate(format!("time offset {offset}")));
            }
            reference.add_seconds(seconds as i64)
        })
        .collect()
}

/// Determine which supported calendar a time axis uses.
///
/// Exactly one of the three families must be present. An empty axis, an
/// unsupported calendar, or a mixture of families is unrecoverable.
pub fn detect_calendar(times: &[CfDateTime]) -> HarmonizeResult<Calendar> {
    let first = times.first().ok_or_else(|| {
        HarmonizeError::CalendarDetection("time axis is empty".to_string())
    })?;
    let calendar = first.calendar().family().ok_or_else(|| {
        HarmonizeError::CalendarDetection(format!(
            "unsupported calendar `{}`",
            first.calendar()
        ))
    })?;
    if let Some(other) = times
        .iter()
        .find(|t| t.calendar().family() != Some(calendar))
    {
        return Err(HarmonizeError::CalendarDetection(format!(
            "time axis mixes `{}` and `{}` timestamps",
            first.calendar(),
            other.calendar()
        )));
    }
    Ok(calendar)
}
