//! Calendar-aware analysis window
//!
//! Every source is trimmed to a window starting 1982-01-01 00:00:00. The end
//! depends on provenance: observations stop at the end of 2020, model runs at
//! the end of 2100. In a 360-day calendar December has 30 days, so the final
//! instant of a year is 12-30 23:59:59.
//!
//! Both bounds are inclusive and are built in the calendar detected on the
//! time axis; timestamps from different calendar families are never compared.

use crate::calendar::{detect_calendar, Calendar, CfDateTime};
use crate::dataset::Temporal;
use crate::errors::{HarmonizeError, HarmonizeResult};
use crate::policy::SourcePolicy;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;

/// First year of every analysis window
pub const WINDOW_START_YEAR: i32 = 1982;

/// Closed interval `[start, end]` in one calendar family.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub calendar: Calendar,
    pub start: CfDateTime,
    pub end: CfDateTime,
}

impl TimeWindow {
    /// Window from the shared start to the last instant of `end_year`.
    pub fn for_calendar(calendar: Calendar, end_year: i32) -> HarmonizeResult<Self> {
        let kind = calendar.kind();
        let start = CfDateTime::ymd(kind, WINDOW_START_YEAR, 1, 1)?;
        let end = CfDateTime::new(kind, end_year, 12, calendar.last_day_of_year(), 23, 59, 59)?;
        if end.civil() < start.civil() {
            return Err(HarmonizeError::EmptyTimeWindow {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self {
            calendar,
            start,
            end,
        })
    }

    pub fn for_policy(calendar: Calendar, policy: &SourcePolicy) -> HarmonizeResult<Self> {
        Self::for_calendar(calendar, policy.window_end_year)
    }

    pub fn contains(&self, time: &CfDateTime) -> bool {
        let t = time.civil();
        t >= self.start.civil() && t <= self.end.civil()
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}] ({})", self.start, self.end, self.calendar)
    }
}

/// Years of the first and last retained timestamps, rendered `YYYY-YYYY`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearSpan {
    pub first: i32,
    pub last: i32,
}

impl fmt::Display for YearSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.first, self.last)
    }
}

/// Drop repeated timestamps, keeping the first occurrence of each.
///
/// The result is in ascending time order. Concatenating historical and
/// scenario files can repeat the overlap years; the copy from the earlier file
/// wins.
pub fn deduplicate_times<T: Temporal>(data: T) -> T {
    let times = data.times();
    let mut order: Vec<usize> = (0..times.len()).collect();
    // stable, so equal timestamps keep their original relative order
    order.sort_by_key(|&i| times[i].civil());
    order.dedup_by_key(|i| times[*i].civil());

    let dropped = times.len() - order.len();
    let in_order = order.iter().enumerate().all(|(pos, i)| pos == *i);
    if dropped == 0 && in_order {
        return data;
    }
    debug!("dropping {dropped} duplicate timestamps");
    data.select_times(&order)
}

/// Deduplicate, detect the calendar and trim to the source's window.
///
/// Fails with [`HarmonizeError::CalendarDetection`] when the axis is not in
/// exactly one supported calendar family, and with
/// [`HarmonizeError::EmptyTimeWindow`] when nothing falls in the window.
pub fn select_time_window<T: Temporal>(
    data: T,
    policy: &SourcePolicy,
) -> HarmonizeResult<(T, YearSpan)> {
    let data = deduplicate_times(data);
    let calendar = detect_calendar(data.times())?;
    let window = TimeWindow::for_policy(calendar, policy)?;
    debug!("time window {window}");

    let keep: Vec<usize> = data
        .times()
        .iter()
        .enumerate()
        .filter(|(_, t)| window.contains(t))
        .map(|(i, _)| i)
        .collect();
    let (first, last) = match (keep.first(), keep.last()) {
        (Some(&first), Some(&last)) => (data.times()[first], data.times()[last]),
        _ => {
            return Err(HarmonizeError::EmptyTimeWindow {
                start: window.start.to_string(),
                end: window.end.to_string(),
            })
        }
    };
    let span = YearSpan {
        first: first.year(),
        last: last.year(),
    };
    info!("start date: {first}");
    info!("end date: {last}");
    info!("year span: {span}");

    Ok((data.select_times(&keep), span))
}
