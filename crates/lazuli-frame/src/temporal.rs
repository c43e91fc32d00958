//! Durations and window parameters for rolling / dynamic grouping and asof
//! tolerances.
//!
//! A duration string is a sequence of `<integer><unit>` pairs, optionally
//! prefixed with `-`, e.g. `"1d12h"`, `"3i"`, `"-2w"`. Units: `ns`, `us`,
//! `ms`, `s`, `m`, `h`, `d`, `w`, `mo`, `q` (3 months), `y` (12 months) and
//! `i` (index steps for integer index columns).

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Int64Array};
use arrow::compute::cast;
use arrow::datatypes::{DataType, TimeUnit};
use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{DataFrameError, Result};

const NANOS_PER_SECOND: i64 = 1_000_000_000;
const NANOS_PER_DAY: i64 = 86_400 * NANOS_PER_SECOND;
/// `NaiveDate::num_days_from_ce()` of 1970-01-01.
const EPOCH_DAYS_FROM_CE: i64 = 719_163;

/// A calendar-aware duration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Duration {
    months: i64,
    weeks: i64,
    days: i64,
    nanos: i64,
    index: i64,
}

impl Duration {
    /// Parse a duration string such as `"1d12h"` or `"3i"`.
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || DataFrameError::invalid_operation(format!("invalid duration string '{s}'"));

        let (negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        if body.is_empty() {
            return Err(invalid());
        }

        let mut out = Duration::default();
        let mut chars = body.chars().peekable();
        while chars.peek().is_some() {
            let mut digits = String::new();
            while let Some(c) = chars.peek().filter(|c| c.is_ascii_digit()) {
                digits.push(*c);
                chars.next();
            }
            let mut unit = String::new();
            while let Some(c) = chars.peek().filter(|c| c.is_ascii_alphabetic()) {
                unit.push(*c);
                chars.next();
            }
            if digits.is_empty() || unit.is_empty() {
                return Err(invalid());
            }
            let n: i64 = digits.parse().map_err(|_| invalid())?;
            match unit.as_str() {
                "ns" => out.nanos += n,
                "us" => out.nanos += n * 1_000,
                "ms" => out.nanos += n * 1_000_000,
                "s" => out.nanos += n * NANOS_PER_SECOND,
                "m" => out.nanos += n * 60 * NANOS_PER_SECOND,
                "h" => out.nanos += n * 3_600 * NANOS_PER_SECOND,
                "d" => out.days += n,
                "w" => out.weeks += n,
                "mo" => out.months += n,
                "q" => out.months += 3 * n,
                "y" => out.months += 12 * n,
                "i" => out.index += n,
                _ => return Err(invalid()),
            }
        }

        Ok(if negative { out.negate() } else { out })
    }

    /// Duration of `n` index steps.
    pub fn from_index(n: i64) -> Self {
        Self {
            index: n,
            ..Self::default()
        }
    }

    pub(crate) fn days(n: i64) -> Self {
        Self {
            days: n,
            ..Self::default()
        }
    }

    pub(crate) fn weeks(n: i64) -> Self {
        Self {
            weeks: n,
            ..Self::default()
        }
    }

    /// The same duration pointing the other way.
    pub fn negate(&self) -> Self {
        Self {
            months: -self.months,
            weeks: -self.weeks,
            days: -self.days,
            nanos: -self.nanos,
            index: -self.index,
        }
    }

    /// `true` when every component is zero.
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// `true` when the duration has a week component.
    pub fn has_weeks(&self) -> bool {
        self.weeks != 0
    }

    fn is_calendar(&self) -> bool {
        self.months != 0 || self.weeks != 0 || self.days != 0 || self.nanos != 0
    }

    fn fixed_ticks(&self, kind: IndexKind) -> i64 {
        match kind {
            IndexKind::Int => self.index,
            IndexKind::Date => self.weeks * 7 + self.days + self.nanos / NANOS_PER_DAY,
            IndexKind::Timestamp(unit) => {
                (self.weeks * 7 + self.days) * ticks_per_day(unit) + nanos_to_ticks(self.nanos, unit)
            }
        }
    }

    fn check_kind(&self, kind: IndexKind) -> Result<()> {
        match kind {
            IndexKind::Int if self.is_calendar() => Err(DataFrameError::invalid_operation(format!(
                "duration '{self}' needs a temporal index; use 'i' units for integer columns"
            ))),
            IndexKind::Date | IndexKind::Timestamp(_) if self.index != 0 => {
                Err(DataFrameError::invalid_operation(format!(
                    "index duration '{self}' used with a temporal column"
                )))
            }
            _ => Ok(()),
        }
    }

    /// `true` when adding this duration moves a value forward.
    pub(crate) fn is_positive(&self, kind: IndexKind) -> bool {
        self.months > 0 || (self.months == 0 && self.fixed_ticks(kind) > 0)
    }

    /// Add this duration to `t`, expressed in the ticks of `kind`.
    pub(crate) fn add_to(&self, t: i64, kind: IndexKind) -> Result<i64> {
        self.check_kind(kind)?;
        let shifted = if self.months == 0 {
            t
        } else {
            let tpd = kind.ticks_per_day();
            let day = t.div_euclid(tpd);
            let rem = t.rem_euclid(tpd);
            let date = shift_months(date_from_days(day)?, self.months)?;
            days_from_date(date) * tpd + rem
        };
        Ok(shifted + self.fixed_ticks(kind))
    }

    /// Start of the window of width `self` that contains `t`.
    ///
    /// Month windows start on the first of a month, week windows on a Monday.
    pub(crate) fn truncate(&self, t: i64, kind: IndexKind) -> Result<i64> {
        self.check_kind(kind)?;
        if !self.is_positive(kind) {
            return Err(DataFrameError::invalid_operation(format!(
                "window size '{self}' must be positive"
            )));
        }
        let tpd = kind.ticks_per_day();
        if self.months > 0 {
            let date = date_from_days(t.div_euclid(tpd))?;
            let total = date.year() as i64 * 12 + date.month0() as i64;
            let floored = total - total.rem_euclid(self.months);
            let start = NaiveDate::from_ymd_opt(
                floored.div_euclid(12) as i32,
                floored.rem_euclid(12) as u32 + 1,
                1,
            )
            .ok_or_else(|| DataFrameError::invalid_operation("date out of range"))?;
            return Ok(days_from_date(start) * tpd);
        }
        let every = self.fixed_ticks(kind);
        if self.weeks != 0 {
            // 1970-01-01 is a Thursday; Mondays sit 3 days earlier in the cycle.
            Ok(t - (t + 3 * tpd).rem_euclid(every))
        } else {
            Ok(t - t.rem_euclid(every))
        }
    }
}

impl FromStr for Duration {
    type Err = DataFrameError;

    fn from_str(s: &str) -> Result<Self> {
        Duration::parse(s)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return write!(f, "0ns");
        }
        let parts = [
            (self.months, "mo"),
            (self.weeks, "w"),
            (self.days, "d"),
            (self.nanos, "ns"),
            (self.index, "i"),
        ];
        let negative = parts.iter().any(|(v, _)| *v < 0);
        if negative {
            write!(f, "-")?;
        }
        for (v, unit) in parts {
            if v != 0 {
                write!(f, "{}{unit}", v.abs())?;
            }
        }
        Ok(())
    }
}

/// How an index column is interpreted when windows are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IndexKind {
    /// Integer column; durations must use `i` units.
    Int,
    /// `Date32`, ticks are days.
    Date,
    /// `Timestamp` in the given unit.
    Timestamp(TimeUnit),
}

impl IndexKind {
    pub(crate) fn from_dtype(dtype: &DataType) -> Result<Self> {
        match dtype {
            DataType::Int32 | DataType::Int64 => Ok(IndexKind::Int),
            DataType::Date32 => Ok(IndexKind::Date),
            DataType::Timestamp(unit, _) => Ok(IndexKind::Timestamp(*unit)),
            other => Err(DataFrameError::type_mismatch(
                None::<String>,
                "Int32, Int64, Date32 or Timestamp index",
                other.to_string(),
            )),
        }
    }

    fn ticks_per_day(&self) -> i64 {
        match self {
            IndexKind::Int | IndexKind::Date => 1,
            IndexKind::Timestamp(unit) => ticks_per_day(*unit),
        }
    }
}

/// Which window bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClosedWindow {
    /// `[lower, upper)`
    Left,
    /// `(lower, upper]`
    Right,
    /// `[lower, upper]`
    Both,
    /// `(lower, upper)`
    None,
}

impl ClosedWindow {
    pub(crate) fn contains(&self, lower: i64, upper: i64, t: i64) -> bool {
        match self {
            ClosedWindow::Left => lower <= t && t < upper,
            ClosedWindow::Right => lower < t && t <= upper,
            ClosedWindow::Both => lower <= t && t <= upper,
            ClosedWindow::None => lower < t && t < upper,
        }
    }
}

/// Which value labels a dynamic window in the output index column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Label {
    /// Lower window boundary.
    #[default]
    Left,
    /// Upper window boundary.
    Right,
    /// First index value inside the window.
    DataPoint,
}

/// Where the first dynamic window starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartBy {
    /// Truncate the first index value by `every`.
    WindowBound,
    /// Start at the first index value.
    DataPoint,
    /// Start on the Monday before the first value (weekly windows only).
    #[default]
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl StartBy {
    pub(crate) fn weekday_offset(&self) -> Option<i64> {
        match self {
            StartBy::WindowBound | StartBy::DataPoint => None,
            StartBy::Monday => Some(0),
            StartBy::Tuesday => Some(1),
            StartBy::Wednesday => Some(2),
            StartBy::Thursday => Some(3),
            StartBy::Friday => Some(4),
            StartBy::Saturday => Some(5),
            StartBy::Sunday => Some(6),
        }
    }
}

/// Read an index column as `i64` ticks.
pub(crate) fn index_values(array: &ArrayRef) -> Result<(IndexKind, Vec<Option<i64>>)> {
    let kind = IndexKind::from_dtype(array.data_type())?;
    let ints = cast(array, &DataType::Int64)?;
    let ints = ints
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| DataFrameError::invalid_operation("bad Int64Array downcast"))?;
    Ok((kind, ints.iter().collect()))
}

/// Build an index column of `dtype` from `i64` ticks.
pub(crate) fn ticks_to_array(values: Vec<Option<i64>>, dtype: &DataType) -> Result<ArrayRef> {
    let ints: ArrayRef = Arc::new(Int64Array::from(values));
    match dtype {
        DataType::Int64 => Ok(ints),
        DataType::Date32 => {
            let days = cast(&ints, &DataType::Int32)?;
            Ok(cast(&days, &DataType::Date32)?)
        }
        other => Ok(cast(&ints, other)?),
    }
}

fn ticks_per_day(unit: TimeUnit) -> i64 {
    match unit {
        TimeUnit::Second => 86_400,
        TimeUnit::Millisecond => 86_400_000,
        TimeUnit::Microsecond => 86_400_000_000,
        TimeUnit::Nanosecond => NANOS_PER_DAY,
    }
}

fn nanos_to_ticks(nanos: i64, unit: TimeUnit) -> i64 {
    match unit {
        TimeUnit::Second => nanos / NANOS_PER_SECOND,
        TimeUnit::Millisecond => nanos / 1_000_000,
        TimeUnit::Microsecond => nanos / 1_000,
        TimeUnit::Nanosecond => nanos,
    }
}

fn date_from_days(days: i64) -> Result<NaiveDate> {
    i32::try_from(days + EPOCH_DAYS_FROM_CE)
        .ok()
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .ok_or_else(|| DataFrameError::invalid_operation(format!("day {days} out of range")))
}

fn days_from_date(date: NaiveDate) -> i64 {
    date.num_days_from_ce() as i64 - EPOCH_DAYS_FROM_CE
}

fn shift_months(date: NaiveDate, months: i64) -> Result<NaiveDate> {
    let magnitude = u32::try_from(months.unsigned_abs())
        .map_err(|_| DataFrameError::invalid_operation("month offset out of range"))?;
    let shifted = if months >= 0 {
        date.checked_add_months(Months::new(magnitude))
    } else {
        date.checked_sub_months(Months::new(magnitude))
    };
    shifted.ok_or_else(|| DataFrameError::invalid_operation("date out of range"))
}

#[cfg(test)]
mod tests {
    use arrow::datatypes::TimeUnit;
    use chrono::NaiveDate;

    use super::{days_from_date, ClosedWindow, Duration, IndexKind};
    use crate::DataFrameError;

    fn day(y: i32, m: u32, d: u32) -> i64 {
        days_from_date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn parses_compound_durations() {
        let d = Duration::parse("1d12h").unwrap();
        assert_eq!(d.days, 1);
        assert_eq!(d.nanos, 12 * 3_600 * 1_000_000_000);

        assert_eq!(Duration::parse("1q").unwrap().months, 3);
        assert_eq!(Duration::parse("2y").unwrap().months, 24);
        assert_eq!(Duration::parse("30m").unwrap().nanos, 30 * 60 * 1_000_000_000);
        assert_eq!(Duration::parse("5ms").unwrap().nanos, 5_000_000);
        assert_eq!(Duration::parse("3i").unwrap(), Duration::from_index(3));
        assert_eq!(Duration::parse("-2w").unwrap().weeks, -2);
    }

    #[test]
    fn rejects_malformed_durations() {
        for bad in ["", "-", "5", "d", "1x", "1d2"] {
            let err = Duration::parse(bad).unwrap_err();
            assert!(
                matches!(err, DataFrameError::InvalidOperation { .. }),
                "{bad}"
            );
        }
    }

    #[test]
    fn display_is_canonical() {
        assert_eq!(Duration::parse("1mo2d").unwrap().to_string(), "1mo2d");
        assert_eq!(Duration::parse("-3i").unwrap().to_string(), "-3i");
    }

    #[test]
    fn month_arithmetic_clamps_to_month_end() {
        let d = Duration::parse("1mo").unwrap();
        let out = d.add_to(day(2024, 1, 31), IndexKind::Date).unwrap();
        assert_eq!(out, day(2024, 2, 29));
    }

    #[test]
    fn timestamp_arithmetic_keeps_time_of_day() {
        let unit = TimeUnit::Millisecond;
        let t = day(2024, 1, 31) * 86_400_000 + 3_600_000;
        let out = Duration::parse("1mo1h")
            .unwrap()
            .add_to(t, IndexKind::Timestamp(unit))
            .unwrap();
        assert_eq!(out, day(2024, 2, 29) * 86_400_000 + 2 * 3_600_000);
    }

    #[test]
    fn weekly_truncation_lands_on_monday() {
        let w = Duration::parse("1w").unwrap();
        // 2024-01-03 is a Wednesday
        let start = w.truncate(day(2024, 1, 3), IndexKind::Date).unwrap();
        assert_eq!(start, day(2024, 1, 1));
    }

    #[test]
    fn monthly_truncation_lands_on_first() {
        let m = Duration::parse("1mo").unwrap();
        assert_eq!(
            m.truncate(day(2024, 3, 15), IndexKind::Date).unwrap(),
            day(2024, 3, 1)
        );
        let q = Duration::parse("1q").unwrap();
        assert_eq!(
            q.truncate(day(2024, 5, 20), IndexKind::Date).unwrap(),
            day(2024, 4, 1)
        );
    }

    #[test]
    fn integer_index_rejects_calendar_units() {
        let err = Duration::parse("1d")
            .unwrap()
            .add_to(3, IndexKind::Int)
            .unwrap_err();
        assert!(matches!(err, DataFrameError::InvalidOperation { .. }));
        assert_eq!(Duration::parse("2i").unwrap().truncate(7, IndexKind::Int).unwrap(), 6);
    }

    #[test]
    fn closed_window_bounds() {
        assert!(ClosedWindow::Left.contains(0, 2, 0));
        assert!(!ClosedWindow::Left.contains(0, 2, 2));
        assert!(ClosedWindow::Right.contains(0, 2, 2));
        assert!(ClosedWindow::Both.contains(0, 2, 2));
        assert!(!ClosedWindow::None.contains(0, 2, 0));
    }
}
