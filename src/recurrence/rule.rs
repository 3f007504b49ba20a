//! Recurrence rule model and its RFC 5545 subset text form.
//!
//! Text form: `FREQ=...;INTERVAL=...;BYDAY=...;BYMONTHDAY=...;BYMONTH=...;
//! COUNT=...;UNTIL=YYYYMMDDTHHmmss;BYSETPOS=...`, parts omitted when
//! default or absent. Parsing is all-or-nothing: a malformed part rejects
//! the whole rule.

use chrono::{NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RuleParseError;
use crate::time::format::{format_basic, parse_basic};

/// Recurrence frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Frequency {
    /// Every `interval` days.
    Daily,
    /// Every `interval` weeks.
    Weekly,
    /// Every `interval` months.
    Monthly,
    /// Every `interval` years.
    Yearly,
}

impl Frequency {
    /// Rule text token.
    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Yearly => "YEARLY",
        }
    }
}

impl FromStr for Frequency {
    type Err = RuleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DAILY" => Ok(Frequency::Daily),
            "WEEKLY" => Ok(Frequency::Weekly),
            "MONTHLY" => Ok(Frequency::Monthly),
            "YEARLY" => Ok(Frequency::Yearly),
            _ => Err(invalid("FREQ", s)),
        }
    }
}

/// A weekday selector, optionally restricted to one ordinal position
/// within the period (`2TU` = second Tuesday, `-1FR` = last Friday).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DaySelector {
    /// Selected weekday.
    pub weekday: Weekday,
    /// 1-based position, negative counts from the end.
    pub ordinal: Option<i32>,
}

impl DaySelector {
    /// Every `weekday` of the period.
    pub fn every(weekday: Weekday) -> Self {
        Self {
            weekday,
            ordinal: None,
        }
    }

    /// The `ordinal`-th `weekday` of the period.
    pub fn nth(ordinal: i32, weekday: Weekday) -> Self {
        Self {
            weekday,
            ordinal: Some(ordinal),
        }
    }
}

impl fmt::Display for DaySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ordinal) = self.ordinal {
            write!(f, "{ordinal}")?;
        }
        f.write_str(weekday_code(self.weekday))
    }
}

impl FromStr for DaySelector {
    type Err = RuleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() < 2 || !s.is_char_boundary(s.len() - 2) {
            return Err(invalid("BYDAY", s));
        }
        let (ordinal, code) = s.split_at(s.len() - 2);
        let weekday = parse_weekday_code(code).ok_or_else(|| invalid("BYDAY", s))?;
        if ordinal.is_empty() {
            return Ok(Self::every(weekday));
        }
        let ordinal: i32 = ordinal.parse().map_err(|_| invalid("BYDAY", s))?;
        if !valid_ordinal(ordinal) {
            return Err(invalid("BYDAY", s));
        }
        Ok(Self::nth(ordinal, weekday))
    }
}

fn valid_ordinal(ordinal: i32) -> bool {
    ordinal != 0 && ordinal.abs() <= 53
}

fn valid_month_day(day: i32) -> bool {
    day != 0 && day.abs() <= 31
}

fn valid_month(month: u32) -> bool {
    (1..=12).contains(&month)
}

fn valid_position(position: i32) -> bool {
    position != 0 && position.abs() <= 366
}

/// Drops out-of-range builder values, logging what was dropped.
fn retain_valid<T>(field: &str, mut values: Vec<T>, valid: impl Fn(&T) -> bool) -> Vec<T> {
    let before = values.len();
    values.retain(|v| valid(v));
    if values.len() != before {
        tracing::warn!(field, dropped = before - values.len(), "discarding out-of-range rule values");
    }
    values
}

/// A parsed recurrence rule.
///
/// `count` and `end_date` are mutually exclusive: setting one clears
/// the other. Serialized as its rule text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecurrenceRule {
    frequency: Frequency,
    interval: u32,
    count: Option<u32>,
    end_date: Option<NaiveDateTime>,
    days: Vec<DaySelector>,
    month_days: Vec<i32>,
    months: Vec<u32>,
    positions: Vec<i32>,
}

impl RecurrenceRule {
    /// A rule repeating every period at `frequency`.
    pub fn new(frequency: Frequency) -> Self {
        Self {
            frequency,
            interval: 1,
            count: None,
            end_date: None,
            days: Vec::new(),
            month_days: Vec::new(),
            months: Vec::new(),
            positions: Vec::new(),
        }
    }

    /// Parses rule text, logging and discarding malformed input.
    pub fn parse_lenient(text: &str) -> Option<Self> {
        match text.parse() {
            Ok(rule) => Some(rule),
            Err(e) => {
                tracing::warn!(rule = text, error = %e, "ignoring malformed recurrence rule");
                None
            }
        }
    }

    /// Sets the interval (values below 1 become 1).
    pub fn with_interval(mut self, interval: u32) -> Self {
        self.interval = interval.max(1);
        self
    }

    /// Limits the series to `count` occurrences.
    pub fn with_count(mut self, count: u32) -> Self {
        self.set_count(Some(count));
        self
    }

    /// Ends the series at `end_date` (inclusive).
    pub fn with_end_date(mut self, end_date: NaiveDateTime) -> Self {
        self.set_end_date(Some(end_date));
        self
    }

    /// Sets weekday selectors. Ordinals must be within -53..=53, not 0.
    pub fn with_days(mut self, days: Vec<DaySelector>) -> Self {
        self.days = retain_valid("days", days, |d| d.ordinal.map_or(true, valid_ordinal));
        self
    }

    /// Sets days of month (1..31 or -31..-1).
    pub fn with_month_days(mut self, month_days: Vec<i32>) -> Self {
        self.month_days = retain_valid("month_days", month_days, |d| valid_month_day(*d));
        self
    }

    /// Sets months of year (1..12).
    pub fn with_months(mut self, months: Vec<u32>) -> Self {
        self.months = retain_valid("months", months, |m| valid_month(*m));
        self
    }

    /// Sets BYSETPOS positions (1..366 or -366..-1).
    pub fn with_positions(mut self, positions: Vec<i32>) -> Self {
        self.positions = retain_valid("positions", positions, |p| valid_position(*p));
        self
    }

    /// Sets the occurrence limit; clears `end_date` when set. Zero means
    /// no limit.
    pub fn set_count(&mut self, count: Option<u32>) {
        self.count = count.filter(|c| *c > 0);
        if self.count.is_some() {
            self.end_date = None;
        }
    }

    /// Sets the end date, truncated to whole seconds; clears `count` when set.
    pub fn set_end_date(&mut self, end_date: Option<NaiveDateTime>) {
        self.end_date = end_date.map(|d| d.with_nanosecond(0).unwrap_or(d));
        if self.end_date.is_some() {
            self.count = None;
        }
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    pub fn count(&self) -> Option<u32> {
        self.count
    }

    pub fn end_date(&self) -> Option<NaiveDateTime> {
        self.end_date
    }

    pub fn days(&self) -> &[DaySelector] {
        &self.days
    }

    pub fn month_days(&self) -> &[i32] {
        &self.month_days
    }

    pub fn months(&self) -> &[u32] {
        &self.months
    }

    pub fn positions(&self) -> &[i32] {
        &self.positions
    }

    /// Neither `count` nor `end_date` bounds the series.
    pub fn is_unbounded(&self) -> bool {
        self.count.is_none() && self.end_date.is_none()
    }
}

impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FREQ={}", self.frequency.as_str())?;
        if self.interval != 1 {
            write!(f, ";INTERVAL={}", self.interval)?;
        }
        if !self.days.is_empty() {
            write!(f, ";BYDAY={}", join(&self.days))?;
        }
        if !self.month_days.is_empty() {
            write!(f, ";BYMONTHDAY={}", join(&self.month_days))?;
        }
        if !self.months.is_empty() {
            write!(f, ";BYMONTH={}", join(&self.months))?;
        }
        if let Some(count) = self.count {
            write!(f, ";COUNT={count}")?;
        }
        if let Some(end_date) = self.end_date {
            write!(f, ";UNTIL={}", format_basic(end_date))?;
        }
        if !self.positions.is_empty() {
            write!(f, ";BYSETPOS={}", join(&self.positions))?;
        }
        Ok(())
    }
}

impl FromStr for RecurrenceRule {
    type Err = RuleParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        let text = text.strip_prefix("RRULE:").unwrap_or(text);

        let mut frequency = None;
        let mut rule = RecurrenceRule::new(Frequency::Daily);

        for part in text.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| RuleParseError::MalformedPart(part.to_string()))?;
            let key = key.trim().to_ascii_uppercase();
            let value = value.trim();
            match key.as_str() {
                "FREQ" => frequency = Some(value.parse::<Frequency>()?),
                "INTERVAL" => {
                    let interval: u32 = value.parse().map_err(|_| invalid(&key, value))?;
                    if interval == 0 {
                        return Err(invalid(&key, value));
                    }
                    rule.interval = interval;
                }
                "COUNT" => {
                    let count: u32 = value.parse().map_err(|_| invalid(&key, value))?;
                    if count == 0 {
                        return Err(invalid(&key, value));
                    }
                    rule.count = Some(count);
                }
                "UNTIL" => {
                    rule.end_date = Some(parse_basic(value).ok_or_else(|| invalid(&key, value))?);
                }
                "BYDAY" => {
                    rule.days = split_list(value, |item| item.parse::<DaySelector>().ok())
                        .ok_or_else(|| invalid(&key, value))?;
                }
                "BYMONTHDAY" => {
                    rule.month_days = split_list(value, |item| {
                        item.parse::<i32>().ok().filter(|d| valid_month_day(*d))
                    })
                    .ok_or_else(|| invalid(&key, value))?;
                }
                "BYMONTH" => {
                    rule.months = split_list(value, |item| {
                        item.parse::<u32>().ok().filter(|m| valid_month(*m))
                    })
                    .ok_or_else(|| invalid(&key, value))?;
                }
                "BYSETPOS" => {
                    rule.positions = split_list(value, |item| {
                        item.parse::<i32>().ok().filter(|p| valid_position(*p))
                    })
                    .ok_or_else(|| invalid(&key, value))?;
                }
                // Week start comes from project configuration.
                "WKST" => {}
                _ => return Err(RuleParseError::MalformedPart(part.to_string())),
            }
        }

        if rule.count.is_some() && rule.end_date.is_some() {
            return Err(RuleParseError::CountWithUntil);
        }
        rule.frequency = frequency.ok_or(RuleParseError::MissingFrequency)?;
        Ok(rule)
    }
}

impl TryFrom<String> for RecurrenceRule {
    type Error = RuleParseError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        text.parse()
    }
}

impl From<RecurrenceRule> for String {
    fn from(rule: RecurrenceRule) -> Self {
        rule.to_string()
    }
}

/// Two-letter rule code of a weekday.
pub fn weekday_code(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

fn parse_weekday_code(code: &str) -> Option<Weekday> {
    match code.to_ascii_uppercase().as_str() {
        "MO" => Some(Weekday::Mon),
        "TU" => Some(Weekday::Tue),
        "WE" => Some(Weekday::Wed),
        "TH" => Some(Weekday::Thu),
        "FR" => Some(Weekday::Fri),
        "SA" => Some(Weekday::Sat),
        "SU" => Some(Weekday::Sun),
        _ => None,
    }
}

fn split_list<T>(value: &str, parse: impl Fn(&str) -> Option<T>) -> Option<Vec<T>> {
    value.split(',').map(|item| parse(item.trim())).collect()
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn invalid(key: &str, value: &str) -> RuleParseError {
    RuleParseError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}
