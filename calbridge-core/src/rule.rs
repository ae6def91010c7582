//! RRULE value model.
//!
//! Parses and writes the RECUR value type of RFC 5545 section 3.3.10. Only the
//! parts the mappers reason about are modelled as fields; BYHOUR and friends
//! are rejected at parse time because no host pattern can carry them.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::CalBridgeError;
use crate::event::EventTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frequency {
    Secondly,
    Minutely,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn as_ics_str(&self) -> &'static str {
        match self {
            Frequency::Secondly => "SECONDLY",
            Frequency::Minutely => "MINUTELY",
            Frequency::Hourly => "HOURLY",
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Yearly => "YEARLY",
        }
    }

    fn from_ics_str(s: &str) -> Option<Self> {
        match s {
            "SECONDLY" => Some(Frequency::Secondly),
            "MINUTELY" => Some(Frequency::Minutely),
            "HOURLY" => Some(Frequency::Hourly),
            "DAILY" => Some(Frequency::Daily),
            "WEEKLY" => Some(Frequency::Weekly),
            "MONTHLY" => Some(Frequency::Monthly),
            "YEARLY" => Some(Frequency::Yearly),
            _ => None,
        }
    }
}

/// How a series ends. COUNT and UNTIL are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleEnd {
    Forever,
    Count(u32),
    Until(EventTime),
}

/// A BYDAY entry such as `TU` or `-1FR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekdayNum {
    pub ordinal: Option<i32>,
    pub weekday: Weekday,
}

impl WeekdayNum {
    pub fn every(weekday: Weekday) -> Self {
        Self {
            ordinal: None,
            weekday,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    pub interval: u32,
    pub end: RuleEnd,
    pub by_day: Vec<WeekdayNum>,
    pub by_month_day: Vec<i32>,
    pub by_month: Vec<i32>,
    pub by_set_pos: Vec<i32>,
    pub week_start: Option<Weekday>,
    /// Parts of a parsed rule that have no host equivalent, e.g. `BYHOUR=9`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignored_parts: Vec<String>,
}

impl RecurrenceRule {
    pub fn new(frequency: Frequency) -> Self {
        Self {
            frequency,
            interval: 1,
            end: RuleEnd::Forever,
            by_day: Vec::new(),
            by_month_day: Vec::new(),
            by_month: Vec::new(),
            by_set_pos: Vec::new(),
            week_start: None,
            ignored_parts: Vec::new(),
        }
    }

    pub fn count(&self) -> Option<u32> {
        match self.end {
            RuleEnd::Count(n) => Some(n),
            _ => None,
        }
    }

    pub fn until(&self) -> Option<&EventTime> {
        match &self.end {
            RuleEnd::Until(t) => Some(t),
            _ => None,
        }
    }
}

pub(crate) fn weekday_code(day: Weekday) -> &'static str {
    match day {
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
    match code {
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

fn write_until(f: &mut fmt::Formatter<'_>, until: &EventTime) -> fmt::Result {
    match until {
        EventTime::Date(d) => write!(f, ";UNTIL={}", d.format("%Y%m%d")),
        EventTime::DateTimeUtc(dt) => write!(f, ";UNTIL={}", dt.format("%Y%m%dT%H%M%SZ")),
        EventTime::DateTimeFloating(dt) => write!(f, ";UNTIL={}", dt.format("%Y%m%dT%H%M%S")),
        // RFC 5545 requires UNTIL in UTC when DTSTART carries a TZID
        EventTime::DateTimeZoned { .. } => {
            write!(f, ";UNTIL={}", until.to_utc().format("%Y%m%dT%H%M%SZ"))
        }
    }
}

fn join_numbers(values: &[i32]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FREQ={}", self.frequency.as_ics_str())?;

        if self.interval > 1 {
            write!(f, ";INTERVAL={}", self.interval)?;
        }

        match &self.end {
            RuleEnd::Forever => {}
            RuleEnd::Count(n) => write!(f, ";COUNT={n}")?,
            RuleEnd::Until(until) => write_until(f, until)?,
        }

        if !self.by_day.is_empty() {
            let days = self
                .by_day
                .iter()
                .map(|d| match d.ordinal {
                    Some(n) => format!("{}{}", n, weekday_code(d.weekday)),
                    None => weekday_code(d.weekday).to_string(),
                })
                .collect::<Vec<_>>()
                .join(",");
            write!(f, ";BYDAY={days}")?;
        }

        if !self.by_month_day.is_empty() {
            write!(f, ";BYMONTHDAY={}", join_numbers(&self.by_month_day))?;
        }

        if !self.by_month.is_empty() {
            write!(f, ";BYMONTH={}", join_numbers(&self.by_month))?;
        }

        if !self.by_set_pos.is_empty() {
            write!(f, ";BYSETPOS={}", join_numbers(&self.by_set_pos))?;
        }

        if let Some(wkst) = self.week_start {
            write!(f, ";WKST={}", weekday_code(wkst))?;
        }

        Ok(())
    }
}

fn parse_numbers(key: &str, value: &str) -> Result<Vec<i32>, CalBridgeError> {
    value
        .split(',')
        .map(|v| {
            v.trim().parse::<i32>().map_err(|_| {
                CalBridgeError::IcsParse(format!("Invalid {key} value '{v}' in RRULE"))
            })
        })
        .collect()
}

fn parse_by_day(value: &str) -> Result<Vec<WeekdayNum>, CalBridgeError> {
    value
        .split(',')
        .map(|entry| {
            let entry = entry.trim();
            if !entry.is_ascii() {
                return Err(CalBridgeError::IcsParse(format!(
                    "Invalid BYDAY value '{entry}' in RRULE"
                )));
            }
            let split = entry.len().saturating_sub(2);
            let (ordinal, code) = entry.split_at(split);
            let weekday = parse_weekday_code(code).ok_or_else(|| {
                CalBridgeError::IcsParse(format!("Invalid BYDAY value '{entry}' in RRULE"))
            })?;
            let ordinal = if ordinal.is_empty() {
                None
            } else {
                Some(ordinal.trim_start_matches('+').parse::<i32>().map_err(|_| {
                    CalBridgeError::IcsParse(format!("Invalid BYDAY ordinal '{entry}' in RRULE"))
                })?)
            };
            Ok(WeekdayNum { ordinal, weekday })
        })
        .collect()
}

fn parse_until(value: &str) -> Result<EventTime, CalBridgeError> {
    let invalid = || CalBridgeError::IcsParse(format!("Invalid UNTIL value '{value}' in RRULE"));

    if value.len() == 8 {
        return NaiveDate::parse_from_str(value, "%Y%m%d")
            .map(EventTime::Date)
            .map_err(|_| invalid());
    }

    if let Some(utc) = value.strip_suffix('Z') {
        return NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S")
            .map(|dt| EventTime::DateTimeUtc(dt.and_utc()))
            .map_err(|_| invalid());
    }

    NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S")
        .map(EventTime::DateTimeFloating)
        .map_err(|_| invalid())
}

impl FromStr for RecurrenceRule {
    type Err = CalBridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_prefix("RRULE:").unwrap_or(s);

        let mut frequency = None;
        let mut rule = RecurrenceRule::new(Frequency::Daily);
        let mut count = None;
        let mut until = None;

        for part in s.split(';').filter(|p| !p.is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                CalBridgeError::IcsParse(format!("Malformed RRULE part '{part}'"))
            })?;
            let key = key.trim().to_ascii_uppercase();
            let value = value.trim().to_ascii_uppercase();

            match key.as_str() {
                "FREQ" => {
                    frequency = Some(Frequency::from_ics_str(&value).ok_or_else(|| {
                        CalBridgeError::IcsParse(format!("Unknown FREQ '{value}'"))
                    })?);
                }
                "INTERVAL" => {
                    rule.interval = value.parse().map_err(|_| {
                        CalBridgeError::IcsParse(format!("Invalid INTERVAL '{value}'"))
                    })?;
                }
                "COUNT" => {
                    count = Some(value.parse::<u32>().map_err(|_| {
                        CalBridgeError::IcsParse(format!("Invalid COUNT '{value}'"))
                    })?);
                }
                "UNTIL" => until = Some(parse_until(&value)?),
                "BYDAY" => rule.by_day = parse_by_day(&value)?,
                "BYMONTHDAY" => rule.by_month_day = parse_numbers("BYMONTHDAY", &value)?,
                "BYMONTH" => rule.by_month = parse_numbers("BYMONTH", &value)?,
                "BYSETPOS" => rule.by_set_pos = parse_numbers("BYSETPOS", &value)?,
                "WKST" => rule.week_start = parse_weekday_code(&value),
                _ => rule.ignored_parts.push(format!("{key}={value}")),
            }
        }

        rule.frequency =
            frequency.ok_or_else(|| CalBridgeError::IcsParse("RRULE without FREQ".into()))?;

        rule.end = match (count, until) {
            (Some(_), Some(_)) => {
                return Err(CalBridgeError::IcsParse(
                    "RRULE must not carry both COUNT and UNTIL".into(),
                ));
            }
            (Some(n), None) => RuleEnd::Count(n),
            (None, Some(t)) => RuleEnd::Until(t),
            (None, None) => RuleEnd::Forever,
        };

        Ok(rule)
    }
}
