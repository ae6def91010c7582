//! Host calendar item model.
//!
//! Mirrors the appointment object of the local calendar store: wall-clock
//! times plus a zone name per endpoint, a closed set of recurrence pattern
//! families, and per-occurrence exceptions keyed by original date.
//!
//! The model enforces the host's occurrence rules. Occurrence operations are
//! rejected until a changed pattern has been saved and reloaded, and an
//! occurrence cannot be moved onto or beyond a neighbouring occurrence.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{CalBridgeResult, HostError};
use crate::event::local_to_utc;
use crate::mapping::recurrence::rule_for_pattern;
use crate::recurrence::expand_dates;
use crate::timezone::chrono_tz_for;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    Low,
    #[default]
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    #[default]
    Normal,
    Personal,
    Private,
    Confidential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusyStatus {
    Free,
    Tentative,
    #[default]
    Busy,
    OutOfOffice,
    WorkingElsewhere,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    #[default]
    NonMeeting,
    /// Organized by the local user
    Meeting,
    Received,
    Canceled,
    ReceivedAndCanceled,
}

impl MeetingStatus {
    pub fn is_received(&self) -> bool {
        matches!(self, MeetingStatus::Received | MeetingStatus::ReceivedAndCanceled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    #[default]
    None,
    Organized,
    Tentative,
    Accepted,
    Declined,
    NotResponded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantType {
    Organizer,
    #[default]
    Required,
    Optional,
    Resource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub kind: ParticipantType,
    #[serde(default)]
    pub response: ResponseStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizerRef {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Which weekday-of-month a monthly or yearly pattern picks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NthInstance {
    First,
    Second,
    Third,
    Fourth,
    Last,
}

impl NthInstance {
    /// BYSETPOS value
    pub fn position(&self) -> i32 {
        match self {
            NthInstance::First => 1,
            NthInstance::Second => 2,
            NthInstance::Third => 3,
            NthInstance::Fourth => 4,
            NthInstance::Last => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PatternKind {
    Daily,
    Weekly {
        days: Vec<Weekday>,
    },
    MonthlyByDay {
        day: u32,
    },
    MonthlyNth {
        instance: NthInstance,
        days: Vec<Weekday>,
    },
    YearlyByDay {
        month: u32,
        day: u32,
    },
    YearlyNth {
        instance: NthInstance,
        days: Vec<Weekday>,
        month: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PatternRange {
    NoEnd,
    Occurrences(u32),
    EndDate(NaiveDate),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecurrencePattern {
    pub kind: PatternKind,
    /// Days, weeks or months between occurrences; yearly patterns count months.
    pub interval: u32,
    pub pattern_start: NaiveDate,
    pub range: PatternRange,
    #[serde(default)]
    pub exceptions: Vec<HostException>,
}

impl HostRecurrencePattern {
    pub fn new(kind: PatternKind, interval: u32, pattern_start: NaiveDate) -> Self {
        Self {
            kind,
            interval,
            pattern_start,
            range: PatternRange::NoEnd,
            exceptions: Vec::new(),
        }
    }

    pub fn exception(&self, original_date: NaiveDate) -> Option<&HostException> {
        self.exceptions
            .iter()
            .find(|e| e.original_date == original_date)
    }

    /// Occurrence dates from the pattern start through `until`.
    pub fn occurrence_dates(&self, until: NaiveDate) -> Result<Vec<NaiveDate>, HostError> {
        expand_dates(
            self.pattern_start,
            &rule_for_pattern(self),
            self.pattern_start,
            until,
        )
        .map_err(|e| HostError::InvalidPattern(e.to_string()))
    }

    /// Date an occurrence currently sits on, None once deleted.
    fn effective_date(&self, original_date: NaiveDate) -> Option<NaiveDate> {
        match self.exception(original_date) {
            Some(e) if e.deleted => None,
            Some(e) => Some(e.item.as_ref().map_or(original_date, |i| i.start.date())),
            None => Some(original_date),
        }
    }

    /// Longest plausible gap between two occurrences, used as search horizon.
    fn horizon(&self) -> Duration {
        Duration::days(31 * i64::from(self.interval.max(1)) + 366)
    }
}

/// One occurrence that differs from the series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostException {
    pub original_date: NaiveDate,
    pub deleted: bool,
    /// The modified occurrence; None for deleted occurrences
    pub item: Option<Box<HostCalendarItem>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostCalendarItem {
    pub entry_id: String,
    /// Stable identifier shared by all copies of a meeting
    #[serde(default)]
    pub global_id: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    /// Wall time in `start_time_zone`
    pub start: NaiveDateTime,
    /// Wall time in `end_time_zone`
    pub end: NaiveDateTime,
    #[serde(default)]
    pub all_day: bool,
    pub start_time_zone: String,
    pub end_time_zone: String,
    #[serde(default)]
    pub importance: Importance,
    #[serde(default)]
    pub sensitivity: Sensitivity,
    #[serde(default)]
    pub busy_status: BusyStatus,
    /// Delimited category list
    #[serde(default)]
    pub categories: String,
    #[serde(default)]
    pub recurrence: Option<HostRecurrencePattern>,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub organizer: Option<OrganizerRef>,
    #[serde(default)]
    pub sent_on_behalf_of: Option<OrganizerRef>,
    #[serde(default)]
    pub reminder_minutes_before_start: Option<i64>,
    #[serde(default)]
    pub meeting_status: MeetingStatus,
    #[serde(default)]
    pub response_status: ResponseStatus,
    pub last_modified: DateTime<Utc>,
    /// Set when the recurrence pattern changed since the last save
    #[serde(skip)]
    pattern_pending: bool,
}

impl HostCalendarItem {
    pub fn new(
        entry_id: impl Into<String>,
        start: NaiveDateTime,
        end: NaiveDateTime,
        time_zone: impl Into<String>,
    ) -> Self {
        let time_zone = time_zone.into();
        Self {
            entry_id: entry_id.into(),
            global_id: None,
            subject: None,
            location: None,
            body: None,
            start,
            end,
            all_day: false,
            start_time_zone: time_zone.clone(),
            end_time_zone: time_zone,
            importance: Importance::default(),
            sensitivity: Sensitivity::default(),
            busy_status: BusyStatus::default(),
            categories: String::new(),
            recurrence: None,
            participants: Vec::new(),
            organizer: None,
            sent_on_behalf_of: None,
            reminder_minutes_before_start: None,
            meeting_status: MeetingStatus::default(),
            response_status: ResponseStatus::default(),
            last_modified: Utc::now(),
            pattern_pending: false,
        }
    }

    pub fn reminder_set(&self) -> bool {
        self.reminder_minutes_before_start.is_some()
    }

    pub fn is_recurring(&self) -> bool {
        self.recurrence.is_some()
    }

    pub fn start_utc(&self) -> DateTime<Utc> {
        to_utc(&self.start, &self.start_time_zone)
    }

    pub fn end_utc(&self) -> DateTime<Utc> {
        to_utc(&self.end, &self.end_time_zone)
    }

    /// Category names, trimmed, without empty entries.
    pub fn category_list(&self, separator: &str) -> Vec<String> {
        self.categories
            .split(separator)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn set_recurrence(&mut self, pattern: HostRecurrencePattern) {
        self.recurrence = Some(pattern);
        self.pattern_pending = true;
    }

    pub fn clear_recurrence(&mut self) {
        if self.recurrence.take().is_some() {
            self.pattern_pending = true;
        }
    }

    /// False while a pattern change awaits save and reload.
    pub fn is_materialized(&self) -> bool {
        !self.pattern_pending
    }

    /// Called by the owning store after persisting the item.
    pub fn mark_materialized(&mut self) {
        self.pattern_pending = false;
    }

    fn materialized_pattern(&self) -> Result<&HostRecurrencePattern, HostError> {
        let pattern = self.recurrence.as_ref().ok_or(HostError::NotRecurring)?;
        if self.pattern_pending {
            return Err(HostError::NotMaterialized);
        }
        Ok(pattern)
    }

    fn materialized_pattern_mut(&mut self) -> Result<&mut HostRecurrencePattern, HostError> {
        if self.pattern_pending {
            return Err(HostError::NotMaterialized);
        }
        self.recurrence.as_mut().ok_or(HostError::NotRecurring)
    }

    /// Item representing one occurrence of the series, as currently stored.
    pub fn occurrence(&self, original_date: NaiveDate) -> Result<HostCalendarItem, HostError> {
        let pattern = self.materialized_pattern()?;
        let dates = pattern.occurrence_dates(original_date)?;
        if !dates.contains(&original_date) {
            return Err(HostError::OccurrenceNotFound(original_date));
        }

        match pattern.exception(original_date) {
            Some(e) if e.deleted => Err(HostError::OccurrenceDeleted(original_date)),
            Some(HostException {
                item: Some(item), ..
            }) => Ok(item.as_ref().clone()),
            _ => {
                let mut occurrence = self.clone();
                occurrence.recurrence = None;
                occurrence.pattern_pending = false;
                occurrence.start = original_date.and_time(self.start.time());
                occurrence.end = occurrence.start + (self.end - self.start);
                Ok(occurrence)
            }
        }
    }

    /// Remove one occurrence from the series.
    pub fn delete_occurrence(&mut self, original_date: NaiveDate) -> Result<(), HostError> {
        let pattern = self.materialized_pattern_mut()?;
        let dates = pattern.occurrence_dates(original_date)?;
        if !dates.contains(&original_date) {
            return Err(HostError::OccurrenceNotFound(original_date));
        }

        pattern.exceptions.retain(|e| e.original_date != original_date);
        pattern.exceptions.push(HostException {
            original_date,
            deleted: true,
            item: None,
        });
        Ok(())
    }

    /// Store `occurrence` as the modified instance of `original_date`.
    ///
    /// Fails if the new date is not strictly between the effective dates of
    /// the neighbouring occurrences.
    pub fn apply_occurrence(
        &mut self,
        original_date: NaiveDate,
        mut occurrence: HostCalendarItem,
    ) -> Result<(), HostError> {
        let target = occurrence.start.date();
        let pattern = self.materialized_pattern_mut()?;

        let horizon = original_date.max(target) + pattern.horizon();
        let dates = pattern.occurrence_dates(horizon)?;
        let Some(index) = dates.iter().position(|d| *d == original_date) else {
            return Err(HostError::OccurrenceNotFound(original_date));
        };
        if pattern.effective_date(original_date).is_none() {
            return Err(HostError::OccurrenceDeleted(original_date));
        }

        let previous = dates[..index]
            .iter()
            .rev()
            .find_map(|d| pattern.effective_date(*d));
        let next = dates[index + 1..]
            .iter()
            .find_map(|d| pattern.effective_date(*d));

        let skips_previous = previous.is_some_and(|p| target <= p);
        let skips_next = next.is_some_and(|n| target >= n);
        if skips_previous || skips_next {
            return Err(HostError::OccurrenceSkipped {
                original: original_date,
                target,
            });
        }

        occurrence.recurrence = None;
        occurrence.pattern_pending = false;
        pattern.exceptions.retain(|e| e.original_date != original_date);
        pattern.exceptions.push(HostException {
            original_date,
            deleted: false,
            item: Some(Box::new(occurrence)),
        });
        Ok(())
    }
}

fn to_utc(wall: &NaiveDateTime, tz_id: &str) -> DateTime<Utc> {
    match chrono_tz_for(tz_id) {
        Some(tz) => local_to_utc(&tz, wall),
        None => wall.and_utc(),
    }
}

/// Access to one host item for the duration of a mapping call.
///
/// The handle is borrowed mutably by the mapper; releasing it is the owner's
/// job once the borrow ends.
pub trait HostItemHandle {
    fn item(&self) -> &HostCalendarItem;
    fn item_mut(&mut self) -> &mut HostCalendarItem;
    /// Persist pending changes and re-read the item from the store.
    fn save_and_reload(&mut self) -> CalBridgeResult<()>;
}

/// Handle over an item that is not backed by a store, e.g. one read from a file.
#[derive(Debug, Clone)]
pub struct LocalItemHandle {
    item: HostCalendarItem,
    saves: usize,
}

impl LocalItemHandle {
    pub fn new(item: HostCalendarItem) -> Self {
        Self { item, saves: 0 }
    }

    pub fn save_count(&self) -> usize {
        self.saves
    }

    pub fn into_inner(self) -> HostCalendarItem {
        self.item
    }
}

impl HostItemHandle for LocalItemHandle {
    fn item(&self) -> &HostCalendarItem {
        &self.item
    }

    fn item_mut(&mut self) -> &mut HostCalendarItem {
        &mut self.item
    }

    fn save_and_reload(&mut self) -> CalBridgeResult<()> {
        self.item.last_modified = Utc::now();
        self.item.mark_materialized();
        self.saves += 1;
        Ok(())
    }
}
