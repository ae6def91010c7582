//! Remote (RFC 5545) event model.
//!
//! One [`CalendarEvent`] corresponds to one VEVENT. A series travels as an
//! [`EventGroup`]: the master event plus the exception events that override
//! single occurrences, all sharing the master's UID.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::rule::RecurrenceRule;
use crate::timezone::TimezoneDescriptor;

pub const BUSY_STATUS_PROPERTY: &str = "X-MICROSOFT-CDO-BUSYSTATUS";
pub const SUPPRESS_NOTIFICATIONS_PROPERTY: &str = "X-SOGO-SEND-APPOINTMENT-NOTIFICATIONS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub uid: String,
    pub sequence: i64,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: EventTime,
    pub end: Option<EventTime>,
    pub status: EventStatus,
    /// PRIORITY, 0 meaning undefined
    pub priority: Option<u8>,
    pub class: Option<Classification>,

    // Recurrence
    pub recurrence_rules: Vec<RecurrenceRule>,
    pub exception_dates: Vec<EventTime>,
    /// Original occurrence this event overrides; None on the master
    pub recurrence_id: Option<EventTime>,

    // Meeting data
    pub organizer: Option<Organizer>,
    pub attendees: Vec<Attendee>,

    pub alarms: Vec<Alarm>,
    pub categories: Vec<String>,
    pub transparency: Transparency,

    /// DTSTAMP / LAST-MODIFIED
    pub last_modified: Option<DateTime<Utc>>,

    /// X- properties, including the busy-status and notification extensions
    pub custom_properties: Vec<(String, String)>,
}

impl CalendarEvent {
    pub fn new(uid: impl Into<String>, start: EventTime) -> Self {
        Self {
            uid: uid.into(),
            sequence: 0,
            summary: None,
            description: None,
            location: None,
            start,
            end: None,
            status: EventStatus::Confirmed,
            priority: None,
            class: None,
            recurrence_rules: Vec::new(),
            exception_dates: Vec::new(),
            recurrence_id: None,
            organizer: None,
            attendees: Vec::new(),
            alarms: Vec::new(),
            categories: Vec::new(),
            transparency: Transparency::Opaque,
            last_modified: None,
            custom_properties: Vec::new(),
        }
    }

    pub fn is_master(&self) -> bool {
        self.recurrence_id.is_none()
    }

    pub fn is_all_day(&self) -> bool {
        self.start.is_date()
    }

    pub fn custom_property(&self, name: &str) -> Option<&str> {
        self.custom_properties
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Replace any existing value of the X- property `name`.
    pub fn set_custom_property(&mut self, name: &str, value: impl Into<String>) {
        self.custom_properties
            .retain(|(key, _)| !key.eq_ignore_ascii_case(name));
        self.custom_properties.push((name.to_string(), value.into()));
    }
}

/// A master event with its exceptions, plus the timezone definitions they refer to.
#[derive(Debug, Clone, PartialEq)]
pub struct EventGroup {
    pub master: CalendarEvent,
    pub exceptions: Vec<CalendarEvent>,
    pub timezones: Vec<TimezoneDescriptor>,
}

impl EventGroup {
    pub fn events(&self) -> impl Iterator<Item = &CalendarEvent> {
        std::iter::once(&self.master).chain(self.exceptions.iter())
    }

    pub fn max_sequence(&self) -> i64 {
        self.events().map(|e| e.sequence).max().unwrap_or(0)
    }

    pub fn into_events(self) -> Vec<CalendarEvent> {
        let mut events = Vec::with_capacity(self.exceptions.len() + 1);
        events.push(self.master);
        events.extend(self.exceptions);
        events
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventTime {
    /// All-day (VALUE=DATE)
    Date(NaiveDate),
    /// UTC instant, written with the Z suffix
    DateTimeUtc(DateTime<Utc>),
    /// Wall time with no timezone reference
    DateTimeFloating(NaiveDateTime),
    /// Wall time in the zone named by TZID
    DateTimeZoned { datetime: NaiveDateTime, tzid: String },
}

impl EventTime {
    pub fn is_date(&self) -> bool {
        matches!(self, EventTime::Date(_))
    }

    pub fn tzid(&self) -> Option<&str> {
        match self {
            EventTime::DateTimeZoned { tzid, .. } => Some(tzid),
            _ => None,
        }
    }

    /// Calendar date in the frame the value is written in.
    pub fn date(&self) -> NaiveDate {
        match self {
            EventTime::Date(d) => *d,
            EventTime::DateTimeUtc(dt) => dt.date_naive(),
            EventTime::DateTimeFloating(dt) => dt.date(),
            EventTime::DateTimeZoned { datetime, .. } => datetime.date(),
        }
    }

    /// Same kind of value moved to `date`, keeping time of day and zone.
    pub fn with_date(&self, date: NaiveDate) -> EventTime {
        match self {
            EventTime::Date(_) => EventTime::Date(date),
            EventTime::DateTimeUtc(dt) => {
                EventTime::DateTimeUtc(date.and_time(dt.time()).and_utc())
            }
            EventTime::DateTimeFloating(dt) => EventTime::DateTimeFloating(date.and_time(dt.time())),
            EventTime::DateTimeZoned { datetime, tzid } => EventTime::DateTimeZoned {
                datetime: date.and_time(datetime.time()),
                tzid: tzid.clone(),
            },
        }
    }

    /// Absolute instant. Dates count from midnight UTC; floating times and
    /// unknown TZIDs are read as UTC.
    pub fn to_utc(&self) -> DateTime<Utc> {
        match self {
            EventTime::Date(d) => d.and_time(NaiveTime::MIN).and_utc(),
            EventTime::DateTimeUtc(dt) => *dt,
            EventTime::DateTimeFloating(dt) => dt.and_utc(),
            EventTime::DateTimeZoned { datetime, tzid } => {
                match crate::timezone::chrono_tz_for(tzid) {
                    Some(tz) => local_to_utc(&tz, datetime),
                    None => datetime.and_utc(),
                }
            }
        }
    }

    /// Format for use as a map key or in log messages.
    pub fn to_ics_string(&self) -> String {
        match self {
            EventTime::Date(d) => d.format("%Y%m%d").to_string(),
            EventTime::DateTimeUtc(dt) => dt.format("%Y%m%dT%H%M%SZ").to_string(),
            EventTime::DateTimeFloating(dt) => dt.format("%Y%m%dT%H%M%S").to_string(),
            EventTime::DateTimeZoned { datetime, .. } => {
                datetime.format("%Y%m%dT%H%M%S").to_string()
            }
        }
    }
}

/// Resolve a wall time in `tz`, picking the earlier instant on ambiguity and
/// shifting forward across a gap.
pub(crate) fn local_to_utc<Tz: TimeZone>(tz: &Tz, wall: &NaiveDateTime) -> DateTime<Utc> {
    if let Some(dt) = tz.from_local_datetime(wall).earliest() {
        return dt.with_timezone(&Utc);
    }
    let shifted = *wall + chrono::Duration::hours(1);
    tz.from_local_datetime(&shifted)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| wall.and_utc())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    Confirmed,
    Tentative,
    Cancelled,
}

/// CLASS property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    Public,
    Private,
    Confidential,
}

impl Classification {
    pub fn as_ics_str(&self) -> &'static str {
        match self {
            Classification::Public => "PUBLIC",
            Classification::Private => "PRIVATE",
            Classification::Confidential => "CONFIDENTIAL",
        }
    }

    pub fn from_ics_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PUBLIC" => Some(Classification::Public),
            "PRIVATE" => Some(Classification::Private),
            "CONFIDENTIAL" => Some(Classification::Confidential),
            _ => None,
        }
    }
}

/// Event transparency (busy/free status)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transparency {
    /// Event blocks time on calendar (default)
    Opaque,
    /// Event does not block time (shows as free)
    Transparent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organizer {
    /// Mailbox address; None when only a display name is known
    pub email: Option<String>,
    pub name: Option<String>,
    pub schedule_agent_client: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    /// Mailbox address; None when only a display name is known
    pub email: Option<String>,
    pub name: Option<String>,
    pub partstat: Option<ParticipationStatus>,
    pub role: Option<AttendeeRole>,
    pub cutype: Option<CalendarUserType>,
    pub rsvp: bool,
    pub schedule_agent_client: bool,
}

impl Attendee {
    pub fn new(email: Option<String>, name: Option<String>) -> Self {
        Self {
            email,
            name,
            partstat: None,
            role: None,
            cutype: None,
            rsvp: false,
            schedule_agent_client: false,
        }
    }
}

/// PARTSTAT parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticipationStatus {
    NeedsAction,
    Accepted,
    Declined,
    Tentative,
    Delegated,
}

impl ParticipationStatus {
    pub fn as_ics_str(&self) -> &'static str {
        match self {
            ParticipationStatus::NeedsAction => "NEEDS-ACTION",
            ParticipationStatus::Accepted => "ACCEPTED",
            ParticipationStatus::Declined => "DECLINED",
            ParticipationStatus::Tentative => "TENTATIVE",
            ParticipationStatus::Delegated => "DELEGATED",
        }
    }

    pub fn from_ics_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "NEEDS-ACTION" => Some(ParticipationStatus::NeedsAction),
            "ACCEPTED" => Some(ParticipationStatus::Accepted),
            "DECLINED" => Some(ParticipationStatus::Declined),
            "TENTATIVE" => Some(ParticipationStatus::Tentative),
            "DELEGATED" => Some(ParticipationStatus::Delegated),
            _ => None,
        }
    }
}

/// ROLE parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendeeRole {
    Chair,
    RequiredParticipant,
    OptionalParticipant,
    NonParticipant,
}

impl AttendeeRole {
    pub fn as_ics_str(&self) -> &'static str {
        match self {
            AttendeeRole::Chair => "CHAIR",
            AttendeeRole::RequiredParticipant => "REQ-PARTICIPANT",
            AttendeeRole::OptionalParticipant => "OPT-PARTICIPANT",
            AttendeeRole::NonParticipant => "NON-PARTICIPANT",
        }
    }

    pub fn from_ics_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CHAIR" => Some(AttendeeRole::Chair),
            "REQ-PARTICIPANT" => Some(AttendeeRole::RequiredParticipant),
            "OPT-PARTICIPANT" => Some(AttendeeRole::OptionalParticipant),
            "NON-PARTICIPANT" => Some(AttendeeRole::NonParticipant),
            _ => None,
        }
    }
}

/// CUTYPE parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalendarUserType {
    Individual,
    Group,
    Resource,
    Room,
    Unknown,
}

impl CalendarUserType {
    pub fn as_ics_str(&self) -> &'static str {
        match self {
            CalendarUserType::Individual => "INDIVIDUAL",
            CalendarUserType::Group => "GROUP",
            CalendarUserType::Resource => "RESOURCE",
            CalendarUserType::Room => "ROOM",
            CalendarUserType::Unknown => "UNKNOWN",
        }
    }

    pub fn from_ics_str(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "INDIVIDUAL" => CalendarUserType::Individual,
            "GROUP" => CalendarUserType::Group,
            "RESOURCE" => CalendarUserType::Resource,
            "ROOM" => CalendarUserType::Room,
            _ => CalendarUserType::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    /// ACTION, usually DISPLAY
    pub action: String,
    pub description: Option<String>,
    pub trigger: AlarmTrigger,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmTrigger {
    /// Offset in seconds, negative meaning before
    Relative {
        offset_seconds: i64,
        related: TriggerRelation,
    },
    Absolute(DateTime<Utc>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerRelation {
    Start,
    End,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zoned_time_resolves_through_tzdb() {
        let time = EventTime::DateTimeZoned {
            datetime: NaiveDate::from_ymd_opt(2025, 7, 1)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            tzid: "Europe/Berlin".into(),
        };
        assert_eq!(
            time.to_utc(),
            Utc.with_ymd_and_hms(2025, 7, 1, 8, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_unknown_tzid_reads_as_utc() {
        let wall = NaiveDate::from_ymd_opt(2025, 7, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let time = EventTime::DateTimeZoned {
            datetime: wall,
            tzid: "Mars/Olympus_Mons".into(),
        };
        assert_eq!(time.to_utc(), wall.and_utc());
    }

    #[test]
    fn test_set_custom_property_replaces_value() {
        let start = EventTime::Date(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        let mut event = CalendarEvent::new("uid-1", start);
        event.set_custom_property(BUSY_STATUS_PROPERTY, "BUSY");
        event.set_custom_property(BUSY_STATUS_PROPERTY, "OOF");

        assert_eq!(event.custom_properties.len(), 1);
        assert_eq!(event.custom_property("x-microsoft-cdo-busystatus"), Some("OOF"));
    }

    #[test]
    fn test_group_events_starts_with_master() {
        let start = EventTime::Date(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        let mut exception = CalendarEvent::new("uid-1", start.clone());
        exception.recurrence_id = Some(start.clone());
        exception.sequence = 4;
        let group = EventGroup {
            master: CalendarEvent::new("uid-1", start),
            exceptions: vec![exception],
            timezones: vec![],
        };

        let events: Vec<_> = group.events().collect();
        assert!(events[0].is_master());
        assert!(!events[1].is_master());
        assert_eq!(group.max_sequence(), 4);
    }
}
