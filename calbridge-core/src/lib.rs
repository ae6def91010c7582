//! Bidirectional translation between host calendar items and RFC 5545 event
//! groups.
//!
//! This crate provides:
//! - `event` and `rule`: the remote event model (master plus exceptions)
//! - `host`: the host item model with its occurrence constraints
//! - `mapping`: the sub-mappers and the [`EventMapper`] that drives them
//! - `timezone`: host ↔ remote zone resolution and the shared timezone cache
//! - `ics`: reading and writing VCALENDAR text
//! - `repository`: the entity store contract with in-memory implementations

pub mod config;
pub mod error;
pub mod event;
pub mod host;
pub mod ics;
pub mod logging;
pub mod mapping;
pub mod recurrence;
pub mod repository;
pub mod rule;
pub mod timezone;

pub use config::{MappingConfiguration, ReminderMapping};
pub use error::{CalBridgeError, CalBridgeResult, HostError};
pub use event::*;
pub use host::{
    BusyStatus, HostCalendarItem, HostException, HostItemHandle, HostRecurrencePattern,
    Importance, LocalItemHandle, MeetingStatus, NthInstance, OrganizerRef, Participant,
    ParticipantType, PatternKind, PatternRange, ResponseStatus, Sensitivity,
};
pub use logging::{CollectingLogger, MappingLogger, NullLogger};
pub use mapping::{EventMapper, OwnIdentity};
pub use rule::{Frequency, RecurrenceRule, RuleEnd, WeekdayNum};
pub use timezone::{
    SharedTimezoneCache, TimezoneCache, TimezoneDescriptor, TimezoneFetcher, TzdbFetcher,
};
