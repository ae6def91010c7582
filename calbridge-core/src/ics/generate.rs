//! ICS file generation.

use icalendar::{Alarm, Calendar, Component, EventLike, Property, Trigger, ValueType};

use crate::error::CalBridgeResult;
use crate::event::{
    AlarmTrigger, CalendarEvent, EventGroup, EventStatus, EventTime, Transparency,
    TriggerRelation,
};
use crate::ics::format_duration;

const PRODID: &str = "PRODID:-//calbridge//calbridge//EN";

/// Generate .ics content for a master event, its exceptions and the
/// timezone definitions they reference.
pub fn generate_ics(group: &EventGroup) -> CalBridgeResult<String> {
    let mut cal = Calendar::new();

    for event in group.events() {
        cal.push(build_vevent(event));
    }

    let cal = cal.done();

    let vtimezones: Vec<&str> = group
        .timezones
        .iter()
        .filter_map(|tz| tz.vtimezone.as_deref())
        .collect();

    Ok(post_process(&cal.to_string(), &vtimezones))
}

fn build_vevent(event: &CalendarEvent) -> icalendar::Event {
    let mut ics_event = icalendar::Event::new();
    ics_event.uid(&event.uid);

    // DTSTAMP - required by RFC 5545, use the modification time or current time
    let dtstamp = event
        .last_modified
        .unwrap_or_else(chrono::Utc::now)
        .format("%Y%m%dT%H%M%SZ")
        .to_string();
    ics_event.add_property("DTSTAMP", &dtstamp);

    if let Some(modified) = event.last_modified {
        ics_event.add_property("LAST-MODIFIED", modified.format("%Y%m%dT%H%M%SZ").to_string());
    }

    ics_event.add_property("SEQUENCE", event.sequence.to_string());

    if let Some(ref summary) = event.summary {
        ics_event.summary(summary);
    }

    add_datetime_property(&mut ics_event, "DTSTART", &event.start);
    if let Some(ref end) = event.end {
        add_datetime_property(&mut ics_event, "DTEND", end);
    }

    if let Some(ref desc) = event.description {
        ics_event.description(desc);
    }

    if let Some(ref loc) = event.location {
        ics_event.location(loc);
    }

    // Status - only emit if not CONFIRMED (the implied default)
    match event.status {
        EventStatus::Confirmed => {}
        EventStatus::Tentative => {
            ics_event.add_property("STATUS", "TENTATIVE");
        }
        EventStatus::Cancelled => {
            ics_event.add_property("STATUS", "CANCELLED");
        }
    }

    if let Some(priority) = event.priority {
        ics_event.add_property("PRIORITY", priority.to_string());
    }

    if let Some(class) = event.class {
        ics_event.add_property("CLASS", class.as_ics_str());
    }

    for rule in &event.recurrence_rules {
        ics_event.append_multi_property(Property::new("RRULE", rule.to_string()));
    }
    for exdate in &event.exception_dates {
        add_exdate_property(&mut ics_event, exdate);
    }

    if let Some(ref recurrence_id) = event.recurrence_id {
        add_datetime_property(&mut ics_event, "RECURRENCE-ID", recurrence_id);
    }

    // TRANSP - only emit if TRANSPARENT (OPAQUE is the default)
    if event.transparency == Transparency::Transparent {
        ics_event.add_property("TRANSP", "TRANSPARENT");
    }

    for category in &event.categories {
        ics_event.append_multi_property(Property::new("CATEGORIES", category));
    }

    for alarm in &event.alarms {
        let description = alarm.description.as_deref().unwrap_or("Reminder");
        let mut valarm = Alarm::display(description, Trigger::before_start(chrono::Duration::zero()));
        valarm.add_property("ACTION", &alarm.action);
        valarm.append_property(trigger_property(&alarm.trigger));
        ics_event.alarm(valarm);
    }

    if let Some(ref org) = event.organizer {
        let mut prop = Property::new("ORGANIZER", cal_address(org.email.as_deref()));
        if let Some(ref name) = org.name {
            prop.add_parameter("CN", name);
        }
        if org.schedule_agent_client {
            prop.add_parameter("SCHEDULE-AGENT", "CLIENT");
        }
        ics_event.append_property(prop);
    }

    // ATTENDEE (multi-property - can appear multiple times)
    for attendee in &event.attendees {
        let mut prop = Property::new("ATTENDEE", cal_address(attendee.email.as_deref()));
        if let Some(ref name) = attendee.name {
            prop.add_parameter("CN", name);
        }
        if let Some(cutype) = attendee.cutype {
            prop.add_parameter("CUTYPE", cutype.as_ics_str());
        }
        if let Some(role) = attendee.role {
            prop.add_parameter("ROLE", role.as_ics_str());
        }
        if let Some(partstat) = attendee.partstat {
            prop.add_parameter("PARTSTAT", partstat.as_ics_str());
        }
        if attendee.rsvp {
            prop.add_parameter("RSVP", "TRUE");
        }
        if attendee.schedule_agent_client {
            prop.add_parameter("SCHEDULE-AGENT", "CLIENT");
        }
        ics_event.append_multi_property(prop);
    }

    // Custom properties (vendor extensions, preserved for round-tripping)
    for (key, value) in &event.custom_properties {
        ics_event.append_multi_property(Property::new(key, value));
    }

    ics_event.done()
}

/// Value of ORGANIZER/ATTENDEE. Name-only participants get a placeholder
/// address so the property stays well-formed.
fn cal_address(email: Option<&str>) -> String {
    match email {
        Some(email) => format!("mailto:{email}"),
        None => "invalid:nomail".to_string(),
    }
}

fn trigger_property(trigger: &AlarmTrigger) -> Property {
    match trigger {
        AlarmTrigger::Relative {
            offset_seconds,
            related,
        } => {
            let mut prop = Property::new("TRIGGER", format_duration(*offset_seconds));
            if *related == TriggerRelation::End {
                prop.add_parameter("RELATED", "END");
            }
            prop
        }
        AlarmTrigger::Absolute(at) => {
            let mut prop = Property::new("TRIGGER", at.format("%Y%m%dT%H%M%SZ").to_string());
            prop.add_parameter("VALUE", "DATE-TIME");
            prop
        }
    }
}

/// Clean up ICS output from the icalendar crate and embed timezone blocks.
/// - Replace PRODID with our own
/// - Remove CALSCALE:GREGORIAN (it's the default)
/// - Remove DTSTAMP and UID inside VALARM sections (not required by RFC 5545)
/// - Insert VTIMEZONE blocks ahead of the first VEVENT
fn post_process(ics: &str, vtimezones: &[&str]) -> String {
    let mut result = String::with_capacity(ics.len());
    let mut in_valarm = false;
    let mut timezones_written = false;

    for line in ics.lines() {
        if line.starts_with("PRODID:") {
            result.push_str(PRODID);
            result.push_str("\r\n");
            continue;
        }

        if line == "CALSCALE:GREGORIAN" {
            continue;
        }

        if line == "BEGIN:VEVENT" && !timezones_written {
            for block in vtimezones {
                for tz_line in block.lines() {
                    result.push_str(tz_line);
                    result.push_str("\r\n");
                }
            }
            timezones_written = true;
        }

        if line == "BEGIN:VALARM" {
            in_valarm = true;
        } else if line == "END:VALARM" {
            in_valarm = false;
        }

        if in_valarm && (line.starts_with("DTSTAMP:") || line.starts_with("UID:")) {
            continue;
        }

        result.push_str(line);
        result.push_str("\r\n");
    }

    result
}

/// Add a datetime property with proper formatting based on EventTime variant
fn add_datetime_property(ics_event: &mut icalendar::Event, name: &str, time: &EventTime) {
    match time {
        EventTime::Date(d) => {
            let mut prop = Property::new(name, d.format("%Y%m%d").to_string());
            prop.append_parameter(ValueType::Date);
            ics_event.append_property(prop);
        }
        EventTime::DateTimeUtc(dt) => {
            ics_event.add_property(name, dt.format("%Y%m%dT%H%M%SZ").to_string());
        }
        EventTime::DateTimeFloating(dt) => {
            ics_event.add_property(name, dt.format("%Y%m%dT%H%M%S").to_string());
        }
        EventTime::DateTimeZoned { datetime, tzid } => {
            let mut prop = Property::new(name, datetime.format("%Y%m%dT%H%M%S").to_string());
            prop.add_parameter("TZID", tzid);
            ics_event.append_property(prop);
        }
    }
}

/// Add an EXDATE property for a single exception date
fn add_exdate_property(ics_event: &mut icalendar::Event, time: &EventTime) {
    let mut prop = match time {
        EventTime::Date(d) => {
            let mut prop = Property::new("EXDATE", d.format("%Y%m%d").to_string());
            prop.append_parameter(ValueType::Date);
            prop
        }
        EventTime::DateTimeUtc(dt) => Property::new("EXDATE", dt.format("%Y%m%dT%H%M%SZ").to_string()),
        EventTime::DateTimeFloating(dt) => {
            Property::new("EXDATE", dt.format("%Y%m%dT%H%M%S").to_string())
        }
        EventTime::DateTimeZoned { datetime, .. } => {
            Property::new("EXDATE", datetime.format("%Y%m%dT%H%M%S").to_string())
        }
    };
    if let EventTime::DateTimeZoned { tzid, .. } = time {
        prop.add_parameter("TZID", tzid);
    }
    ics_event.append_multi_property(prop);
}
