//! Reminder ⇄ VALARM.
//!
//! The host keeps at most one reminder, expressed in minutes before start.

use chrono::Duration;

use crate::config::ReminderMapping;
use crate::event::{Alarm, AlarmTrigger, CalendarEvent, TriggerRelation};
use crate::host::HostCalendarItem;
use crate::mapping::MappingContext;

const REMINDER_DESCRIPTION: &str = "This is an event reminder";

/// Alarm for the item's reminder, if the policy lets it through.
pub fn alarm_outbound(ctx: &MappingContext<'_>, item: &HostCalendarItem) -> Option<Alarm> {
    let minutes = item.reminder_minutes_before_start?;
    match ctx.config.map_reminder {
        ReminderMapping::Off => return None,
        ReminderMapping::JustUpcoming => {
            if item.start_utc() - Duration::minutes(minutes) < ctx.now {
                return None;
            }
        }
        ReminderMapping::Always => {}
    }

    Some(Alarm {
        action: "DISPLAY".into(),
        description: Some(REMINDER_DESCRIPTION.into()),
        trigger: AlarmTrigger::Relative {
            offset_seconds: -minutes * 60,
            related: TriggerRelation::Start,
        },
    })
}

/// Set the item's reminder from the first alarm of `event`.
pub fn map_reminder_inbound(
    ctx: &MappingContext<'_>,
    event: &CalendarEvent,
    item: &mut HostCalendarItem,
) {
    if ctx.config.map_reminder == ReminderMapping::Off {
        return;
    }

    let Some(alarm) = event.alarms.first() else {
        item.reminder_minutes_before_start = None;
        return;
    };
    if event.alarms.len() > 1 {
        ctx.warn(&format!(
            "Event '{}' has {} alarms, only the first is used",
            event.uid,
            event.alarms.len()
        ));
    }

    let offset_seconds = match alarm.trigger {
        AlarmTrigger::Relative {
            offset_seconds,
            related: TriggerRelation::Start,
        } if offset_seconds <= 0 => offset_seconds,
        _ => {
            ctx.warn(&format!(
                "Alarm of event '{}' is not relative to and before the start, reminder removed",
                event.uid
            ));
            item.reminder_minutes_before_start = None;
            return;
        }
    };

    let minutes = -offset_seconds / 60;
    if ctx.config.map_reminder == ReminderMapping::JustUpcoming
        && item.start_utc() - Duration::minutes(minutes) < ctx.now
    {
        item.reminder_minutes_before_start = None;
        return;
    }

    item.reminder_minutes_before_start = Some(minutes);
}
