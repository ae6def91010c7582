//! Orchestrates the sub-mappers for one host item and its remote event group.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use uuid::Uuid;

use crate::config::MappingConfiguration;
use crate::error::{CalBridgeResult, HostError};
use crate::event::{
    CalendarEvent, EventGroup, EventStatus, EventTime, SUPPRESS_NOTIFICATIONS_PROPERTY,
};
use crate::host::{HostCalendarItem, HostItemHandle, MeetingStatus};
use crate::logging::MappingLogger;
use crate::mapping::exceptions::{
    host_date, map_exdates_outbound, modified, occurrence_time, placement_order,
    reconstruct_master,
};
use crate::mapping::{
    MappingContext, OwnIdentity, attendees, category, privacy, recurrence, reminder,
};
use crate::timezone::{
    ResolvedTimezones, TimezoneCache, TimezoneDescriptor, TimezoneResolver, chrono_tz_for,
};

const CANCELLED_PREFIX: &str = "Cancelled: ";

/// Maps host items to remote event groups and back.
///
/// Holds only immutable state, so one mapper can serve concurrent calls for
/// different items.
pub struct EventMapper<C> {
    config: MappingConfiguration,
    cache: C,
    local_host_tz_id: String,
    local_descriptor: Option<TimezoneDescriptor>,
    identity: OwnIdentity,
    clock: Option<DateTime<Utc>>,
}

impl<C: TimezoneCache> EventMapper<C> {
    pub fn new(
        config: MappingConfiguration,
        cache: C,
        local_host_tz_id: impl Into<String>,
        identity: OwnIdentity,
    ) -> Self {
        Self {
            config,
            cache,
            local_host_tz_id: local_host_tz_id.into(),
            local_descriptor: None,
            identity,
            clock: None,
        }
    }

    /// Descriptor used for items in the local machine zone without a lookup.
    pub fn with_local_descriptor(mut self, descriptor: TimezoneDescriptor) -> Self {
        self.local_descriptor = Some(descriptor);
        self
    }

    /// Fixed "now" for reminder decisions.
    pub fn with_clock(mut self, now: DateTime<Utc>) -> Self {
        self.clock = Some(now);
        self
    }

    pub fn config(&self) -> &MappingConfiguration {
        &self.config
    }

    /// Look up `event_time_zone` once and keep it as the local descriptor.
    pub async fn preload_local_timezone(&mut self, logger: &dyn MappingLogger) {
        let Some(iana_id) = self.config.event_time_zone.clone() else {
            return;
        };
        match self.cache.get_by_iana_id_or_null(&iana_id).await {
            Ok(Some(descriptor)) => {
                self.local_descriptor = Some(if self.config.use_iana_timezones {
                    descriptor
                } else {
                    descriptor.renamed(&self.local_host_tz_id)
                });
            }
            Ok(None) => crate::logging::warn(
                logger,
                &format!("Configured event timezone '{iana_id}' not found"),
            ),
            Err(e) => crate::logging::warn_with_cause(
                logger,
                &format!("Configured event timezone '{iana_id}' could not be loaded"),
                &e,
            ),
        }
    }

    fn context<'a>(&'a self, logger: &'a dyn MappingLogger) -> MappingContext<'a> {
        MappingContext {
            config: &self.config,
            logger,
            identity: &self.identity,
            now: self.clock.unwrap_or_else(Utc::now),
        }
    }

    fn resolver<'a>(&'a self, logger: &'a dyn MappingLogger) -> TimezoneResolver<'a, C> {
        TimezoneResolver::new(
            &self.cache,
            &self.config,
            &self.local_host_tz_id,
            self.local_descriptor.as_ref(),
            logger,
        )
    }

    /// Build the remote group for `item`.
    ///
    /// `existing` is the group currently stored remotely, if any. Its UID is
    /// kept and its sequence numbers are continued.
    pub async fn map_outbound(
        &self,
        item: &HostCalendarItem,
        existing: Option<&[CalendarEvent]>,
        logger: &dyn MappingLogger,
    ) -> CalBridgeResult<EventGroup> {
        let ctx = self.context(logger);
        let resolver = self.resolver(logger);

        let uid = existing
            .and_then(|events| events.first())
            .map(|e| e.uid.clone())
            .or_else(|| {
                self.config
                    .use_stable_id_as_uid
                    .then(|| item.global_id.clone())
                    .flatten()
            })
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let zones = resolver
            .resolve_pair(&item.start_time_zone, &item.end_time_zone)
            .await;
        let mut definitions = zones.definitions();

        let mut master = CalendarEvent::new(uid.clone(), outbound_start(item, &zones));
        map_fields_outbound(&ctx, item, &zones, &mut master);

        let mut exceptions = Vec::new();
        if let Some(pattern) = &item.recurrence {
            recurrence::map_recurrence_outbound(&ctx, item, &mut master);
            map_exdates_outbound(&ctx, item, &mut master);

            for (original, occurrence) in modified(pattern) {
                let same_zones = occurrence.start_time_zone == item.start_time_zone
                    && occurrence.end_time_zone == item.end_time_zone;
                let occurrence_zones = if same_zones {
                    zones.clone()
                } else {
                    let resolved = resolver
                        .resolve_pair(&occurrence.start_time_zone, &occurrence.end_time_zone)
                        .await;
                    for definition in resolved.definitions() {
                        if !definitions.contains(&definition) {
                            definitions.push(definition);
                        }
                    }
                    resolved
                };

                let mut event =
                    CalendarEvent::new(uid.clone(), outbound_start(occurrence, &occurrence_zones));
                map_fields_outbound(&ctx, occurrence, &occurrence_zones, &mut event);
                event.recurrence_id = Some(occurrence_time(&master.start, item, original));
                exceptions.push(event);
            }
            exceptions.sort_by_key(|e| e.recurrence_id.as_ref().map(EventTime::to_utc));
        }

        let base = existing
            .and_then(|events| events.iter().map(|e| e.sequence).max())
            .map_or(0, |max| max + 1);
        master.sequence = base;
        for (offset, exception) in (1..).zip(exceptions.iter_mut()) {
            exception.sequence = base + offset;
        }

        tracing::debug!(
            uid = %master.uid,
            exceptions = exceptions.len(),
            sequence = base,
            "mapped host item to remote group"
        );

        Ok(EventGroup {
            master,
            exceptions,
            timezones: definitions,
        })
    }

    /// Apply a remote event group to the host item behind `handle`.
    ///
    /// Fails only if the group has no master and none can be reconstructed,
    /// or if the host refuses to save. Per-occurrence problems are warnings.
    pub async fn map_inbound<H: HostItemHandle>(
        &self,
        remote: &[CalendarEvent],
        handle: &mut H,
        logger: &dyn MappingLogger,
    ) -> CalBridgeResult<()> {
        let ctx = self.context(logger);
        let resolver = self.resolver(logger);

        let (master, exceptions) = match remote.iter().find(|e| e.is_master()) {
            Some(master) => (
                master.clone(),
                remote.iter().filter(|e| !e.is_master()).cloned().collect(),
            ),
            None => {
                let uid = remote.first().map(|e| e.uid.as_str()).unwrap_or_default();
                ctx.warn(&format!(
                    "Event '{uid}' has no master, reconstructing it from its exceptions"
                ));
                reconstruct_master(remote)?
            }
        };

        if !master.recurrence_rules.is_empty() || handle.item().is_recurring() {
            handle.item_mut().clear_recurrence();
            handle.save_and_reload()?;
        }

        self.map_fields_inbound(&ctx, &resolver, &master, handle.item_mut(), false);

        if master.recurrence_rules.is_empty() {
            return Ok(());
        }

        recurrence::map_recurrence_inbound(&ctx, &master, handle.item_mut());
        if !handle.item().is_recurring() {
            return Ok(());
        }
        handle.save_and_reload()?;

        let item = handle.item_mut();
        let overridden: Vec<NaiveDate> = exceptions
            .iter()
            .filter_map(|e| e.recurrence_id.as_ref())
            .map(|rid| host_date(rid, item))
            .collect();
        for exdate in &master.exception_dates {
            let date = host_date(exdate, item);
            if overridden.contains(&date) {
                continue;
            }
            if let Err(e) = item.delete_occurrence(date) {
                warn_occurrence(&ctx, "delete", date, &e);
            }
        }

        for exception in placement_order(&exceptions) {
            let Some(recurrence_id) = &exception.recurrence_id else {
                continue;
            };
            let original = host_date(recurrence_id, item);
            let mut occurrence = match item.occurrence(original) {
                Ok(occurrence) => occurrence,
                Err(e) => {
                    warn_occurrence(&ctx, "find", original, &e);
                    continue;
                }
            };
            self.map_fields_inbound(&ctx, &resolver, exception, &mut occurrence, true);
            if let Err(e) = item.apply_occurrence(original, occurrence) {
                warn_occurrence(&ctx, "move", original, &e);
            }
        }

        tracing::debug!(
            uid = %master.uid,
            exdates = master.exception_dates.len(),
            exceptions = exceptions.len(),
            "applied remote group to host item"
        );

        Ok(())
    }

    fn map_fields_inbound(
        &self,
        ctx: &MappingContext<'_>,
        resolver: &TimezoneResolver<'_, C>,
        event: &CalendarEvent,
        item: &mut HostCalendarItem,
        is_exception: bool,
    ) {
        item.subject = event.summary.clone();
        item.location = event.location.clone();
        if ctx.config.map_body {
            item.body = event.description.clone();
        }

        self.map_times_inbound(ctx, resolver, event, item);

        item.importance = privacy::importance_for_priority(event.priority);
        if !is_exception {
            item.sensitivity = privacy::sensitivity_for_class(ctx.config, event.class);
            item.categories = category::categories_inbound(ctx.config, &event.categories);
        }
        privacy::map_busy_status_inbound(event, item);
        reminder::map_reminder_inbound(ctx, event, item);

        if ctx.config.map_attendees {
            attendees::map_attendees_inbound(ctx, event, item);
        }

        if event.status == EventStatus::Cancelled {
            let subject = item.subject.take().unwrap_or_default();
            item.subject = Some(if subject.starts_with(CANCELLED_PREFIX) {
                subject
            } else {
                format!("{CANCELLED_PREFIX}{subject}")
            });
            if item.meeting_status != MeetingStatus::NonMeeting {
                item.meeting_status = MeetingStatus::ReceivedAndCanceled;
            }
        }
    }

    fn map_times_inbound(
        &self,
        ctx: &MappingContext<'_>,
        resolver: &TimezoneResolver<'_, C>,
        event: &CalendarEvent,
        item: &mut HostCalendarItem,
    ) {
        if let EventTime::Date(start) = event.start {
            let mut end = event.end.as_ref().map_or(start + Duration::days(1), EventTime::date);
            if end <= start {
                ctx.warn(&format!(
                    "All-day event '{}' ends on {end}, not after its start {start}; using one day",
                    event.uid
                ));
                end = start + Duration::days(1);
            }
            item.all_day = true;
            item.start = start.and_time(NaiveTime::MIN);
            item.end = end.and_time(NaiveTime::MIN);
            item.start_time_zone = self.local_host_tz_id.clone();
            item.end_time_zone = self.local_host_tz_id.clone();
            return;
        }

        let end = event.end.as_ref().unwrap_or(&event.start);
        let (start_tz, start) = self.host_wall_time(resolver, &event.start);
        let (end_tz, mut end) = self.host_wall_time(resolver, end);
        if start_tz == end_tz && end < start {
            ctx.warn(&format!(
                "Event '{}' ends before it starts, using its start as end",
                event.uid
            ));
            end = start;
        }

        item.all_day = false;
        item.start = start;
        item.end = end;
        item.start_time_zone = start_tz;
        item.end_time_zone = end_tz;
    }

    /// Host zone id and wall time for a timed value.
    fn host_wall_time(
        &self,
        resolver: &TimezoneResolver<'_, C>,
        time: &EventTime,
    ) -> (String, NaiveDateTime) {
        match time {
            EventTime::DateTimeZoned { datetime, tzid } => {
                (resolver.resolve_inbound(tzid), *datetime)
            }
            EventTime::DateTimeFloating(datetime) => (self.local_host_tz_id.clone(), *datetime),
            EventTime::DateTimeUtc(_) | EventTime::Date(_) => {
                let wall = match chrono_tz_for(&self.local_host_tz_id) {
                    Some(tz) => time.to_utc().with_timezone(&tz).naive_local(),
                    None => time.to_utc().naive_utc(),
                };
                (self.local_host_tz_id.clone(), wall)
            }
        }
    }
}

fn warn_occurrence(ctx: &MappingContext<'_>, action: &str, date: NaiveDate, e: &HostError) {
    ctx.warn_with_cause(
        &format!("Could not {action} occurrence of {date}, skipping it"),
        e,
    );
}

fn outbound_time(
    item: &HostCalendarItem,
    wall: NaiveDateTime,
    host_tz_id: &str,
    zone: &TimezoneDescriptor,
) -> EventTime {
    if item.all_day {
        return EventTime::Date(wall.date());
    }
    if zone.is_utc() {
        let instant = match chrono_tz_for(host_tz_id) {
            Some(tz) => crate::event::local_to_utc(&tz, &wall),
            None => wall.and_utc(),
        };
        return EventTime::DateTimeUtc(instant);
    }
    EventTime::DateTimeZoned {
        datetime: wall,
        tzid: zone.tzid.clone(),
    }
}

fn outbound_start(item: &HostCalendarItem, zones: &ResolvedTimezones) -> EventTime {
    outbound_time(item, item.start, &item.start_time_zone, &zones.start)
}

/// Every field except recurrence, exception dates and sequence.
fn map_fields_outbound(
    ctx: &MappingContext<'_>,
    item: &HostCalendarItem,
    zones: &ResolvedTimezones,
    event: &mut CalendarEvent,
) {
    let cancelled = item
        .subject
        .as_deref()
        .is_some_and(|s| s.starts_with(CANCELLED_PREFIX));
    event.status = if cancelled {
        EventStatus::Cancelled
    } else {
        EventStatus::Confirmed
    };
    event.summary = item.subject.clone();
    event.location = item.location.clone();
    if ctx.config.map_body {
        event.description = item.body.clone();
    }

    event.start = outbound_start(item, zones);
    let mut end = outbound_time(item, item.end, &item.end_time_zone, &zones.end);
    if item.all_day && end.date() <= event.start.date() {
        end = EventTime::Date(event.start.date() + Duration::days(1));
    }
    event.end = Some(end);

    event.priority = Some(privacy::priority_for_importance(item.importance));
    event.class = Some(privacy::class_for_sensitivity(ctx.config, item.sensitivity));
    event.categories = category::categories_outbound(ctx.config, item);
    privacy::map_busy_status_outbound(item, event);
    event.alarms = reminder::alarm_outbound(ctx, item).into_iter().collect();

    if ctx.config.map_attendees {
        attendees::map_attendees_outbound(ctx, item, event);
    }
    if ctx.config.suppress_server_notifications {
        event.set_custom_property(SUPPRESS_NOTIFICATIONS_PROPERTY, "NO");
    }
    event.last_modified = Some(item.last_modified);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{
        HostException, HostRecurrencePattern, LocalItemHandle, PatternKind, PatternRange,
    };
    use crate::logging::CollectingLogger;
    use crate::mapping::test_support::timed_item;
    use crate::timezone::{SharedTimezoneCache, TzdbFetcher};
    use chrono::{TimeZone, Weekday};

    type Mapper = EventMapper<SharedTimezoneCache<TzdbFetcher>>;

    fn mapper(config: MappingConfiguration) -> Mapper {
        EventMapper::new(
            config,
            SharedTimezoneCache::new(TzdbFetcher::new()),
            "W. Europe Standard Time",
            OwnIdentity::new("me@example.com"),
        )
        .with_clock(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap())
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn test_single_item_roundtrip() {
        let mapper = mapper(MappingConfiguration::default());
        let logger = CollectingLogger::new();
        let mut item = timed_item(2025, 3, 10, 9);
        item.location = Some("Room 4".into());

        let group = mapper.map_outbound(&item, None, &logger).await.unwrap();
        assert_eq!(group.master.sequence, 0);
        assert_eq!(group.master.start.tzid(), Some("Europe/Berlin"));
        assert_eq!(group.timezones.len(), 1);

        let mut handle = LocalItemHandle::new(timed_item(2020, 1, 1, 0));
        mapper
            .map_inbound(&group.into_events(), &mut handle, &logger)
            .await
            .unwrap();
        let back = handle.into_inner();
        assert_eq!(back.start_utc(), item.start_utc());
        assert_eq!(back.end_utc(), item.end_utc());
        assert_eq!(back.subject, item.subject);
        assert_eq!(back.location, item.location);
        assert_eq!(back.start_time_zone, "W. Europe Standard Time");
        assert!(logger.is_empty(), "{:?}", logger.warnings());
    }

    #[test_log::test(tokio::test)]
    async fn test_utc_mode_and_sequence_continuation() {
        let mapper = mapper(MappingConfiguration {
            create_events_in_utc: true,
            ..Default::default()
        });
        let logger = CollectingLogger::new();
        let item = timed_item(2025, 7, 1, 10);

        let mut previous = CalendarEvent::new("kept-uid", EventTime::Date(date(2025, 1, 1)));
        previous.sequence = 4;
        let existing = vec![previous];
        let group = mapper
            .map_outbound(&item, Some(existing.as_slice()), &logger)
            .await
            .unwrap();

        assert_eq!(group.master.uid, "kept-uid");
        assert_eq!(group.master.sequence, 5);
        assert_eq!(
            group.master.start,
            EventTime::DateTimeUtc(Utc.with_ymd_and_hms(2025, 7, 1, 8, 0, 0).unwrap())
        );
        assert!(group.timezones.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_stable_id_as_uid() {
        let mapper = mapper(MappingConfiguration {
            use_stable_id_as_uid: true,
            ..Default::default()
        });
        let mut item = timed_item(2025, 7, 1, 10);
        item.global_id = Some("040000008200E000".into());
        let group = mapper
            .map_outbound(&item, None, &CollectingLogger::new())
            .await
            .unwrap();
        assert_eq!(group.master.uid, "040000008200E000");
    }

    #[test_log::test(tokio::test)]
    async fn test_cancelled_prefix_roundtrip() {
        let mapper = mapper(MappingConfiguration::default());
        let logger = CollectingLogger::new();
        let mut item = timed_item(2025, 7, 1, 10);
        item.subject = Some("Cancelled: Review".into());

        let group = mapper.map_outbound(&item, None, &logger).await.unwrap();
        assert_eq!(group.master.status, EventStatus::Cancelled);

        let mut handle = LocalItemHandle::new(timed_item(2025, 7, 1, 10));
        mapper
            .map_inbound(&group.into_events(), &mut handle, &logger)
            .await
            .unwrap();
        assert_eq!(
            handle.item().subject.as_deref(),
            Some("Cancelled: Review")
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_all_day_end_is_repaired() {
        let mapper = mapper(MappingConfiguration::default());
        let logger = CollectingLogger::new();
        let mut event = CalendarEvent::new("uid", EventTime::Date(date(2025, 5, 1)));
        event.end = Some(EventTime::Date(date(2025, 5, 1)));

        let mut handle = LocalItemHandle::new(timed_item(2025, 1, 1, 9));
        mapper.map_inbound(&[event], &mut handle, &logger).await.unwrap();

        let item = handle.item();
        assert!(item.all_day);
        assert_eq!(item.end.date(), date(2025, 5, 2));
        assert!(logger.contains("not after its start"));
    }

    #[test_log::test(tokio::test)]
    async fn test_recurring_master_with_moved_occurrence() {
        let mapper = mapper(MappingConfiguration::default());
        let logger = CollectingLogger::new();

        // Mondays from 2025-03-03, the 2025-03-10 one moved to Wednesday
        let mut item = timed_item(2025, 3, 3, 10);
        let mut pattern = HostRecurrencePattern::new(
            PatternKind::Weekly {
                days: vec![Weekday::Mon],
            },
            1,
            date(2025, 3, 3),
        );
        pattern.range = PatternRange::Occurrences(5);
        let mut moved = timed_item(2025, 3, 12, 10);
        moved.subject = Some("Planning (moved)".into());
        pattern.exceptions.push(HostException {
            original_date: date(2025, 3, 10),
            deleted: false,
            item: Some(Box::new(moved)),
        });
        pattern.exceptions.push(HostException {
            original_date: date(2025, 3, 24),
            deleted: true,
            item: None,
        });
        item.recurrence = Some(pattern);

        let group = mapper.map_outbound(&item, None, &logger).await.unwrap();
        assert_eq!(
            group.master.recurrence_rules[0].to_string(),
            "FREQ=WEEKLY;COUNT=5;BYDAY=MO"
        );
        assert_eq!(group.master.exception_dates.len(), 2);
        assert_eq!(group.exceptions.len(), 1);
        assert_eq!(group.exceptions[0].sequence, 1);
        assert_eq!(
            group.exceptions[0].recurrence_id.as_ref().map(EventTime::date),
            Some(date(2025, 3, 10))
        );

        let mut handle = LocalItemHandle::new(timed_item(2025, 1, 1, 9));
        mapper
            .map_inbound(&group.into_events(), &mut handle, &logger)
            .await
            .unwrap();
        assert!(handle.save_count() >= 2);

        let back = handle.into_inner();
        let pattern = back.recurrence.as_ref().unwrap();
        assert_eq!(pattern.range, PatternRange::Occurrences(5));
        let moved = pattern.exception(date(2025, 3, 10)).unwrap();
        assert!(!moved.deleted);
        assert_eq!(
            moved.item.as_ref().map(|i| i.start.date()),
            Some(date(2025, 3, 12))
        );
        assert!(pattern.exception(date(2025, 3, 24)).unwrap().deleted);
        assert!(logger.is_empty(), "{:?}", logger.warnings());
    }

    #[test_log::test(tokio::test)]
    async fn test_missing_master_without_enough_exceptions_fails() {
        let mapper = mapper(MappingConfiguration::default());
        let mut lone = CalendarEvent::new("uid", EventTime::Date(date(2025, 5, 1)));
        lone.recurrence_id = Some(EventTime::Date(date(2025, 5, 1)));

        let mut handle = LocalItemHandle::new(timed_item(2025, 1, 1, 9));
        let result = mapper
            .map_inbound(&[lone], &mut handle, &CollectingLogger::new())
            .await;
        assert!(matches!(
            result,
            Err(crate::error::CalBridgeError::MasterEventMissing(_))
        ));
        assert_eq!(handle.save_count(), 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_preload_local_timezone() {
        let mut mapper = mapper(MappingConfiguration {
            event_time_zone: Some("Europe/Berlin".into()),
            use_iana_timezones: false,
            ..Default::default()
        });
        mapper.preload_local_timezone(&CollectingLogger::new()).await;
        let group = mapper
            .map_outbound(&timed_item(2025, 7, 1, 10), None, &CollectingLogger::new())
            .await
            .unwrap();
        assert_eq!(group.master.start.tzid(), Some("W. Europe Standard Time"));
    }
}
