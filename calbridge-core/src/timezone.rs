//! Timezone resolution.
//!
//! Host items name their zones the way the host does (Windows zone names or
//! IANA ids). Remote events carry a TZID plus, optionally, a VTIMEZONE
//! definition. The [`TimezoneResolver`] maps between the two, falling back to
//! UTC whenever a zone cannot be resolved.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use tokio::sync::OnceCell;

use crate::config::MappingConfiguration;
use crate::error::{CalBridgeError, CalBridgeResult};
use crate::logging::{MappingLogger, warn, warn_with_cause};
use crate::rule::weekday_code;

pub const UTC_TZID: &str = "UTC";

/// Windows zone name to IANA id, following the CLDR "001" territory mapping.
static WINDOWS_TO_IANA: &[(&str, &str)] = &[
    ("Dateline Standard Time", "Etc/GMT+12"),
    ("Hawaiian Standard Time", "Pacific/Honolulu"),
    ("Alaskan Standard Time", "America/Anchorage"),
    ("Pacific Standard Time", "America/Los_Angeles"),
    ("US Mountain Standard Time", "America/Phoenix"),
    ("Mountain Standard Time", "America/Denver"),
    ("Central Standard Time", "America/Chicago"),
    ("Central Standard Time (Mexico)", "America/Mexico_City"),
    ("Eastern Standard Time", "America/New_York"),
    ("SA Pacific Standard Time", "America/Bogota"),
    ("Venezuela Standard Time", "America/Caracas"),
    ("Atlantic Standard Time", "America/Halifax"),
    ("Pacific SA Standard Time", "America/Santiago"),
    ("Newfoundland Standard Time", "America/St_Johns"),
    ("E. South America Standard Time", "America/Sao_Paulo"),
    ("Argentina Standard Time", "America/Argentina/Buenos_Aires"),
    ("UTC", "Etc/UTC"),
    ("GMT Standard Time", "Europe/London"),
    ("Greenwich Standard Time", "Atlantic/Reykjavik"),
    ("W. Europe Standard Time", "Europe/Berlin"),
    ("Central Europe Standard Time", "Europe/Budapest"),
    ("Romance Standard Time", "Europe/Paris"),
    ("Central European Standard Time", "Europe/Warsaw"),
    ("W. Central Africa Standard Time", "Africa/Lagos"),
    ("Morocco Standard Time", "Africa/Casablanca"),
    ("GTB Standard Time", "Europe/Bucharest"),
    ("FLE Standard Time", "Europe/Kyiv"),
    ("E. Europe Standard Time", "Europe/Chisinau"),
    ("Egypt Standard Time", "Africa/Cairo"),
    ("Israel Standard Time", "Asia/Jerusalem"),
    ("South Africa Standard Time", "Africa/Johannesburg"),
    ("Turkey Standard Time", "Europe/Istanbul"),
    ("Russian Standard Time", "Europe/Moscow"),
    ("Arabian Standard Time", "Asia/Dubai"),
    ("Iran Standard Time", "Asia/Tehran"),
    ("Pakistan Standard Time", "Asia/Karachi"),
    ("India Standard Time", "Asia/Kolkata"),
    ("Nepal Standard Time", "Asia/Kathmandu"),
    ("Bangladesh Standard Time", "Asia/Dhaka"),
    ("SE Asia Standard Time", "Asia/Bangkok"),
    ("China Standard Time", "Asia/Shanghai"),
    ("Singapore Standard Time", "Asia/Singapore"),
    ("Taipei Standard Time", "Asia/Taipei"),
    ("Tokyo Standard Time", "Asia/Tokyo"),
    ("Korea Standard Time", "Asia/Seoul"),
    ("W. Australia Standard Time", "Australia/Perth"),
    ("AUS Central Standard Time", "Australia/Darwin"),
    ("E. Australia Standard Time", "Australia/Brisbane"),
    ("AUS Eastern Standard Time", "Australia/Sydney"),
    ("New Zealand Standard Time", "Pacific/Auckland"),
    ("Tonga Standard Time", "Pacific/Tongatapu"),
];

pub fn iana_for_windows_id(id: &str) -> Option<&'static str> {
    WINDOWS_TO_IANA
        .iter()
        .find(|(windows, _)| windows.eq_ignore_ascii_case(id))
        .map(|(_, iana)| *iana)
}

pub fn windows_for_iana_id(id: &str) -> Option<&'static str> {
    WINDOWS_TO_IANA
        .iter()
        .find(|(_, iana)| iana.eq_ignore_ascii_case(id))
        .map(|(windows, _)| *windows)
}

/// Canonical IANA id for a host or remote zone name.
pub fn canonical_iana_id(id: &str) -> Option<String> {
    if let Some(iana) = iana_for_windows_id(id) {
        return Some(iana.to_string());
    }
    id.parse::<chrono_tz::Tz>().ok().map(|tz| tz.name().to_string())
}

/// Zone rules for a Windows name or IANA id.
pub fn chrono_tz_for(id: &str) -> Option<chrono_tz::Tz> {
    let iana = iana_for_windows_id(id).unwrap_or(id);
    iana.parse::<chrono_tz::Tz>().ok()
}

pub(crate) fn is_utc_id(id: &str) -> bool {
    matches!(
        id.to_ascii_uppercase().as_str(),
        "UTC" | "ETC/UTC" | "GMT" | "ETC/GMT" | "Z" | "ZULU" | "UNIVERSAL" | "ETC/UNIVERSAL"
    )
}

/// A zone as written into remote events: its TZID and the VTIMEZONE block
/// defining it, if one is available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimezoneDescriptor {
    pub tzid: String,
    pub vtimezone: Option<String>,
}

impl TimezoneDescriptor {
    pub fn utc() -> Self {
        Self {
            tzid: UTC_TZID.to_string(),
            vtimezone: None,
        }
    }

    pub fn is_utc(&self) -> bool {
        is_utc_id(&self.tzid)
    }

    /// Same definition published under another TZID.
    pub fn renamed(&self, tzid: &str) -> Self {
        let vtimezone = self.vtimezone.as_ref().map(|block| {
            block
                .lines()
                .map(|line| {
                    if line.starts_with("TZID:") {
                        format!("TZID:{tzid}")
                    } else {
                        line.to_string()
                    }
                })
                .collect::<Vec<_>>()
                .join("\r\n")
        });
        Self {
            tzid: tzid.to_string(),
            vtimezone,
        }
    }
}

/// Read access to remote timezone definitions by IANA id.
pub trait TimezoneCache: Send + Sync {
    fn get_by_iana_id_or_null(
        &self,
        iana_id: &str,
    ) -> impl Future<Output = CalBridgeResult<Option<TimezoneDescriptor>>> + Send;
}

/// Source of timezone definitions behind a [`SharedTimezoneCache`].
pub trait TimezoneFetcher: Send + Sync {
    fn fetch(
        &self,
        iana_id: &str,
    ) -> impl Future<Output = CalBridgeResult<Option<TimezoneDescriptor>>> + Send;
}

type Slot = Arc<OnceCell<Option<TimezoneDescriptor>>>;

/// Lazily populated read-through cache.
///
/// Each key owns a `OnceCell`, so concurrent misses for the same id wait on a
/// single fetch. Failed fetches are not cached and are retried by the next
/// caller.
pub struct SharedTimezoneCache<F> {
    fetcher: F,
    slots: RwLock<HashMap<String, Slot>>,
}

impl<F: TimezoneFetcher> SharedTimezoneCache<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            slots: RwLock::new(HashMap::new()),
        }
    }

    fn slot(&self, iana_id: &str) -> Slot {
        if let Some(slot) = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(iana_id)
        {
            return slot.clone();
        }

        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(iana_id.to_string())
            .or_default()
            .clone()
    }
}

impl<F: TimezoneFetcher> TimezoneCache for SharedTimezoneCache<F> {
    async fn get_by_iana_id_or_null(
        &self,
        iana_id: &str,
    ) -> CalBridgeResult<Option<TimezoneDescriptor>> {
        let slot = self.slot(iana_id);
        let value = slot
            .get_or_try_init(|| self.fetcher.fetch(iana_id))
            .await?;
        Ok(value.clone())
    }
}

/// Builds definitions from the IANA database compiled into `chrono-tz`.
#[derive(Debug, Clone, Copy)]
pub struct TzdbFetcher {
    reference_year: i32,
}

impl TzdbFetcher {
    pub fn new() -> Self {
        Self {
            reference_year: Utc::now().year(),
        }
    }

    pub fn with_reference_year(reference_year: i32) -> Self {
        Self { reference_year }
    }
}

impl Default for TzdbFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl TimezoneFetcher for TzdbFetcher {
    async fn fetch(&self, iana_id: &str) -> CalBridgeResult<Option<TimezoneDescriptor>> {
        let Ok(tz) = iana_id.parse::<chrono_tz::Tz>() else {
            return Ok(None);
        };
        let vtimezone = build_vtimezone(tz, tz.name(), self.reference_year)?;
        Ok(Some(TimezoneDescriptor {
            tzid: tz.name().to_string(),
            vtimezone: Some(vtimezone),
        }))
    }
}

fn offset_seconds(tz: &chrono_tz::Tz, at: &NaiveDateTime) -> i32 {
    tz.offset_from_utc_datetime(at).fix().local_minus_utc()
}

fn format_offset(seconds: i32) -> String {
    let sign = if seconds < 0 { '-' } else { '+' };
    let abs = seconds.abs();
    format!("{}{:02}{:02}", sign, abs / 3600, (abs % 3600) / 60)
}

struct Transition {
    /// Wall time of the change, read in the offset in force before it
    local: NaiveDateTime,
    from: i32,
    to: i32,
}

/// Offset changes during `year`, found at quarter-hour precision.
fn transitions_in_year(tz: &chrono_tz::Tz, year: i32) -> CalBridgeResult<Vec<Transition>> {
    let start = NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| CalBridgeError::TimezoneLookup {
            tzid: tz.name().to_string(),
            message: format!("invalid reference year {year}"),
        })?;

    let mut transitions = Vec::new();
    let mut day = start;
    let mut previous = offset_seconds(tz, &day);
    while day.year() == year {
        let next_day = day + Duration::days(1);
        let offset = offset_seconds(tz, &next_day);
        if offset != previous {
            let mut at = day;
            while offset_seconds(tz, &at) == previous {
                at += Duration::minutes(15);
            }
            transitions.push(Transition {
                local: at + Duration::seconds(i64::from(previous)),
                from: previous,
                to: offset,
            });
            previous = offset;
        }
        day = next_day;
    }
    Ok(transitions)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

/// Generate a VTIMEZONE block describing `tz` as it behaves in `reference_year`.
pub fn build_vtimezone(
    tz: chrono_tz::Tz,
    tzid: &str,
    reference_year: i32,
) -> CalBridgeResult<String> {
    let mut lines = vec!["BEGIN:VTIMEZONE".to_string(), format!("TZID:{tzid}")];
    let transitions = transitions_in_year(&tz, reference_year)?;

    if transitions.is_empty() {
        let jan = NaiveDate::from_ymd_opt(reference_year, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or_default();
        let offset = format_offset(offset_seconds(&tz, &jan));
        lines.push("BEGIN:STANDARD".into());
        lines.push("DTSTART:19700101T000000".into());
        lines.push(format!("TZOFFSETFROM:{offset}"));
        lines.push(format!("TZOFFSETTO:{offset}"));
        lines.push("END:STANDARD".into());
    }

    for transition in &transitions {
        let kind = if transition.to > transition.from {
            "DAYLIGHT"
        } else {
            "STANDARD"
        };
        let date = transition.local.date();
        let nth = if date.day() + 7 > days_in_month(date.year(), date.month()) {
            -1
        } else {
            (date.day() as i32 - 1) / 7 + 1
        };

        lines.push(format!("BEGIN:{kind}"));
        lines.push(format!(
            "DTSTART:{}",
            transition.local.format("%Y%m%dT%H%M%S")
        ));
        lines.push(format!(
            "RRULE:FREQ=YEARLY;BYMONTH={};BYDAY={}{}",
            date.month(),
            nth,
            weekday_code(date.weekday())
        ));
        lines.push(format!("TZOFFSETFROM:{}", format_offset(transition.from)));
        lines.push(format!("TZOFFSETTO:{}", format_offset(transition.to)));
        lines.push(format!("END:{kind}"));
    }

    lines.push("END:VTIMEZONE".into());
    Ok(lines.join("\r\n"))
}

/// Timezones resolved for the start and end of one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTimezones {
    pub start: TimezoneDescriptor,
    pub end: TimezoneDescriptor,
}

impl ResolvedTimezones {
    pub fn utc() -> Self {
        Self {
            start: TimezoneDescriptor::utc(),
            end: TimezoneDescriptor::utc(),
        }
    }

    /// Descriptors with a VTIMEZONE to embed, without duplicates.
    pub fn definitions(&self) -> Vec<TimezoneDescriptor> {
        let mut definitions = Vec::new();
        for descriptor in [&self.start, &self.end] {
            if descriptor.vtimezone.is_some() && !definitions.contains(descriptor) {
                definitions.push(descriptor.clone());
            }
        }
        definitions
    }
}

pub struct TimezoneResolver<'a, C> {
    cache: &'a C,
    config: &'a MappingConfiguration,
    local_host_tz_id: &'a str,
    local_descriptor: Option<&'a TimezoneDescriptor>,
    logger: &'a dyn MappingLogger,
}

impl<'a, C: TimezoneCache> TimezoneResolver<'a, C> {
    pub fn new(
        cache: &'a C,
        config: &'a MappingConfiguration,
        local_host_tz_id: &'a str,
        local_descriptor: Option<&'a TimezoneDescriptor>,
        logger: &'a dyn MappingLogger,
    ) -> Self {
        Self {
            cache,
            config,
            local_host_tz_id,
            local_descriptor,
            logger,
        }
    }

    /// Remote descriptor for a host zone id. Never fails: every problem is
    /// logged and answered with UTC.
    pub async fn resolve_outbound(&self, host_tz_id: &str) -> TimezoneDescriptor {
        if self.config.create_events_in_utc {
            return TimezoneDescriptor::utc();
        }

        if host_tz_id == self.local_host_tz_id {
            if let Some(descriptor) = self.local_descriptor {
                return descriptor.clone();
            }
        }

        let Some(iana_id) = canonical_iana_id(host_tz_id) else {
            warn(
                self.logger,
                &format!("Unknown timezone '{host_tz_id}', falling back to UTC"),
            );
            return TimezoneDescriptor::utc();
        };

        if is_utc_id(&iana_id) {
            return TimezoneDescriptor::utc();
        }

        match self.cache.get_by_iana_id_or_null(&iana_id).await {
            Ok(Some(descriptor)) => {
                if self.config.use_iana_timezones {
                    descriptor
                } else {
                    descriptor.renamed(host_tz_id)
                }
            }
            Ok(None) => {
                warn(
                    self.logger,
                    &format!("Timezone '{iana_id}' not found, falling back to UTC"),
                );
                TimezoneDescriptor::utc()
            }
            Err(e) => {
                warn_with_cause(
                    self.logger,
                    &format!("Timezone lookup for '{iana_id}' failed, falling back to UTC"),
                    &e,
                );
                TimezoneDescriptor::utc()
            }
        }
    }

    /// Resolve start and end zones, sharing the lookup when they are equal.
    pub async fn resolve_pair(&self, start_tz_id: &str, end_tz_id: &str) -> ResolvedTimezones {
        let start = self.resolve_outbound(start_tz_id).await;
        let end = if start_tz_id == end_tz_id {
            start.clone()
        } else {
            self.resolve_outbound(end_tz_id).await
        };
        ResolvedTimezones { start, end }
    }

    /// Host zone id for a remote TZID. Unknown ids map to the local zone.
    pub fn resolve_inbound(&self, remote_tzid: &str) -> String {
        if is_utc_id(remote_tzid) {
            return UTC_TZID.to_string();
        }
        if let Some(iana) = iana_for_windows_id(remote_tzid) {
            return windows_for_iana_id(iana)
                .unwrap_or(remote_tzid)
                .to_string();
        }
        match remote_tzid.parse::<chrono_tz::Tz>() {
            Ok(tz) => windows_for_iana_id(tz.name())
                .unwrap_or(tz.name())
                .to_string(),
            Err(_) => {
                warn(
                    self.logger,
                    &format!(
                        "Unknown timezone '{}', using local timezone '{}'",
                        remote_tzid, self.local_host_tz_id
                    ),
                );
                self.local_host_tz_id.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::CollectingLogger;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFetcher {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingFetcher {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }
    }

    impl TimezoneFetcher for CountingFetcher {
        async fn fetch(&self, iana_id: &str) -> CalBridgeResult<Option<TimezoneDescriptor>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            if self.fail {
                return Err(CalBridgeError::TimezoneLookup {
                    tzid: iana_id.to_string(),
                    message: "server unavailable".into(),
                });
            }
            if iana_id == "Europe/Berlin" {
                Ok(Some(TimezoneDescriptor {
                    tzid: iana_id.to_string(),
                    vtimezone: Some("BEGIN:VTIMEZONE\r\nTZID:Europe/Berlin\r\nEND:VTIMEZONE".into()),
                }))
            } else {
                Ok(None)
            }
        }
    }

    #[test]
    fn test_windows_names_map_both_ways() {
        assert_eq!(iana_for_windows_id("W. Europe Standard Time"), Some("Europe/Berlin"));
        assert_eq!(windows_for_iana_id("America/New_York"), Some("Eastern Standard Time"));
        assert_eq!(
            canonical_iana_id("Pacific Standard Time").as_deref(),
            Some("America/Los_Angeles")
        );
        assert_eq!(canonical_iana_id("Asia/Tokyo").as_deref(), Some("Asia/Tokyo"));
        assert_eq!(canonical_iana_id("Nowhere Standard Time"), None);
    }

    #[tokio::test]
    async fn test_concurrent_misses_fetch_once() {
        let cache = Arc::new(SharedTimezoneCache::new(CountingFetcher::new(false)));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.get_by_iana_id_or_null("Europe/Berlin").await
            }));
        }
        for handle in handles {
            let descriptor = handle.await.unwrap().unwrap().unwrap();
            assert_eq!(descriptor.tzid, "Europe/Berlin");
        }

        assert_eq!(cache.fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_cached_but_errors_are_not() {
        let cache = SharedTimezoneCache::new(CountingFetcher::new(false));
        assert_eq!(cache.get_by_iana_id_or_null("Asia/Tokyo").await.unwrap(), None);
        assert_eq!(cache.get_by_iana_id_or_null("Asia/Tokyo").await.unwrap(), None);
        assert_eq!(cache.fetcher.calls.load(Ordering::SeqCst), 1);

        let failing = SharedTimezoneCache::new(CountingFetcher::new(true));
        assert!(failing.get_by_iana_id_or_null("Asia/Tokyo").await.is_err());
        assert!(failing.get_by_iana_id_or_null("Asia/Tokyo").await.is_err());
        assert_eq!(failing.fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_tzdb_fetcher_builds_daylight_rules() {
        let fetcher = TzdbFetcher::with_reference_year(2025);
        let descriptor = fetcher.fetch("Europe/Berlin").await.unwrap().unwrap();
        let block = descriptor.vtimezone.unwrap();

        assert!(block.contains("TZID:Europe/Berlin"));
        assert!(block.contains("BEGIN:DAYLIGHT"));
        assert!(block.contains("RRULE:FREQ=YEARLY;BYMONTH=3;BYDAY=-1SU"));
        assert!(block.contains("RRULE:FREQ=YEARLY;BYMONTH=10;BYDAY=-1SU"));
        assert!(block.contains("DTSTART:20250330T020000"));
        assert!(block.contains("TZOFFSETTO:+0200"));

        assert_eq!(fetcher.fetch("Not/AZone").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_tzdb_fetcher_zone_without_dst() {
        let fetcher = TzdbFetcher::with_reference_year(2025);
        let block = fetcher.fetch("Asia/Tokyo").await.unwrap().unwrap().vtimezone.unwrap();
        assert!(block.contains("TZOFFSETTO:+0900"));
        assert!(!block.contains("DAYLIGHT"));
    }

    #[tokio::test]
    async fn test_resolver_utc_mode_skips_lookup() {
        let cache = SharedTimezoneCache::new(CountingFetcher::new(false));
        let config = MappingConfiguration {
            create_events_in_utc: true,
            ..Default::default()
        };
        let logger = CollectingLogger::new();
        let resolver = TimezoneResolver::new(&cache, &config, "UTC", None, &logger);

        let resolved = resolver.resolve_pair("W. Europe Standard Time", "W. Europe Standard Time").await;
        assert!(resolved.start.is_utc());
        assert!(resolved.end.is_utc());
        assert_eq!(cache.fetcher.calls.load(Ordering::SeqCst), 0);
        assert!(logger.is_empty());
    }

    #[tokio::test]
    async fn test_resolver_uses_local_descriptor_fast_path() {
        let cache = SharedTimezoneCache::new(CountingFetcher::new(false));
        let config = MappingConfiguration::default();
        let logger = CollectingLogger::new();
        let local = TimezoneDescriptor {
            tzid: "Europe/Vienna".into(),
            vtimezone: None,
        };
        let resolver = TimezoneResolver::new(
            &cache,
            &config,
            "W. Europe Standard Time",
            Some(&local),
            &logger,
        );

        let descriptor = resolver.resolve_outbound("W. Europe Standard Time").await;
        assert_eq!(descriptor, local);
        assert_eq!(cache.fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_resolver_shares_equal_zones_and_falls_back() {
        let cache = SharedTimezoneCache::new(CountingFetcher::new(false));
        let config = MappingConfiguration::default();
        let logger = CollectingLogger::new();
        let resolver = TimezoneResolver::new(&cache, &config, "UTC", None, &logger);

        let resolved = resolver.resolve_pair("W. Europe Standard Time", "W. Europe Standard Time").await;
        assert_eq!(resolved.start.tzid, "Europe/Berlin");
        assert_eq!(resolved.start, resolved.end);
        assert_eq!(resolved.definitions().len(), 1);

        // Known to tzdb but unknown to the remote cache
        let fallback = resolver.resolve_outbound("Tokyo Standard Time").await;
        assert!(fallback.is_utc());
        assert!(logger.contains("Asia/Tokyo"));
    }

    #[tokio::test]
    async fn test_resolver_lookup_failure_falls_back_to_utc() {
        let cache = SharedTimezoneCache::new(CountingFetcher::new(true));
        let config = MappingConfiguration::default();
        let logger = CollectingLogger::new();
        let resolver = TimezoneResolver::new(&cache, &config, "UTC", None, &logger);

        assert!(resolver.resolve_outbound("Europe/Berlin").await.is_utc());
        assert!(logger.contains("server unavailable"));
    }

    #[tokio::test]
    async fn test_resolver_publishes_host_names_when_iana_disabled() {
        let cache = SharedTimezoneCache::new(CountingFetcher::new(false));
        let config = MappingConfiguration {
            use_iana_timezones: false,
            ..Default::default()
        };
        let logger = CollectingLogger::new();
        let resolver = TimezoneResolver::new(&cache, &config, "UTC", None, &logger);

        let descriptor = resolver.resolve_outbound("W. Europe Standard Time").await;
        assert_eq!(descriptor.tzid, "W. Europe Standard Time");
        assert!(
            descriptor
                .vtimezone
                .unwrap()
                .contains("TZID:W. Europe Standard Time")
        );
    }

    #[test]
    fn test_resolve_inbound() {
        let cache = SharedTimezoneCache::new(CountingFetcher::new(false));
        let config = MappingConfiguration::default();
        let logger = CollectingLogger::new();
        let resolver =
            TimezoneResolver::new(&cache, &config, "Eastern Standard Time", None, &logger);

        assert_eq!(resolver.resolve_inbound("Europe/Berlin"), "W. Europe Standard Time");
        assert_eq!(resolver.resolve_inbound("Europe/Oslo"), "Europe/Oslo");
        assert_eq!(resolver.resolve_inbound("Romance Standard Time"), "Romance Standard Time");
        assert_eq!(resolver.resolve_inbound("Etc/UTC"), "UTC");
        assert!(logger.is_empty());

        assert_eq!(
            resolver.resolve_inbound("Custom Zone 1"),
            "Eastern Standard Time"
        );
        assert!(logger.contains("Custom Zone 1"));
    }
}
