//! Sensitivity, busy status and importance.

use crate::config::MappingConfiguration;
use crate::event::{BUSY_STATUS_PROPERTY, CalendarEvent, Classification, Transparency};
use crate::host::{BusyStatus, HostCalendarItem, Importance, Sensitivity};

pub fn class_for_sensitivity(config: &MappingConfiguration, sensitivity: Sensitivity) -> Classification {
    match sensitivity {
        Sensitivity::Normal => Classification::Public,
        Sensitivity::Personal => Classification::Private,
        Sensitivity::Private if config.sensitivity_private_maps_to_class_confidential => {
            Classification::Confidential
        }
        Sensitivity::Private => Classification::Private,
        Sensitivity::Confidential => Classification::Confidential,
    }
}

pub fn sensitivity_for_class(
    config: &MappingConfiguration,
    class: Option<Classification>,
) -> Sensitivity {
    match class {
        None => Sensitivity::Normal,
        Some(Classification::Public) if config.class_public_maps_to_sensitivity_private => {
            Sensitivity::Private
        }
        Some(Classification::Public) => Sensitivity::Normal,
        Some(Classification::Private) => Sensitivity::Private,
        Some(Classification::Confidential)
            if config.class_confidential_maps_to_sensitivity_private =>
        {
            Sensitivity::Private
        }
        Some(Classification::Confidential) => Sensitivity::Confidential,
    }
}

fn busy_token(status: BusyStatus) -> &'static str {
    match status {
        BusyStatus::Free => "FREE",
        BusyStatus::Tentative => "TENTATIVE",
        BusyStatus::Busy => "BUSY",
        BusyStatus::OutOfOffice => "OOF",
        BusyStatus::WorkingElsewhere => "WORKINGELSEWHERE",
    }
}

fn busy_from_token(token: &str) -> Option<BusyStatus> {
    match token.trim().to_ascii_uppercase().as_str() {
        "FREE" => Some(BusyStatus::Free),
        "TENTATIVE" => Some(BusyStatus::Tentative),
        "BUSY" => Some(BusyStatus::Busy),
        "OOF" => Some(BusyStatus::OutOfOffice),
        "WORKINGELSEWHERE" => Some(BusyStatus::WorkingElsewhere),
        _ => None,
    }
}

/// Write the busy status as vendor property and transparency.
pub fn map_busy_status_outbound(item: &HostCalendarItem, event: &mut CalendarEvent) {
    event.set_custom_property(BUSY_STATUS_PROPERTY, busy_token(item.busy_status));
    event.transparency = match item.busy_status {
        BusyStatus::Free => Transparency::Transparent,
        _ => Transparency::Opaque,
    };
}

/// The vendor property wins over transparency when it carries a known token.
pub fn map_busy_status_inbound(event: &CalendarEvent, item: &mut HostCalendarItem) {
    item.busy_status = event
        .custom_property(BUSY_STATUS_PROPERTY)
        .and_then(busy_from_token)
        .unwrap_or(match event.transparency {
            Transparency::Transparent => BusyStatus::Free,
            Transparency::Opaque => BusyStatus::Busy,
        });
}

pub fn priority_for_importance(importance: Importance) -> u8 {
    match importance {
        Importance::High => 1,
        Importance::Normal => 5,
        Importance::Low => 9,
    }
}

/// PRIORITY 1-4 is high, 6-9 is low, anything else normal.
pub fn importance_for_priority(priority: Option<u8>) -> Importance {
    match priority {
        Some(1..=4) => Importance::High,
        Some(6..=9) => Importance::Low,
        _ => Importance::Normal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventTime;
    use crate::mapping::test_support::timed_item;

    #[test]
    fn test_private_sensitivity_toggle() {
        let mut config = MappingConfiguration::default();
        assert_eq!(
            class_for_sensitivity(&config, Sensitivity::Private),
            Classification::Private
        );
        config.sensitivity_private_maps_to_class_confidential = true;
        assert_eq!(
            class_for_sensitivity(&config, Sensitivity::Private),
            Classification::Confidential
        );
        assert_eq!(
            class_for_sensitivity(&config, Sensitivity::Normal),
            Classification::Public
        );
    }

    #[test]
    fn test_inbound_class_toggles() {
        let mut config = MappingConfiguration::default();
        assert_eq!(sensitivity_for_class(&config, None), Sensitivity::Normal);
        assert_eq!(
            sensitivity_for_class(&config, Some(Classification::Confidential)),
            Sensitivity::Confidential
        );

        config.class_confidential_maps_to_sensitivity_private = true;
        config.class_public_maps_to_sensitivity_private = true;
        assert_eq!(
            sensitivity_for_class(&config, Some(Classification::Confidential)),
            Sensitivity::Private
        );
        assert_eq!(
            sensitivity_for_class(&config, Some(Classification::Public)),
            Sensitivity::Private
        );
    }

    #[test]
    fn test_busy_status_roundtrip_keeps_out_of_office() {
        let mut item = timed_item(2025, 3, 3, 9);
        item.busy_status = BusyStatus::OutOfOffice;
        let mut event = CalendarEvent::new("uid", EventTime::DateTimeFloating(item.start));
        map_busy_status_outbound(&item, &mut event);
        assert_eq!(event.custom_property(BUSY_STATUS_PROPERTY), Some("OOF"));
        assert_eq!(event.transparency, Transparency::Opaque);

        let mut back = timed_item(2025, 3, 3, 9);
        map_busy_status_inbound(&event, &mut back);
        assert_eq!(back.busy_status, BusyStatus::OutOfOffice);
    }

    #[test]
    fn test_busy_status_from_transparency_only() {
        let mut event = CalendarEvent::new("uid", EventTime::Date(chrono::NaiveDate::MIN));
        event.transparency = Transparency::Transparent;
        let mut item = timed_item(2025, 3, 3, 9);
        map_busy_status_inbound(&event, &mut item);
        assert_eq!(item.busy_status, BusyStatus::Free);
    }

    #[test]
    fn test_priority_bands() {
        assert_eq!(importance_for_priority(Some(2)), Importance::High);
        assert_eq!(importance_for_priority(Some(0)), Importance::Normal);
        assert_eq!(importance_for_priority(None), Importance::Normal);
        assert_eq!(importance_for_priority(Some(9)), Importance::Low);
        assert_eq!(priority_for_importance(Importance::Low), 9);
    }
}
