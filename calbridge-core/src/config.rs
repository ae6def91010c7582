//! Mapping configuration.
//!
//! A read-only set of switches consulted by every sub-mapper. It is usually
//! embedded as the `[mapping]` table of the command line's config file, but
//! can also be loaded on its own from TOML.

use serde::{Deserialize, Serialize};

use crate::error::{CalBridgeError, CalBridgeResult};

/// How reminders are carried across.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderMapping {
    Off,
    #[default]
    Always,
    /// Only reminders whose trigger instant is still in the future.
    JustUpcoming,
}

fn default_true() -> bool {
    true
}

fn default_category_separator() -> String {
    ",".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingConfiguration {
    #[serde(default = "default_true")]
    pub map_body: bool,

    #[serde(default = "default_true")]
    pub map_attendees: bool,

    #[serde(default)]
    pub map_reminder: ReminderMapping,

    /// Write every timed event in UTC instead of its own timezone.
    #[serde(default)]
    pub create_events_in_utc: bool,

    /// Publish IANA timezone ids. When off, the host's own timezone names are
    /// used as TZID.
    #[serde(default = "default_true")]
    pub use_iana_timezones: bool,

    /// Use the host's global object id as UID for new remote events.
    #[serde(default)]
    pub use_stable_id_as_uid: bool,

    #[serde(default)]
    pub schedule_agent_is_client: bool,

    #[serde(default)]
    pub suppress_server_notifications: bool,

    #[serde(default)]
    pub use_category_as_filter: bool,

    #[serde(default)]
    pub filter_category_name: String,

    #[serde(default)]
    pub invert_category_filter: bool,

    #[serde(default)]
    pub sensitivity_private_maps_to_class_confidential: bool,

    #[serde(default)]
    pub class_confidential_maps_to_sensitivity_private: bool,

    #[serde(default)]
    pub class_public_maps_to_sensitivity_private: bool,

    /// Delimiter of the host category string.
    #[serde(default = "default_category_separator")]
    pub category_separator: String,

    /// Pre-resolved remote timezone id for the local machine zone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_time_zone: Option<String>,
}

impl Default for MappingConfiguration {
    fn default() -> Self {
        Self {
            map_body: true,
            map_attendees: true,
            map_reminder: ReminderMapping::default(),
            create_events_in_utc: false,
            use_iana_timezones: true,
            use_stable_id_as_uid: false,
            schedule_agent_is_client: false,
            suppress_server_notifications: false,
            use_category_as_filter: false,
            filter_category_name: String::new(),
            invert_category_filter: false,
            sensitivity_private_maps_to_class_confidential: false,
            class_confidential_maps_to_sensitivity_private: false,
            class_public_maps_to_sensitivity_private: false,
            category_separator: default_category_separator(),
            event_time_zone: None,
        }
    }
}

impl MappingConfiguration {
    pub fn from_toml_str(content: &str) -> CalBridgeResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| CalBridgeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the mappers cannot honor.
    pub fn validate(&self) -> CalBridgeResult<()> {
        if self.category_separator.is_empty() {
            return Err(CalBridgeError::Config(
                "category_separator must not be empty".into(),
            ));
        }

        if self.use_category_as_filter {
            let name = self.filter_category_name.trim();
            if name.is_empty() {
                return Err(CalBridgeError::Config(
                    "filter_category_name is required when use_category_as_filter is set".into(),
                ));
            }
            if name.contains(self.category_separator.as_str()) {
                return Err(CalBridgeError::Config(format!(
                    "filter_category_name '{}' must not contain the category separator '{}'",
                    name, self.category_separator
                )));
            }
        }

        Ok(())
    }

    /// The filter category if filtering is active and the item is expected to carry it.
    pub(crate) fn injected_filter_category(&self) -> Option<&str> {
        if self.use_category_as_filter && !self.invert_category_filter {
            Some(self.filter_category_name.trim()).filter(|name| !name.is_empty())
        } else {
            None
        }
    }
}
