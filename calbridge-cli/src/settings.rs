use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use calbridge_core::timezone::windows_for_iana_id;
use calbridge_core::{
    EventMapper, MappingConfiguration, MappingLogger, OwnIdentity, SharedTimezoneCache,
    TzdbFetcher,
};
use config::{Config, Environment, File};
use serde::Deserialize;

const CONFIG_ENV: &str = "CALBRIDGE_CONFIG";

pub type Mapper = EventMapper<SharedTimezoneCache<TzdbFetcher>>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentitySettings {
    /// Address of the local mailbox
    pub email: Option<String>,
    /// Address the calendar server knows you by, if different
    pub server_email: Option<String>,
}

/// Settings at ~/.config/calbridge/config.toml, overridable with
/// CALBRIDGE__SECTION__KEY environment variables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub identity: IdentitySettings,

    /// Host timezone id of this machine. Detected when unset.
    pub local_time_zone: Option<String>,

    #[serde(default)]
    pub mapping: MappingConfiguration,
}

impl Settings {
    pub fn config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join("calbridge");

        Ok(config_dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Settings> {
        let settings: Settings = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix("CALBRIDGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Could not read settings from {}", path.display()))?
            .try_deserialize()
            .context("Invalid settings")?;

        settings.mapping.validate()?;
        Ok(settings)
    }

    fn identity(&self) -> OwnIdentity {
        OwnIdentity {
            host_email: self.identity.email.clone(),
            server_email: self.identity.server_email.clone(),
        }
    }

    /// IANA id of the machine zone, from the settings or the OS.
    fn local_iana_zone(&self) -> String {
        match &self.local_time_zone {
            Some(zone) => zone.clone(),
            None => iana_time_zone::get_timezone().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Could not detect the local timezone, using UTC");
                "UTC".to_string()
            }),
        }
    }

    /// Mapper configured for this machine, with the local zone preloaded.
    pub async fn mapper(&self, logger: &dyn MappingLogger) -> Mapper {
        let local_iana = self.local_iana_zone();
        let local_host_id = windows_for_iana_id(&local_iana)
            .map(str::to_string)
            .unwrap_or_else(|| local_iana.clone());

        let mut mapping = self.mapping.clone();
        if mapping.event_time_zone.is_none() {
            mapping.event_time_zone = Some(local_iana);
        }

        let mut mapper = EventMapper::new(
            mapping,
            SharedTimezoneCache::new(TzdbFetcher::new()),
            local_host_id,
            self.identity(),
        );
        mapper.preload_local_timezone(logger).await;
        mapper
    }

    /// Create a default settings file with all options commented out.
    pub fn create_default_config(path: &Path) -> Result<()> {
        let contents = "\
# calbridge configuration

# Your own mailbox, used to tell you apart from other attendees:
# [identity]
# email = \"me@example.com\"
# server_email = \"me@calendar.example.com\"

# Host timezone of this machine (detected when unset):
# local_time_zone = \"Europe/Berlin\"

# [mapping]
# map_body = true
# map_attendees = true
# map_reminder = \"always\"            # off | always | just_upcoming
# create_events_in_utc = false
# use_iana_timezones = true
# use_stable_id_as_uid = false
# schedule_agent_is_client = false
# suppress_server_notifications = false
# use_category_as_filter = false
# filter_category_name = \"\"
# invert_category_filter = false
# sensitivity_private_maps_to_class_confidential = false
# class_confidential_maps_to_sensitivity_private = false
# class_public_maps_to_sensitivity_private = false
# category_separator = \",\"
";

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Could not create config directory")?;
        }

        std::fs::write(path, contents).context("Could not write config file")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calbridge_core::ReminderMapping;
    use config::FileFormat;

    fn from_toml(content: &str) -> Settings {
        Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_partial_settings_use_defaults() {
        let settings = from_toml(
            r#"
            [identity]
            email = "me@example.com"

            [mapping]
            map_reminder = "just_upcoming"
            "#,
        );
        assert_eq!(settings.identity.email.as_deref(), Some("me@example.com"));
        assert_eq!(settings.mapping.map_reminder, ReminderMapping::JustUpcoming);
        assert!(settings.mapping.map_body);
        assert_eq!(settings.mapping.category_separator, ",");
    }

    #[test]
    fn test_default_file_is_valid() {
        let dir = std::env::temp_dir().join(format!("calbridge-test-{}", std::process::id()));
        let path = dir.join("config.toml");
        Settings::create_default_config(&path).unwrap();

        let settings = Settings::load(&path).unwrap();
        assert!(settings.identity.email.is_none());
        assert_eq!(settings.mapping, MappingConfiguration::default());

        std::fs::remove_dir_all(dir).unwrap();
    }
}
