use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use crate::Result;
use crate::error::Error as CrateError;
use crate::types::{Importance, NotificationDuration};

mod defaults;
mod env;
mod raw;
mod serde;

pub(crate) use self::serde::HumantimeDuration;

/// Process-wide notification settings, passed to [`crate::Notifier::new`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub app: AppConfig,
    pub channel: ChannelConfig,
    pub notify: NotifySettings,
}

/// Identity shown by the platform next to every notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub app_name: String,
    /// Resource locator for the application icon, staged before use.
    pub small_icon: Option<String>,
}

/// The single default channel notifications are posted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub id: String,
    pub name: String,
    pub description: String,
    pub importance: Importance,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifySettings {
    pub duration: NotificationDuration,
    /// Upper bound on how long a submitted notification may wait for a native callback.
    pub callback_timeout: Duration,
    pub staging_cache: NonZeroUsize,
    /// Active les journaux de niveau debug quand aucun filtre n'est donné.
    pub debug: bool,
}

impl Config {
    /// Load configuration from an optional TOML file and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be parsed, when an environment
    /// override is malformed, or when the resulting values fail validation.
    pub fn from_env_and_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut raw = raw::load(Some(path.as_ref())).map_err(CrateError::from)?;
        raw.apply_env_overrides().map_err(CrateError::from)?;
        raw.validate_and_build()
    }

    /// Same as [`Config::from_env_and_file`] without a file.
    ///
    /// # Errors
    ///
    /// Returns an error when an environment override is malformed or invalid.
    pub fn from_env() -> Result<Self> {
        let mut raw = raw::load(None).map_err(CrateError::from)?;
        raw.apply_env_overrides().map_err(CrateError::from)?;
        raw.validate_and_build()
    }

    #[must_use]
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app.app_name = app_name.into();
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: defaults::default_app_name(),
            small_icon: None,
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            id: defaults::default_channel_id(),
            name: defaults::default_channel_name(),
            description: String::new(),
            importance: Importance::default(),
        }
    }
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            duration: NotificationDuration::default(),
            callback_timeout: defaults::default_callback_timeout(),
            staging_cache: defaults::default_staging_cache(),
            debug: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Config;
    use std::io::Write;
    use std::time::Duration;

    use crate::error::{ConfigError, Error};
    use crate::types::{Importance, NotificationDuration};

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = match tempfile::Builder::new().suffix(".toml").tempfile() {
            Ok(file) => file,
            Err(err) => panic!("failed to create temp config: {err}"),
        };
        if let Err(err) = file.write_all(contents.as_bytes()) {
            panic!("failed to write temp config: {err}");
        }
        file
    }

    #[test]
    fn defaults_apply_without_file() {
        let config = Config::default();
        assert_eq!(config.app.app_name, "Application");
        assert_eq!(config.channel.id, "default");
        assert_eq!(config.notify.callback_timeout, Duration::from_secs(30));
        assert_eq!(config.notify.duration, NotificationDuration::Short);
    }

    #[test]
    fn file_values_override_defaults() {
        let file = write_config(
            r#"
[app]
name = "Reminders"
icon = "res:icons/app.png"

[channel]
id = "alerts"
name = "Alerts"
importance = "high"

[notify]
duration = "long"
callback_timeout = "45s"
"#,
        );

        let config = match Config::from_env_and_file(file.path()) {
            Ok(config) => config,
            Err(err) => panic!("config should load: {err}"),
        };
        assert_eq!(config.app.app_name, "Reminders");
        assert_eq!(config.app.small_icon.as_deref(), Some("res:icons/app.png"));
        assert_eq!(config.channel.id, "alerts");
        assert_eq!(config.channel.importance, Importance::High);
        assert_eq!(config.notify.duration, NotificationDuration::Long);
        assert_eq!(config.notify.callback_timeout, Duration::from_secs(45));
    }

    #[test]
    fn zero_callback_timeout_is_rejected() {
        let file = write_config("[notify]\ncallback_timeout = \"0s\"\n");
        match Config::from_env_and_file(file.path()) {
            Err(Error::Config(ConfigError::InvalidField { field, .. })) => {
                assert_eq!(field, "notify.callback_timeout");
            }
            other => panic!("expected invalid field, got {other:?}"),
        }
    }

    #[test]
    fn blank_app_name_is_rejected() {
        let file = write_config("[app]\nname = \"  \"\n");
        assert!(matches!(
            Config::from_env_and_file(file.path()),
            Err(Error::Config(ConfigError::InvalidField {
                field: "app.name",
                ..
            }))
        ));
    }
}
