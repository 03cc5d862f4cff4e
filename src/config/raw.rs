use std::num::NonZeroUsize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use serde_with::serde_as;

use crate::Result;
use crate::error::ConfigError;
use crate::types::{Importance, NotificationDuration};

use super::defaults::{
    default_app_name, default_callback_timeout, default_channel_id, default_channel_name,
    default_duration, default_importance, default_staging_cache_raw,
};
use super::env::{ENV_PREFIX, env_bool, env_duration, env_parse, env_string};
use super::{AppConfig, ChannelConfig, Config, HumantimeDuration, NotifySettings};

/// Charge les valeurs par défaut, le fichier TOML si présent, puis `DESKNOTIFY__*`.
pub(super) fn load(path: Option<&Path>) -> std::result::Result<RawConfig, ConfigError> {
    let mut builder = ::config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(::config::File::from(path).required(false));
    }
    builder = builder.add_source(
        ::config::Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    );

    builder
        .build()
        .map_err(|err| ConfigError::Other(err.to_string()))?
        .try_deserialize()
        .map_err(|err| ConfigError::Parse(err.to_string()))
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct RawConfig {
    #[serde(default)]
    pub(super) app: RawApp,
    #[serde(default)]
    pub(super) channel: RawChannel,
    #[serde(default)]
    pub(super) notify: RawNotify,
}

#[derive(Debug, Deserialize)]
pub(super) struct RawApp {
    #[serde(default = "default_app_name")]
    pub(super) name: String,
    #[serde(default)]
    pub(super) icon: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RawChannel {
    #[serde(default = "default_channel_id")]
    pub(super) id: String,
    #[serde(default = "default_channel_name")]
    pub(super) name: String,
    #[serde(default)]
    pub(super) description: String,
    #[serde(default = "default_importance")]
    pub(super) importance: String,
}

#[serde_as]
#[derive(Debug, Deserialize)]
pub(super) struct RawNotify {
    #[serde(default = "default_duration")]
    pub(super) duration: String,
    #[serde(default = "default_callback_timeout")]
    #[serde_as(as = "HumantimeDuration")]
    pub(super) callback_timeout: Duration,
    #[serde(default = "default_staging_cache_raw")]
    pub(super) staging_cache: usize,
    #[serde(default)]
    pub(super) debug: bool,
}

impl RawConfig {
    pub(super) fn apply_env_overrides(&mut self) -> std::result::Result<(), ConfigError> {
        if let Some(name) = env_string("APP_NAME")? {
            self.app.name = name;
        }
        if let Some(icon) = env_string("APP_ICON")? {
            self.app.icon = (!icon.trim().is_empty()).then_some(icon);
        }
        if let Some(id) = env_string("CHANNEL_ID")? {
            self.channel.id = id;
        }
        if let Some(importance) = env_string("IMPORTANCE")? {
            self.channel.importance = importance;
        }
        if let Some(duration) = env_string("DURATION")? {
            self.notify.duration = duration;
        }
        if let Some(timeout) = env_duration("CALLBACK_TIMEOUT")? {
            self.notify.callback_timeout = timeout;
        }
        if let Some(cache) = env_parse::<usize>("STAGING_CACHE")? {
            self.notify.staging_cache = cache;
        }
        if let Some(debug) = env_bool("DEBUG")? {
            self.notify.debug = debug;
        }
        Ok(())
    }

    pub(super) fn validate_and_build(self) -> Result<Config> {
        let app_name = self.app.name.trim().to_string();
        if app_name.is_empty() {
            return Err(ConfigError::InvalidField {
                field: "app.name",
                message: "application name cannot be empty".to_string(),
            }
            .into());
        }

        let channel_id = self.channel.id.trim().to_string();
        if channel_id.is_empty() {
            return Err(ConfigError::InvalidField {
                field: "channel.id",
                message: "channel id cannot be empty".to_string(),
            }
            .into());
        }

        let importance = Importance::from_str(&self.channel.importance).map_err(|message| {
            ConfigError::InvalidField {
                field: "channel.importance",
                message,
            }
        })?;
        let duration = NotificationDuration::from_str(&self.notify.duration).map_err(|message| {
            ConfigError::InvalidField {
                field: "notify.duration",
                message,
            }
        })?;

        if self.notify.callback_timeout.is_zero() {
            return Err(ConfigError::InvalidField {
                field: "notify.callback_timeout",
                message: "callback timeout must be greater than zero".to_string(),
            }
            .into());
        }
        let staging_cache =
            NonZeroUsize::new(self.notify.staging_cache).ok_or(ConfigError::InvalidField {
                field: "notify.staging_cache",
                message: "staging cache must hold at least one entry".to_string(),
            })?;

        Ok(Config {
            app: AppConfig {
                app_name,
                small_icon: self.app.icon.filter(|icon| !icon.trim().is_empty()),
            },
            channel: ChannelConfig {
                id: channel_id,
                name: self.channel.name,
                description: self.channel.description,
                importance,
            },
            notify: NotifySettings {
                duration,
                callback_timeout: self.notify.callback_timeout,
                staging_cache,
                debug: self.notify.debug,
            },
        })
    }
}

impl Default for RawApp {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            icon: None,
        }
    }
}

impl Default for RawChannel {
    fn default() -> Self {
        Self {
            id: default_channel_id(),
            name: default_channel_name(),
            description: String::new(),
            importance: default_importance(),
        }
    }
}

impl Default for RawNotify {
    fn default() -> Self {
        Self {
            duration: default_duration(),
            callback_timeout: default_callback_timeout(),
            staging_cache: default_staging_cache_raw(),
            debug: false,
        }
    }
}
