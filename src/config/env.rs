use std::time::Duration;

use humantime::parse_duration;

use crate::error::ConfigError;

pub(super) const ENV_PREFIX: &str = "DESKNOTIFY";

fn prefixed(key: &str) -> String {
    format!("{ENV_PREFIX}_{key}")
}

/// Lit `DESKNOTIFY_<key>`, `Ok(None)` si absente.
pub(super) fn env_string(key: &'static str) -> std::result::Result<Option<String>, ConfigError> {
    match std::env::var(prefixed(key)) {
        Ok(value) => Ok(Some(value)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(ConfigError::Other(format!("{}: {err}", prefixed(key)))),
    }
}

/// Comme [`env_string`], puis parse la valeur ; une valeur vide compte comme absente.
pub(super) fn env_parse<T>(key: &'static str) -> std::result::Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(key)? {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|err| ConfigError::InvalidField {
                field: key,
                message: err.to_string(),
            }),
        _ => Ok(None),
    }
}

pub(super) fn env_bool(key: &'static str) -> std::result::Result<Option<bool>, ConfigError> {
    match env_string(key)? {
        Some(value) if !value.trim().is_empty() => {
            match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(Some(true)),
                "0" | "false" | "no" | "off" => Ok(Some(false)),
                other => Err(ConfigError::InvalidField {
                    field: key,
                    message: format!("expected a boolean, got {other}"),
                }),
            }
        }
        _ => Ok(None),
    }
}

pub(super) fn env_duration(
    key: &'static str,
) -> std::result::Result<Option<Duration>, ConfigError> {
    match env_string(key)? {
        Some(value) if !value.trim().is_empty() => parse_duration(value.trim())
            .map(Some)
            .map_err(|err| ConfigError::InvalidField {
                field: key,
                message: err.to_string(),
            }),
        _ => Ok(None),
    }
}
