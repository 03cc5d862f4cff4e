use std::num::NonZeroUsize;
use std::time::Duration;

pub(super) fn default_app_name() -> String {
    "Application".to_string()
}

pub(super) fn default_channel_id() -> String {
    "default".to_string()
}

pub(super) fn default_channel_name() -> String {
    "Default".to_string()
}

pub(super) fn default_importance() -> String {
    "default".to_string()
}

pub(super) fn default_duration() -> String {
    "short".to_string()
}

pub(super) const fn default_callback_timeout() -> Duration {
    Duration::from_secs(30)
}

pub(super) const fn default_staging_cache() -> NonZeroUsize {
    match NonZeroUsize::new(64) {
        Some(size) => size,
        None => NonZeroUsize::MIN,
    }
}

pub(super) const fn default_staging_cache_raw() -> usize {
    default_staging_cache().get()
}
