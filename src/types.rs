use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Why a notification left the screen without being activated.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DismissalReason {
    UserCanceled,
    ApplicationHidden,
    TimedOut,
    Unknown,
}

impl DismissalReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserCanceled => "user_canceled",
            Self::ApplicationHidden => "application_hidden",
            Self::TimedOut => "timed_out",
            Self::Unknown => "unknown",
        }
    }
}

impl Display for DismissalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DismissalReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "user_canceled" | "usercanceled" | "user_cancelled" => Ok(Self::UserCanceled),
            "application_hidden" | "applicationhidden" => Ok(Self::ApplicationHidden),
            "timed_out" | "timedout" | "timeout" => Ok(Self::TimedOut),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown dismissal reason: {other}")),
        }
    }
}

/// Operating environment a provider targets.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Platform {
    Linux,
    Windows,
    MacOs,
    Android,
    Ios,
    Web,
    Unknown,
}

impl Platform {
    /// Platform of the running binary, resolved at compile time.
    pub const fn current() -> Self {
        if cfg!(target_os = "android") {
            Self::Android
        } else if cfg!(any(
            target_os = "linux",
            target_os = "freebsd",
            target_os = "openbsd",
            target_os = "netbsd",
            target_os = "dragonfly"
        )) {
            Self::Linux
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(target_os = "ios") {
            Self::Ios
        } else if cfg!(target_family = "wasm") {
            Self::Web
        } else {
            Self::Unknown
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Windows => "windows",
            Self::MacOs => "macos",
            Self::Android => "android",
            Self::Ios => "ios",
            Self::Web => "web",
            Self::Unknown => "unknown",
        }
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationDuration {
    #[default]
    Short,
    Long,
}

impl FromStr for NotificationDuration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "short" => Ok(Self::Short),
            "long" => Ok(Self::Long),
            other => Err(format!("unknown notification duration: {other}")),
        }
    }
}

/// Importance of the default notification channel.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Min,
    Low,
    #[default]
    Default,
    High,
}

impl Display for Importance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Min => "min",
            Self::Low => "low",
            Self::Default => "default",
            Self::High => "high",
        })
    }
}

impl FromStr for Importance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "min" | "none" => Ok(Self::Min),
            "low" => Ok(Self::Low),
            "default" | "normal" => Ok(Self::Default),
            "high" | "urgent" => Ok(Self::High),
            other => Err(format!("unknown importance: {other}")),
        }
    }
}
