#![deny(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used)]
//! Declarative desktop notifications delegated to the platform's own
//! notification service.
//!
//! Build a [`Notification`] through a [`Notifier`], call
//! [`Notification::send`], and receive the outcome through the callbacks set
//! on the builder. Every send is fire-and-forget; recoverable failures arrive
//! through `on_failed`.

pub mod backend;
pub mod config;
pub mod error;
pub mod notification;
pub mod notifier;
pub mod provider;
pub mod staging;
pub mod telemetry;
pub mod types;

pub use config::Config;
pub use error::Error;
pub use notification::{Notification, NotificationBuilder, NotificationId, NotificationRequest};
pub use notifier::{GlobalGuard, Notifier, configure, global};
pub use provider::{NativeBackend, NotificationProvider, PlatformProvider};
pub use types::{DismissalReason, Importance, NotificationDuration, Platform};

pub type Result<T> = std::result::Result<T, error::Error>;
