//! The seam between the provider state machine and an OS notification service.

use std::path::PathBuf;
use std::sync::mpsc::Sender;

use tracing::{trace, warn};

use crate::config::{AppConfig, Config};
use crate::error::NotifyError;
use crate::notification::{NotificationId, NotificationRequest};
use crate::staging::ResourceStager;
use crate::types::{DismissalReason, Importance, NotificationDuration, Platform};

/// What the OS reports about notification authorization.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Authorization {
    Granted,
    Denied,
    NotDetermined,
    /// The platform has no permission concept; notifications are always allowed.
    Unsupported,
}

impl Authorization {
    pub const fn allows(self) -> bool {
        matches!(self, Self::Granted | Self::Unsupported)
    }
}

/// A native callback, already decoded from the platform representation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NativeEvent {
    Activated,
    ButtonClicked(usize),
    TextSubmitted { action_id: String, text: String },
    Dismissed(DismissalReason),
    Failed,
}

/// Token-addressed channel handed to native callbacks.
///
/// Native code never holds user closures; it only knows the notification id
/// and pushes events here. The provider's event loop looks the id up.
#[derive(Clone, Debug)]
pub struct EventSink {
    tx: Sender<(NotificationId, NativeEvent)>,
}

impl EventSink {
    pub(crate) const fn new(tx: Sender<(NotificationId, NativeEvent)>) -> Self {
        Self { tx }
    }

    pub fn emit(&self, token: NotificationId, event: NativeEvent) {
        trace!(id = %token, ?event, "native event");
        // The receiver lives as long as the provider.
        let _ = self.tx.send((token, event));
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NativeTextInput {
    pub id: String,
    pub label: String,
    pub placeholder: String,
}

/// Everything a backend needs to render one notification, with resource
/// locators already staged to plain files.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NativePayload {
    pub app_name: String,
    pub channel_id: String,
    pub importance: Importance,
    pub duration: NotificationDuration,
    pub title: String,
    pub message: String,
    pub large_image: Option<PathBuf>,
    pub small_icon: Option<PathBuf>,
    pub sound: Option<PathBuf>,
    pub buttons: Vec<String>,
    pub text_inputs: Vec<NativeTextInput>,
}

impl NativePayload {
    /// Builds the payload for `request`. Assets that cannot be staged are
    /// dropped with a warning; the notification is still shown without them.
    pub(crate) fn assemble(
        request: &NotificationRequest,
        config: &Config,
        stager: &ResourceStager,
    ) -> Self {
        let stage = |kind: &'static str, locator: Option<&str>| -> Option<PathBuf> {
            let locator = locator?;
            match stager.stage(locator) {
                Ok(staged) => Some(staged.into_path()),
                Err(err) => {
                    warn!(
                        id = %request.id(),
                        asset = kind,
                        locator,
                        error = %err,
                        "asset unavailable, sending without it"
                    );
                    None
                }
            }
        };

        Self {
            app_name: config.app.app_name.clone(),
            channel_id: config.channel.id.clone(),
            importance: config.channel.importance,
            duration: config.notify.duration,
            title: request.title().to_string(),
            message: request.message().to_string(),
            large_image: stage("large_image", request.large_image()),
            small_icon: stage(
                "small_icon",
                request.small_icon().or(config.app.small_icon.as_deref()),
            ),
            sound: stage("sound", request.sound()),
            buttons: request
                .buttons()
                .iter()
                .map(|button| button.label().to_string())
                .collect(),
            text_inputs: request
                .text_inputs()
                .iter()
                .map(|input| NativeTextInput {
                    id: input.id().to_string(),
                    label: input.label().to_string(),
                    placeholder: input.placeholder().to_string(),
                })
                .collect(),
        }
    }
}

/// The native half of a platform provider.
///
/// Implementations talk to exactly one OS notification service. They report
/// user interaction by pushing [`NativeEvent`]s into the [`EventSink`] given to
/// [`NativeBackend::show`], tagged with the token they were handed.
pub trait NativeBackend: Send + Sync + 'static {
    /// Native resources kept alive while a notification is on screen.
    type Handle: Send + 'static;

    fn platform(&self) -> Platform;

    /// Prepares the notification service. Called before every send, so
    /// implementations cache whatever is expensive, failures included.
    ///
    /// Returns `true` when the identity the OS knows the application by has
    /// just changed; the provider then re-reads [`NativeBackend::authorization`].
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Initialization`] when the service is unreachable.
    fn initialize(&self, app: &AppConfig) -> Result<bool, NotifyError>;

    /// Displays the notification.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Show`] or [`NotifyError::InvalidPayload`] when the
    /// service refused it. Nothing must stay registered in that case.
    fn show(
        &self,
        token: NotificationId,
        payload: &NativePayload,
        events: &EventSink,
    ) -> Result<Self::Handle, NotifyError>;

    /// Best-effort removal from screen.
    fn hide(&self, handle: &Self::Handle);

    /// Unregisters native callbacks and frees the handle.
    fn release(&self, handle: Self::Handle);

    fn authorization(&self) -> Authorization;

    /// Asks the OS for permission. `reply` runs once, on any thread.
    fn request_authorization(&self, reply: Box<dyn FnOnce(bool) + Send>);

    /// Whether this backend ever emits events. When it doesn't, entries are
    /// released right after submission.
    fn reports_events(&self) -> bool {
        true
    }

    /// Drains the platform message queue of the event-loop thread, for
    /// services that deliver callbacks as window messages.
    fn pump_events(&self) {}
}
