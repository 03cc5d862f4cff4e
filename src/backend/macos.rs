//! macOS notification centre through `mac-notification-sys`.
//!
//! The library only offers a blocking send that returns the user's response,
//! so every shown notification gets a waiter thread that reports the response
//! as a native event.

use std::sync::OnceLock;
use std::thread;

use mac_notification_sys::{MainButton, Notification, NotificationResponse};
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::error::NotifyError;
use crate::notification::NotificationId;
use crate::provider::{Authorization, EventSink, NativeBackend, NativeEvent, NativePayload};
use crate::types::{DismissalReason, Platform};

/// Title of the dropdown holding several buttons.
const ACTIONS_TITLE: &str = "Options";
const CLOSE_LABEL: &str = "Close";

#[derive(Debug, Default)]
pub struct MacOsBackend {
    /// Bundle identifier the notification centre attributes notifications to.
    bundle: OnceLock<String>,
}

/// The notification centre keeps no handle we could act on; the waiter
/// thread ends with the user's response.
#[derive(Debug)]
pub struct MacOsHandle {
    token: NotificationId,
}

impl MacOsBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NativeBackend for MacOsBackend {
    type Handle = MacOsHandle;

    fn platform(&self) -> Platform {
        Platform::MacOs
    }

    fn initialize(&self, app: &AppConfig) -> Result<bool, NotifyError> {
        if self.bundle.get().is_some() {
            return Ok(false);
        }
        let bundle = mac_notification_sys::get_bundle_identifier_or_default(&app.app_name);
        if let Err(err) = mac_notification_sys::set_application(&bundle) {
            // Already set by an earlier call in this process.
            debug!(bundle = %bundle, error = %err, "application identity unchanged");
        }
        debug!(bundle = %bundle, "using the notification centre");
        Ok(self.bundle.set(bundle).is_ok())
    }

    fn show(
        &self,
        token: NotificationId,
        payload: &NativePayload,
        events: &EventSink,
    ) -> Result<MacOsHandle, NotifyError> {
        let payload = payload.clone();
        let events = events.clone();
        thread::Builder::new()
            .name(format!("desknotify-macos-{token}"))
            .spawn(move || {
                let event = match deliver(token, &payload) {
                    Ok(response) => map_response(&payload, response),
                    Err(err) => {
                        warn!(id = %token, error = %err, "notification centre refused the notification");
                        Some(NativeEvent::Failed)
                    }
                };
                if let Some(event) = event {
                    events.emit(token, event);
                }
            })
            .map_err(|err| NotifyError::Show(format!("could not start waiter: {err}")))?;
        Ok(MacOsHandle { token })
    }

    fn hide(&self, handle: &MacOsHandle) {
        // The notification centre offers no removal for delivered notifications.
        debug!(id = %handle.token, "hide is best-effort on macOS");
    }

    fn release(&self, handle: MacOsHandle) {
        debug!(id = %handle.token, "released");
    }

    fn authorization(&self) -> Authorization {
        Authorization::Unsupported
    }

    fn request_authorization(&self, reply: Box<dyn FnOnce(bool) + Send>) {
        reply(true);
    }
}

/// Shows the notification and blocks until the user responds.
fn deliver(
    token: NotificationId,
    payload: &NativePayload,
) -> Result<NotificationResponse, mac_notification_sys::error::Error> {
    let labels: Vec<&str> = payload.buttons.iter().map(String::as_str).collect();
    let reply = payload.text_inputs.first();
    let main_button = match (labels.as_slice(), reply) {
        ([], None) => None,
        ([], Some(input)) => Some(MainButton::Response(input.placeholder.as_str())),
        ([single], _) => Some(MainButton::SingleAction(*single)),
        (many, _) => Some(MainButton::DropdownActions(ACTIONS_TITLE, many)),
    };
    if payload.text_inputs.len() > usize::from(labels.is_empty()) {
        warn!(
            id = %token,
            inputs = payload.text_inputs.len(),
            "only one action fits a macOS notification, dropping text inputs"
        );
    }
    let icon = payload.small_icon.as_ref().map(|path| path.to_string_lossy());
    let image = payload.large_image.as_ref().map(|path| path.to_string_lossy());
    let sound = payload.sound.as_ref().map(|path| path.to_string_lossy());

    let mut notification = Notification::new();
    notification
        .title(&payload.title)
        .message(&payload.message)
        .asynchronous(false)
        .wait_for_click(true);
    if let Some(button) = main_button {
        notification.main_button(button).close_button(CLOSE_LABEL);
    }
    if let Some(icon) = icon.as_deref() {
        notification.app_icon(icon);
    }
    if let Some(image) = image.as_deref() {
        notification.content_image(image);
    }
    if let Some(sound) = sound.as_deref() {
        notification.sound(sound);
    }
    notification.send()
}

fn map_response(payload: &NativePayload, response: NotificationResponse) -> Option<NativeEvent> {
    match response {
        NotificationResponse::Click => Some(NativeEvent::Activated),
        NotificationResponse::ActionButton(label) => payload
            .buttons
            .iter()
            .position(|button| *button == label)
            // The dropdown title itself stands for the first button.
            .or_else(|| (!payload.buttons.is_empty()).then_some(0))
            .map(NativeEvent::ButtonClicked),
        NotificationResponse::Reply(text) => {
            payload
                .text_inputs
                .first()
                .map(|input| NativeEvent::TextSubmitted {
                    action_id: input.id.clone(),
                    text,
                })
        }
        NotificationResponse::CloseButton(_) => {
            Some(NativeEvent::Dismissed(DismissalReason::UserCanceled))
        }
        NotificationResponse::None => Some(NativeEvent::Dismissed(DismissalReason::TimedOut)),
    }
}
