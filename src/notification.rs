//! Notification requests and the handle returned to callers.
//!
//! A [`NotificationRequest`] is assembled through [`NotificationBuilder`] and is
//! never mutated once built. Every request receives a process-unique
//! [`NotificationId`] which backends use as their correlation token.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::provider::NotificationProvider;
use crate::types::DismissalReason;

pub type Action = Arc<dyn Fn() + Send + Sync>;
pub type DismissHandler = Arc<dyn Fn(DismissalReason) + Send + Sync>;
pub type TextHandler = Arc<dyn Fn(&str) + Send + Sync>;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NotificationId(u64);

impl NotificationId {
    fn allocate() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone)]
pub struct Button {
    label: String,
    on_click: Action,
}

impl Button {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn click(&self) {
        (self.on_click)();
    }
}

#[derive(Clone)]
pub struct TextInputAction {
    id: String,
    label: String,
    placeholder: String,
    on_text_submitted: TextHandler,
}

impl TextInputAction {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    pub(crate) fn submit(&self, text: &str) {
        (self.on_text_submitted)(text);
    }
}

/// One notification to display, with its actions and lifecycle callbacks.
pub struct NotificationRequest {
    id: NotificationId,
    title: String,
    message: String,
    large_image: Option<String>,
    small_icon: Option<String>,
    sound: Option<String>,
    buttons: Vec<Button>,
    text_inputs: Vec<TextInputAction>,
    on_activated: Option<Action>,
    on_dismissed: Option<DismissHandler>,
    on_failed: Option<Action>,
}

impl NotificationRequest {
    pub fn builder(title: impl Into<String>, message: impl Into<String>) -> NotificationBuilder {
        NotificationBuilder::new(title, message)
    }

    pub const fn id(&self) -> NotificationId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn large_image(&self) -> Option<&str> {
        self.large_image.as_deref()
    }

    pub fn small_icon(&self) -> Option<&str> {
        self.small_icon.as_deref()
    }

    pub fn sound(&self) -> Option<&str> {
        self.sound.as_deref()
    }

    pub fn buttons(&self) -> &[Button] {
        &self.buttons
    }

    pub fn text_inputs(&self) -> &[TextInputAction] {
        &self.text_inputs
    }

    pub(crate) fn activate(&self) {
        if let Some(on_activated) = &self.on_activated {
            on_activated();
        }
    }

    pub(crate) fn dismiss(&self, reason: DismissalReason) {
        if let Some(on_dismissed) = &self.on_dismissed {
            on_dismissed(reason);
        }
    }

    pub(crate) fn fail(&self) {
        if let Some(on_failed) = &self.on_failed {
            on_failed();
        }
    }
}

impl fmt::Debug for NotificationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationRequest")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("message", &self.message)
            .field("large_image", &self.large_image)
            .field("small_icon", &self.small_icon)
            .field("sound", &self.sound)
            .field(
                "buttons",
                &self.buttons.iter().map(Button::label).collect::<Vec<_>>(),
            )
            .field(
                "text_inputs",
                &self
                    .text_inputs
                    .iter()
                    .map(TextInputAction::id)
                    .collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

/// Collects the parts of a notification. Nothing is validated here; backends
/// report unusable content through `on_failed`.
pub struct NotificationBuilder {
    title: String,
    message: String,
    large_image: Option<String>,
    small_icon: Option<String>,
    sound: Option<String>,
    buttons: Vec<Button>,
    text_inputs: Vec<TextInputAction>,
    on_activated: Option<Action>,
    on_dismissed: Option<DismissHandler>,
    on_failed: Option<Action>,
}

impl NotificationBuilder {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            large_image: None,
            small_icon: None,
            sound: None,
            buttons: Vec::new(),
            text_inputs: Vec::new(),
            on_activated: None,
            on_dismissed: None,
            on_failed: None,
        }
    }

    pub fn large_image(&mut self, locator: impl Into<String>) -> &mut Self {
        self.large_image = Some(locator.into());
        self
    }

    pub fn small_icon(&mut self, locator: impl Into<String>) -> &mut Self {
        self.small_icon = Some(locator.into());
        self
    }

    pub fn sound(&mut self, locator: impl Into<String>) -> &mut Self {
        self.sound = Some(locator.into());
        self
    }

    /// Adds a button; buttons are displayed in insertion order.
    pub fn button<F>(&mut self, label: impl Into<String>, on_click: F) -> &mut Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.buttons.push(Button {
            label: label.into(),
            on_click: Arc::new(on_click),
        });
        self
    }

    pub fn text_input<F>(
        &mut self,
        id: impl Into<String>,
        label: impl Into<String>,
        placeholder: impl Into<String>,
        on_text_submitted: F,
    ) -> &mut Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.text_inputs.push(TextInputAction {
            id: id.into(),
            label: label.into(),
            placeholder: placeholder.into(),
            on_text_submitted: Arc::new(on_text_submitted),
        });
        self
    }

    pub fn on_activated<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_activated = Some(Arc::new(callback));
        self
    }

    pub fn on_dismissed<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(DismissalReason) + Send + Sync + 'static,
    {
        self.on_dismissed = Some(Arc::new(callback));
        self
    }

    pub fn on_failed<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_failed = Some(Arc::new(callback));
        self
    }

    /// Finalizes the request and allocates its id.
    pub fn build(self) -> NotificationRequest {
        NotificationRequest {
            id: NotificationId::allocate(),
            title: self.title,
            message: self.message,
            large_image: self.large_image,
            small_icon: self.small_icon,
            sound: self.sound,
            buttons: self.buttons,
            text_inputs: self.text_inputs,
            on_activated: self.on_activated,
            on_dismissed: self.on_dismissed,
            on_failed: self.on_failed,
        }
    }
}

/// A built notification bound to the provider that will display it.
#[derive(Clone)]
pub struct Notification {
    request: Arc<NotificationRequest>,
    provider: Arc<dyn NotificationProvider>,
}

impl Notification {
    pub fn new(request: NotificationRequest, provider: Arc<dyn NotificationProvider>) -> Self {
        Self {
            request: Arc::new(request),
            provider,
        }
    }

    pub fn id(&self) -> NotificationId {
        self.request.id()
    }

    pub fn request(&self) -> &NotificationRequest {
        &self.request
    }

    /// Hands the notification to the platform. Returns immediately; the
    /// outcome arrives through the request callbacks.
    pub fn send(&self) {
        self.provider.send_notification(Arc::clone(&self.request));
    }

    /// Removes the notification if it is still on screen. No-op otherwise.
    pub fn hide(&self) {
        self.provider.hide_notification(&self.request);
    }
}

impl fmt::Debug for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notification")
            .field("request", &self.request)
            .field("platform", &self.provider.platform())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::NotificationRequest;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn ids_are_unique_and_increasing() {
        let first = NotificationRequest::builder("a", "b").build();
        let second = NotificationRequest::builder("a", "b").build();
        assert!(second.id() > first.id());
    }

    #[test]
    fn builder_defaults_are_empty() {
        let request = NotificationRequest::builder("", "").build();
        assert!(request.title().is_empty());
        assert!(request.large_image().is_none());
        assert!(request.buttons().is_empty());
        assert!(request.text_inputs().is_empty());
        // Missing callbacks are silently skipped.
        request.activate();
        request.fail();
    }

    #[test]
    fn buttons_keep_insertion_order_and_own_callbacks() {
        let hits = Arc::new(AtomicUsize::new(0));
        let first = Arc::clone(&hits);
        let second = Arc::clone(&hits);

        let mut builder = NotificationRequest::builder("T", "M");
        builder
            .button("One", move || {
                first.fetch_add(1, Ordering::SeqCst);
            })
            .button("Ten", move || {
                second.fetch_add(10, Ordering::SeqCst);
            });
        let request = builder.build();

        let labels: Vec<_> = request.buttons().iter().map(|b| b.label()).collect();
        assert_eq!(labels, ["One", "Ten"]);
        request.buttons()[1].click();
        assert_eq!(hits.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn text_input_receives_submitted_text() {
        let seen = Arc::new(parking_lot::Mutex::new(String::new()));
        let sink = Arc::clone(&seen);
        let mut builder = NotificationRequest::builder("T", "M");
        builder.text_input("reply", "Reply", "Type here", move |text| {
            sink.lock().push_str(text);
        });
        let request = builder.build();

        let input = &request.text_inputs()[0];
        assert_eq!(input.id(), "reply");
        assert_eq!(input.placeholder(), "Type here");
        input.submit("hello");
        assert_eq!(seen.lock().as_str(), "hello");
    }
}
