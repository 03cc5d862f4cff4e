//! The provider capability interface and the shared platform state machine.
//!
//! Each OS gets a [`NativeBackend`]; [`PlatformProvider`] wraps it with the
//! parts every platform shares: permission gating, resource staging, the
//! correlation map and callback delivery.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::NotifyError;
use crate::notification::{NotificationId, NotificationRequest};
use crate::staging::ResourceStager;
use crate::types::Platform;

mod dispatch;
mod event_loop;
mod native;
mod permission;
mod registry;

pub use self::native::{
    Authorization, EventSink, NativeBackend, NativeEvent, NativePayload, NativeTextInput,
};

use self::event_loop::{Drive, EventLoop};
use self::permission::PermissionState;
use self::registry::Registry;

pub type PermissionCallback = Box<dyn FnOnce() + Send>;

/// Capability interface shared by every platform provider.
///
/// All methods return immediately. Outcomes of a send are reported through
/// the request's callbacks, never as return values.
pub trait NotificationProvider: Send + Sync {
    fn platform(&self) -> Platform;

    /// Submits `request`. Failures are reported through `on_failed`.
    fn send_notification(&self, request: Arc<NotificationRequest>);

    /// Best-effort removal. A no-op when the notification is not live.
    fn hide_notification(&self, request: &NotificationRequest);

    fn has_permission(&self) -> bool;

    /// Calls `on_granted` right away when permission is already held,
    /// otherwise asks the OS and calls exactly one callback once it answers.
    fn request_permission(&self, on_granted: PermissionCallback, on_denied: PermissionCallback);

    fn permission_state(&self) -> watch::Receiver<bool>;

    /// Overrides the observed permission, bypassing the OS.
    fn update_permission_state(&self, granted: bool);

    /// Re-reads the OS authorization status.
    fn refresh_permission(&self);
}

/// A [`NotificationProvider`] driving one native backend.
pub struct PlatformProvider<B: NativeBackend> {
    inner: Arc<Inner<B>>,
}

struct Inner<B: NativeBackend> {
    backend: B,
    registry: Registry<B::Handle>,
    permission: PermissionState,
    stager: Arc<ResourceStager>,
    config: Arc<RwLock<Config>>,
    events: EventLoop,
}

impl<B: NativeBackend> PlatformProvider<B> {
    /// Creates a provider with its own resource stager.
    pub fn new(backend: B, config: Config) -> Self {
        let stager = Arc::new(ResourceStager::new(config.notify.staging_cache));
        Self::with_shared(backend, Arc::new(RwLock::new(config)), stager)
    }

    pub(crate) fn with_shared(
        backend: B,
        config: Arc<RwLock<Config>>,
        stager: Arc<ResourceStager>,
    ) -> Self {
        let permission = PermissionState::new(backend.authorization().allows());
        Self {
            inner: Arc::new(Inner {
                backend,
                registry: Registry::new(),
                permission,
                stager,
                config,
                events: EventLoop::new(),
            }),
        }
    }

    pub fn backend(&self) -> &B {
        &self.inner.backend
    }

    pub fn stager(&self) -> &ResourceStager {
        &self.inner.stager
    }

    /// Number of notifications still waiting for a terminal event.
    pub fn outstanding(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn is_outstanding(&self, id: NotificationId) -> bool {
        self.inner.registry.contains(id)
    }
}

impl<B: NativeBackend> Inner<B> {
    fn submit(self: &Arc<Self>, request: &Arc<NotificationRequest>, config: &Config) {
        let id = request.id();
        let payload = NativePayload::assemble(request, config, &self.stager);

        let (reservation, replaced) = self.registry.reserve(Arc::clone(request));
        if let Some(replaced) = replaced {
            debug!(%id, "sent again while live, replacing the shown notification");
            if let Some(handle) = replaced.handle {
                self.backend.hide(&handle);
                self.backend.release(handle);
            }
        }
        if self.backend.reports_events() {
            // Native callbacks may fire before `show` returns.
            event_loop::ensure_running(self);
        }
        let handle = match self.backend.show(id, &payload, self.events.sink()) {
            Ok(handle) => handle,
            Err(err) => {
                error!(%id, error = %err, "native show failed");
                if let Some(entry) = self.registry.take_reserved(id, reservation) {
                    guarded(id, || entry.request.fail());
                }
                return;
            }
        };
        debug!(%id, platform = %self.backend.platform(), "notification submitted");

        if !self.backend.reports_events() {
            self.registry.take_reserved(id, reservation);
            self.backend.release(handle);
            return;
        }

        if let Err(handle) = self.registry.attach(id, reservation, handle) {
            // Hidden, resolved or superseded while the show call was in flight.
            self.backend.hide(&handle);
            self.backend.release(handle);
        }
    }
}

impl<B: NativeBackend> Drive for Inner<B> {
    fn event_loop(&self) -> &EventLoop {
        &self.events
    }

    fn deliver(&self, id: NotificationId, event: NativeEvent) {
        let Some(entry) = self.registry.take(id) else {
            debug!(%id, ?event, "event for released notification ignored");
            return;
        };
        if let Some(handle) = entry.handle {
            self.backend.release(handle);
        }
        guarded(id, || resolve(&entry.request, event));
    }

    fn tick(&self) {
        self.backend.pump_events();

        let timeout = self.config.read().notify.callback_timeout;
        for entry in self.registry.expire(Instant::now(), timeout) {
            warn!(
                id = %entry.request.id(),
                timeout = %humantime::format_duration(timeout),
                "no native callback before timeout, releasing"
            );
            if let Some(handle) = entry.handle {
                self.backend.release(handle);
            }
        }
    }

    fn is_idle(&self) -> bool {
        self.registry.is_empty()
    }
}

/// Runs the one callback matching `event`.
fn resolve(request: &NotificationRequest, event: NativeEvent) {
    let id = request.id();
    match event {
        NativeEvent::Activated => {
            debug!(%id, "notification activated");
            request.activate();
        }
        NativeEvent::ButtonClicked(index) => match request.buttons().get(index) {
            Some(button) => {
                debug!(%id, index, label = button.label(), "button clicked");
                button.click();
            }
            None => warn!(%id, index, "click on unknown button"),
        },
        NativeEvent::TextSubmitted { action_id, text } => {
            match request.text_inputs().iter().find(|input| input.id() == action_id) {
                Some(input) => {
                    debug!(%id, action_id = %action_id, "text submitted");
                    input.submit(&text);
                }
                None => warn!(%id, action_id = %action_id, "text submitted for unknown input"),
            }
        }
        NativeEvent::Dismissed(reason) => {
            debug!(%id, %reason, "notification dismissed");
            request.dismiss(reason);
        }
        NativeEvent::Failed => {
            warn!(%id, "native delivery failed");
            request.fail();
        }
    }
}

/// Keeps a panicking user callback from taking the delivery thread down.
fn guarded(id: NotificationId, callback: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(callback)).is_err() {
        error!(%id, "notification callback panicked");
    }
}

impl<B: NativeBackend> NotificationProvider for PlatformProvider<B> {
    fn platform(&self) -> Platform {
        self.inner.backend.platform()
    }

    fn send_notification(&self, request: Arc<NotificationRequest>) {
        let id = request.id();
        let config = self.inner.config.read().clone();
        match self.inner.backend.initialize(&config.app) {
            Ok(true) => self.refresh_permission(),
            Ok(false) => {}
            Err(err) => {
                error!(%id, error = %err, "notification service unavailable");
                request.fail();
                return;
            }
        }

        if !self.inner.permission.get() {
            warn!(%id, error = %NotifyError::PermissionDenied, "not sending");
            request.fail();
            return;
        }

        let inner = Arc::clone(&self.inner);
        let job_request = Arc::clone(&request);
        if let Err(err) = dispatch::spawn(id, move || inner.submit(&job_request, &config)) {
            error!(%id, error = %err, "failed to dispatch notification");
            request.fail();
        }
    }

    fn hide_notification(&self, request: &NotificationRequest) {
        let id = request.id();
        let Some(entry) = self.inner.registry.take(id) else {
            debug!(%id, "hide ignored, notification is not live");
            return;
        };
        if let Some(handle) = entry.handle {
            self.inner.backend.hide(&handle);
            self.inner.backend.release(handle);
        }
        debug!(%id, "notification hidden");
    }

    fn has_permission(&self) -> bool {
        self.inner.permission.get()
    }

    fn request_permission(&self, on_granted: PermissionCallback, on_denied: PermissionCallback) {
        if self.inner.permission.get() {
            on_granted();
            return;
        }

        info!(platform = %self.platform(), "requesting notification permission");
        let inner = Arc::clone(&self.inner);
        self.inner
            .backend
            .request_authorization(Box::new(move |granted| {
                inner.permission.set(granted);
                if granted {
                    on_granted();
                } else {
                    on_denied();
                }
            }));
    }

    fn permission_state(&self) -> watch::Receiver<bool> {
        self.inner.permission.subscribe()
    }

    fn update_permission_state(&self, granted: bool) {
        self.inner.permission.set(granted);
    }

    fn refresh_permission(&self) {
        let authorization = self.inner.backend.authorization();
        debug!(?authorization, "permission refreshed");
        self.inner.permission.set(authorization.allows());
    }
}

impl<B: NativeBackend> std::fmt::Debug for PlatformProvider<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformProvider")
            .field("platform", &self.inner.backend.platform())
            .field("outstanding", &self.inner.registry.len())
            .field("event_loop_running", &self.inner.events.is_running())
            .finish_non_exhaustive()
    }
}
