//! Freedesktop notifications over D-Bus.
//!
//! `notify-rust` shows the notification. One signal listener per backend
//! receives `ActionInvoked` and `NotificationClosed` for every live
//! notification and routes them to tokens by server id. The listener starts
//! with the first live notification and stops once none is left.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use notify_rust::{CloseReason, Hint, Notification, NotificationHandle, Timeout, Urgency};
use parking_lot::Mutex;
use tracing::{debug, warn};
use zbus::blocking::{Connection, MessageIterator};
use zbus::message::Type as MessageType;
use zbus::{MatchRule, Message};

use crate::config::AppConfig;
use crate::error::NotifyError;
use crate::notification::NotificationId;
use crate::provider::{Authorization, EventSink, NativeBackend, NativeEvent, NativePayload};
use crate::types::{DismissalReason, Importance, NotificationDuration, Platform};

const DEFAULT_ACTION: &str = "default";
const BUTTON_PREFIX: &str = "button:";
const LONG_TIMEOUT_MS: u32 = 25_000;
const NOTIFICATIONS_INTERFACE: &str = "org.freedesktop.Notifications";
const NOTIFICATIONS_PATH: &str = "/org/freedesktop/Notifications";
/// How long a failed daemon connection is remembered before retrying.
const RETRY_BACKOFF: Duration = Duration::from_secs(5);

#[zbus::proxy(
    interface = "org.freedesktop.Notifications",
    default_service = "org.freedesktop.Notifications",
    default_path = "/org/freedesktop/Notifications",
    gen_async = false,
    blocking_name = "NotificationsProxyBlocking"
)]
trait Notifications {
    fn close_notification(&self, id: u32) -> zbus::Result<()>;
}

/// Talks to the session notification daemon.
#[derive(Default)]
pub struct LinuxBackend {
    session: Attempt<Session>,
    routes: Arc<Mutex<Routes>>,
}

/// A shown notification. The `notify-rust` handle keeps its connection open,
/// which some daemons require for actions to keep working.
pub struct LinuxHandle {
    server_id: u32,
    _native: NotificationHandle,
}

impl std::fmt::Debug for LinuxHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinuxHandle")
            .field("server_id", &self.server_id)
            .finish_non_exhaustive()
    }
}

struct Session {
    bus: Connection,
    daemon: NotificationsProxyBlocking<'static>,
    capabilities: Vec<String>,
}

impl Session {
    fn connect() -> Result<Self, String> {
        let capabilities = notify_rust::get_capabilities().map_err(|err| err.to_string())?;
        let bus = Connection::session().map_err(|err| err.to_string())?;
        let daemon = NotificationsProxyBlocking::new(&bus).map_err(|err| err.to_string())?;
        Ok(Self {
            bus,
            daemon,
            capabilities,
        })
    }

    fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|cap| cap == capability)
    }

    fn close(&self, server_id: u32) {
        if let Err(err) = self.daemon.close_notification(server_id) {
            debug!(server_id, error = %err, "notification already closed");
        }
    }
}

impl LinuxBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn session(&self) -> Result<Arc<Session>, NotifyError> {
        self.session
            .current()
            .ok_or_else(|| NotifyError::Initialization("notification daemon not connected".into()))
    }

    /// Stops routing `server_id` and asks the daemon to close it. The close
    /// signal also wakes an otherwise idle listener so it can stop.
    fn withdraw(&self, server_id: u32) {
        if !self.routes.lock().withdraw(server_id) {
            return;
        }
        if let Some(session) = self.session.current() {
            session.close(server_id);
        }
    }
}

impl NativeBackend for LinuxBackend {
    type Handle = LinuxHandle;

    fn platform(&self) -> Platform {
        Platform::Linux
    }

    fn initialize(&self, app: &AppConfig) -> Result<bool, NotifyError> {
        self.session
            .get_or_connect(Instant::now(), || {
                let session = Session::connect()?;
                debug!(
                    app = %app.app_name,
                    capabilities = ?session.capabilities,
                    "notification daemon reachable"
                );
                Ok(session)
            })
            .map(|_| false)
            .map_err(NotifyError::Initialization)
    }

    fn show(
        &self,
        token: NotificationId,
        payload: &NativePayload,
        events: &EventSink,
    ) -> Result<LinuxHandle, NotifyError> {
        let session = self.session()?;

        let mut builder = Notification::new();
        builder
            .appname(&payload.app_name)
            .summary(&payload.title)
            .body(&payload.message)
            .urgency(map_urgency(payload.importance))
            .timeout(map_timeout(payload.duration));

        if let Some(icon) = &payload.small_icon {
            builder.icon(&icon.to_string_lossy());
        }
        if let Some(image) = &payload.large_image {
            builder.hint(Hint::ImagePath(image.to_string_lossy().into_owned()));
        }
        if let Some(sound) = &payload.sound {
            builder.hint(Hint::SoundFile(sound.to_string_lossy().into_owned()));
        }

        builder.action(DEFAULT_ACTION, &payload.title);
        if !payload.buttons.is_empty() && !session.supports("actions") {
            warn!(id = %token, "notification daemon does not advertise action support");
        }
        for (index, label) in payload.buttons.iter().enumerate() {
            builder.action(&format!("{BUTTON_PREFIX}{index}"), label);
        }
        if !payload.text_inputs.is_empty() {
            warn!(
                id = %token,
                inputs = payload.text_inputs.len(),
                "text inputs are not supported by freedesktop notifications, dropping them"
            );
        }

        // Held across the show call so the listener cannot see a signal for
        // this notification before its route exists.
        let mut routes = self.routes.lock();
        if !routes.listening {
            let signals = subscribe(&session.bus)?;
            let shared = Arc::clone(&self.routes);
            thread::Builder::new()
                .name("desknotify-dbus".to_string())
                .spawn(move || listen(&shared, signals))
                .map_err(|err| NotifyError::Show(format!("could not start signal listener: {err}")))?;
            routes.listening = true;
            debug!("notification signal listener started");
        }

        let native = builder
            .show()
            .map_err(|err| NotifyError::Show(err.to_string()))?;
        let server_id = native.id();
        routes.route(server_id, token, events.clone());
        drop(routes);

        debug!(id = %token, server_id, "notification shown");
        Ok(LinuxHandle {
            server_id,
            _native: native,
        })
    }

    fn hide(&self, handle: &LinuxHandle) {
        self.withdraw(handle.server_id);
    }

    fn release(&self, handle: LinuxHandle) {
        // Still routed only when no terminal signal arrived, i.e. on expiry.
        self.withdraw(handle.server_id);
        debug!(server_id = handle.server_id, "released");
    }

    fn authorization(&self) -> Authorization {
        Authorization::Unsupported
    }

    fn request_authorization(&self, reply: Box<dyn FnOnce(bool) + Send>) {
        reply(true);
    }
}

fn subscribe(bus: &Connection) -> Result<MessageIterator, NotifyError> {
    let rule = MatchRule::builder()
        .msg_type(MessageType::Signal)
        .interface(NOTIFICATIONS_INTERFACE)
        .and_then(|rule| rule.path(NOTIFICATIONS_PATH))
        .map_err(|err| NotifyError::Show(err.to_string()))?
        .build();
    MessageIterator::for_match_rule(rule, bus, None)
        .map_err(|err| NotifyError::Show(format!("could not subscribe to daemon signals: {err}")))
}

fn listen(routes: &Mutex<Routes>, signals: MessageIterator) {
    for message in signals {
        let message = match message {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, "notification signal stream failed");
                break;
            }
        };
        let Some(signal) = Signal::decode(&message) else {
            continue;
        };
        if !routes.lock().dispatch(signal) {
            debug!("no live notifications, signal listener stopping");
            return;
        }
    }
    routes.lock().listening = false;
}

/// Daemon signals the backend cares about.
#[derive(Clone, Debug, Eq, PartialEq)]
enum Signal {
    ActionInvoked { server_id: u32, key: String },
    Closed { server_id: u32, reason: u32 },
}

impl Signal {
    fn decode(message: &Message) -> Option<Self> {
        let header = message.header();
        let member = header.member()?.as_str();
        let body = message.body();
        match member {
            "ActionInvoked" => body
                .deserialize::<(u32, String)>()
                .ok()
                .map(|(server_id, key)| Self::ActionInvoked { server_id, key }),
            "NotificationClosed" => body
                .deserialize::<(u32, u32)>()
                .ok()
                .map(|(server_id, reason)| Self::Closed { server_id, reason }),
            _ => None,
        }
    }

    const fn server_id(&self) -> u32 {
        match self {
            Self::ActionInvoked { server_id, .. } | Self::Closed { server_id, .. } => *server_id,
        }
    }

    fn into_event(self) -> Option<NativeEvent> {
        match self {
            Self::ActionInvoked { key, .. } => map_action(&key),
            Self::Closed { reason, .. } => Some(NativeEvent::Dismissed(map_close_reason(
                CloseReason::from(reason),
            ))),
        }
    }
}

struct Route {
    token: NotificationId,
    events: EventSink,
}

/// Server id to token routing shared by `show` and the listener thread.
#[derive(Default)]
struct Routes {
    live: HashMap<u32, Route>,
    listening: bool,
}

impl Routes {
    fn route(&mut self, server_id: u32, token: NotificationId, events: EventSink) {
        self.live.insert(server_id, Route { token, events });
    }

    /// Returns whether `server_id` was still routed.
    fn withdraw(&mut self, server_id: u32) -> bool {
        self.live.remove(&server_id).is_some()
    }

    /// Forwards `signal` to its notification. Signals for other applications'
    /// notifications are ignored. Returns whether the listener keeps running.
    fn dispatch(&mut self, signal: Signal) -> bool {
        let server_id = signal.server_id();
        if self.live.contains_key(&server_id) {
            match signal.into_event() {
                Some(event) => {
                    if let Some(route) = self.live.remove(&server_id) {
                        route.events.emit(route.token, event);
                    }
                }
                None => debug!(server_id, "unrecognised action"),
            }
        }
        if self.live.is_empty() {
            self.listening = false;
        }
        self.listening
    }
}

/// Caches the outcome of an expensive connection attempt. Successes are kept
/// for good, failures for [`RETRY_BACKOFF`].
struct Attempt<T> {
    state: Mutex<AttemptState<T>>,
}

enum AttemptState<T> {
    Untried,
    Ready(Arc<T>),
    Failed { at: Instant, reason: String },
}

impl<T> Default for Attempt<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(AttemptState::Untried),
        }
    }
}

impl<T> Attempt<T> {
    fn get_or_connect(
        &self,
        now: Instant,
        connect: impl FnOnce() -> Result<T, String>,
    ) -> Result<Arc<T>, String> {
        let mut state = self.state.lock();
        match &*state {
            AttemptState::Ready(value) => return Ok(Arc::clone(value)),
            AttemptState::Failed { at, reason }
                if now.saturating_duration_since(*at) < RETRY_BACKOFF =>
            {
                return Err(reason.clone());
            }
            _ => {}
        }
        match connect() {
            Ok(value) => {
                let value = Arc::new(value);
                *state = AttemptState::Ready(Arc::clone(&value));
                Ok(value)
            }
            Err(reason) => {
                warn!(error = %reason, "notification daemon unreachable");
                *state = AttemptState::Failed {
                    at: now,
                    reason: reason.clone(),
                };
                Err(reason)
            }
        }
    }

    fn current(&self) -> Option<Arc<T>> {
        match &*self.state.lock() {
            AttemptState::Ready(value) => Some(Arc::clone(value)),
            _ => None,
        }
    }
}

fn map_action(action: &str) -> Option<NativeEvent> {
    match action {
        DEFAULT_ACTION => Some(NativeEvent::Activated),
        other => other
            .strip_prefix(BUTTON_PREFIX)
            .and_then(|index| index.parse().ok())
            .map(NativeEvent::ButtonClicked),
    }
}

const fn map_close_reason(reason: CloseReason) -> DismissalReason {
    match reason {
        CloseReason::Expired => DismissalReason::TimedOut,
        CloseReason::Dismissed => DismissalReason::UserCanceled,
        CloseReason::CloseAction => DismissalReason::ApplicationHidden,
        CloseReason::Other(_) => DismissalReason::Unknown,
    }
}

const fn map_urgency(importance: Importance) -> Urgency {
    match importance {
        Importance::Min | Importance::Low => Urgency::Low,
        Importance::Default => Urgency::Normal,
        Importance::High => Urgency::Critical,
    }
}

const fn map_timeout(duration: NotificationDuration) -> Timeout {
    match duration {
        NotificationDuration::Short => Timeout::Default,
        NotificationDuration::Long => Timeout::Milliseconds(LONG_TIMEOUT_MS),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    use notify_rust::CloseReason;

    use super::{RETRY_BACKOFF, Attempt, Routes, Signal, map_action, map_close_reason};
    use crate::notification::{NotificationId, NotificationRequest};
    use crate::provider::{EventSink, NativeEvent};
    use crate::types::DismissalReason;

    fn token() -> NotificationId {
        NotificationRequest::builder("T", "M").build().id()
    }

    fn closed(server_id: u32, reason: u32) -> Signal {
        Signal::Closed { server_id, reason }
    }

    #[test]
    fn actions_map_onto_native_events() {
        assert_eq!(map_action("default"), Some(NativeEvent::Activated));
        assert_eq!(map_action("button:2"), Some(NativeEvent::ButtonClicked(2)));
        assert_eq!(map_action("button:"), None);
        assert_eq!(map_action("ignore"), None);
    }

    #[test]
    fn close_reasons_cover_every_dismissal_cause() {
        assert_eq!(map_close_reason(CloseReason::from(1)), DismissalReason::TimedOut);
        assert_eq!(map_close_reason(CloseReason::from(2)), DismissalReason::UserCanceled);
        assert_eq!(
            map_close_reason(CloseReason::from(3)),
            DismissalReason::ApplicationHidden
        );
        assert_eq!(map_close_reason(CloseReason::from(4)), DismissalReason::Unknown);
        assert_eq!(map_close_reason(CloseReason::from(0)), DismissalReason::Unknown);
    }

    #[test]
    fn signals_reach_only_their_own_notification_once() {
        let (tx, rx) = mpsc::channel();
        let mut routes = Routes {
            listening: true,
            ..Routes::default()
        };
        let (first, second) = (token(), token());
        routes.route(10, first, EventSink::new(tx.clone()));
        routes.route(11, second, EventSink::new(tx));

        // Another application's notification.
        assert!(routes.dispatch(closed(99, 2)));
        assert!(rx.try_recv().is_err());

        assert!(routes.dispatch(Signal::ActionInvoked {
            server_id: 11,
            key: "button:0".to_string(),
        }));
        assert_eq!(rx.try_recv().ok(), Some((second, NativeEvent::ButtonClicked(0))));

        // The daemon follows an action with a close; it resolves nothing.
        assert!(routes.dispatch(closed(11, 3)));
        assert!(rx.try_recv().is_err());

        assert!(!routes.dispatch(closed(10, 1)));
        assert_eq!(
            rx.try_recv().ok(),
            Some((first, NativeEvent::Dismissed(DismissalReason::TimedOut)))
        );
        assert!(!routes.listening);
    }

    #[test]
    fn unknown_action_keeps_the_route() {
        let (tx, rx) = mpsc::channel();
        let mut routes = Routes {
            listening: true,
            ..Routes::default()
        };
        routes.route(5, token(), EventSink::new(tx));

        assert!(routes.dispatch(Signal::ActionInvoked {
            server_id: 5,
            key: "inline-reply".to_string(),
        }));
        assert!(rx.try_recv().is_err());
        assert_eq!(routes.live.len(), 1);
    }

    #[test]
    fn listener_stops_once_expired_notifications_are_withdrawn() {
        let (tx, rx) = mpsc::channel();
        let mut routes = Routes {
            listening: true,
            ..Routes::default()
        };
        for server_id in 1..=3 {
            routes.route(server_id, token(), EventSink::new(tx.clone()));
        }

        // Local expiry withdraws every route; the close each one triggers
        // arrives afterwards and finds nothing to resolve.
        for server_id in 1..=3 {
            assert!(routes.withdraw(server_id));
        }
        assert!(!routes.withdraw(2));
        assert!(!routes.dispatch(closed(3, 3)));
        assert!(routes.live.is_empty());
        assert!(!routes.listening);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn failed_connection_is_reused_until_the_backoff_elapses() {
        let session = Attempt::<u32>::default();
        let start = Instant::now();
        let mut attempts = 0;

        let mut attempt = |now: Instant, result: Result<u32, String>| {
            session.get_or_connect(now, || {
                attempts += 1;
                result
            })
        };
        assert!(attempt(start, Err("no daemon".into())).is_err());
        assert_eq!(
            attempt(start + Duration::from_secs(1), Ok(1)),
            Err("no daemon".to_string())
        );
        assert_eq!(attempt(start + RETRY_BACKOFF, Ok(7)).ok().as_deref(), Some(&7));
        assert_eq!(attempt(start + RETRY_BACKOFF * 3, Ok(9)).ok().as_deref(), Some(&7));
        drop(attempt);
        assert_eq!(attempts, 2);
        assert_eq!(session.current().as_deref(), Some(&7));
    }
}
