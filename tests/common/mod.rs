#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

use desknotify::NotificationId;
use desknotify::config::{AppConfig, Config};
use desknotify::error::NotifyError;
use desknotify::provider::{Authorization, EventSink, NativeBackend, NativeEvent, NativePayload};
use desknotify::types::Platform;
use parking_lot::Mutex;

pub const WAIT: Duration = Duration::from_secs(3);
pub const QUIET: Duration = Duration::from_millis(200);

/// Scripted stand-in for an OS notification service.
pub struct FakeBackend {
    state: Arc<FakeState>,
}

#[derive(Debug)]
pub struct FakeHandle(pub NotificationId);

struct FakeState {
    shown: Mutex<Vec<(NotificationId, NativePayload)>>,
    hidden: Mutex<Vec<NotificationId>>,
    released: Mutex<Vec<NotificationId>>,
    sinks: Mutex<HashMap<NotificationId, EventSink>>,
    authorization: Mutex<Authorization>,
    prompt_answer: AtomicBool,
    prompts: AtomicUsize,
    fail_init: AtomicBool,
    fail_show: AtomicBool,
    identity_changed: AtomicBool,
    announce: Sender<NotificationId>,
}

/// Test-side view of a [`FakeBackend`].
#[derive(Clone)]
pub struct FakeControl {
    state: Arc<FakeState>,
    shown_rx: Arc<Mutex<Receiver<NotificationId>>>,
}

pub fn fake() -> (FakeBackend, FakeControl) {
    fake_with(Authorization::Unsupported)
}

pub fn fake_with(authorization: Authorization) -> (FakeBackend, FakeControl) {
    let (announce, shown_rx) = mpsc::channel();
    let state = Arc::new(FakeState {
        shown: Mutex::new(Vec::new()),
        hidden: Mutex::new(Vec::new()),
        released: Mutex::new(Vec::new()),
        sinks: Mutex::new(HashMap::new()),
        authorization: Mutex::new(authorization),
        prompt_answer: AtomicBool::new(true),
        prompts: AtomicUsize::new(0),
        fail_init: AtomicBool::new(false),
        fail_show: AtomicBool::new(false),
        identity_changed: AtomicBool::new(false),
        announce,
    });
    (
        FakeBackend {
            state: Arc::clone(&state),
        },
        FakeControl {
            state,
            shown_rx: Arc::new(Mutex::new(shown_rx)),
        },
    )
}

impl NativeBackend for FakeBackend {
    type Handle = FakeHandle;

    fn platform(&self) -> Platform {
        Platform::current()
    }

    fn initialize(&self, _app: &AppConfig) -> Result<bool, NotifyError> {
        if self.state.fail_init.load(Ordering::SeqCst) {
            return Err(NotifyError::Initialization("scripted".to_string()));
        }
        Ok(self.state.identity_changed.swap(false, Ordering::SeqCst))
    }

    fn show(
        &self,
        token: NotificationId,
        payload: &NativePayload,
        events: &EventSink,
    ) -> Result<FakeHandle, NotifyError> {
        if self.state.fail_show.load(Ordering::SeqCst) {
            let _ = self.state.announce.send(token);
            return Err(NotifyError::Show("scripted".to_string()));
        }
        self.state.shown.lock().push((token, payload.clone()));
        self.state.sinks.lock().insert(token, events.clone());
        let _ = self.state.announce.send(token);
        Ok(FakeHandle(token))
    }

    fn hide(&self, handle: &FakeHandle) {
        self.state.hidden.lock().push(handle.0);
    }

    fn release(&self, handle: FakeHandle) {
        self.state.released.lock().push(handle.0);
    }

    fn authorization(&self) -> Authorization {
        *self.state.authorization.lock()
    }

    fn request_authorization(&self, reply: Box<dyn FnOnce(bool) + Send>) {
        self.state.prompts.fetch_add(1, Ordering::SeqCst);
        reply(self.state.prompt_answer.load(Ordering::SeqCst));
    }
}

impl FakeControl {
    /// Blocks until the backend was asked to show something.
    pub fn wait_shown(&self) -> NotificationId {
        match self.shown_rx.lock().recv_timeout(WAIT) {
            Ok(id) => id,
            Err(err) => panic!("nothing was shown: {err}"),
        }
    }

    /// Delivers `event` the way a native callback would.
    pub fn fire(&self, id: NotificationId, event: NativeEvent) {
        let sink = self.state.sinks.lock().get(&id).cloned();
        match sink {
            Some(sink) => sink.emit(id, event),
            None => panic!("notification {id} was never shown"),
        }
    }

    pub fn payload(&self, id: NotificationId) -> Option<NativePayload> {
        self.state
            .shown
            .lock()
            .iter()
            .find(|(shown, _)| *shown == id)
            .map(|(_, payload)| payload.clone())
    }

    pub fn shown_count(&self) -> usize {
        self.state.shown.lock().len()
    }

    pub fn hidden(&self) -> Vec<NotificationId> {
        self.state.hidden.lock().clone()
    }

    pub fn released(&self) -> Vec<NotificationId> {
        self.state.released.lock().clone()
    }

    pub fn prompts(&self) -> usize {
        self.state.prompts.load(Ordering::SeqCst)
    }

    pub fn set_authorization(&self, authorization: Authorization) {
        *self.state.authorization.lock() = authorization;
    }

    pub fn answer_prompt(&self, granted: bool) {
        self.state.prompt_answer.store(granted, Ordering::SeqCst);
    }

    pub fn fail_init(&self, fail: bool) {
        self.state.fail_init.store(fail, Ordering::SeqCst);
    }

    pub fn fail_show(&self, fail: bool) {
        self.state.fail_show.store(fail, Ordering::SeqCst);
    }

    /// Makes the next `initialize` report a new application identity.
    pub fn change_identity(&self) {
        self.state.identity_changed.store(true, Ordering::SeqCst);
    }
}

/// Polls `condition` until it holds or [`WAIT`] elapses.
pub fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}

pub fn short_timeout_config(timeout: Duration) -> Config {
    let mut config = Config::default();
    config.notify.callback_timeout = timeout;
    config
}
