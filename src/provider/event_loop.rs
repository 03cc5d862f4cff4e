use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error};

use crate::notification::NotificationId;

use super::native::{EventSink, NativeEvent};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

type Queue = Receiver<(NotificationId, NativeEvent)>;

/// What the delivery thread needs from its provider.
pub(crate) trait Drive: Send + Sync + 'static {
    fn event_loop(&self) -> &EventLoop;
    fn deliver(&self, id: NotificationId, event: NativeEvent);
    /// Housekeeping between events: pumping native queues, expiring entries.
    fn tick(&self);
    fn is_idle(&self) -> bool;
}

/// One delivery thread per provider, shared by every outstanding notification.
///
/// The thread starts on the first registration and exits once the registry
/// is empty. Both the start decision and the exit decision happen under
/// `running`, so a registration can never be stranded without a thread.
pub(crate) struct EventLoop {
    sink: EventSink,
    queue: Arc<Mutex<Queue>>,
    running: Mutex<bool>,
}

impl EventLoop {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            sink: EventSink::new(tx),
            queue: Arc::new(Mutex::new(rx)),
            running: Mutex::new(false),
        }
    }

    pub(crate) const fn sink(&self) -> &EventSink {
        &self.sink
    }

    pub(crate) fn is_running(&self) -> bool {
        *self.running.lock()
    }
}

/// Starts the delivery thread unless it is already running.
pub(crate) fn ensure_running<D: Drive>(driver: &Arc<D>) {
    let mut running = driver.event_loop().running.lock();
    if *running {
        return;
    }

    let queue = Arc::clone(&driver.event_loop().queue);
    let worker = Arc::clone(driver);
    let spawned = thread::Builder::new()
        .name("desknotify-events".to_string())
        .spawn(move || run(&*worker, &queue));
    match spawned {
        Ok(_) => {
            *running = true;
            debug!("event loop started");
        }
        Err(err) => error!(error = %err, "failed to start event loop thread"),
    }
}

fn run<D: Drive>(driver: &D, queue: &Mutex<Queue>) {
    let queue = queue.lock();
    loop {
        match queue.recv_timeout(POLL_INTERVAL) {
            Ok((id, event)) => driver.deliver(id, event),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        driver.tick();

        let mut running = driver.event_loop().running.lock();
        if driver.is_idle() {
            // Anything left queued is picked up by the next loop; events for
            // released entries resolve to nothing.
            *running = false;
            break;
        }
    }
    debug!("event loop stopped");
}
