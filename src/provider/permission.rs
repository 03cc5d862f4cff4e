use tokio::sync::watch;
use tracing::debug;

/// Observable notification permission.
///
/// Written by OS authorization queries, by permission-request outcomes and
/// by explicit overrides. Readers always see the last write.
#[derive(Debug)]
pub(crate) struct PermissionState {
    tx: watch::Sender<bool>,
}

impl PermissionState {
    pub(crate) fn new(granted: bool) -> Self {
        let (tx, _rx) = watch::channel(granted);
        Self { tx }
    }

    pub(crate) fn get(&self) -> bool {
        *self.tx.borrow()
    }

    pub(crate) fn set(&self, granted: bool) {
        let previous = self.tx.send_replace(granted);
        if previous != granted {
            debug!(granted, "notification permission changed");
        }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
