use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::notification::{NotificationId, NotificationRequest};

/// A live notification: the request that owns the callbacks plus the native
/// handle once the OS accepted it.
pub(crate) struct Entry<H> {
    pub(crate) request: Arc<NotificationRequest>,
    pub(crate) handle: Option<H>,
    reservation: Reservation,
    submitted_at: Instant,
}

/// Identifies one submission of a request; a re-send of the same request
/// gets a new one.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Reservation(u64);

/// Correlation map from notification id to live state.
///
/// Every method takes the lock for the duration of one map operation only.
/// Callers run user callbacks after the entry has been removed, never under
/// the lock.
pub(crate) struct Registry<H> {
    entries: Mutex<HashMap<NotificationId, Entry<H>>>,
    next_reservation: AtomicU64,
}

impl<H> Registry<H> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_reservation: AtomicU64::new(0),
        }
    }

    /// Records `request` before the native show call so that events racing
    /// with it find their entry.
    ///
    /// Also returns the entry this one replaces when the same request is sent
    /// again while still live; its native handle must be released by the caller.
    pub(crate) fn reserve(
        &self,
        request: Arc<NotificationRequest>,
    ) -> (Reservation, Option<Entry<H>>) {
        let id = request.id();
        let reservation = Reservation(self.next_reservation.fetch_add(1, Ordering::Relaxed));
        let replaced = self.entries.lock().insert(
            id,
            Entry {
                request,
                handle: None,
                reservation,
                submitted_at: Instant::now(),
            },
        );
        (reservation, replaced)
    }

    /// Stores the native handle. Hands it back when the reserved entry is gone:
    /// resolved, hidden or replaced by a later send while the show call was in
    /// flight.
    pub(crate) fn attach(
        &self,
        id: NotificationId,
        reservation: Reservation,
        handle: H,
    ) -> Result<(), H> {
        match self.entries.lock().get_mut(&id) {
            Some(entry) if entry.reservation == reservation && entry.handle.is_none() => {
                entry.handle = Some(handle);
                Ok(())
            }
            _ => Err(handle),
        }
    }

    /// Removes the entry only while it still belongs to `reservation`.
    pub(crate) fn take_reserved(
        &self,
        id: NotificationId,
        reservation: Reservation,
    ) -> Option<Entry<H>> {
        let mut entries = self.entries.lock();
        match entries.get(&id) {
            Some(entry) if entry.reservation == reservation => entries.remove(&id),
            _ => None,
        }
    }

    pub(crate) fn take(&self, id: NotificationId) -> Option<Entry<H>> {
        self.entries.lock().remove(&id)
    }

    /// Removes every entry submitted more than `timeout` before `now`.
    pub(crate) fn expire(&self, now: Instant, timeout: Duration) -> Vec<Entry<H>> {
        let mut entries = self.entries.lock();
        let stale: Vec<NotificationId> = entries
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.submitted_at) >= timeout)
            .map(|(id, _)| *id)
            .collect();
        stale
            .into_iter()
            .filter_map(|id| entries.remove(&id))
            .collect()
    }

    pub(crate) fn contains(&self, id: NotificationId) -> bool {
        self.entries.lock().contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
