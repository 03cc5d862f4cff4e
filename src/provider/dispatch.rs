use std::thread;

use tokio::runtime::Handle;

use crate::error::NotifyError;
use crate::notification::NotificationId;

/// Runs a send job off the caller's thread.
///
/// Inside a tokio runtime the job goes to the blocking pool, since native
/// show calls block on IPC. Elsewhere it gets a short-lived named thread.
pub(crate) fn spawn<F>(id: NotificationId, job: F) -> Result<(), NotifyError>
where
    F: FnOnce() + Send + 'static,
{
    if let Ok(runtime) = Handle::try_current() {
        drop(runtime.spawn_blocking(job));
        return Ok(());
    }

    thread::Builder::new()
        .name(format!("desknotify-send-{id}"))
        .spawn(job)
        .map(drop)
        .map_err(|err| NotifyError::Show(format!("could not start send worker: {err}")))
}
