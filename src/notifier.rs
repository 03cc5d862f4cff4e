//! Provider selection and the entry point applications hold on to.

use std::ops::Deref;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::Result;
use crate::config::Config;
use crate::error::Error;
use crate::notification::{Notification, NotificationBuilder};
use crate::provider::{NativeBackend, NotificationProvider, PlatformProvider};
use crate::staging::ResourceStager;
use crate::types::Platform;

static GLOBAL: OnceLock<Notifier> = OnceLock::new();

/// Owns the provider for the running platform, its configuration and the
/// resource stager. Create one per process, or use [`configure`] / [`global`].
pub struct Notifier {
    provider: Arc<dyn NotificationProvider>,
    config: Arc<RwLock<Config>>,
    stager: Arc<ResourceStager>,
}

impl Notifier {
    /// Selects the provider for the platform this binary runs on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedPlatform`] when no provider exists for it.
    pub fn new(config: Config) -> Result<Self> {
        Self::for_platform(Platform::current(), config)
    }

    /// # Errors
    ///
    /// Returns [`Error::UnsupportedPlatform`] when `platform` has no provider
    /// in this build.
    pub fn for_platform(platform: Platform, config: Config) -> Result<Self> {
        let stager = Arc::new(ResourceStager::new(config.notify.staging_cache));
        let config = Arc::new(RwLock::new(config));
        let provider = select(platform, Arc::clone(&config), Arc::clone(&stager))?;
        info!(%platform, "notification provider selected");
        Ok(Self {
            provider,
            config,
            stager,
        })
    }

    /// Uses a caller-supplied backend instead of the platform default.
    pub fn with_backend<B: NativeBackend>(backend: B, config: Config) -> Self {
        let stager = Arc::new(ResourceStager::new(config.notify.staging_cache));
        let config = Arc::new(RwLock::new(config));
        let provider: Arc<dyn NotificationProvider> = Arc::new(PlatformProvider::with_shared(
            backend,
            Arc::clone(&config),
            Arc::clone(&stager),
        ));
        Self {
            provider,
            config,
            stager,
        }
    }

    pub fn platform(&self) -> Platform {
        self.provider.platform()
    }

    pub fn provider(&self) -> Arc<dyn NotificationProvider> {
        Arc::clone(&self.provider)
    }

    pub fn config(&self) -> Config {
        self.config.read().clone()
    }

    /// Replaces the configuration. Sends that already started keep the
    /// values they read.
    pub fn reconfigure(&self, config: Config) {
        debug!(app = %config.app.app_name, channel = %config.channel.id, "reconfigured");
        *self.config.write() = config;
    }

    /// Makes `bytes` available to notifications as `res:<name>`.
    pub fn embed_resource(&self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.stager.embed(name, bytes);
    }

    pub fn stager(&self) -> &ResourceStager {
        &self.stager
    }

    /// Builds a notification bound to this notifier's provider.
    ///
    /// ```no_run
    /// # fn main() -> desknotify::Result<()> {
    /// let notifier = desknotify::Notifier::new(desknotify::Config::default())?;
    /// let notification = notifier.notification("Backup", "Finished in 4m", |n| {
    ///     n.button("Open", || println!("open"))
    ///         .on_dismissed(|reason| println!("dismissed: {reason}"));
    /// });
    /// notification.send();
    /// # Ok(())
    /// # }
    /// ```
    pub fn notification<F>(
        &self,
        title: impl Into<String>,
        message: impl Into<String>,
        configure: F,
    ) -> Notification
    where
        F: FnOnce(&mut NotificationBuilder),
    {
        let mut builder = NotificationBuilder::new(title, message);
        configure(&mut builder);
        Notification::new(builder.build(), self.provider())
    }

    pub fn has_permission(&self) -> bool {
        self.provider.has_permission()
    }

    pub fn request_permission<G, D>(&self, on_granted: G, on_denied: D)
    where
        G: FnOnce() + Send + 'static,
        D: FnOnce() + Send + 'static,
    {
        self.provider
            .request_permission(Box::new(on_granted), Box::new(on_denied));
    }

    /// Call when the application returns to the foreground; permission may
    /// have changed in system settings meanwhile.
    pub fn on_foreground(&self) {
        self.provider.refresh_permission();
    }

    /// Removes staged resource files now rather than at drop.
    pub fn cleanup(&self) {
        self.stager.cleanup();
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("platform", &self.platform())
            .field("config", &*self.config.read())
            .field("stager", &self.stager)
            .finish_non_exhaustive()
    }
}

fn select(
    platform: Platform,
    config: Arc<RwLock<Config>>,
    stager: Arc<ResourceStager>,
) -> Result<Arc<dyn NotificationProvider>> {
    match platform {
        #[cfg(target_os = "linux")]
        Platform::Linux => Ok(Arc::new(PlatformProvider::with_shared(
            crate::backend::LinuxBackend::new(),
            config,
            stager,
        ))),
        #[cfg(target_os = "windows")]
        Platform::Windows => Ok(Arc::new(PlatformProvider::with_shared(
            crate::backend::WindowsBackend::new(),
            config,
            stager,
        ))),
        #[cfg(target_os = "macos")]
        Platform::MacOs => Ok(Arc::new(PlatformProvider::with_shared(
            crate::backend::MacOsBackend::new(),
            config,
            stager,
        ))),
        other => {
            drop((config, stager));
            Err(Error::UnsupportedPlatform(other))
        }
    }
}

/// Keeps the process-wide notifier configured by [`configure`]. Dropping it
/// removes the files staged for its notifications, so hold it until the
/// application exits.
///
/// The notifier itself stays installed; later sends stage their resources
/// again.
#[must_use = "dropping the guard removes staged resources right away"]
#[derive(Debug)]
pub struct GlobalGuard {
    notifier: &'static Notifier,
}

impl Deref for GlobalGuard {
    type Target = Notifier;

    fn deref(&self) -> &Notifier {
        self.notifier
    }
}

impl Drop for GlobalGuard {
    fn drop(&mut self) {
        debug!("cleaning up the global notifier");
        self.notifier.cleanup();
    }
}

/// Installs the process-wide notifier, or reconfigures it when one exists.
///
/// ```no_run
/// # fn main() -> desknotify::Result<()> {
/// let _notifications = desknotify::configure(desknotify::Config::default())?;
/// desknotify::global()?.notification("Ready", "Listening", |_| {}).send();
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns [`Error::UnsupportedPlatform`] on platforms without a provider.
pub fn configure(config: Config) -> Result<GlobalGuard> {
    let notifier = install(&GLOBAL, config, true)?;
    Ok(GlobalGuard { notifier })
}

/// The process-wide notifier, created with default configuration when
/// [`configure`] was never called. Never replaces an existing configuration.
///
/// # Errors
///
/// Returns [`Error::UnsupportedPlatform`] on platforms without a provider.
pub fn global() -> Result<&'static Notifier> {
    match GLOBAL.get() {
        Some(existing) => Ok(existing),
        None => install(&GLOBAL, Config::default(), false),
    }
}

/// Puts a notifier into `cell`. With `overwrite`, `config` ends up applied
/// even when another thread installed its own instance first.
fn install(cell: &OnceLock<Notifier>, config: Config, overwrite: bool) -> Result<&Notifier> {
    if let Some(existing) = cell.get() {
        return Ok(adopt(existing, config, overwrite));
    }
    let notifier = Notifier::new(config.clone())?;
    let mut won = false;
    let installed = cell.get_or_init(|| {
        won = true;
        notifier
    });
    if won {
        Ok(installed)
    } else {
        debug!("global notifier installed concurrently");
        Ok(adopt(installed, config, overwrite))
    }
}

fn adopt(existing: &Notifier, config: Config, overwrite: bool) -> &Notifier {
    if overwrite {
        existing.reconfigure(config);
    }
    existing
}

#[cfg(test)]
mod tests {
    use std::sync::{Barrier, OnceLock};
    use std::thread;

    use super::{Notifier, install};
    use crate::config::Config;
    use crate::error::Error;
    use crate::types::Platform;

    #[test]
    fn unsupported_platforms_fail_fast() {
        for platform in [Platform::Android, Platform::Ios, Platform::Web, Platform::Unknown] {
            assert!(matches!(
                Notifier::for_platform(platform, Config::default()),
                Err(Error::UnsupportedPlatform(p)) if p == platform
            ));
        }
    }

    #[test]
    fn foreign_desktop_platforms_are_unsupported_in_this_build() {
        let foreign = if cfg!(target_os = "linux") {
            Platform::Windows
        } else {
            Platform::Linux
        };
        assert!(Notifier::for_platform(foreign, Config::default()).is_err());
    }

    #[cfg(any(target_os = "linux", target_os = "windows", target_os = "macos"))]
    #[test]
    fn explicit_configuration_survives_a_concurrent_default_install() {
        for _ in 0..16 {
            let cell = OnceLock::new();
            let barrier = Barrier::new(2);
            thread::scope(|scope| {
                scope.spawn(|| {
                    barrier.wait();
                    assert!(install(&cell, Config::default(), false).is_ok());
                });
                scope.spawn(|| {
                    barrier.wait();
                    let wanted = Config::default().with_app_name("Wanted");
                    assert!(install(&cell, wanted, true).is_ok());
                });
            });
            let name = cell.get().map(|installed| installed.config().app.app_name);
            assert_eq!(name.as_deref(), Some("Wanted"));
        }
    }

    #[cfg(any(target_os = "linux", target_os = "windows", target_os = "macos"))]
    #[test]
    fn default_install_keeps_an_existing_configuration() {
        let cell = OnceLock::new();
        let name = |config: Config, overwrite: bool| {
            install(&cell, config, overwrite).map(|installed| installed.config().app.app_name)
        };
        assert!(matches!(name(Config::default().with_app_name("First"), true), Ok(n) if n == "First"));
        assert!(matches!(name(Config::default(), false), Ok(n) if n == "First"));
        assert!(matches!(name(Config::default().with_app_name("Second"), true), Ok(n) if n == "Second"));
    }
}
