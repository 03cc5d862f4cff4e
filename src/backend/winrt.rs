//! WinRT toast notifications.
#![allow(unsafe_code)]

use std::cell::OnceCell;
use std::fs;
use std::os::windows::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tauri_winrt_notification::Toast;
use tracing::{debug, info, warn};
use windows::Data::Xml::Dom::XmlDocument;
use windows::Foundation::{EventRegistrationToken, IPropertyValue, TypedEventHandler};
use windows::UI::Notifications::{
    NotificationSetting, ToastActivatedEventArgs, ToastDismissalReason, ToastDismissedEventArgs,
    ToastFailedEventArgs, ToastNotification, ToastNotificationManager, ToastNotifier,
};
use windows::Win32::Foundation::{BOOL, HWND, RPC_E_CHANGED_MODE};
use windows::Win32::System::Com::{
    CLSCTX_INPROC_SERVER, COINIT_APARTMENTTHREADED, CoCreateInstance, CoInitializeEx,
    CoUninitialize, IPersistFile,
};
use windows::Win32::UI::Shell::PropertiesSystem::{IPropertyStore, PROPERTYKEY};
use windows::Win32::UI::Shell::{IShellLinkW, SetCurrentProcessExplicitAppUserModelID, ShellLink};
use windows::Win32::UI::WindowsAndMessaging::{
    DispatchMessageW, MSG, PM_REMOVE, PeekMessageW, TranslateMessage,
};
use windows::core::{GUID, HSTRING, IInspectable, Interface, PCWSTR, PROPVARIANT};

use super::toast_xml::{self, ToastArgument};
use crate::config::AppConfig;
use crate::error::NotifyError;
use crate::notification::NotificationId;
use crate::provider::{Authorization, EventSink, NativeBackend, NativeEvent, NativePayload};
use crate::types::{DismissalReason, Platform};

const PKEY_APP_USER_MODEL_ID: PROPERTYKEY = PROPERTYKEY {
    fmtid: GUID::from_u128(0x9f4c2855_9f79_4b39_a8d0_e1d42de1d5f3),
    pid: 5,
};

#[derive(Debug, Default)]
pub struct WindowsBackend {
    /// Requested application name and the AppUserModelID actually in use.
    identity: Mutex<Option<(String, String)>>,
}

/// A shown toast with its registered event handlers.
pub struct ToastHandle {
    toast: ToastNotification,
    notifier: ToastNotifier,
    activated: EventRegistrationToken,
    dismissed: EventRegistrationToken,
    failed: EventRegistrationToken,
}

impl WindowsBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn app_id(&self) -> String {
        self.identity
            .lock()
            .as_ref()
            .map_or_else(|| Toast::POWERSHELL_APP_ID.to_string(), |(_, id)| id.clone())
    }

    fn notifier(&self) -> windows::core::Result<ToastNotifier> {
        ToastNotificationManager::CreateToastNotifierWithId(&HSTRING::from(self.app_id()))
    }
}

impl NativeBackend for WindowsBackend {
    type Handle = ToastHandle;

    fn platform(&self) -> Platform {
        Platform::Windows
    }

    fn initialize(&self, app: &AppConfig) -> Result<bool, NotifyError> {
        let mut identity = self.identity.lock();
        if identity
            .as_ref()
            .is_some_and(|(requested, _)| *requested == app.app_name)
        {
            return Ok(false);
        }

        let preferred = app.app_name.trim();
        let app_id = match ensure_app_registration(preferred) {
            Ok(()) if !preferred.is_empty() => preferred.to_string(),
            Ok(()) => Toast::POWERSHELL_APP_ID.to_string(),
            Err(err) => {
                warn!(
                    app_id = preferred,
                    error = %err,
                    "could not register application identity, using the PowerShell identity"
                );
                Toast::POWERSHELL_APP_ID.to_string()
            }
        };

        if let Err(err) = set_current_process_app_id(&app_id) {
            warn!(app_id = %app_id, error = %err, "could not set the process AppUserModelID");
        }
        info!(app_id = %app_id, "toast identity ready");
        *identity = Some((app.app_name.clone(), app_id));
        // The notifier setting belongs to the identity just established.
        Ok(true)
    }

    fn show(
        &self,
        token: NotificationId,
        payload: &NativePayload,
        events: &EventSink,
    ) -> Result<ToastHandle, NotifyError> {
        let _apartment = ComApartment::new()?;
        let show_err = |err: windows::core::Error| NotifyError::Show(err.to_string());

        let xml = toast_xml::render(payload);
        debug!(id = %token, xml = %xml, "toast template");
        let document = XmlDocument::new().map_err(show_err)?;
        document
            .LoadXml(&HSTRING::from(xml))
            .map_err(|err| NotifyError::InvalidPayload(err.to_string()))?;

        let toast = ToastNotification::CreateToastNotification(&document).map_err(show_err)?;
        toast
            .SetTag(&HSTRING::from(token.to_string()))
            .map_err(show_err)?;
        toast
            .SetGroup(&HSTRING::from(payload.channel_id.as_str()))
            .map_err(show_err)?;

        let sink = events.clone();
        let activated = toast
            .Activated(&TypedEventHandler::new(
                move |_sender: &Option<ToastNotification>, args: &Option<IInspectable>| {
                    if let Some(args) = args
                        .as_ref()
                        .and_then(|args| args.cast::<ToastActivatedEventArgs>().ok())
                    {
                        sink.emit(token, activation_event(&args));
                    }
                    Ok(())
                },
            ))
            .map_err(show_err)?;

        let sink = events.clone();
        let dismissed = toast
            .Dismissed(&TypedEventHandler::new(
                move |_sender: &Option<ToastNotification>,
                      args: &Option<ToastDismissedEventArgs>| {
                    let reason = args
                        .as_ref()
                        .and_then(|args| args.Reason().ok())
                        .map_or(DismissalReason::Unknown, map_dismissal);
                    sink.emit(token, NativeEvent::Dismissed(reason));
                    Ok(())
                },
            ))
            .map_err(show_err)?;

        let sink = events.clone();
        let failed = toast
            .Failed(&TypedEventHandler::new(
                move |_sender: &Option<ToastNotification>, args: &Option<ToastFailedEventArgs>| {
                    if let Some(code) = args.as_ref().and_then(|args| args.ErrorCode().ok()) {
                        warn!(id = %token, code = ?code, "toast failed");
                    }
                    sink.emit(token, NativeEvent::Failed);
                    Ok(())
                },
            ))
            .map_err(show_err)?;

        let handle = ToastHandle {
            notifier: self.notifier().map_err(show_err)?,
            toast,
            activated,
            dismissed,
            failed,
        };
        if let Err(err) = handle.notifier.Show(&handle.toast) {
            self.release(handle);
            return Err(show_err(err));
        }
        Ok(handle)
    }

    fn hide(&self, handle: &ToastHandle) {
        let _apartment = ComApartment::new().ok();
        if let Err(err) = handle.notifier.Hide(&handle.toast) {
            debug!(error = %err, "toast already gone");
        }
    }

    fn release(&self, handle: ToastHandle) {
        let _apartment = ComApartment::new().ok();
        let _ = handle.toast.RemoveActivated(handle.activated);
        let _ = handle.toast.RemoveDismissed(handle.dismissed);
        let _ = handle.toast.RemoveFailed(handle.failed);
    }

    fn authorization(&self) -> Authorization {
        let Ok(_apartment) = ComApartment::new() else {
            return Authorization::Unsupported;
        };
        match self.notifier().and_then(|notifier| notifier.Setting()) {
            Ok(setting) if setting == NotificationSetting::Enabled => Authorization::Granted,
            Ok(setting) => {
                debug!(setting = setting.0, "toasts disabled");
                Authorization::Denied
            }
            // Unregistered identities cannot be queried; toasts still show.
            Err(_) => Authorization::Unsupported,
        }
    }

    fn request_authorization(&self, reply: Box<dyn FnOnce(bool) + Send>) {
        // There is no prompt: the setting only changes in system settings.
        reply(self.authorization().allows());
    }

    fn pump_events(&self) {
        DELIVERY_APARTMENT.with(|apartment| {
            apartment.get_or_init(|| {
                ComApartment::new()
                    .inspect_err(|err| warn!(error = %err, "delivery thread has no COM apartment"))
                    .ok()
            });
        });
        let mut msg = MSG::default();
        unsafe {
            while PeekMessageW(&mut msg, HWND::default(), 0, 0, PM_REMOVE).as_bool() {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
    }
}

fn activation_event(args: &ToastActivatedEventArgs) -> NativeEvent {
    let arguments = args
        .Arguments()
        .map(|arguments| arguments.to_string())
        .unwrap_or_default();
    match toast_xml::parse_arguments(&arguments) {
        Some(ToastArgument::Button(index)) => NativeEvent::ButtonClicked(index),
        Some(ToastArgument::Input(action_id)) => {
            let text = args
                .UserInput()
                .ok()
                .and_then(|input| input.Lookup(&HSTRING::from(action_id.as_str())).ok())
                .and_then(|value| value.cast::<IPropertyValue>().ok())
                .and_then(|value| value.GetString().ok())
                .map(|text| text.to_string())
                .unwrap_or_default();
            NativeEvent::TextSubmitted { action_id, text }
        }
        Some(ToastArgument::Body) | None => NativeEvent::Activated,
    }
}

fn map_dismissal(reason: ToastDismissalReason) -> DismissalReason {
    if reason == ToastDismissalReason::UserCanceled {
        DismissalReason::UserCanceled
    } else if reason == ToastDismissalReason::ApplicationHidden {
        DismissalReason::ApplicationHidden
    } else if reason == ToastDismissalReason::TimedOut {
        DismissalReason::TimedOut
    } else {
        DismissalReason::Unknown
    }
}

fn ensure_app_registration(app_id: &str) -> Result<(), NotifyError> {
    if app_id.is_empty() || app_id == Toast::POWERSHELL_APP_ID {
        return Ok(());
    }
    let shortcut_path = start_menu_shortcut_path(app_id)?;
    if shortcut_path.exists() {
        return Ok(());
    }
    create_shortcut(&shortcut_path, app_id)
}

fn start_menu_shortcut_path(app_id: &str) -> Result<PathBuf, NotifyError> {
    let appdata = std::env::var_os("APPDATA")
        .ok_or_else(|| NotifyError::Initialization("APPDATA is not set".to_string()))?;
    Ok(PathBuf::from(appdata)
        .join("Microsoft")
        .join("Windows")
        .join("Start Menu")
        .join("Programs")
        .join(format!("{app_id}.lnk")))
}

fn create_shortcut(shortcut_path: &Path, app_id: &str) -> Result<(), NotifyError> {
    let init_err = |err: windows::core::Error| NotifyError::Initialization(err.to_string());

    if let Some(parent) = shortcut_path.parent() {
        fs::create_dir_all(parent).map_err(|err| NotifyError::Initialization(err.to_string()))?;
    }
    let exe_path =
        std::env::current_exe().map_err(|err| NotifyError::Initialization(err.to_string()))?;
    let exe_w = to_wide_path(&exe_path);
    let workdir_w = exe_path.parent().map_or_else(|| vec![0], to_wide_path);
    let shortcut_w = to_wide_path(shortcut_path);

    let _apartment = ComApartment::new()?;
    unsafe {
        let shell_link: IShellLinkW =
            CoCreateInstance(&ShellLink, None, CLSCTX_INPROC_SERVER).map_err(init_err)?;
        shell_link
            .SetPath(PCWSTR(exe_w.as_ptr()))
            .map_err(init_err)?;
        shell_link
            .SetWorkingDirectory(PCWSTR(workdir_w.as_ptr()))
            .map_err(init_err)?;

        let property_store: IPropertyStore = shell_link.cast().map_err(init_err)?;
        property_store
            .SetValue(&PKEY_APP_USER_MODEL_ID, &PROPVARIANT::from(app_id))
            .map_err(init_err)?;
        property_store.Commit().map_err(init_err)?;

        let persist_file: IPersistFile = shell_link.cast().map_err(init_err)?;
        persist_file
            .Save(PCWSTR(shortcut_w.as_ptr()), BOOL(1))
            .map_err(init_err)?;
    }
    debug!(path = %shortcut_path.display(), "start menu shortcut created");
    Ok(())
}

fn to_wide_path(path: &Path) -> Vec<u16> {
    path.as_os_str()
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

fn set_current_process_app_id(app_id: &str) -> windows::core::Result<()> {
    let app_id = HSTRING::from(app_id);
    unsafe { SetCurrentProcessExplicitAppUserModelID(PCWSTR(app_id.as_ptr())) }
}

thread_local! {
    /// Apartment of the delivery thread, entered on its first tick and left
    /// when the thread exits.
    static DELIVERY_APARTMENT: OnceCell<Option<ComApartment>> = const { OnceCell::new() };
}

/// Single-threaded COM apartment for the current thread, released on drop.
///
/// A thread already in the multithreaded apartment keeps it; WinRT calls work
/// there too, and the guard then leaves COM alone on drop.
struct ComApartment {
    owned: bool,
}

impl ComApartment {
    fn new() -> Result<Self, NotifyError> {
        let hr = unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) };
        if hr == RPC_E_CHANGED_MODE {
            return Ok(Self { owned: false });
        }
        hr.ok()
            .map_err(|err| NotifyError::Initialization(err.to_string()))?;
        Ok(Self { owned: true })
    }
}

impl Drop for ComApartment {
    fn drop(&mut self) {
        if self.owned {
            unsafe {
                CoUninitialize();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use windows::Win32::System::Com::{COINIT_MULTITHREADED, CoInitializeEx, CoUninitialize};
    use windows::UI::Notifications::ToastDismissalReason;

    use super::{ComApartment, map_dismissal};
    use crate::types::DismissalReason;

    #[test]
    fn apartment_joins_a_multithreaded_thread_without_owning_it() {
        let joined = std::thread::spawn(|| {
            assert!(unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) }.is_ok());
            match ComApartment::new() {
                Ok(apartment) => assert!(!apartment.owned),
                Err(err) => panic!("joining the thread's apartment failed: {err}"),
            }
            unsafe { CoUninitialize() };
        })
        .join();
        assert!(joined.is_ok());
    }

    #[test]
    fn nested_apartments_on_one_thread_are_balanced() {
        let joined = std::thread::spawn(|| {
            let outer = ComApartment::new();
            let inner = ComApartment::new();
            assert!(matches!((&outer, &inner), (Ok(o), Ok(i)) if o.owned && i.owned));
        })
        .join();
        assert!(joined.is_ok());
    }

    #[test]
    fn dismissal_reasons_map_one_to_one() {
        assert_eq!(
            map_dismissal(ToastDismissalReason::UserCanceled),
            DismissalReason::UserCanceled
        );
        assert_eq!(
            map_dismissal(ToastDismissalReason::ApplicationHidden),
            DismissalReason::ApplicationHidden
        );
        assert_eq!(
            map_dismissal(ToastDismissalReason::TimedOut),
            DismissalReason::TimedOut
        );
    }
}
