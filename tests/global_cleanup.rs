#![cfg(any(target_os = "linux", target_os = "windows", target_os = "macos"))]

use desknotify::config::Config;

const PNG_URI: &str = "data:image/png;base64,iVBORw0KGgo=";

#[test]
fn dropping_the_global_guard_removes_staged_files() {
    let guard = match desknotify::configure(Config::default().with_app_name("Cleanup")) {
        Ok(guard) => guard,
        Err(err) => panic!("global notifier unavailable: {err}"),
    };
    let staged = match desknotify::global().map(|notifier| notifier.stager().stage(PNG_URI)) {
        Ok(Ok(staged)) => staged.into_path(),
        Ok(Err(err)) => panic!("staging failed: {err}"),
        Err(err) => panic!("global notifier unavailable: {err}"),
    };
    assert!(staged.exists());
    assert_eq!(guard.config().app.app_name, "Cleanup");

    drop(guard);
    assert!(!staged.exists());

    // The notifier outlives the guard and stages again on demand.
    let restaged = desknotify::global().map(|notifier| notifier.stager().stage(PNG_URI));
    assert!(matches!(restaged, Ok(Ok(ref staged)) if staged.path().exists()));
}
