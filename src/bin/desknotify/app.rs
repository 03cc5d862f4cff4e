use std::fmt;
use std::time::Duration;

use desknotify::Result;
use desknotify::config::Config;
use desknotify::error::{ConfigError, Error};
use desknotify::telemetry::{explicit_filter, init_tracing};
use desknotify::{DismissalReason, Notifier};
use tokio::signal;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::time::sleep;
use tracing::{info, warn};

use super::cli::Cli;

/// Time given to a fire-and-forget send to report an early failure.
const SUBMIT_GRACE: Duration = Duration::from_millis(750);

#[derive(Debug, Eq, PartialEq)]
enum Outcome {
    Activated,
    Button(String),
    Text { id: String, text: String },
    Dismissed(DismissalReason),
    Failed,
}

impl Outcome {
    const fn is_success(&self) -> bool {
        !matches!(self, Self::Failed)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Activated => f.write_str("activated"),
            Self::Button(label) => write!(f, "button:{label}"),
            Self::Text { id, text } => write!(f, "input:{id}:{text}"),
            Self::Dismissed(reason) => write!(f, "dismissed:{reason}"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// Sends one notification. Returns whether the run counts as a success.
pub async fn run(cli: Cli) -> Result<bool> {
    let mut config = match cli.config.as_deref() {
        Some(path) => Config::from_env_and_file(path)?,
        None => Config::from_env()?,
    };
    init_tracing(
        explicit_filter(cli.log_filter.as_deref(), config.notify.debug),
        cli.json_logs,
    )?;
    if let Some(timeout) = cli.timeout {
        if timeout.is_zero() {
            return Err(Error::from(ConfigError::InvalidField {
                field: "cli.timeout",
                message: "timeout must be greater than zero".to_string(),
            }));
        }
        config.notify.callback_timeout = timeout;
    }
    let wait_bound = config.notify.callback_timeout;

    let notifier = Notifier::new(config)?;

    if cli.request_permission && !request_permission(&notifier).await {
        warn!("notification permission denied");
        return Ok(false);
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let notification = notifier.notification(cli.title, cli.message, |n| {
        if let Some(image) = cli.image {
            n.large_image(image);
        }
        if let Some(icon) = cli.icon {
            n.small_icon(icon);
        }
        if let Some(sound) = cli.sound {
            n.sound(sound);
        }
        for label in cli.buttons {
            let tx = tx.clone();
            let reported = label.clone();
            n.button(label, move || report(&tx, Outcome::Button(reported.clone())));
        }
        for input in cli.inputs {
            let tx = tx.clone();
            let id = input.id.clone();
            n.text_input(input.id, input.label, input.placeholder, move |text| {
                report(
                    &tx,
                    Outcome::Text {
                        id: id.clone(),
                        text: text.to_string(),
                    },
                );
            });
        }
        let activated = tx.clone();
        let dismissed = tx.clone();
        let failed = tx.clone();
        n.on_activated(move || report(&activated, Outcome::Activated))
            .on_dismissed(move |reason| report(&dismissed, Outcome::Dismissed(reason)))
            .on_failed(move || report(&failed, Outcome::Failed));
    });
    drop(tx);

    notification.send();
    info!(id = %notification.id(), "notification sent");

    let success = if cli.wait {
        tokio::select! {
            outcome = rx.recv() => finish(outcome),
            _ = signal::ctrl_c() => {
                info!(id = %notification.id(), "interrupted, hiding notification");
                notification.hide();
                false
            }
            () = sleep(wait_bound) => {
                warn!(id = %notification.id(), "no response before timeout");
                false
            }
        }
    } else {
        tokio::select! {
            outcome = rx.recv() => finish(outcome),
            () = sleep(SUBMIT_GRACE) => true,
        }
    };

    notifier.cleanup();
    Ok(success)
}

async fn request_permission(notifier: &Notifier) -> bool {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let denied = tx.clone();
    notifier.request_permission(
        move || {
            let _ = tx.send(true);
        },
        move || {
            let _ = denied.send(false);
        },
    );
    rx.recv().await.unwrap_or(false)
}

fn report(tx: &UnboundedSender<Outcome>, outcome: Outcome) {
    let _ = tx.send(outcome);
}

fn finish(outcome: Option<Outcome>) -> bool {
    match outcome {
        Some(outcome) => {
            println!("{outcome}");
            outcome.is_success()
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::Outcome;
    use desknotify::DismissalReason;

    #[test]
    fn outcomes_print_as_stable_tokens() {
        assert_eq!(Outcome::Button("OK".into()).to_string(), "button:OK");
        assert_eq!(
            Outcome::Dismissed(DismissalReason::TimedOut).to_string(),
            "dismissed:timed_out"
        );
        assert_eq!(
            Outcome::Text {
                id: "reply".into(),
                text: "hi".into()
            }
            .to_string(),
            "input:reply:hi"
        );
        assert!(!Outcome::Failed.is_success());
        assert!(Outcome::Activated.is_success());
    }
}
