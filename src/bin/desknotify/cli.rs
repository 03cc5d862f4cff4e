use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};
use humantime::parse_duration;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InputSpec {
    pub id: String,
    pub label: String,
    pub placeholder: String,
}

#[allow(clippy::struct_excessive_bools)]
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Send a desktop notification through the platform notification service",
    long_about = None
)]
pub struct Cli {
    /// TOML configuration file.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub title: String,

    #[arg(long, default_value = "")]
    pub message: String,

    /// Large image: a path, `file://` or `data:` URI.
    #[arg(long, value_name = "LOCATOR")]
    pub image: Option<String>,

    /// Small icon, overriding `app.icon` from the configuration.
    #[arg(long, value_name = "LOCATOR")]
    pub icon: Option<String>,

    #[arg(long, value_name = "LOCATOR")]
    pub sound: Option<String>,

    /// Adds a button; repeat for more. Buttons keep their order.
    #[arg(long = "button", value_name = "LABEL", action = ArgAction::Append)]
    pub buttons: Vec<String>,

    /// Adds a text input, written `id:label:placeholder`.
    #[arg(long = "input", value_name = "ID:LABEL:PLACEHOLDER", value_parser = parse_input, action = ArgAction::Append)]
    pub inputs: Vec<InputSpec>,

    /// Waits for the user's response and prints it.
    #[arg(long, action = ArgAction::SetTrue)]
    pub wait: bool,

    /// Upper bound for `--wait` (e.g. "45s"); defaults to `notify.callback_timeout`.
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Asks for notification permission before sending.
    #[arg(long, action = ArgAction::SetTrue)]
    pub request_permission: bool,

    /// JSON log output (needs the `json-logs` feature).
    #[arg(long, action = ArgAction::SetTrue)]
    pub json_logs: bool,

    /// Explicit log filter (e.g. "desknotify=debug").
    #[arg(long, value_name = "FILTER")]
    pub log_filter: Option<String>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

fn parse_input(raw: &str) -> Result<InputSpec, String> {
    let mut parts = raw.splitn(3, ':');
    let id = parts.next().unwrap_or_default().trim();
    if id.is_empty() {
        return Err("input id cannot be empty".to_string());
    }
    let label = parts
        .next()
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .unwrap_or(id);
    let placeholder = parts.next().unwrap_or_default();
    Ok(InputSpec {
        id: id.to_string(),
        label: label.to_string(),
        placeholder: placeholder.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::{Cli, InputSpec, parse_input};
    use clap::Parser;

    #[test]
    fn input_spec_keeps_colons_in_placeholder() {
        assert_eq!(
            parse_input("reply:Reply:e.g. 10:30"),
            Ok(InputSpec {
                id: "reply".to_string(),
                label: "Reply".to_string(),
                placeholder: "e.g. 10:30".to_string(),
            })
        );
    }

    #[test]
    fn input_spec_label_defaults_to_id() {
        let spec = parse_input("note").unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(spec.label, "note");
        assert!(spec.placeholder.is_empty());
        assert!(parse_input(":label").is_err());
    }

    #[test]
    fn buttons_are_repeatable_and_ordered() {
        let cli = Cli::try_parse_from([
            "desknotify",
            "--title",
            "T",
            "--button",
            "OK",
            "--button",
            "Cancel",
            "--input",
            "reply:Reply:",
        ])
        .unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(cli.buttons, ["OK", "Cancel"]);
        assert_eq!(cli.inputs.len(), 1);
        assert!(cli.message.is_empty());
        assert!(!cli.wait);
    }
}
