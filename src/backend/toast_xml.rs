//! Toast template rendering and activation-argument parsing.
//!
//! Kept free of Windows APIs so the markup can be checked on any host.

use std::fmt::Write as _;
use std::path::Path;

use url::Url;

use crate::provider::NativePayload;
use crate::types::{Importance, NotificationDuration};

const BODY_ARGUMENT: &str = "activate";
const BUTTON_PREFIX: &str = "button:";
const INPUT_PREFIX: &str = "input:";

/// Decoded `arguments` attribute of an activated toast.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ToastArgument {
    Body,
    Button(usize),
    Input(String),
}

pub fn parse_arguments(arguments: &str) -> Option<ToastArgument> {
    let arguments = arguments.trim();
    if arguments.is_empty() || arguments == BODY_ARGUMENT {
        return Some(ToastArgument::Body);
    }
    if let Some(index) = arguments.strip_prefix(BUTTON_PREFIX) {
        return index.parse().ok().map(ToastArgument::Button);
    }
    arguments
        .strip_prefix(INPUT_PREFIX)
        .filter(|id| !id.is_empty())
        .map(|id| ToastArgument::Input(id.to_string()))
}

/// Renders the `ToastGeneric` document for `payload`.
pub fn render(payload: &NativePayload) -> String {
    let mut toast = format!(
        "<toast activationType=\"foreground\" launch=\"{BODY_ARGUMENT}\" duration=\"{}\">\n",
        match payload.duration {
            NotificationDuration::Short => "short",
            NotificationDuration::Long => "long",
        }
    );
    toast.push_str(&render_visual(payload));
    if let Some(actions) = render_actions(payload) {
        toast.push_str(&actions);
    }
    if let Some(audio) = render_audio(payload) {
        toast.push_str(&audio);
    }
    toast.push_str("</toast>");
    toast
}

fn render_visual(payload: &NativePayload) -> String {
    let title = payload.title.trim();
    let title = if title.is_empty() {
        payload.app_name.as_str()
    } else {
        title
    };

    let mut visual = String::from("  <visual>\n    <binding template=\"ToastGeneric\">\n");
    if let Some(icon) = &payload.small_icon {
        let _ = writeln!(
            visual,
            "      <image placement=\"appLogoOverride\" src=\"{}\" />",
            escape_attr(&file_uri(icon))
        );
    }
    let _ = writeln!(visual, "      <text>{}</text>", escape_text(title));

    let lines: Vec<&str> = payload
        .message
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    if let Some((first, rest)) = lines.split_first() {
        let _ = writeln!(visual, "      <text>{}</text>", escape_text(first));
        if !rest.is_empty() {
            let _ = writeln!(visual, "      <text>{}</text>", escape_text(&rest.join(" ")));
        }
    }

    if let Some(image) = &payload.large_image {
        let _ = writeln!(
            visual,
            "      <image placement=\"hero\" src=\"{}\" />",
            escape_attr(&file_uri(image))
        );
    }
    visual.push_str("    </binding>\n  </visual>\n");
    visual
}

fn render_actions(payload: &NativePayload) -> Option<String> {
    if payload.buttons.is_empty() && payload.text_inputs.is_empty() {
        return None;
    }

    let mut actions = String::from("  <actions>\n");
    for input in &payload.text_inputs {
        let id = escape_attr(&input.id);
        let _ = writeln!(
            actions,
            "    <input id=\"{id}\" type=\"text\" placeHolderContent=\"{}\" />",
            escape_attr(&input.placeholder)
        );
        let _ = writeln!(
            actions,
            "    <action content=\"{}\" arguments=\"{INPUT_PREFIX}{id}\" activationType=\"foreground\" hint-inputId=\"{id}\" />",
            escape_attr(&input.label)
        );
    }
    for (index, label) in payload.buttons.iter().enumerate() {
        let _ = writeln!(
            actions,
            "    <action content=\"{}\" arguments=\"{BUTTON_PREFIX}{index}\" activationType=\"foreground\" />",
            escape_attr(label)
        );
    }
    actions.push_str("  </actions>\n");
    Some(actions)
}

fn render_audio(payload: &NativePayload) -> Option<String> {
    if let Some(sound) = &payload.sound {
        return Some(format!(
            "  <audio src=\"{}\" />\n",
            escape_attr(&file_uri(sound))
        ));
    }
    match payload.importance {
        Importance::Min | Importance::Low => Some("  <audio silent=\"true\" />\n".to_string()),
        Importance::Default => None,
        Importance::High => {
            Some("  <audio src=\"ms-winsoundevent:Notification.Looping.Alarm4\" />\n".to_string())
        }
    }
}

fn escape_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

fn escape_attr(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

fn file_uri(path: &Path) -> String {
    Url::from_file_path(path).map_or_else(
        |()| format!("file:///{}", path.to_string_lossy().replace('\\', "/")),
        String::from,
    )
}

#[cfg(test)]
mod tests {
    use super::{ToastArgument, parse_arguments, render};
    use crate::provider::{NativePayload, NativeTextInput};
    use crate::types::{Importance, NotificationDuration};

    fn payload() -> NativePayload {
        NativePayload {
            app_name: "Reminders".to_string(),
            channel_id: "default".to_string(),
            importance: Importance::Default,
            duration: NotificationDuration::Short,
            title: "Build <done>".to_string(),
            message: "All green\n\nsee log & details\nbye".to_string(),
            large_image: None,
            small_icon: None,
            sound: None,
            buttons: vec!["OK".to_string(), "Open \"log\"".to_string()],
            text_inputs: vec![NativeTextInput {
                id: "reply".to_string(),
                label: "Send".to_string(),
                placeholder: "Type a reply".to_string(),
            }],
        }
    }

    #[test]
    fn renders_text_inputs_before_buttons() {
        insta::assert_snapshot!(render(&payload()), @r#"
        <toast activationType="foreground" launch="activate" duration="short">
          <visual>
            <binding template="ToastGeneric">
              <text>Build &lt;done&gt;</text>
              <text>All green</text>
              <text>see log &amp; details bye</text>
            </binding>
          </visual>
          <actions>
            <input id="reply" type="text" placeHolderContent="Type a reply" />
            <action content="Send" arguments="input:reply" activationType="foreground" hint-inputId="reply" />
            <action content="OK" arguments="button:0" activationType="foreground" />
            <action content="Open &quot;log&quot;" arguments="button:1" activationType="foreground" />
          </actions>
        </toast>
        "#);
    }

    #[test]
    fn empty_title_falls_back_to_app_name_and_quiet_importance_is_silent() {
        let mut payload = payload();
        payload.title = "  ".to_string();
        payload.importance = Importance::Low;
        payload.buttons.clear();
        payload.text_inputs.clear();
        payload.duration = NotificationDuration::Long;

        let xml = render(&payload);
        assert!(xml.contains("duration=\"long\""));
        assert!(xml.contains("<text>Reminders</text>"));
        assert!(xml.contains("<audio silent=\"true\" />"));
        assert!(!xml.contains("<actions>"));
    }

    #[cfg(unix)]
    #[test]
    fn images_and_sound_are_file_uris() {
        let mut payload = payload();
        payload.small_icon = Some("/tmp/app icon.png".into());
        payload.large_image = Some("/tmp/hero.png".into());
        payload.sound = Some("/tmp/ping.wav".into());

        let xml = render(&payload);
        assert!(xml.contains(
            "<image placement=\"appLogoOverride\" src=\"file:///tmp/app%20icon.png\" />"
        ));
        assert!(xml.contains("<image placement=\"hero\" src=\"file:///tmp/hero.png\" />"));
        assert!(xml.contains("<audio src=\"file:///tmp/ping.wav\" />"));
    }

    #[test]
    fn activation_arguments_round_trip_through_the_template_scheme() {
        assert_eq!(parse_arguments(""), Some(ToastArgument::Body));
        assert_eq!(parse_arguments("activate"), Some(ToastArgument::Body));
        assert_eq!(parse_arguments("button:3"), Some(ToastArgument::Button(3)));
        assert_eq!(
            parse_arguments("input:reply"),
            Some(ToastArgument::Input("reply".to_string()))
        );
        assert_eq!(parse_arguments("button:x"), None);
        assert_eq!(parse_arguments("input:"), None);
        assert_eq!(parse_arguments("something-else"), None);
    }
}
