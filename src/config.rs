use crate::ai::{DraftStyle, GEMINI_API_BASE};
use crate::models::CustomLabel;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

pub const SETTINGS_FILE: &str = "settings.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub keybindings: Keybindings,
    pub page_size: u32,
    pub enrichment_interval_ms: u64,
    pub request_timeout_secs: u64,
    pub llm: LlmSettings,
    pub compose: ComposeSettings,
    pub labels: Vec<CustomLabel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub model: String,
    pub endpoint: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            endpoint: GEMINI_API_BASE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeSettings {
    pub language: String,
    pub style: DraftStyle,
}

impl Default for ComposeSettings {
    fn default() -> Self {
        Self {
            language: "English".to_string(),
            style: DraftStyle::Default,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Keybindings {
    pub next_panel: Vec<String>,
    pub prev_panel: Vec<String>,
    pub move_up: Vec<String>,
    pub move_down: Vec<String>,
    pub open: Vec<String>,
    pub toggle_read: Vec<String>,
    pub star: Vec<String>,
    pub archive: Vec<String>,
    pub unarchive: Vec<String>,
    pub trash: Vec<String>,
    pub search: Vec<String>,
    pub refresh: Vec<String>,
    pub new_message: Vec<String>,
    pub reply: Vec<String>,
    pub ai_reply: Vec<String>,
    pub enhance: Vec<String>,
    pub send_message: Vec<String>,
    pub new_label: Vec<String>,
    pub delete_label: Vec<String>,
    pub toggle_task: Vec<String>,
    pub delete_task: Vec<String>,
    pub chat: Vec<String>,
    pub quit: Vec<String>,
}

fn keys(list: &[&str]) -> Vec<String> {
    list.iter().map(|k| k.to_string()).collect()
}

impl Default for Keybindings {
    fn default() -> Self {
        Self {
            next_panel: keys(&["l", "Right", "Tab"]),
            prev_panel: keys(&["h", "Left", "BackTab"]),
            move_up: keys(&["k", "Up"]),
            move_down: keys(&["j", "Down"]),
            open: keys(&["Enter"]),
            toggle_read: keys(&[" "]),
            star: keys(&["s"]),
            archive: keys(&["a"]),
            unarchive: keys(&["A"]),
            trash: keys(&["Backspace", "d"]),
            search: keys(&["/"]),
            refresh: keys(&["R"]),
            new_message: keys(&["n"]),
            reply: keys(&["r"]),
            ai_reply: keys(&["g"]),
            enhance: keys(&["ctrl-e"]),
            send_message: keys(&["ctrl-s"]),
            new_label: keys(&["L"]),
            delete_label: keys(&["D"]),
            toggle_task: keys(&["x"]),
            delete_task: keys(&["X"]),
            chat: keys(&["?"]),
            quit: keys(&["q"]),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            keybindings: Keybindings::default(),
            page_size: crate::sync::DEFAULT_PAGE_SIZE,
            enrichment_interval_ms: crate::sync::DEFAULT_ENRICHMENT_INTERVAL.as_millis() as u64,
            request_timeout_secs: 30,
            llm: LlmSettings::default(),
            compose: ComposeSettings::default(),
            labels: Vec::new(),
        }
    }
}

pub fn parse_key_string(key_str: &str) -> (KeyCode, KeyModifiers) {
    let mut parts: Vec<&str> = key_str.split('-').collect();
    let mut modifiers = KeyModifiers::empty();

    // A bare "-" splits into two empty parts.
    let base_key_str = if key_str == "-" {
        parts.clear();
        "-"
    } else {
        parts.pop().unwrap_or("")
    };

    for part in parts {
        match part.to_lowercase().as_str() {
            "ctrl" => modifiers.insert(KeyModifiers::CONTROL),
            "alt" => modifiers.insert(KeyModifiers::ALT),
            "shift" => modifiers.insert(KeyModifiers::SHIFT),
            "cmd" | "command" | "super" => modifiers.insert(KeyModifiers::SUPER),
            "meta" => modifiers.insert(KeyModifiers::META),
            _ => {}
        }
    }

    let mut chars = base_key_str.chars();
    let code = match base_key_str {
        "Backspace" => KeyCode::Backspace,
        "Enter" => KeyCode::Enter,
        "Left" => KeyCode::Left,
        "Right" => KeyCode::Right,
        "Up" => KeyCode::Up,
        "Down" => KeyCode::Down,
        "Tab" => KeyCode::Tab,
        "BackTab" => KeyCode::BackTab,
        "Esc" => KeyCode::Esc,
        "Delete" => KeyCode::Delete,
        " " => KeyCode::Char(' '),
        _ => match (chars.next(), chars.next()) {
            (Some(c), None) => KeyCode::Char(c),
            _ => KeyCode::Null,
        },
    };

    (code, modifiers)
}

pub fn matches_key(event: KeyEvent, bindings: &[String]) -> bool {
    bindings.iter().any(|b| {
        let (code, modifiers) = parse_key_string(b);
        event.code == code && event.modifiers.contains(modifiers)
    })
}

impl Config {
    pub fn load() -> Self {
        match std::fs::read_to_string(SETTINGS_FILE) {
            Ok(content) => Self::parse(&content),
            Err(_) => Self::default(),
        }
    }

    pub fn parse(content: &str) -> Self {
        match toml::from_str::<Config>(content) {
            Ok(mut config) => {
                config.labels = config
                    .labels
                    .iter()
                    .filter_map(|l| {
                        CustomLabel::new(&l.name, &l.prompt, &l.color, l.apply_retroactively)
                    })
                    .collect();
                config
            }
            Err(e) => {
                warn!("Ignoring malformed {}: {}", SETTINGS_FILE, e);
                Self::default()
            }
        }
    }

    pub fn enrichment_interval(&self) -> Duration {
        Duration::from_millis(self.enrichment_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_string_modifiers() {
        assert_eq!(
            parse_key_string("ctrl-s"),
            (KeyCode::Char('s'), KeyModifiers::CONTROL)
        );
        assert_eq!(parse_key_string("Enter"), (KeyCode::Enter, KeyModifiers::empty()));
        assert_eq!(parse_key_string("-"), (KeyCode::Char('-'), KeyModifiers::empty()));
        assert_eq!(parse_key_string("nonsense").0, KeyCode::Null);
    }

    #[test]
    fn test_matches_key() {
        let event = KeyEvent::new(KeyCode::Char('e'), KeyModifiers::CONTROL);
        assert!(matches_key(event, &keys(&["ctrl-e"])));
        assert!(!matches_key(event, &keys(&["x"])));
    }

    #[test]
    fn test_partial_settings_fall_back_to_defaults() {
        let config = Config::parse(
            r#"
page_size = 25

[llm]
model = "gemini-1.5-pro"

[[labels]]
name = "Invoices"
prompt = "Bills and receipts"
color = "green"
"#,
        );
        assert_eq!(config.page_size, 25);
        assert_eq!(config.llm.model, "gemini-1.5-pro");
        assert_eq!(config.llm.endpoint, GEMINI_API_BASE);
        assert_eq!(config.enrichment_interval(), Duration::from_millis(1500));
        assert_eq!(config.keybindings.quit, keys(&["q"]));
        assert_eq!(config.labels.len(), 1);
        assert!(config.labels[0].apply_retroactively);
    }

    #[test]
    fn test_seeded_labels_are_validated() {
        let config = Config::parse(
            r#"
[[labels]]
name = "  "
prompt = "blank name"

[[labels]]
name = "Travel"
prompt = "Flights and hotels"
color = "chartreuse"
"#,
        );
        assert_eq!(config.labels.len(), 1);
        assert_eq!(config.labels[0].color, "blue");
    }

    #[test]
    fn test_malformed_settings_use_defaults() {
        let config = Config::parse("page_size = \"many\"");
        assert_eq!(config.page_size, crate::sync::DEFAULT_PAGE_SIZE);
        assert_eq!(config.compose.style, DraftStyle::Default);
    }
}
