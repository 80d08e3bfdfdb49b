//! Wire data model for planner-produced action plans.
//!
//! Plans arrive as untrusted JSON. Decoding is strict: an unknown action
//! kind, an unknown key name or a missing required parameter fails the
//! whole plan instead of being dropped on the floor.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Mouse buttons the engine can press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
    #[serde(alias = "middle")]
    Center,
}

impl Default for MouseButton {
    fn default() -> Self {
        MouseButton::Left
    }
}

/// Keyboard keys addressable by the planner.
///
/// Parsed from the loose names vision-language models tend to emit
/// ("enter", "cmd", "esc", ...). Anything unrecognized is a decode error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Return,
    Tab,
    Space,
    Escape,
    Backspace,
    Delete,
    Meta,
    Shift,
    Alt,
    Control,
    Up,
    Down,
    Left,
    Right,
    /// Function keys F1..=F12.
    F(u8),
    /// A single printable character, sent as a unicode key event.
    Char(char),
}

impl FromStr for Key {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        let key = match name.as_str() {
            "enter" | "return" => Key::Return,
            "tab" => Key::Tab,
            "space" => Key::Space,
            "escape" | "esc" => Key::Escape,
            "backspace" => Key::Backspace,
            "delete" | "del" => Key::Delete,
            "cmd" | "command" | "meta" | "super" | "windows" => Key::Meta,
            "shift" => Key::Shift,
            "alt" | "opt" | "option" => Key::Alt,
            "ctrl" | "control" => Key::Control,
            "up" => Key::Up,
            "down" => Key::Down,
            "left" => Key::Left,
            "right" => Key::Right,
            _ => {
                if let Some(n) = name.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
                    if (1..=12).contains(&n) {
                        return Ok(Key::F(n));
                    }
                    return Err(format!("unsupported function key: {s}"));
                }
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Key::Char(c),
                    _ => return Err(format!("unsupported key: {s}")),
                }
            }
        };
        Ok(key)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Return => write!(f, "enter"),
            Key::Tab => write!(f, "tab"),
            Key::Space => write!(f, "space"),
            Key::Escape => write!(f, "escape"),
            Key::Backspace => write!(f, "backspace"),
            Key::Delete => write!(f, "delete"),
            Key::Meta => write!(f, "cmd"),
            Key::Shift => write!(f, "shift"),
            Key::Alt => write!(f, "alt"),
            Key::Control => write!(f, "ctrl"),
            Key::Up => write!(f, "up"),
            Key::Down => write!(f, "down"),
            Key::Left => write!(f, "left"),
            Key::Right => write!(f, "right"),
            Key::F(n) => write!(f, "f{n}"),
            Key::Char(c) => write!(f, "{c}"),
        }
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(DeError::custom)
    }
}

fn default_duration_ms() -> u64 {
    500
}

/// One low-level step of an action plan.
///
/// Matches the planner wire format `{"action": "...", "params": {...}}`.
/// Coordinates are normalized to `[0, 1] x [0, 1]` with the origin at the
/// top-left of the primary display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "params", rename_all = "snake_case")]
pub enum Action {
    /// Smoothly move the cursor to a normalized position.
    MoveMouse {
        x: f64,
        y: f64,
        /// Travel time in milliseconds.
        #[serde(default = "default_duration_ms")]
        duration: u64,
    },
    MouseDown {
        #[serde(default)]
        button: MouseButton,
    },
    MouseUp {
        #[serde(default)]
        button: MouseButton,
    },
    /// Compound press-hold-release at the current cursor position.
    Click {
        #[serde(default)]
        button: MouseButton,
    },
    KeyPress {
        key: Key,
    },
    KeyRelease {
        key: Key,
    },
    /// Enter literal text via clipboard paste. `type` is the legacy name.
    #[serde(alias = "type")]
    PasteText {
        text: String,
    },
    /// Suspend between actions, in milliseconds.
    Delay {
        #[serde(default = "default_duration_ms")]
        duration: u64,
    },
    /// Scroll by pixel deltas at the current cursor position.
    Scroll {
        #[serde(default)]
        dx: i32,
        #[serde(default)]
        dy: i32,
    },
    /// Release every pressed key and button.
    AllRelease,
    /// Planner signal: re-plan with a new goal, skipping validation.
    Resubmit {
        prompt: String,
    },
    /// Planner signal: the plan believes the goal is reached.
    Finish,
    /// Planner signal: the goal is unreachable from the current screen.
    Fail,
}

/// One planning iteration's output. Immutable once received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPlan {
    #[serde(default)]
    pub thought: String,
    /// The planner wire format calls this field `tasks`.
    #[serde(alias = "tasks")]
    pub actions: Vec<Action>,
}

/// Validator verdict for one iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub success: bool,
    #[serde(default)]
    pub summary: String,
    /// Corrective follow-up goal. Required to keep iterating after a
    /// failed validation; without it the run terminates.
    #[serde(default, alias = "nextPrompt")]
    pub next_prompt: Option<String>,
}
