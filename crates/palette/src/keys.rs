#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Keys the palette reacts to; text edits arrive through `Palette::on_input`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Key {
    Up,
    Down,
    Tab,
    Enter,
    Escape,
}

impl Key {
    /// Parse a key name as typed in the REPL (`:up`, `down`, `esc`, ...).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().trim_start_matches(':').to_ascii_lowercase().as_str() {
            "up" => Some(Key::Up),
            "down" => Some(Key::Down),
            "tab" => Some(Key::Tab),
            "enter" | "ret" => Some(Key::Enter),
            "esc" | "escape" => Some(Key::Escape),
            _ => None,
        }
    }
}
