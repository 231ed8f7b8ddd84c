// ABOUTME: Key normalization, held-key tracking and hotkey matching for keyboard input
// ABOUTME: Also provides the KeyRecorder used when a user captures a new key combination

use crate::hotkeys::Hotkey;

/// Map a raw `KeyboardEvent.key` value to its canonical token.
///
/// `' '` becomes `Space`, `Control` becomes `Ctrl`, `Meta` becomes `Cmd`.
/// Single printable characters are lower-cased so `Q` and `q` are the same key.
/// Every other name passes through unchanged.
pub fn normalize_key(raw: &str) -> String {
    match raw {
        " " => "Space".to_string(),
        "Control" => "Ctrl".to_string(),
        "Meta" => "Cmd".to_string(),
        other => {
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if !c.is_control() => c.to_lowercase().collect(),
                _ => other.to_string(),
            }
        }
    }
}

fn normalized_sorted<S: AsRef<str>>(keys: &[S]) -> Vec<String> {
    let mut out: Vec<String> = keys.iter().map(|k| normalize_key(k.as_ref())).collect();
    out.sort();
    out
}

/// Order-independent set equality between a configured combo and the held keys.
pub fn keys_match<A: AsRef<str>, B: AsRef<str>>(configured: &[A], pressed: &[B]) -> bool {
    if configured.len() != pressed.len() {
        return false;
    }
    normalized_sorted(configured) == normalized_sorted(pressed)
}

/// Human readable combo, e.g. `Ctrl + Shift + Q`.
pub fn format_combo<S: AsRef<str>>(keys: &[S]) -> String {
    keys.iter()
        .map(|k| {
            let key = normalize_key(k.as_ref());
            if key.chars().count() == 1 {
                key.to_uppercase()
            } else {
                key
            }
        })
        .collect::<Vec<_>>()
        .join(" + ")
}

/// Set of keys currently held down, in press order.
#[derive(Debug, Default, Clone)]
pub struct PressedKeys {
    keys: Vec<String>,
}

impl PressedKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_down(&mut self, raw: &str) {
        let key = normalize_key(raw);
        if !self.keys.contains(&key) {
            self.keys.push(key);
        }
    }

    /// Release a key. Releasing the last held key leaves the set empty, which
    /// is what keeps an earlier unrelated combo from leaking into the next one.
    pub fn key_up(&mut self, raw: &str) {
        let key = normalize_key(raw);
        self.keys.retain(|k| k != &key);
    }

    /// Window lost focus; keyup events will never arrive for held keys.
    pub fn blur(&mut self) {
        self.keys.clear();
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.keys.clone()
    }
}

/// Matches live keyboard input against a list of hotkeys.
///
/// Used on both sides of the frame boundary: the host for its own document and
/// same-origin frames, the frame agent for keys pressed inside the game.
#[derive(Debug, Default)]
pub struct HotkeyMatcher {
    pressed: PressedKeys,
}

impl HotkeyMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a keydown and return the first enabled hotkey (in the given
    /// order) whose key set equals the held keys. Held state is cleared on a
    /// match.
    pub fn on_key_down(&mut self, raw: &str, hotkeys: &[Hotkey]) -> Option<Hotkey> {
        self.pressed.key_down(raw);
        let held = self.pressed.snapshot();
        let hit = hotkeys
            .iter()
            .filter(|h| h.enabled)
            .find(|h| keys_match(&h.keys, &held))
            .cloned();
        if let Some(ref hotkey) = hit {
            tracing::debug!(hotkey_id = %hotkey.id, keys = ?held, "Hotkey matched");
            self.pressed.clear();
        }
        hit
    }

    pub fn on_key_up(&mut self, raw: &str) {
        self.pressed.key_up(raw);
    }

    pub fn on_blur(&mut self) {
        self.pressed.blur();
    }

    pub fn held(&self) -> Vec<String> {
        self.pressed.snapshot()
    }
}

/// State of a [`KeyRecorder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
    Finished(Vec<String>),
    Cancelled,
}

/// Captures a key combination from the settings UI.
///
/// Keys are collected in press order while any key is held. When every key has
/// been released the combination is complete. Pressing Escape on its own
/// cancels.
#[derive(Debug)]
pub struct KeyRecorder {
    state: RecorderState,
    recorded: Vec<String>,
    held: PressedKeys,
}

impl Default for KeyRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyRecorder {
    pub fn new() -> Self {
        Self {
            state: RecorderState::Idle,
            recorded: Vec::new(),
            held: PressedKeys::new(),
        }
    }

    pub fn start(&mut self) {
        self.state = RecorderState::Recording;
        self.recorded.clear();
        self.held.clear();
    }

    pub fn cancel(&mut self) {
        self.state = RecorderState::Cancelled;
        self.recorded.clear();
        self.held.clear();
    }

    pub fn state(&self) -> &RecorderState {
        &self.state
    }

    /// Keys captured so far, for live display while recording.
    pub fn recorded(&self) -> &[String] {
        &self.recorded
    }

    pub fn key_down(&mut self, raw: &str) {
        if self.state != RecorderState::Recording {
            return;
        }
        let key = normalize_key(raw);
        if key == "Escape" && self.recorded.is_empty() {
            self.cancel();
            return;
        }
        self.held.key_down(raw);
        if !self.recorded.contains(&key) {
            self.recorded.push(key);
        }
    }

    pub fn key_up(&mut self, raw: &str) {
        if self.state != RecorderState::Recording {
            return;
        }
        self.held.key_up(raw);
        if self.held.is_empty() && !self.recorded.is_empty() {
            self.state = RecorderState::Finished(std::mem::take(&mut self.recorded));
        }
    }

    /// Take the finished combination, resetting the recorder to idle.
    pub fn take(&mut self) -> Option<Vec<String>> {
        match std::mem::replace(&mut self.state, RecorderState::Idle) {
            RecorderState::Finished(keys) => Some(keys),
            other => {
                self.state = other;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkeys::{Hotkey, HotkeyAction};

    fn hotkey(id: &str, keys: &[&str]) -> Hotkey {
        Hotkey {
            id: id.to_string(),
            keys: keys.iter().map(|k| k.to_string()).collect(),
            action: HotkeyAction::Refresh,
            enabled: true,
            description: None,
            created_at: 0,
        }
    }

    #[test]
    fn test_normalize_key_aliases() {
        assert_eq!(normalize_key(" "), "Space");
        assert_eq!(normalize_key("Control"), "Ctrl");
        assert_eq!(normalize_key("Meta"), "Cmd");
        assert_eq!(normalize_key("Q"), "q");
        assert_eq!(normalize_key("Shift"), "Shift");
        assert_eq!(normalize_key("ArrowUp"), "ArrowUp");
    }

    #[test]
    fn test_keys_match_is_order_independent() {
        assert!(keys_match(&["Ctrl", "q"], &["q", "Control"]));
        assert!(keys_match(&["q", "Control"], &["Ctrl", "q"]));
        assert!(keys_match(&["Ctrl", "Shift", "Q"], &["Ctrl", "Shift", "Q"]));
    }

    #[test]
    fn test_keys_match_requires_equal_length() {
        assert!(!keys_match(&["Ctrl", "q"], &["Ctrl", "q", "Shift"]));
        assert!(!keys_match(&["Ctrl", "Alt", "q"], &["q"]));
    }

    #[test]
    fn test_release_all_resets_pressed_state() {
        let hotkeys = vec![hotkey("a", &["Ctrl", "Alt", "q"])];
        let mut matcher = HotkeyMatcher::new();

        // Ctrl+Alt+Z matches nothing
        assert!(matcher.on_key_down("Control", &hotkeys).is_none());
        assert!(matcher.on_key_down("Alt", &hotkeys).is_none());
        assert!(matcher.on_key_down("z", &hotkeys).is_none());
        matcher.on_key_up("z");
        matcher.on_key_up("Alt");
        matcher.on_key_up("Control");
        assert!(matcher.held().is_empty());

        // Q alone must not complete the three-key combo
        assert!(matcher.on_key_down("q", &hotkeys).is_none());
    }

    #[test]
    fn test_match_clears_held_keys() {
        let hotkeys = vec![hotkey("a", &["Ctrl", "q"])];
        let mut matcher = HotkeyMatcher::new();
        assert!(matcher.on_key_down("Control", &hotkeys).is_none());
        let hit = matcher.on_key_down("Q", &hotkeys).unwrap();
        assert_eq!(hit.id, "a");
        assert!(matcher.held().is_empty());
    }

    #[test]
    fn test_disabled_hotkeys_never_match() {
        let mut hk = hotkey("a", &["q"]);
        hk.enabled = false;
        let mut matcher = HotkeyMatcher::new();
        assert!(matcher.on_key_down("q", &[hk]).is_none());
    }

    #[test]
    fn test_blur_clears_held_keys() {
        let hotkeys = vec![hotkey("a", &["Ctrl", "q"])];
        let mut matcher = HotkeyMatcher::new();
        matcher.on_key_down("Control", &hotkeys);
        matcher.on_blur();
        assert!(matcher.on_key_down("q", &hotkeys).is_none());
    }

    #[test]
    fn test_recorder_captures_combo_on_release() {
        let mut recorder = KeyRecorder::new();
        recorder.start();
        recorder.key_down("Control");
        recorder.key_down("Shift");
        recorder.key_down("K");
        assert_eq!(recorder.recorded(), &["Ctrl", "Shift", "k"]);
        recorder.key_up("K");
        recorder.key_up("Shift");
        assert_eq!(recorder.state(), &RecorderState::Recording);
        recorder.key_up("Control");
        assert_eq!(
            recorder.take(),
            Some(vec!["Ctrl".to_string(), "Shift".to_string(), "k".to_string()])
        );
        assert_eq!(recorder.state(), &RecorderState::Idle);
    }

    #[test]
    fn test_recorder_escape_cancels() {
        let mut recorder = KeyRecorder::new();
        recorder.start();
        recorder.key_down("Escape");
        assert_eq!(recorder.state(), &RecorderState::Cancelled);
        assert!(recorder.take().is_none());
    }

    #[test]
    fn test_format_combo() {
        assert_eq!(format_combo(&["Control", "q"]), "Ctrl + Q");
        assert_eq!(format_combo(&[" "]), "Space");
    }
}
