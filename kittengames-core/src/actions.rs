// ABOUTME: Executes a triggered hotkey's action against the host window
// ABOUTME: Script actions run through the pluggable ScriptEngine with window-backed effects

use crate::hotkeys::{Hotkey, HotkeyAction};
use crate::script::{ScriptEffects, ScriptEngine, ScriptError};
use crate::traits::HostWindow;
use std::sync::Arc;

pub struct HotkeyExecutor {
    window: Arc<dyn HostWindow>,
    engine: Arc<dyn ScriptEngine>,
}

impl HotkeyExecutor {
    pub fn new(window: Arc<dyn HostWindow>, engine: Arc<dyn ScriptEngine>) -> Self {
        Self { window, engine }
    }

    pub fn execute(&self, hotkey: &Hotkey) -> Result<(), ScriptError> {
        tracing::info!(hotkey_id = %hotkey.id, action = hotkey.action.label(), "Executing hotkey");
        let result = self.execute_action(&hotkey.action);
        if let Err(ref e) = result {
            tracing::warn!(hotkey_id = %hotkey.id, error = %e, "Hotkey script failed");
        }
        result
    }

    pub fn execute_action(&self, action: &HotkeyAction) -> Result<(), ScriptError> {
        let window = self.window.as_ref();
        match action {
            HotkeyAction::Redirect { url } => window.navigate(url),
            HotkeyAction::Refresh => window.reload(),
            HotkeyAction::Back => window.history_back(),
            HotkeyAction::Forward => window.history_forward(),
            HotkeyAction::Fullscreen => window.toggle_fullscreen(),
            HotkeyAction::Escape => window.exit_fullscreen(),
            HotkeyAction::CloseTab => window.close(),
            HotkeyAction::NewTab => {
                if window.open("about:blank", "_blank").is_none() {
                    tracing::warn!("New tab was blocked");
                }
            }
            HotkeyAction::Javascript { script, attributes } => {
                let mut effects = WindowEffects { window };
                self.engine.run(script, attributes, &mut effects)?;
            }
        }
        Ok(())
    }
}

struct WindowEffects<'a> {
    window: &'a dyn HostWindow,
}

impl ScriptEffects for WindowEffects<'_> {
    fn navigate(&mut self, url: &str) {
        self.window.navigate(url);
    }

    fn open(&mut self, url: &str) {
        if self.window.open(url, "_blank").is_none() {
            tracing::warn!(url = %url, "Script popup was blocked");
        }
    }

    fn alert(&mut self, message: &str) {
        self.window.alert(message);
    }

    fn set_title(&mut self, title: &str) {
        self.window.set_title(title);
    }

    fn set_favicon(&mut self, href: &str) {
        self.window.set_favicon(href);
    }

    fn reload(&mut self) {
        self.window.reload();
    }

    fn back(&mut self) {
        self.window.history_back();
    }

    fn forward(&mut self) {
        self.window.history_forward();
    }
}
