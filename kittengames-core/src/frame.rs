// ABOUTME: Game-frame side of the cross-frame protocol, the Rust twin of hotkeys-helper.js
// ABOUTME: Requests config, matches keys locally, reports hotkeys, and serves save/restore requests

use crate::hotkeys::Hotkey;
use crate::keys::HotkeyMatcher;
use crate::protocol::{FrameEndpoint, FrameMessage, ParentPort};
use crate::traits::{FrameStorage, KeyEvent};
use tokio::sync::mpsc;

/// Script running inside the game frame.
pub struct FrameAgent<S> {
    parent: ParentPort,
    storage: S,
    matcher: HotkeyMatcher,
    hotkeys: Vec<Hotkey>,
    enabled: bool,
}

impl<S: FrameStorage> FrameAgent<S> {
    pub fn new(parent: ParentPort, storage: S) -> Self {
        Self {
            parent,
            storage,
            matcher: HotkeyMatcher::new(),
            hotkeys: Vec::new(),
            enabled: false,
        }
    }

    pub fn hotkeys(&self) -> &[Hotkey] {
        &self.hotkeys
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Announce the frame to the parent and ask for the hotkey config.
    pub fn start(&self) {
        if !self.parent.post(FrameMessage::HotkeyRequest) {
            tracing::debug!("Parent window is gone, running without hotkeys");
        }
    }

    /// Handle a message from the parent.
    pub fn on_message(&mut self, message: FrameMessage) {
        match message {
            FrameMessage::HotkeyConfig { hotkeys, enabled } => {
                tracing::debug!(count = hotkeys.len(), enabled, "Hotkey config applied");
                self.hotkeys = hotkeys;
                self.enabled = enabled;
            }
            FrameMessage::SaveExtract => {
                let reply = match self.storage.extract() {
                    Ok(data) => FrameMessage::SaveData { data },
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to extract game storage");
                        FrameMessage::SaveError {
                            error: e.to_string(),
                        }
                    }
                };
                self.parent.post(reply);
            }
            FrameMessage::SaveRestore { data } => {
                if let Err(e) = self.storage.restore(&data) {
                    tracing::warn!(error = %e, "Failed to restore game storage");
                    self.parent.post(FrameMessage::SaveError {
                        error: e.to_string(),
                    });
                } else {
                    tracing::info!(
                        local_storage = data.local_storage.len(),
                        cookies = data.cookies.len(),
                        "Game storage restored"
                    );
                }
            }
            other => {
                tracing::debug!(kind = other.kind(), "Ignoring frame-bound message");
            }
        }
    }

    /// Handle a keyboard event inside the frame. Returns the hotkey reported
    /// to the parent, if any.
    pub fn on_key(&mut self, event: KeyEvent) -> Option<Hotkey> {
        match event {
            KeyEvent::Down(key) => {
                if !self.enabled {
                    return None;
                }
                let hotkey = self.matcher.on_key_down(&key, &self.hotkeys)?;
                self.parent.post(FrameMessage::Hotkey {
                    hotkey: hotkey.clone(),
                });
                Some(hotkey)
            }
            KeyEvent::Up(key) => {
                self.matcher.on_key_up(&key);
                None
            }
            KeyEvent::Blur => {
                self.matcher.on_blur();
                None
            }
        }
    }

    /// Run until the frame unloads (both the inbox and the key stream close).
    pub async fn run(
        mut self,
        inbox: mpsc::UnboundedReceiver<FrameMessage>,
        keys: mpsc::UnboundedReceiver<KeyEvent>,
    ) -> S {
        let mut inbox = Some(inbox);
        let mut keys = Some(keys);
        self.start();

        loop {
            tokio::select! {
                message = recv(&mut inbox), if inbox.is_some() => match message {
                    Some(message) => self.on_message(message),
                    None => inbox = None,
                },
                event = recv(&mut keys), if keys.is_some() => match event {
                    Some(event) => {
                        self.on_key(event);
                    }
                    None => keys = None,
                },
                else => break,
            }
        }
        tracing::debug!(frame = %self.parent.source(), "Frame unloaded");
        self.storage
    }
}

/// Spawn an agent for a freshly connected frame.
pub fn spawn_agent<S>(
    endpoint: FrameEndpoint,
    storage: S,
    keys: mpsc::UnboundedReceiver<KeyEvent>,
) -> tokio::task::JoinHandle<S>
where
    S: FrameStorage + 'static,
{
    let FrameEndpoint { parent, inbox } = endpoint;
    tokio::spawn(FrameAgent::new(parent, storage).run(inbox, keys))
}

async fn recv<T>(rx: &mut Option<mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => None,
    }
}
