// ABOUTME: Message types exchanged between the host page and the game frame
// ABOUTME: FramePort and ParentPort stand in for postMessage with a wildcard target origin

use crate::hotkeys::Hotkey;
use crate::save::GameData;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Cross-frame message. The `type` field is the discriminant on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FrameMessage {
    /// Frame asks the host for the current hotkey configuration.
    #[serde(rename = "kittengames-hotkey-request")]
    HotkeyRequest,
    #[serde(rename = "kittengames-hotkey-config")]
    HotkeyConfig { hotkeys: Vec<Hotkey>, enabled: bool },
    /// Frame reports a hotkey it matched locally.
    #[serde(rename = "kittengames-hotkey")]
    Hotkey { hotkey: Hotkey },
    #[serde(rename = "kittengames-save-extract")]
    SaveExtract,
    #[serde(rename = "kittengames-save-data")]
    SaveData { data: GameData },
    #[serde(rename = "kittengames-save-error")]
    SaveError { error: String },
    #[serde(rename = "kittengames-save-restore")]
    SaveRestore { data: GameData },
}

impl FrameMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::HotkeyRequest => "kittengames-hotkey-request",
            Self::HotkeyConfig { .. } => "kittengames-hotkey-config",
            Self::Hotkey { .. } => "kittengames-hotkey",
            Self::SaveExtract => "kittengames-save-extract",
            Self::SaveData { .. } => "kittengames-save-data",
            Self::SaveError { .. } => "kittengames-save-error",
            Self::SaveRestore { .. } => "kittengames-save-restore",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse a message. Anything that is not one of ours is an error and
    /// receivers ignore it.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

/// Identity of a browsing context, compared the way `event.source` is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(u64);

impl FrameId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "frame-{}", self.0)
    }
}

/// A message as delivered to the host window's `message` listener.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub source: FrameId,
    pub message: FrameMessage,
}

pub type HostInbox = mpsc::UnboundedReceiver<Envelope>;

/// Sender side of the host window's message queue. Every frame that can
/// reach the host gets a clone.
#[derive(Debug, Clone)]
pub struct HostMailbox {
    tx: mpsc::UnboundedSender<Envelope>,
}

pub fn host_channel() -> (HostMailbox, HostInbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (HostMailbox { tx }, rx)
}

/// Host's handle on one frame's `contentWindow`.
#[derive(Debug, Clone)]
pub struct FramePort {
    id: FrameId,
    tx: mpsc::UnboundedSender<FrameMessage>,
}

impl FramePort {
    pub fn id(&self) -> FrameId {
        self.id
    }

    /// Fire and forget. Returns false if the frame is gone.
    pub fn post(&self, message: FrameMessage) -> bool {
        self.tx.send(message).is_ok()
    }
}

/// Frame's handle on `window.parent`.
#[derive(Debug, Clone)]
pub struct ParentPort {
    source: FrameId,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl ParentPort {
    pub fn source(&self) -> FrameId {
        self.source
    }

    pub fn post(&self, message: FrameMessage) -> bool {
        self.tx
            .send(Envelope {
                source: self.source,
                message,
            })
            .is_ok()
    }
}

/// Everything a frame needs: its parent port and its own message queue.
#[derive(Debug)]
pub struct FrameEndpoint {
    pub parent: ParentPort,
    pub inbox: mpsc::UnboundedReceiver<FrameMessage>,
}

/// Create a new frame inside the host reachable through `mailbox`.
pub fn connect_frame(mailbox: &HostMailbox) -> (FramePort, FrameEndpoint) {
    let id = FrameId::next();
    let (tx, inbox) = mpsc::unbounded_channel();
    (
        FramePort { id, tx },
        FrameEndpoint {
            parent: ParentPort {
                source: id,
                tx: mailbox.tx.clone(),
            },
            inbox,
        },
    )
}
