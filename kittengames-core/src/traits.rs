// ABOUTME: Browser seams the core is written against: host window, popup, document chrome, embedded frame
// ABOUTME: Real browsers, the HTTP host and test doubles all implement these traits

use crate::save::GameData;
use thiserror::Error;
use tokio::sync::mpsc;

// =============================================================================
// Document Chrome
// =============================================================================

/// Tab title and favicon of a document.
pub trait DocumentChrome: Send + Sync {
    fn set_title(&self, title: &str);
    fn set_favicon(&self, href: &str);
}

// =============================================================================
// Host Window
// =============================================================================

/// A window opened with `window.open`.
pub trait PopupWindow: Send {
    /// Synchronously replace the popup's document with `html`.
    fn write_document(&mut self, html: &str);
}

/// The top-level page hosting the catalog and the game frame.
///
/// Methods take `&self`; implementations use interior mutability so guards
/// and listener tasks can hold a shared handle.
pub trait HostWindow: DocumentChrome {
    /// Navigate the current document.
    fn navigate(&self, url: &str);

    /// `window.open(url, target)`. `None` means the popup was blocked.
    fn open(&self, url: &str, target: &str) -> Option<Box<dyn PopupWindow>>;

    /// Blocking `alert()`.
    fn alert(&self, message: &str);

    /// Install a `beforeunload` handler that forces the native leave-site prompt.
    fn install_before_unload(&self);

    /// Remove the `beforeunload` handler if one is installed.
    fn remove_before_unload(&self);

    fn reload(&self);
    fn history_back(&self);
    fn history_forward(&self);
    fn toggle_fullscreen(&self);
    fn exit_fullscreen(&self);
    fn close(&self);
}

// =============================================================================
// Embedded Frame
// =============================================================================

/// Raw keyboard event observed in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyEvent {
    Down(String),
    Up(String),
    Blur,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameAccessError {
    #[error("Frame document is cross-origin")]
    CrossOrigin,
    #[error("Frame has no document yet")]
    NotLoaded,
}

/// The game iframe as seen from the host.
pub trait EmbeddedFrame: Send + Sync {
    /// Attach keydown/keyup listeners directly to the frame document.
    ///
    /// Only works for same-origin frames; cross-origin access fails and the
    /// host falls back to the message protocol.
    fn same_origin_keys(&self) -> Result<mpsc::UnboundedReceiver<KeyEvent>, FrameAccessError>;
}

// =============================================================================
// Frame Storage
// =============================================================================

/// Client-side storage inside the game frame (localStorage, cookies, IndexedDB).
pub trait FrameStorage: Send {
    fn extract(&self) -> anyhow::Result<GameData>;
    fn restore(&mut self, data: &GameData) -> anyhow::Result<()>;
}
