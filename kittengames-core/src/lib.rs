// ABOUTME: Platform-agnostic core of the kittengames front-end
// ABOUTME: Hotkeys, cross-frame messaging, launch modes, save files and the catalog cache

pub mod actions;
pub mod catalog;
pub mod config;
pub mod frame;
pub mod hotkeys;
pub mod keys;
pub mod launch;
pub mod messenger;
pub mod paths;
pub mod protocol;
pub mod save;
pub mod script;
pub mod session;
pub mod settings;
pub mod storage;
pub mod subscription;
pub mod traits;

pub use traits::{
    // Host page
    DocumentChrome, HostWindow, PopupWindow,
    // Game frame
    EmbeddedFrame, FrameAccessError, FrameStorage, KeyEvent,
};

pub use catalog::{CatalogEntry, CatalogError, CatalogSource, GameCatalogCache};
pub use config::Config;
pub use hotkeys::{Hotkey, HotkeyAction, HotkeyDef, HotkeyError, HotkeyStore};
pub use launch::{LaunchError, LaunchOutcome, LaunchPlan, Launcher};
pub use messenger::{MessengerConfig, MessengerError, MessengerHandle};
pub use protocol::FrameMessage;
pub use save::{GameData, SaveBundle, SaveError, SaveManager};
pub use session::{HostSession, SessionDeps};
pub use settings::{CloakSettings, LaunchSettings, OpenMode, SettingsStore};
pub use storage::{KeyValueStore, SharedStore};
