// ABOUTME: Typed settings store for launch mode, tab cloak and UI preferences
// ABOUTME: Wraps a swappable key-value backend and broadcasts every change to subscribers

use crate::storage::{read_json, write_json, SharedStore};
use crate::traits::DocumentChrome;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub const LAUNCH_SETTINGS_KEY: &str = "kittengames-launch-settings";
pub const CLOAK_PRESET_KEY: &str = "kittengames-cloak-preset";
pub const TAB_NAME_KEY: &str = "kittengames-tab-name";
pub const TAB_ICON_KEY: &str = "kittengames-tab-icon";
pub const STREAMING_DOMAIN_KEY: &str = "kittengames-streaming-domain";
pub const NAVBAR_POSITION_KEY: &str = "kittengames-navbar-position";
pub const HOTKEYS_ENABLED_KEY: &str = "kittengames-hotkeys-enabled";

pub const DEFAULT_TITLE: &str = "Kitten Games";
pub const DEFAULT_ICON: &str = "/favicon.ico";
pub const DEFAULT_STREAMING_DOMAIN: &str = "vidsrc.cc";

// ─── Launch ─────────────────────────────────────────────────────

/// How a game is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", from = "String")]
pub enum OpenMode {
    #[default]
    SameTab,
    NewTab,
    AboutBlank,
}

impl From<String> for OpenMode {
    fn from(value: String) -> Self {
        match value.as_str() {
            "same-tab" => Self::SameTab,
            "new-tab" => Self::NewTab,
            "about-blank" => Self::AboutBlank,
            // Removed mode, silently mapped
            "html-blob" => Self::SameTab,
            other => {
                tracing::warn!(open_mode = %other, "Unknown open mode, using same-tab");
                Self::SameTab
            }
        }
    }
}

impl std::fmt::Display for OpenMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SameTab => write!(f, "same-tab"),
            Self::NewTab => write!(f, "new-tab"),
            Self::AboutBlank => write!(f, "about-blank"),
        }
    }
}

impl std::str::FromStr for OpenMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "same-tab" => Ok(Self::SameTab),
            "new-tab" => Ok(Self::NewTab),
            "about-blank" => Ok(Self::AboutBlank),
            _ => anyhow::bail!("Unknown open mode: {}", s),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchSettings {
    #[serde(default)]
    pub open_mode: OpenMode,
    #[serde(default)]
    pub confirm_close: bool,
}

// ─── Cloak ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloakSettings {
    pub tab_name: String,
    pub tab_icon_url: String,
    pub preset_name: String,
}

impl Default for CloakSettings {
    fn default() -> Self {
        Self {
            tab_name: String::new(),
            tab_icon_url: String::new(),
            preset_name: "none".to_string(),
        }
    }
}

impl CloakSettings {
    pub fn is_active(&self) -> bool {
        !self.tab_name.is_empty() || !self.tab_icon_url.is_empty()
    }

    pub fn title(&self) -> &str {
        if self.tab_name.is_empty() {
            DEFAULT_TITLE
        } else {
            &self.tab_name
        }
    }

    pub fn icon(&self) -> &str {
        if self.tab_icon_url.is_empty() {
            DEFAULT_ICON
        } else {
            &self.tab_icon_url
        }
    }

    /// Write title and favicon to the document.
    pub fn apply(&self, chrome: &dyn DocumentChrome) {
        chrome.set_title(self.title());
        chrome.set_favicon(self.icon());
    }
}

/// Built-in disguise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CloakPreset {
    pub name: &'static str,
    pub title: &'static str,
    pub icon: &'static str,
}

pub const CLOAK_PRESETS: &[CloakPreset] = &[
    CloakPreset {
        name: "none",
        title: "",
        icon: "",
    },
    CloakPreset {
        name: "google-classroom",
        title: "Home",
        icon: "https://ssl.gstatic.com/classroom/favicon.png",
    },
    CloakPreset {
        name: "google-docs",
        title: "Google Docs",
        icon: "https://ssl.gstatic.com/docs/documents/images/kix-favicon7.ico",
    },
    CloakPreset {
        name: "google-drive",
        title: "My Drive - Google Drive",
        icon: "https://ssl.gstatic.com/images/branding/product/1x/drive_2020q4_32dp.png",
    },
    CloakPreset {
        name: "canvas",
        title: "Dashboard",
        icon: "https://du11hjcvx0uqb.cloudfront.net/dist/images/favicon-e10d657a73.ico",
    },
    CloakPreset {
        name: "khan-academy",
        title: "Dashboard | Khan Academy",
        icon: "https://cdn.kastatic.org/images/favicon.ico",
    },
    CloakPreset {
        name: "clever",
        title: "Clever | Portal",
        icon: "https://assets.clever.com/launchpad/2b0d8b2e/favicon.ico",
    },
    CloakPreset {
        name: "desmos",
        title: "Desmos | Graphing Calculator",
        icon: "https://www.desmos.com/assets/img/apps/graphing/favicon.ico",
    },
];

pub fn find_preset(name: &str) -> Option<&'static CloakPreset> {
    CLOAK_PRESETS.iter().find(|p| p.name == name)
}

// ─── Misc preferences ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NavbarPosition {
    pub x: f64,
    pub y: f64,
}

/// Notification sent to subscribers after each successful write.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsChange {
    Launch(LaunchSettings),
    Cloak(CloakSettings),
    StreamingDomain(String),
    NavbarPosition(NavbarPosition),
    HotkeysEnabled(bool),
}

// ─── Store ──────────────────────────────────────────────────────

/// Single entry point for persisted settings.
///
/// Reads go to the backend every time, so a value written by another tab is
/// picked up on the next read. Writes are last-write-wins.
#[derive(Clone)]
pub struct SettingsStore {
    store: SharedStore,
    changes: broadcast::Sender<SettingsChange>,
}

impl SettingsStore {
    pub fn new(store: SharedStore) -> Self {
        let (changes, _) = broadcast::channel(64);
        Self { store, changes }
    }

    pub fn backend(&self) -> SharedStore {
        self.store.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SettingsChange> {
        self.changes.subscribe()
    }

    fn notify(&self, change: SettingsChange) {
        // No subscribers is fine
        let _ = self.changes.send(change);
    }

    pub fn launch(&self) -> LaunchSettings {
        read_json(self.store.as_ref(), LAUNCH_SETTINGS_KEY).unwrap_or_default()
    }

    pub fn update_launch<F>(&self, f: F) -> Result<LaunchSettings>
    where
        F: FnOnce(&mut LaunchSettings),
    {
        let mut settings = self.launch();
        f(&mut settings);
        write_json(self.store.as_ref(), LAUNCH_SETTINGS_KEY, &settings)?;
        tracing::info!(
            open_mode = %settings.open_mode,
            confirm_close = settings.confirm_close,
            "Launch settings updated"
        );
        self.notify(SettingsChange::Launch(settings));
        Ok(settings)
    }

    pub fn cloak(&self) -> CloakSettings {
        let defaults = CloakSettings::default();
        let store = self.store.as_ref();
        CloakSettings {
            tab_name: read_json(store, TAB_NAME_KEY).unwrap_or(defaults.tab_name),
            tab_icon_url: read_json(store, TAB_ICON_KEY).unwrap_or(defaults.tab_icon_url),
            preset_name: read_json(store, CLOAK_PRESET_KEY).unwrap_or(defaults.preset_name),
        }
    }

    pub fn update_cloak<F>(&self, f: F) -> Result<CloakSettings>
    where
        F: FnOnce(&mut CloakSettings),
    {
        let mut cloak = self.cloak();
        f(&mut cloak);
        let store = self.store.as_ref();
        write_json(store, TAB_NAME_KEY, &cloak.tab_name)?;
        write_json(store, TAB_ICON_KEY, &cloak.tab_icon_url)?;
        write_json(store, CLOAK_PRESET_KEY, &cloak.preset_name)?;
        tracing::info!(preset = %cloak.preset_name, "Cloak settings updated");
        self.notify(SettingsChange::Cloak(cloak.clone()));
        Ok(cloak)
    }

    /// Switch to a built-in preset. `none` clears the cloak.
    pub fn set_cloak_preset(&self, name: &str) -> Result<CloakSettings> {
        let preset =
            find_preset(name).ok_or_else(|| anyhow::anyhow!("Unknown cloak preset: {}", name))?;
        self.update_cloak(|cloak| {
            cloak.preset_name = preset.name.to_string();
            cloak.tab_name = preset.title.to_string();
            cloak.tab_icon_url = preset.icon.to_string();
        })
    }

    /// Master switch for all hotkeys. On unless turned off.
    pub fn hotkeys_enabled(&self) -> bool {
        read_json(self.store.as_ref(), HOTKEYS_ENABLED_KEY).unwrap_or(true)
    }

    pub fn set_hotkeys_enabled(&self, enabled: bool) -> Result<()> {
        write_json(self.store.as_ref(), HOTKEYS_ENABLED_KEY, &enabled)?;
        tracing::info!(enabled, "Hotkeys master switch changed");
        self.notify(SettingsChange::HotkeysEnabled(enabled));
        Ok(())
    }

    pub fn streaming_domain(&self) -> String {
        read_json(self.store.as_ref(), STREAMING_DOMAIN_KEY)
            .unwrap_or_else(|| DEFAULT_STREAMING_DOMAIN.to_string())
    }

    pub fn set_streaming_domain(&self, domain: &str) -> Result<()> {
        let domain = domain.trim();
        if domain.is_empty() {
            anyhow::bail!("Streaming domain cannot be empty");
        }
        write_json(self.store.as_ref(), STREAMING_DOMAIN_KEY, domain)?;
        self.notify(SettingsChange::StreamingDomain(domain.to_string()));
        Ok(())
    }

    pub fn navbar_position(&self) -> Option<NavbarPosition> {
        read_json(self.store.as_ref(), NAVBAR_POSITION_KEY)
    }

    pub fn set_navbar_position(&self, position: NavbarPosition) -> Result<()> {
        write_json(self.store.as_ref(), NAVBAR_POSITION_KEY, &position)?;
        self.notify(SettingsChange::NavbarPosition(position));
        Ok(())
    }
}
