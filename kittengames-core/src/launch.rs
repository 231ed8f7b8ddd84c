// ABOUTME: Decides how a game opens (same tab, new tab, cloaked about:blank) and carries it out
// ABOUTME: Also owns the confirm-close beforeunload guard and slug-to-url resolution before opening

use crate::catalog::{CatalogEntry, CatalogError, GameCatalogCache};
use crate::settings::{CloakSettings, LaunchSettings, OpenMode, SettingsStore};
use crate::traits::HostWindow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use url::Url;

pub const POPUP_BLOCKED_MESSAGE: &str =
    "Popup blocked! Allow popups for this site to use about:blank mode. Opening in a new tab instead.";

/// What the launcher is going to do. Computed without side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchPlan {
    SameTab { url: String },
    NewTab { url: String },
    AboutBlank { url: String },
}

impl LaunchPlan {
    pub fn url(&self) -> &str {
        match self {
            Self::SameTab { url } | Self::NewTab { url } | Self::AboutBlank { url } => url,
        }
    }
}

/// What actually happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    Navigated,
    /// `opened` is false when the browser refused the new tab.
    NewTab { opened: bool },
    Cloaked,
    /// The about:blank popup was blocked; the user was alerted and the raw
    /// url was opened in a new tab instead.
    PopupBlocked { fallback_opened: bool },
}

pub fn plan(settings: &LaunchSettings, url: &str, entry_newtab: bool) -> LaunchPlan {
    let url = url.to_string();
    if entry_newtab {
        return LaunchPlan::NewTab { url };
    }
    match settings.open_mode {
        OpenMode::SameTab => LaunchPlan::SameTab { url },
        OpenMode::NewTab => LaunchPlan::NewTab { url },
        OpenMode::AboutBlank => LaunchPlan::AboutBlank { url },
    }
}

pub fn html_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Self-contained page with a full-bleed iframe, written into the popup.
pub fn cloaked_document(url: &str, cloak: &CloakSettings) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<link rel="icon" href="{icon}">
<style>
html, body {{ margin: 0; padding: 0; height: 100%; overflow: hidden; background: #000; }}
iframe {{ position: fixed; inset: 0; width: 100%; height: 100%; border: none; }}
</style>
</head>
<body>
<iframe src="{src}" allow="fullscreen; autoplay; gamepad; clipboard-write" allowfullscreen></iframe>
</body>
</html>
"#,
        title = html_escape(cloak.title()),
        icon = html_escape(cloak.icon()),
        src = html_escape(url),
    )
}

/// Executes launch plans against the host window.
pub struct Launcher {
    window: Arc<dyn HostWindow>,
    guard_installed: AtomicBool,
}

impl Launcher {
    pub fn new(window: Arc<dyn HostWindow>) -> Self {
        Self {
            window,
            guard_installed: AtomicBool::new(false),
        }
    }

    pub fn launch(
        &self,
        settings: &LaunchSettings,
        url: &str,
        cloak: &CloakSettings,
    ) -> LaunchOutcome {
        self.execute(&plan(settings, url, false), cloak)
    }

    pub fn execute(&self, plan: &LaunchPlan, cloak: &CloakSettings) -> LaunchOutcome {
        let window = self.window.as_ref();
        let outcome = match plan {
            LaunchPlan::SameTab { url } => {
                // A stale guard would prompt on our own navigation
                self.remove_unload_guard();
                window.navigate(url);
                LaunchOutcome::Navigated
            }
            LaunchPlan::NewTab { url } => LaunchOutcome::NewTab {
                opened: window.open(url, "_blank").is_some(),
            },
            LaunchPlan::AboutBlank { url } => match window.open("about:blank", "_blank") {
                Some(mut popup) => {
                    popup.write_document(&cloaked_document(url, cloak));
                    LaunchOutcome::Cloaked
                }
                None => {
                    tracing::warn!(url = %url, "about:blank popup blocked, falling back to new tab");
                    window.alert(POPUP_BLOCKED_MESSAGE);
                    LaunchOutcome::PopupBlocked {
                        fallback_opened: window.open(url, "_blank").is_some(),
                    }
                }
            },
        };
        tracing::info!(url = %plan.url(), outcome = ?outcome, "Game launched");
        outcome
    }

    /// Install or remove the beforeunload guard to match `confirm_close`.
    pub fn sync_unload_guard(&self, settings: &LaunchSettings) {
        if settings.confirm_close {
            if !self.guard_installed.swap(true, Ordering::SeqCst) {
                self.window.install_before_unload();
                tracing::debug!("Installed close confirmation guard");
            }
        } else {
            self.remove_unload_guard();
        }
    }

    pub fn unload_guard_installed(&self) -> bool {
        self.guard_installed.load(Ordering::SeqCst)
    }

    pub fn remove_unload_guard(&self) {
        if self.guard_installed.swap(false, Ordering::SeqCst) {
            self.window.remove_before_unload();
            tracing::debug!("Removed close confirmation guard");
        }
    }
}

impl Drop for Launcher {
    fn drop(&mut self) {
        self.remove_unload_guard();
    }
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("No game named '{0}' in the catalog")]
    UnknownGame(String),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// A catalog entry with its url resolved, ready to open synchronously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGame {
    pub entry: CatalogEntry,
    pub url: Url,
}

/// Opens catalog games by slug.
///
/// Resolution is async (it may hit the catalog); opening is not, so callers
/// resolve first and open inside the user gesture.
pub struct GameLauncher {
    catalog: Arc<GameCatalogCache>,
    settings: SettingsStore,
    launcher: Arc<Launcher>,
}

impl GameLauncher {
    pub fn new(
        catalog: Arc<GameCatalogCache>,
        settings: SettingsStore,
        launcher: Arc<Launcher>,
    ) -> Self {
        Self {
            catalog,
            settings,
            launcher,
        }
    }

    pub async fn resolve(&self, slug: &str) -> Result<ResolvedGame, LaunchError> {
        let entry = self
            .catalog
            .find_by_slug(slug)
            .await?
            .ok_or_else(|| LaunchError::UnknownGame(slug.to_string()))?;
        let url = entry.play_url(self.catalog.base_url())?;
        Ok(ResolvedGame { entry, url })
    }

    /// Plan for a resolved game under the current settings.
    pub fn plan_for(&self, game: &ResolvedGame) -> LaunchPlan {
        plan(&self.settings.launch(), game.url.as_str(), game.entry.opens_in_new_tab())
    }

    pub fn open(&self, game: &ResolvedGame) -> LaunchOutcome {
        let plan = self.plan_for(game);
        self.launcher.execute(&plan, &self.settings.cloak())
    }

    pub async fn launch_slug(&self, slug: &str) -> Result<LaunchOutcome, LaunchError> {
        let game = self.resolve(slug).await?;
        Ok(self.open(&game))
    }
}
