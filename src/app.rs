// ABOUTME: Application wiring shared by the CLI and the HTTP host service
// ABOUTME: Opens the settings database, hotkey store and catalog cache from configuration

use anyhow::{Context, Result};
use kittengames_core::catalog::{CatalogSource, GameCatalogCache, HttpCatalogSource};
use kittengames_core::config::Config;
use kittengames_core::hotkeys::HotkeyStore;
use kittengames_core::settings::SettingsStore;
use kittengames_core::storage::{SharedStore, SqliteStore};
use std::sync::Arc;

/// Long-lived services. Cheap to share behind an `Arc`.
pub struct App {
    pub config: Config,
    pub store: SharedStore,
    pub hotkeys: Arc<HotkeyStore>,
    pub settings: SettingsStore,
    pub catalog: Arc<GameCatalogCache>,
}

impl App {
    /// Open persistent storage and the HTTP catalog source described by `config`.
    pub fn open(config: Config) -> Result<Self> {
        let data_dir = config.storage.data_dir();
        let store = SqliteStore::open(&data_dir)
            .with_context(|| format!("Failed to open settings in {}", data_dir.display()))?;
        tracing::info!(data_dir = %data_dir.display(), "Settings store opened");

        let source = HttpCatalogSource::new(config.catalog.url()?)
            .context("Failed to build catalog HTTP client")?;
        Self::with_parts(config, Arc::new(store), Arc::new(source))
    }

    /// Build from explicit parts. Used by tests and embedders.
    pub fn with_parts(
        config: Config,
        store: SharedStore,
        source: Arc<dyn CatalogSource>,
    ) -> Result<Self> {
        let hotkeys = Arc::new(HotkeyStore::open(store.clone()));
        if hotkeys.seed_defaults()? {
            tracing::info!("Seeded default hotkeys");
        }
        let settings = SettingsStore::new(store.clone());
        let catalog = Arc::new(GameCatalogCache::with_ttl(
            source,
            config.catalog.base_url()?,
            config.catalog.ttl(),
        ));
        Ok(Self {
            config,
            store,
            hotkeys,
            settings,
            catalog,
        })
    }
}
