// ABOUTME: Root library module for the kittengames binary and HTTP host service
// ABOUTME: Re-exports configuration and paths from kittengames-core alongside app wiring and logging

pub mod app;
pub mod logging;
#[cfg(feature = "server")]
pub mod server;

// Re-export platform-agnostic modules from kittengames-core
pub use kittengames_core::config;
pub use kittengames_core::paths;

// Re-export the stores the binary wires together
pub use kittengames_core::{GameCatalogCache, HotkeyStore, SettingsStore};
