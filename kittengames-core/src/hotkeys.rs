// ABOUTME: Hotkey definitions, their actions, and the persisted HotkeyStore with CRUD operations
// ABOUTME: Every mutation is written through to the key-value store immediately

use crate::keys::{keys_match, normalize_key};
use crate::storage::{read_json, write_json, SharedStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use thiserror::Error;

/// Storage key holding the JSON array of hotkeys.
pub const HOTKEYS_KEY: &str = "kittengames-hotkeys";

/// What a hotkey does when it fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HotkeyAction {
    Redirect {
        url: String,
    },
    Refresh,
    Back,
    Forward,
    Fullscreen,
    Escape,
    CloseTab,
    NewTab,
    /// User script run through the sandboxed script engine. `attributes` are
    /// injected into the script's scope by name.
    Javascript {
        script: String,
        #[serde(default)]
        attributes: BTreeMap<String, String>,
    },
}

impl HotkeyAction {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Redirect { .. } => "redirect",
            Self::Refresh => "refresh",
            Self::Back => "back",
            Self::Forward => "forward",
            Self::Fullscreen => "fullscreen",
            Self::Escape => "escape",
            Self::CloseTab => "close-tab",
            Self::NewTab => "new-tab",
            Self::Javascript { .. } => "javascript",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hotkey {
    pub id: String,
    pub keys: Vec<String>,
    pub action: HotkeyAction,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Creation time in epoch milliseconds; drives match priority.
    #[serde(default)]
    pub created_at: i64,
}

fn default_true() -> bool {
    true
}

/// User-editable part of a hotkey, used for add and update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotkeyDef {
    pub keys: Vec<String>,
    pub action: HotkeyAction,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HotkeyError {
    #[error("A hotkey needs at least one key")]
    EmptyKeys,
    #[error("Hotkey not found: {0}")]
    NotFound(String),
    #[error("Failed to persist hotkeys: {0}")]
    Storage(String),
}

/// Persisted collection of hotkeys.
///
/// Duplicate key sets are allowed; [`HotkeyStore::matching_order`] gives the
/// most recently created hotkey priority.
pub struct HotkeyStore {
    store: SharedStore,
    hotkeys: Mutex<Vec<Hotkey>>,
    seq: AtomicU64,
}

impl HotkeyStore {
    /// Load hotkeys from storage. A corrupt list is discarded and the store
    /// starts empty.
    pub fn open(store: SharedStore) -> Self {
        let hotkeys: Vec<Hotkey> = read_json(store.as_ref(), HOTKEYS_KEY).unwrap_or_default();
        tracing::debug!(count = hotkeys.len(), "Loaded hotkeys");
        Self {
            store,
            hotkeys: Mutex::new(hotkeys),
            seq: AtomicU64::new(0),
        }
    }

    /// Write the starter bindings if hotkeys were never saved before.
    pub fn seed_defaults(&self) -> Result<bool, HotkeyError> {
        let never_written = matches!(self.store.get(HOTKEYS_KEY), Ok(None));
        if !never_written {
            return Ok(false);
        }
        self.add(HotkeyDef {
            keys: vec!["Ctrl".to_string(), "Shift".to_string(), "e".to_string()],
            action: HotkeyAction::Escape,
            enabled: true,
            description: Some("Exit fullscreen".to_string()),
        })?;
        Ok(true)
    }

    pub fn list(&self) -> Vec<Hotkey> {
        self.lock().clone()
    }

    pub fn get(&self, id: &str) -> Option<Hotkey> {
        self.lock().iter().find(|h| h.id == id).cloned()
    }

    pub fn add(&self, def: HotkeyDef) -> Result<String, HotkeyError> {
        let keys = validate_keys(&def.keys)?;
        let now = chrono::Utc::now().timestamp_millis();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let id = format!("hk-{}-{}", now, seq);

        self.commit(|hotkeys| {
            hotkeys.push(Hotkey {
                id: id.clone(),
                keys,
                action: def.action,
                enabled: def.enabled,
                description: def.description,
                created_at: now,
            });
            Ok(())
        })?;
        tracing::info!(hotkey_id = %id, "Hotkey added");
        Ok(id)
    }

    pub fn update(&self, id: &str, def: HotkeyDef) -> Result<(), HotkeyError> {
        let keys = validate_keys(&def.keys)?;
        self.commit(|hotkeys| {
            let hotkey = find_mut(hotkeys, id)?;
            hotkey.keys = keys;
            hotkey.action = def.action;
            hotkey.enabled = def.enabled;
            hotkey.description = def.description;
            Ok(())
        })?;
        tracing::info!(hotkey_id = %id, "Hotkey updated");
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Result<(), HotkeyError> {
        self.commit(|hotkeys| {
            let before = hotkeys.len();
            hotkeys.retain(|h| h.id != id);
            if hotkeys.len() == before {
                return Err(HotkeyError::NotFound(id.to_string()));
            }
            Ok(())
        })?;
        tracing::info!(hotkey_id = %id, "Hotkey removed");
        Ok(())
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<(), HotkeyError> {
        self.commit(|hotkeys| {
            find_mut(hotkeys, id)?.enabled = enabled;
            Ok(())
        })?;
        tracing::info!(hotkey_id = %id, enabled, "Hotkey toggled");
        Ok(())
    }

    /// Enabled hotkeys, newest first. This is the order matchers must use.
    pub fn matching_order(&self) -> Vec<Hotkey> {
        let mut ordered: Vec<Hotkey> = self
            .lock()
            .iter()
            .rev()
            .filter(|h| h.enabled)
            .cloned()
            .collect();
        // Stable sort keeps reverse insertion order for identical timestamps
        ordered.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        ordered
    }

    /// Ids of enabled hotkeys already bound to `keys`, ignoring `exclude_id`.
    pub fn conflicts(&self, keys: &[String], exclude_id: Option<&str>) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|h| h.enabled && Some(h.id.as_str()) != exclude_id)
            .filter(|h| keys_match(&h.keys, keys))
            .map(|h| h.id.clone())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Hotkey>> {
        self.hotkeys.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply `change` to a copy of the list and keep it only once storage
    /// accepted the write.
    fn commit(
        &self,
        change: impl FnOnce(&mut Vec<Hotkey>) -> Result<(), HotkeyError>,
    ) -> Result<(), HotkeyError> {
        let mut hotkeys = self.lock();
        let mut next = hotkeys.clone();
        change(&mut next)?;
        write_json(self.store.as_ref(), HOTKEYS_KEY, &next)
            .map_err(|e| HotkeyError::Storage(e.to_string()))?;
        *hotkeys = next;
        Ok(())
    }
}

fn find_mut<'a>(hotkeys: &'a mut [Hotkey], id: &str) -> Result<&'a mut Hotkey, HotkeyError> {
    hotkeys
        .iter_mut()
        .find(|h| h.id == id)
        .ok_or_else(|| HotkeyError::NotFound(id.to_string()))
}

fn validate_keys(keys: &[String]) -> Result<Vec<String>, HotkeyError> {
    let mut normalized: Vec<String> = Vec::with_capacity(keys.len());
    for key in keys.iter().filter(|k| !k.is_empty()) {
        let key = normalize_key(key);
        if !normalized.contains(&key) {
            normalized.push(key);
        }
    }
    if normalized.is_empty() {
        return Err(HotkeyError::EmptyKeys);
    }
    Ok(normalized)
}
