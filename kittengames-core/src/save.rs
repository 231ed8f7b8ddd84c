// ABOUTME: Portable save-file format for game storage snapshots (.kgsave)
// ABOUTME: Encodes extracted frame storage with a metadata envelope and validates files on import

use crate::messenger::{MessengerError, MessengerHandle};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// The only scope currently written or accepted.
pub const SAVE_SCOPE: &str = "allgames";
pub const SAVE_VERSION: &str = "1.0";
pub const SAVE_EXTENSION: &str = "kgsave";

const BANNER: &str = "// meow! this is a kittengames save file, don't edit it unless you know what you're doing";

/// Client-side state extracted from inside the game frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameData {
    #[serde(default)]
    pub local_storage: BTreeMap<String, String>,
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,
    #[serde(default, rename = "indexedDB")]
    pub indexed_db: BTreeMap<String, serde_json::Value>,
    /// Extraction time in epoch milliseconds.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub url: String,
}

impl GameData {
    pub fn is_empty(&self) -> bool {
        self.local_storage.is_empty() && self.cookies.is_empty() && self.indexed_db.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveMetadata {
    pub scope: String,
    /// RFC 3339 creation time.
    pub timestamp: String,
    /// Human-readable creation time.
    pub date: String,
    pub version: String,
    pub user_agent: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveBundle {
    pub metadata: SaveMetadata,
    pub game_data: GameData,
}

impl SaveBundle {
    pub fn new(game_data: GameData, user_agent: &str, url: &str, now: DateTime<Utc>) -> Self {
        Self {
            metadata: SaveMetadata {
                scope: SAVE_SCOPE.to_string(),
                timestamp: now.to_rfc3339(),
                date: now.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
                version: SAVE_VERSION.to_string(),
                user_agent: user_agent.to_string(),
                url: url.to_string(),
            },
            game_data,
        }
    }
}

/// Encoded file ready to be offered as a download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveFile {
    pub file_name: String,
    pub contents: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SaveError {
    #[error("Not a kittengames save file: {0}")]
    NotASaveFile(String),
    #[error("Save file scope '{found}' is not supported (expected '{}')", SAVE_SCOPE)]
    ScopeMismatch { found: String },
    #[error("Save file is corrupt: {0}")]
    Corrupt(String),
}

pub fn file_name_for(now: DateTime<Utc>) -> String {
    format!(
        "kittengames-save-{}.{}",
        now.format("%Y-%m-%d_%H-%M-%S"),
        SAVE_EXTENSION
    )
}

/// Serialize a bundle into save-file text. The file name is derived from the
/// bundle's creation time.
pub fn encode(bundle: &SaveBundle) -> Result<SaveFile, SaveError> {
    let created = DateTime::parse_from_rfc3339(&bundle.metadata.timestamp)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());
    let json =
        serde_json::to_string_pretty(bundle).map_err(|e| SaveError::Corrupt(e.to_string()))?;
    Ok(SaveFile {
        file_name: file_name_for(created),
        contents: format!("{}\n{}\n", BANNER, json),
    })
}

/// Parse save-file bytes. Leading `//` and `#` comment lines are ignored.
pub fn decode(bytes: &[u8]) -> Result<SaveBundle, SaveError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| SaveError::Corrupt(format!("invalid UTF-8: {}", e)))?;
    let body = strip_comment_lines(text);
    if body.trim().is_empty() {
        return Err(SaveError::NotASaveFile("file is empty".to_string()));
    }

    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| SaveError::Corrupt(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| SaveError::NotASaveFile("expected a JSON object".to_string()))?;
    let metadata = object
        .get("metadata")
        .ok_or_else(|| SaveError::NotASaveFile("missing metadata".to_string()))?;
    if !object.contains_key("gameData") {
        return Err(SaveError::NotASaveFile("missing gameData".to_string()));
    }

    let scope = metadata.get("scope").and_then(|s| s.as_str()).unwrap_or("");
    if scope != SAVE_SCOPE {
        return Err(SaveError::ScopeMismatch {
            found: scope.to_string(),
        });
    }

    serde_json::from_value(value).map_err(|e| SaveError::Corrupt(e.to_string()))
}

fn strip_comment_lines(text: &str) -> &str {
    let mut rest = text.trim_start_matches('\u{feff}');
    loop {
        let trimmed = rest.trim_start();
        if !(trimmed.starts_with("//") || trimmed.starts_with('#')) {
            return trimmed;
        }
        rest = match trimmed.find('\n') {
            Some(end) => &trimmed[end + 1..],
            None => "",
        };
    }
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    File(#[from] SaveError),
    #[error(transparent)]
    Messenger(#[from] MessengerError),
}

/// Moves save files between the attached game frame and disk.
#[derive(Debug, Clone)]
pub struct SaveManager {
    messenger: MessengerHandle,
    user_agent: String,
}

impl SaveManager {
    pub fn new(messenger: MessengerHandle, user_agent: impl Into<String>) -> Self {
        Self {
            messenger,
            user_agent: user_agent.into(),
        }
    }

    /// Extract the frame's storage and encode it as a downloadable file.
    pub async fn export(&self, page_url: &str) -> Result<SaveFile, TransferError> {
        let data = self.messenger.request_save().await?;
        let bundle = SaveBundle::new(data, &self.user_agent, page_url, Utc::now());
        let file = encode(&bundle)?;
        tracing::info!(file_name = %file.file_name, "Save exported");
        Ok(file)
    }

    /// Validate a save file and restore it into the frame. Nothing is sent
    /// to the frame unless the whole file is valid.
    pub async fn import(&self, bytes: &[u8]) -> Result<SaveBundle, TransferError> {
        let bundle = decode(bytes).map_err(|e| {
            tracing::warn!(error = %e, "Rejected save file");
            e
        })?;
        self.messenger.restore(bundle.game_data.clone()).await?;
        tracing::info!(saved_at = %bundle.metadata.timestamp, "Save imported");
        Ok(bundle)
    }
}
