// ABOUTME: Game catalog entries, slug helpers and the time-boxed catalog cache
// ABOUTME: Fetches the remote JSON list over HTTP and serves stale data when a refresh fails

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use url::Url;

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Catalog request failed: {0}")]
    Http(String),
    #[error("Catalog server returned HTTP {0}")]
    Status(u16),
    #[error("Catalog response is not a valid game list: {0}")]
    Decode(String),
    #[error("Game '{0}' has no url or path")]
    MissingUrl(String),
    #[error("Invalid game url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// One game in the remote catalog. Read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, alias = "thumbnail")]
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub newtab: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added: Option<String>,
}

impl CatalogEntry {
    pub fn slug(&self) -> String {
        slugify(&self.name)
    }

    /// Entries flagged `newtab` refuse to run inside a frame.
    pub fn opens_in_new_tab(&self) -> bool {
        self.newtab.unwrap_or(false)
    }

    /// Absolute URL of the game. Relative urls and paths resolve against `base`.
    pub fn play_url(&self, base: &Url) -> Result<Url, CatalogError> {
        let present = |s: &&str| !s.trim().is_empty();
        let raw = self
            .url
            .as_deref()
            .filter(present)
            .or_else(|| self.path.as_deref().filter(present))
            .ok_or_else(|| CatalogError::MissingUrl(self.name.clone()))?;
        base.join(raw.trim()).map_err(|e| CatalogError::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })
    }

    fn added_date(&self) -> Option<chrono::NaiveDate> {
        let added = self.added.as_deref()?;
        chrono::NaiveDate::parse_from_str(added.get(..10)?, "%Y-%m-%d").ok()
    }
}

/// Lowercase, whitespace runs collapsed to a single `-`.
pub fn slugify(name: &str) -> String {
    name.split_whitespace()
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

fn rot13(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            'a'..='z' => (((c as u8 - b'a') + 13) % 26 + b'a') as char,
            'A'..='Z' => (((c as u8 - b'A') + 13) % 26 + b'A') as char,
            _ => c,
        })
        .collect()
}

/// Obfuscated route code for a game name. Not a security measure.
pub fn rot13_encode(name: &str) -> String {
    rot13(&slugify(name))
}

/// Slug back from a route code.
pub fn rot13_decode(code: &str) -> String {
    slugify(&rot13(code))
}

pub fn play_path(name: &str) -> String {
    format!("/play/{}", rot13_encode(name))
}

// ─── Sources ────────────────────────────────────────────────────

#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<CatalogEntry>, CatalogError>;
}

/// Plain GET of a static JSON array.
pub struct HttpCatalogSource {
    client: reqwest::Client,
    url: Url,
}

impl HttpCatalogSource {
    pub fn new(url: Url) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(concat!("kittengames/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CatalogError::Http(e.to_string()))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
    async fn fetch(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| CatalogError::Http(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status(status.as_u16()));
        }
        response
            .json::<Vec<CatalogEntry>>()
            .await
            .map_err(|e| CatalogError::Decode(e.to_string()))
    }
}

// ─── Cache ──────────────────────────────────────────────────────

struct Snapshot {
    entries: Arc<Vec<CatalogEntry>>,
    fetched_at: Instant,
}

/// In-memory cache over a [`CatalogSource`].
///
/// The lock is held across the fetch, so concurrent callers share one
/// request instead of stampeding the source.
pub struct GameCatalogCache {
    source: Arc<dyn CatalogSource>,
    base_url: Url,
    ttl: Duration,
    snapshot: Mutex<Option<Snapshot>>,
}

impl GameCatalogCache {
    pub fn new(source: Arc<dyn CatalogSource>, base_url: Url) -> Self {
        Self::with_ttl(source, base_url, DEFAULT_TTL)
    }

    pub fn with_ttl(source: Arc<dyn CatalogSource>, base_url: Url, ttl: Duration) -> Self {
        Self {
            source,
            base_url,
            ttl,
            snapshot: Mutex::new(None),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn get_catalog(
        &self,
        force_refresh: bool,
    ) -> Result<Arc<Vec<CatalogEntry>>, CatalogError> {
        let mut snapshot = self.snapshot.lock().await;

        if let Some(cached) = snapshot.as_ref() {
            if !force_refresh && cached.fetched_at.elapsed() < self.ttl {
                return Ok(Arc::clone(&cached.entries));
            }
        }

        match self.source.fetch().await {
            Ok(entries) => {
                tracing::info!(count = entries.len(), "Fetched game catalog");
                let entries = Arc::new(entries);
                *snapshot = Some(Snapshot {
                    entries: Arc::clone(&entries),
                    fetched_at: Instant::now(),
                });
                Ok(entries)
            }
            Err(e) => match snapshot.as_ref() {
                Some(cached) => {
                    tracing::warn!(error = %e, "Catalog fetch failed, serving stale copy");
                    Ok(Arc::clone(&cached.entries))
                }
                None => {
                    tracing::error!(error = %e, "Catalog fetch failed with nothing cached");
                    Err(e)
                }
            },
        }
    }

    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<CatalogEntry>, CatalogError> {
        let wanted = slugify(slug);
        let catalog = self.get_catalog(false).await?;
        Ok(catalog.iter().find(|e| e.slug() == wanted).cloned())
    }

    /// Case-insensitive substring match on the game name.
    pub async fn search(&self, query: &str) -> Result<Vec<CatalogEntry>, CatalogError> {
        let needle = query.trim().to_lowercase();
        let catalog = self.get_catalog(false).await?;
        Ok(catalog
            .iter()
            .filter(|e| needle.is_empty() || e.name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    /// Newest `limit` entries by `added` date. Undated entries are skipped.
    pub async fn recently_added(&self, limit: usize) -> Result<Vec<CatalogEntry>, CatalogError> {
        let catalog = self.get_catalog(false).await?;
        let mut dated: Vec<(chrono::NaiveDate, &CatalogEntry)> = catalog
            .iter()
            .filter_map(|e| e.added_date().map(|d| (d, e)))
            .collect();
        dated.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(dated
            .into_iter()
            .take(limit)
            .map(|(_, e)| e.clone())
            .collect())
    }
}
