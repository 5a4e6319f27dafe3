use common::errors::AppError;
use common::http_client::UpstreamClient;
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, instrument, warn};

/// Upper bound on autocomplete suggestions per lookup.
pub const MAX_SUGGESTIONS: usize = 10;

/// One entry of the bulk city list. Unknown provider fields are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityRecord {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub coord: Option<Coordinates>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coordinates {
    pub lon: f64,
    pub lat: f64,
}

/// Immutable snapshot of the full city list, always replaced as a whole.
pub struct CityCatalog {
    cities: Vec<CityRecord>,
}

impl CityCatalog {
    fn new(cities: Vec<CityRecord>) -> Self {
        Self { cities }
    }

    pub fn len(&self) -> usize {
        self.cities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }

    /// At most [`MAX_SUGGESTIONS`] city names containing `query` as a
    /// case-insensitive substring, in list order.
    pub fn search(&self, query: &str) -> Vec<String> {
        let needle = query.to_lowercase();
        self.cities
            .iter()
            .filter(|city| city.name.to_lowercase().contains(&needle))
            .take(MAX_SUGGESTIONS)
            .map(|city| city.name.clone())
            .collect()
    }
}

/// Multi-tier store for the city list: process memory first, then a durable
/// JSON snapshot on disk, then the remote gzip bulk list.
///
/// The lazy load path never fails; when no tier yields data it settles on an
/// empty catalog so autocompletion degrades to no suggestions.
pub struct CityCatalogStore {
    client: Arc<UpstreamClient>,
    url: String,
    path: PathBuf,
    max_age: Duration,
    snapshot: RwLock<Option<Arc<CityCatalog>>>,
    load_lock: Mutex<()>,
}

impl CityCatalogStore {
    pub fn new(client: Arc<UpstreamClient>, url: String, path: PathBuf, max_age: Duration) -> Self {
        Self {
            client,
            url,
            path,
            max_age,
            snapshot: RwLock::new(None),
            load_lock: Mutex::new(()),
        }
    }

    /// Autocomplete lookup. Empty queries return no suggestions without
    /// touching the catalog; lookups never fail.
    pub async fn search(&self, query: &str) -> Vec<String> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }
        self.get_or_load().await.search(query)
    }

    /// Returns the in-memory snapshot, loading it on first access.
    pub async fn get_or_load(&self) -> Arc<CityCatalog> {
        {
            let snapshot = self.snapshot.read().await;
            if let Some(catalog) = snapshot.as_ref() {
                return catalog.clone();
            }
        }

        let _guard = self.load_lock.lock().await;
        // Another task may have finished the load while we waited.
        {
            let snapshot = self.snapshot.read().await;
            if let Some(catalog) = snapshot.as_ref() {
                return catalog.clone();
            }
        }

        let catalog = Arc::new(self.load().await);
        *self.snapshot.write().await = Some(catalog.clone());
        catalog
    }

    /// Force-fetches the remote list, persists it, and swaps the in-memory
    /// snapshot. Unlike the lazy path, failures here surface to the caller.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<usize, AppError> {
        let _guard = self.load_lock.lock().await;

        let catalog = Arc::new(CityCatalog::new(self.fetch_and_persist().await?));
        let count = catalog.len();
        *self.snapshot.write().await = Some(catalog);

        info!(count, "City list refreshed");
        Ok(count)
    }

    async fn load(&self) -> CityCatalog {
        let disk = self.read_snapshot().await.unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "Discarding unreadable city list snapshot");
            None
        });

        match disk {
            Some(cities) if !self.snapshot_is_stale().await => {
                info!(count = cities.len(), "Loaded city list snapshot from disk");
                CityCatalog::new(cities)
            }
            stale => match self.fetch_and_persist().await {
                Ok(cities) => {
                    info!(count = cities.len(), "City list fetched and cached successfully");
                    CityCatalog::new(cities)
                }
                Err(e) => {
                    warn!(error = %e, "Failed to fetch or process new city list");
                    match stale {
                        Some(cities) => {
                            warn!(count = cities.len(), "Serving stale city list snapshot");
                            CityCatalog::new(cities)
                        }
                        None => {
                            warn!("No city list available, serving empty catalog");
                            CityCatalog::new(Vec::new())
                        }
                    }
                }
            },
        }
    }

    async fn read_snapshot(&self) -> Result<Option<Vec<CityRecord>>, AppError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn snapshot_is_stale(&self) -> bool {
        let age = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata
                .modified()
                .ok()
                .and_then(|mtime| SystemTime::now().duration_since(mtime).ok()),
            Err(_) => None,
        };
        match age {
            Some(age) => age > self.max_age,
            None => true,
        }
    }

    async fn fetch_and_persist(&self) -> Result<Vec<CityRecord>, AppError> {
        let cities = self.fetch_remote().await?;
        if let Err(e) = self.persist(&cities).await {
            warn!(path = %self.path.display(), error = %e, "Failed to persist city list snapshot");
        }
        Ok(cities)
    }

    async fn fetch_remote(&self) -> Result<Vec<CityRecord>, AppError> {
        let response = self.client.fetch_with_retry(&self.url).await?;
        let compressed = response.bytes().await.map_err(AppError::Network)?;

        let mut decoder = GzDecoder::new(compressed.as_ref());
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;

        Ok(serde_json::from_slice(&decompressed)?)
    }

    /// Writes the snapshot to a sibling temp file and renames it into place,
    /// so readers only ever see a fully written list.
    async fn persist(&self, cities: &[CityRecord]) -> Result<(), AppError> {
        let bytes = serde_json::to_vec(cities)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
