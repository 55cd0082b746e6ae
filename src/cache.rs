use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::info;

use crate::error::ImportError;
use crate::importers::Importer;
use crate::models::{ImportUnit, UniversityInfo};

/// Stores adapter output so a rerun can skip refetching a university.
#[async_trait]
pub trait UnitCache: Send + Sync {
    async fn has(&self, key: &str) -> Result<bool, ImportError>;
    async fn get(&self, key: &str) -> Result<Option<Vec<ImportUnit>>, ImportError>;
    async fn put(&self, key: &str, units: &[ImportUnit]) -> Result<(), ImportError>;
}

/// One pretty-printed JSON file per key inside `dir`.
pub struct FileUnitCache {
    dir: PathBuf,
}

impl FileUnitCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[async_trait]
impl UnitCache for FileUnitCache {
    async fn has(&self, key: &str) -> Result<bool, ImportError> {
        Ok(tokio::fs::try_exists(self.path(key)).await?)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<ImportUnit>>, ImportError> {
        match tokio::fs::read_to_string(self.path(key)).await {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, units: &[ImportUnit]) -> Result<(), ImportError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let raw = serde_json::to_string_pretty(units)?;
        tokio::fs::write(self.path(key), raw).await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryUnitCache {
    entries: Mutex<HashMap<String, Vec<ImportUnit>>>,
}

impl MemoryUnitCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<ImportUnit>>>, ImportError> {
        self.entries
            .lock()
            .map_err(|_| ImportError::Parse("unit cache lock poisoned".to_string()))
    }
}

#[async_trait]
impl UnitCache for MemoryUnitCache {
    async fn has(&self, key: &str) -> Result<bool, ImportError> {
        Ok(self.lock()?.contains_key(key))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<ImportUnit>>, ImportError> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn put(&self, key: &str, units: &[ImportUnit]) -> Result<(), ImportError> {
        self.lock()?.insert(key.to_string(), units.to_vec());
        Ok(())
    }
}

/// "University of New South Wales" -> "university-of-new-south-wales"
pub fn cache_key(info: &UniversityInfo) -> String {
    info.name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Serves units from the cache when present, otherwise runs the wrapped
/// importer and stores what it returns.
pub struct CachedImporter {
    inner: Box<dyn Importer>,
    cache: Arc<dyn UnitCache>,
}

impl CachedImporter {
    pub fn new(inner: Box<dyn Importer>, cache: Arc<dyn UnitCache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl Importer for CachedImporter {
    fn info(&self) -> &UniversityInfo {
        self.inner.info()
    }

    async fn get_units(&self) -> Result<Vec<ImportUnit>, ImportError> {
        let key = cache_key(self.info());

        if self.cache.has(&key).await? {
            if let Some(units) = self.cache.get(&key).await? {
                info!(university = %self.info().name, key, count = units.len(), "Unit data already cached, skipping fetch");
                return Ok(units);
            }
        }

        let units = self.inner.get_units().await?;
        self.cache.put(&key, &units).await?;
        info!(university = %self.info().name, key, count = units.len(), "Unit data cached");
        Ok(units)
    }
}
