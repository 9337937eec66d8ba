//! Capacity-bounded persistence over a string key-value surface.
//!
//! The surface is shared by everything that opens the same location (browser
//! tabs, processes pointing at one data dir). Nothing here locks: two writers
//! doing `append` at once can race, and the last read-modify-write wins. That
//! gap is accepted; all ordering guarantees are per-handle only.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;

pub const EVENT_STORE_KEY: &str = "funnelEvents_v1";
pub const LEAD_STORE_KEY: &str = "pipelineLeads_v1";
pub const ATTRIBUTION_STORE_KEY: &str = "leadAttribution_v1";

pub const LEAD_CAPACITY: usize = 400;
pub const EVENT_CAPACITY: usize = 600;
pub const ATTRIBUTION_CAPACITY: usize = 1;

/// Raw string storage, shaped after the browser's `localStorage`.
pub trait KeyValueSurface {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// In-process surface. Can be built "unavailable" to model disabled storage.
#[derive(Debug, Default)]
pub struct MemorySurface {
    items: HashMap<String, String>,
    unavailable: bool,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable() -> Self {
        Self {
            items: HashMap::new(),
            unavailable: true,
        }
    }

    /// Seed a raw value, bypassing encoding. Handy for corrupt-data cases.
    pub fn with_item(mut self, key: &str, raw: &str) -> Self {
        self.items.insert(key.to_string(), raw.to_string());
        self
    }
}

impl KeyValueSurface for MemorySurface {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("memory surface disabled".to_string()));
        }
        Ok(self.items.get(key).cloned())
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("memory surface disabled".to_string()));
        }
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One `<key>.json` file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileSurface {
    dir: PathBuf,
}

impl FileSurface {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{file_name}.json"))
    }
}

impl KeyValueSurface for FileSurface {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// The only component allowed to touch a [`KeyValueSurface`].
///
/// Reads never fail: a missing, unreadable or malformed value yields the
/// caller's fallback. Writes report failure through their return value and
/// leave stored data untouched.
pub struct BoundedStore {
    surface: Box<dyn KeyValueSurface>,
}

impl BoundedStore {
    pub fn new(surface: impl KeyValueSurface + 'static) -> Self {
        Self {
            surface: Box::new(surface),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemorySurface::new())
    }

    pub fn try_read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.surface.get_item(key)? else {
            return Ok(None);
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| StoreError::Malformed {
                key: key.to_string(),
                message: err.to_string(),
            })
    }

    pub fn read<T: DeserializeOwned>(&self, key: &str, fallback: T) -> T {
        match self.try_read(key) {
            Ok(Some(value)) => value,
            Ok(None) => fallback,
            Err(err) => {
                tracing::debug!(key, error = %err, "store read fell back");
                fallback
            }
        }
    }

    pub fn read_list<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        self.read(key, Vec::new())
    }

    pub fn write<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)?;
        self.surface.set_item(key, &raw)
    }

    /// Push `item` onto the list under `key`, keeping only the newest
    /// `capacity` entries. Returns the retained length.
    pub fn append<T>(&mut self, key: &str, item: T, capacity: usize) -> Result<usize, StoreError>
    where
        T: Serialize + DeserializeOwned,
    {
        let mut items: Vec<T> = self.read_list(key);
        items.push(item);
        if items.len() > capacity {
            let overflow = items.len() - capacity;
            items.drain(..overflow);
        }
        self.write(key, &items)?;
        Ok(items.len())
    }

    /// Replace the list under `key` with an empty one.
    pub fn clear(&mut self, key: &str) -> Result<(), StoreError> {
        self.write(key, &Vec::<serde_json::Value>::new())
    }
}
