//! Versioned JSON files in the `.storage/` directory

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage key {found} does not match expected key {expected}")]
    KeyMismatch { expected: String, found: String },

    #[error("no migration for {key} from version {from} to {to}")]
    MigrationRequired { key: String, from: u32, to: u32 },

    #[error("{key} was written by a newer version ({found} > {supported})")]
    UnsupportedVersion {
        key: String,
        found: u32,
        supported: u32,
    },
}

pub type StorageResult<T> = Result<T, StorageError>;

/// On-disk envelope around stored data
///
/// ```json
/// {
///   "version": 2,
///   "minor_version": 1,
///   "key": "consequences.addons",
///   "data": [ ... ]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageFile<T> {
    /// Bumped on breaking changes to `data`
    pub version: u32,
    /// Bumped on additive changes to `data`
    #[serde(default)]
    pub minor_version: u32,
    pub key: String,
    pub data: T,
}

impl<T> StorageFile<T> {
    pub fn new(key: impl Into<String>, data: T, version: u32, minor_version: u32) -> Self {
        Self {
            version,
            minor_version,
            key: key.into(),
            data,
        }
    }
}

/// Data with a fixed storage key and version
pub trait Storable: Serialize + DeserializeOwned {
    const KEY: &'static str;
    const VERSION: u32;
    const MINOR_VERSION: u32 = 1;

    /// Convert `data` written by an older major version
    fn migrate(data: Value, from_version: u32) -> StorageResult<Self> {
        let _ = data;
        Err(StorageError::MigrationRequired {
            key: Self::KEY.to_string(),
            from: from_version,
            to: Self::VERSION,
        })
    }
}

/// Handle on a `.storage/` directory
#[derive(Debug, Clone)]
pub struct Storage {
    storage_dir: PathBuf,
}

impl Storage {
    /// Storage rooted at `<root>/.storage`
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            storage_dir: root.as_ref().join(".storage"),
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn file_path(&self, key: &str) -> PathBuf {
        self.storage_dir.join(key)
    }

    pub async fn exists(&self, key: &str) -> bool {
        fs::try_exists(self.file_path(key)).await.unwrap_or(false)
    }

    /// Read the raw envelope for `key`, or `None` if it was never written
    pub async fn load<T>(&self, key: &str) -> StorageResult<Option<StorageFile<T>>>
    where
        T: DeserializeOwned,
    {
        let content = match fs::read_to_string(self.file_path(key)).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(key, "Storage file not found");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let file: StorageFile<T> = serde_json::from_str(&content)?;
        if file.key != key {
            return Err(StorageError::KeyMismatch {
                expected: key.to_string(),
                found: file.key,
            });
        }

        debug!(key, version = file.version, minor_version = file.minor_version, "Loaded storage file");
        Ok(Some(file))
    }

    /// Write an envelope, replacing the previous file atomically
    pub async fn save<T>(&self, file: &StorageFile<T>) -> StorageResult<()>
    where
        T: Serialize,
    {
        fs::create_dir_all(&self.storage_dir).await?;

        let path = self.file_path(&file.key);
        let temp_path = self.file_path(&format!("{}.tmp", file.key));

        let content = serde_json::to_string_pretty(file)?;
        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, &path).await?;

        debug!(key = %file.key, version = file.version, "Saved storage file");
        Ok(())
    }

    /// Load a [`Storable`], migrating older major versions
    ///
    /// A migrated file is written back in the current version.
    pub async fn load_data<T: Storable>(&self) -> StorageResult<Option<T>> {
        let Some(file) = self.load::<Value>(T::KEY).await? else {
            return Ok(None);
        };

        if file.version > T::VERSION {
            return Err(StorageError::UnsupportedVersion {
                key: T::KEY.to_string(),
                found: file.version,
                supported: T::VERSION,
            });
        }

        if file.version < T::VERSION {
            info!(key = T::KEY, from = file.version, to = T::VERSION, "Migrating storage file");
            let migrated = T::migrate(file.data, file.version)?;
            self.save_data(&migrated).await?;
            return Ok(Some(migrated));
        }

        if file.minor_version < T::MINOR_VERSION {
            warn!(
                key = T::KEY,
                found = file.minor_version,
                current = T::MINOR_VERSION,
                "Storage file has an older minor version"
            );
        }

        Ok(Some(serde_json::from_value(file.data)?))
    }

    /// Save a [`Storable`] under its key and current version
    pub async fn save_data<T: Storable>(&self, data: &T) -> StorageResult<()> {
        self.save(&StorageFile::new(T::KEY, data, T::VERSION, T::MINOR_VERSION))
            .await
    }

    pub async fn delete(&self, key: &str) -> StorageResult<()> {
        match fs::remove_file(self.file_path(key)).await {
            Ok(()) => {
                debug!(key, "Deleted storage file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
