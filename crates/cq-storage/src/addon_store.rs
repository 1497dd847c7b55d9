//! Records of created addon instances

use async_trait::async_trait;
use cq_core::UserInputValue;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::storage::{Storable, Storage, StorageResult};

/// Everything needed to recreate an addon instance after a restart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddonRecord {
    pub instance_id: String,
    pub module_name: String,
    pub display_name: String,
    #[serde(default)]
    pub inputs: Vec<UserInputValue>,
}

/// Persisted contents of `consequences.addons`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddonRecords(pub Vec<AddonRecord>);

/// Version 1 kept one options map per module and had no instance ids
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyAddonOptions {
    module_name: String,
    #[serde(default)]
    options: serde_json::Map<String, Value>,
}

impl Storable for AddonRecords {
    const KEY: &'static str = "consequences.addons";
    const VERSION: u32 = 2;

    fn migrate(data: Value, from_version: u32) -> StorageResult<Self> {
        if from_version != 1 {
            return Err(crate::StorageError::MigrationRequired {
                key: Self::KEY.to_string(),
                from: from_version,
                to: Self::VERSION,
            });
        }

        let legacy: Vec<LegacyAddonOptions> = serde_json::from_value(data)?;
        Ok(Self(
            legacy
                .into_iter()
                .map(|entry| AddonRecord {
                    instance_id: uuid::Uuid::new_v4().to_string(),
                    display_name: entry.module_name.clone(),
                    module_name: entry.module_name,
                    inputs: entry
                        .options
                        .into_iter()
                        .map(|(id, value)| UserInputValue::new(id, value))
                        .collect(),
                })
                .collect(),
        ))
    }
}

/// Where the addon registry persists instances
#[async_trait]
pub trait AddonStore: Send + Sync {
    async fn create_addon_record(&self, record: AddonRecord) -> StorageResult<()>;

    async fn retrieve_all_addon_records(&self) -> StorageResult<Vec<AddonRecord>>;
}

/// [`AddonStore`] backed by `.storage/consequences.addons`
pub struct JsonAddonStore {
    storage: Storage,
    /// Loaded lazily; every write goes through this lock
    records: Mutex<Option<Vec<AddonRecord>>>,
}

impl JsonAddonStore {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            records: Mutex::new(None),
        }
    }

    async fn load(&self) -> StorageResult<Vec<AddonRecord>> {
        Ok(self
            .storage
            .load_data::<AddonRecords>()
            .await?
            .map(|records| records.0)
            .unwrap_or_default())
    }
}

#[async_trait]
impl AddonStore for JsonAddonStore {
    async fn create_addon_record(&self, record: AddonRecord) -> StorageResult<()> {
        let mut cached = self.records.lock().await;
        let mut records = match cached.take() {
            Some(records) => records,
            None => self.load().await?,
        };

        debug!(
            module = %record.module_name,
            instance_id = %record.instance_id,
            "Persisting addon record"
        );

        // Replace a record for the same instance, otherwise append
        records.retain(|existing| existing.instance_id != record.instance_id);
        records.push(record);

        let result = self.storage.save_data(&AddonRecords(records.clone())).await;
        *cached = Some(records);
        result
    }

    async fn retrieve_all_addon_records(&self) -> StorageResult<Vec<AddonRecord>> {
        let mut cached = self.records.lock().await;
        if let Some(records) = cached.as_ref() {
            return Ok(records.clone());
        }

        let records = self.load().await?;
        *cached = Some(records.clone());
        Ok(records)
    }
}

/// In-memory [`AddonStore`], for tests and ephemeral hosts
#[derive(Default)]
pub struct MemoryAddonStore {
    records: Mutex<Vec<AddonRecord>>,
}

impl MemoryAddonStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<AddonRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }
}

#[async_trait]
impl AddonStore for MemoryAddonStore {
    async fn create_addon_record(&self, record: AddonRecord) -> StorageResult<()> {
        let mut records = self.records.lock().await;
        records.retain(|existing| existing.instance_id != record.instance_id);
        records.push(record);
        Ok(())
    }

    async fn retrieve_all_addon_records(&self) -> StorageResult<Vec<AddonRecord>> {
        Ok(self.records.lock().await.clone())
    }
}
