//! record stores. the recipient is the unique key.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use tokio::sync::{Mutex, RwLock};

use crate::error::RecordError;
use crate::model::MintRecord;

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_by_recipient(&self, recipient: &Pubkey) -> Result<Option<MintRecord>, RecordError>;

    async fn get_by_id(&self, id: u64) -> Result<Option<MintRecord>, RecordError>;

    /// store a new record, assigning its id. `Duplicate` if the recipient has one.
    async fn insert(&self, record: MintRecord) -> Result<MintRecord, RecordError>;

    /// replace a stored record. `NotFound` if the id is unknown.
    async fn update(&self, record: &MintRecord) -> Result<(), RecordError>;
}

#[async_trait]
impl<T: RecordStore + ?Sized> RecordStore for Arc<T> {
    async fn get_by_recipient(&self, recipient: &Pubkey) -> Result<Option<MintRecord>, RecordError> {
        (**self).get_by_recipient(recipient).await
    }

    async fn get_by_id(&self, id: u64) -> Result<Option<MintRecord>, RecordError> {
        (**self).get_by_id(id).await
    }

    async fn insert(&self, record: MintRecord) -> Result<MintRecord, RecordError> {
        (**self).insert(record).await
    }

    async fn update(&self, record: &MintRecord) -> Result<(), RecordError> {
        (**self).update(record).await
    }
}

/// records keyed by id, shared by both stores.
#[derive(Debug, Clone, Default)]
struct Table {
    records: BTreeMap<u64, MintRecord>,
}

impl Table {
    fn from_records(records: Vec<MintRecord>) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.id, r)).collect(),
        }
    }

    fn by_recipient(&self, recipient: &Pubkey) -> Option<&MintRecord> {
        self.records.values().find(|r| r.recipient == *recipient)
    }

    fn insert(&mut self, mut record: MintRecord) -> Result<MintRecord, RecordError> {
        if self.by_recipient(&record.recipient).is_some() {
            return Err(RecordError::Duplicate(record.recipient));
        }
        record.id = self.records.keys().next_back().map_or(1, |id| id + 1);
        self.records.insert(record.id, record.clone());
        Ok(record)
    }

    fn update(&mut self, record: &MintRecord) -> Result<(), RecordError> {
        let slot = self
            .records
            .get_mut(&record.id)
            .ok_or(RecordError::NotFound(record.id))?;
        *slot = record.clone();
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    table: RwLock<Table>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// every record in id order.
    pub async fn all(&self) -> Vec<MintRecord> {
        self.table.read().await.records.values().cloned().collect()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get_by_recipient(&self, recipient: &Pubkey) -> Result<Option<MintRecord>, RecordError> {
        Ok(self.table.read().await.by_recipient(recipient).cloned())
    }

    async fn get_by_id(&self, id: u64) -> Result<Option<MintRecord>, RecordError> {
        Ok(self.table.read().await.records.get(&id).cloned())
    }

    async fn insert(&self, record: MintRecord) -> Result<MintRecord, RecordError> {
        self.table.write().await.insert(record)
    }

    async fn update(&self, record: &MintRecord) -> Result<(), RecordError> {
        self.table.write().await.update(record)
    }
}

/// whole-table json snapshot. each mutation rewrites the file via a temp
/// file + rename; the in-memory table only changes once the write succeeds.
#[derive(Debug)]
pub struct JsonFileRecordStore {
    path: PathBuf,
    table: Mutex<Table>,
}

impl JsonFileRecordStore {
    /// load `path`, or start empty if it does not exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, RecordError> {
        let path = path.into();
        let table = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let records: Vec<MintRecord> =
                    serde_json::from_slice(&bytes).map_err(|source| RecordError::Corrupt {
                        path: path.clone(),
                        source,
                    })?;
                tracing::info!(path = %path.display(), records = records.len(), "record file loaded");
                Table::from_records(records)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Table::default(),
            Err(source) => return Err(RecordError::Io { path, source }),
        };
        Ok(Self {
            path,
            table: Mutex::new(table),
        })
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, table: &Table) -> Result<(), RecordError> {
        let records: Vec<&MintRecord> = table.records.values().collect();
        let bytes = serde_json::to_vec_pretty(&records).map_err(|source| RecordError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let io = |source: std::io::Error| RecordError::Io {
            path: self.path.clone(),
            source,
        };
        tokio::fs::write(&tmp, &bytes).await.map_err(io)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io)
    }

    async fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut Table) -> Result<T, RecordError>,
    ) -> Result<T, RecordError> {
        let mut table = self.table.lock().await;
        let mut next = table.clone();
        let out = apply(&mut next)?;
        self.persist(&next).await?;
        *table = next;
        Ok(out)
    }
}

#[async_trait]
impl RecordStore for JsonFileRecordStore {
    async fn get_by_recipient(&self, recipient: &Pubkey) -> Result<Option<MintRecord>, RecordError> {
        Ok(self.table.lock().await.by_recipient(recipient).cloned())
    }

    async fn get_by_id(&self, id: u64) -> Result<Option<MintRecord>, RecordError> {
        Ok(self.table.lock().await.records.get(&id).cloned())
    }

    async fn insert(&self, record: MintRecord) -> Result<MintRecord, RecordError> {
        self.mutate(|table| table.insert(record)).await
    }

    async fn update(&self, record: &MintRecord) -> Result<(), RecordError> {
        self.mutate(|table| table.update(record)).await
    }
}
