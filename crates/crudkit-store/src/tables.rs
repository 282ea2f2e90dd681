//! Partitioned key/value table store.
//!
//! Entities are stored as JSON documents addressed by (partition, row).
//! Tables are provisioned on first use and dropped by `clear_data`. There is
//! no session to share: every repository talks to the service directly.
//! Unordered fetches come back in address order, which for integer keys is
//! numeric order.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use crudkit_core::{Query, Record, RecordKey};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::config::BackendType;
use crate::error::StoreError;
use crate::repository::{Repository, Session};

/// A record stored in the table service.
pub trait TableEntity: Record + Serialize + DeserializeOwned {
    const TABLE_NAME: &'static str;
}

type Address = (String, String);

#[derive(Default)]
struct Table {
    entities: BTreeMap<Address, serde_json::Value>,
    sequence: u64,
}

/// In-process table service shared by every repository of a factory.
#[derive(Default)]
pub struct TableService {
    account: String,
    tables: DashMap<&'static str, Table>,
}

impl TableService {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            tables: DashMap::new(),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn table_exists(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn table_len(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, |t| t.entities.len())
    }

    /// Create the table if it does not exist yet, then run `f` on it.
    fn with_table<T>(&self, table: &'static str, f: impl FnOnce(&mut Table) -> T) -> T {
        let mut entry = self.tables.entry(table).or_insert_with(|| {
            info!(table, account = %self.account, "table provisioned");
            Table::default()
        });
        f(entry.value_mut())
    }

    /// Drop a table. Returns whether it existed.
    pub fn delete_table(&self, table: &str) -> bool {
        let existed = self.tables.remove(table).is_some();
        if existed {
            info!(table, account = %self.account, "table deleted");
        }
        existed
    }
}

pub struct TableRepository<R> {
    service: Arc<TableService>,
    disposed: AtomicBool,
    _record: PhantomData<fn() -> R>,
}

impl<R: TableEntity> TableRepository<R> {
    pub fn new(service: Arc<TableService>) -> Self {
        Self {
            service,
            disposed: AtomicBool::new(false),
            _record: PhantomData,
        }
    }

    fn check_open(&self) -> Result<(), StoreError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(StoreError::Disposed);
        }
        Ok(())
    }

    fn decode(value: &serde_json::Value) -> Result<R, StoreError> {
        Ok(serde_json::from_value(value.clone())?)
    }

    fn not_found(key: &R::Key) -> StoreError {
        StoreError::NotFound(format!("{} {key}", R::KIND))
    }
}

#[async_trait]
impl<R: TableEntity> Repository<R> for TableRepository<R> {
    fn backend(&self) -> BackendType {
        BackendType::Tables
    }

    #[instrument(skip_all, fields(table = R::TABLE_NAME))]
    async fn create(&self, mut record: R) -> Result<R::Key, StoreError> {
        self.check_open()?;
        self.service.with_table(R::TABLE_NAME, |table| {
            if R::KEY_AUTOGENERATED {
                table.sequence += 1;
                record.set_key(<R::Key as RecordKey>::generate(table.sequence));
            }
            let key = record.key();
            let address = key.table_address();
            if table.entities.contains_key(&address) {
                return Err(StoreError::Conflict(format!("{} {key} already exists", R::KIND)));
            }
            table.entities.insert(address, serde_json::to_value(&record)?);
            debug!(key = %key, "entity inserted");
            Ok(key)
        })
    }

    async fn read(&self, key: &R::Key) -> Result<Option<R>, StoreError> {
        self.check_open()?;
        let address = key.table_address();
        self.service.with_table(R::TABLE_NAME, |table| {
            table.entities.get(&address).map(Self::decode).transpose()
        })
    }

    #[instrument(skip_all, fields(table = R::TABLE_NAME))]
    async fn update(&self, record: &R) -> Result<(), StoreError> {
        self.check_open()?;
        let key = record.key();
        let document = serde_json::to_value(record)?;
        self.service.with_table(R::TABLE_NAME, |table| {
            match table.entities.get_mut(&key.table_address()) {
                Some(slot) => {
                    *slot = document;
                    Ok(())
                }
                None => Err(Self::not_found(&key)),
            }
        })
    }

    #[instrument(skip_all, fields(table = R::TABLE_NAME, key = %key))]
    async fn delete(&self, key: &R::Key) -> Result<(), StoreError> {
        self.check_open()?;
        self.service.with_table(R::TABLE_NAME, |table| {
            match table.entities.remove(&key.table_address()) {
                Some(_) => Ok(()),
                None => Err(Self::not_found(key)),
            }
        })
    }

    async fn fetch(&self, query: &Query<R>) -> Result<Vec<R>, StoreError> {
        self.check_open()?;
        let records = self.service.with_table(R::TABLE_NAME, |table| {
            table.entities.values().map(Self::decode).collect::<Result<Vec<_>, _>>()
        })?;
        Ok(query.apply(records)?)
    }

    async fn clear_data(&self) -> Result<(), StoreError> {
        self.check_open()?;
        self.service.delete_table(R::TABLE_NAME);
        Ok(())
    }

    fn session(&self) -> Result<Session, StoreError> {
        Ok(Session::Detached)
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::RepositoryExt;
    use crudkit_core::{FieldValue, RecordKind, TableKey};
    use serde::Deserialize;

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Shelf {
        key: TableKey,
        label: String,
        capacity: i64,
    }

    impl Record for Shelf {
        type Key = TableKey;
        const KIND: RecordKind = RecordKind::new("shelf");
        const KEY_AUTOGENERATED: bool = false;

        fn key(&self) -> TableKey {
            self.key.clone()
        }

        fn set_key(&mut self, key: TableKey) {
            self.key = key;
        }

        fn field(&self, name: &str) -> Option<FieldValue> {
            match name {
                "partition" => Some(self.key.partition.as_str().into()),
                "label" => Some(self.label.as_str().into()),
                "capacity" => Some(self.capacity.into()),
                _ => None,
            }
        }

        fn contents_equal(&self, other: &Self) -> bool {
            self.label == other.label && self.capacity == other.capacity
        }
    }

    impl TableEntity for Shelf {
        const TABLE_NAME: &'static str = "shelves";
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Counter {
        id: i64,
    }

    impl Record for Counter {
        type Key = i64;
        const KIND: RecordKind = RecordKind::new("counter");
        const KEY_AUTOGENERATED: bool = true;

        fn key(&self) -> i64 {
            self.id
        }

        fn set_key(&mut self, key: i64) {
            self.id = key;
        }

        fn field(&self, name: &str) -> Option<FieldValue> {
            (name == "id").then(|| self.id.into())
        }

        fn contents_equal(&self, _other: &Self) -> bool {
            true
        }
    }

    impl TableEntity for Counter {
        const TABLE_NAME: &'static str = "counters";
    }

    fn shelf(partition: &str, row: &str, label: &str, capacity: i64) -> Shelf {
        Shelf {
            key: TableKey::new(partition, row),
            label: label.to_string(),
            capacity,
        }
    }

    #[tokio::test]
    async fn tables_are_provisioned_on_first_use() {
        let service = Arc::new(TableService::new("devstore"));
        let repo = TableRepository::<Shelf>::new(service.clone());
        assert!(!service.table_exists("shelves"));
        assert!(repo.read(&TableKey::invalid()).await.unwrap().is_none());
        assert!(service.table_exists("shelves"));
    }

    #[tokio::test]
    async fn crud_roundtrip() {
        let service = Arc::new(TableService::new("devstore"));
        let repo = TableRepository::<Shelf>::new(service.clone());

        let key = repo.create(shelf("east", "1", "Poetry", 40)).await.unwrap();
        let mut stored = repo.read(&key).await.unwrap().unwrap();
        assert_eq!(stored.label, "Poetry");

        stored.capacity = 55;
        repo.update(&stored).await.unwrap();
        assert_eq!(repo.read(&key).await.unwrap().unwrap().capacity, 55);

        repo.delete(&key).await.unwrap();
        assert!(repo.read(&key).await.unwrap().is_none());
        assert_eq!(service.table_len("shelves"), 0);
    }

    #[tokio::test]
    async fn missing_keys_are_not_found_on_write() {
        let repo = TableRepository::<Shelf>::new(Arc::new(TableService::default()));
        let ghost = shelf("west", "9", "Ghost", 0);
        assert!(matches!(repo.update(&ghost).await, Err(StoreError::NotFound(_))));
        assert!(matches!(repo.delete(&ghost.key).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn duplicate_address_conflicts() {
        let repo = TableRepository::<Shelf>::new(Arc::new(TableService::default()));
        repo.create(shelf("east", "1", "Poetry", 40)).await.unwrap();
        let err = repo.create(shelf("east", "1", "Drama", 10)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn autogenerated_keys_follow_the_table_sequence() {
        let repo = TableRepository::<Counter>::new(Arc::new(TableService::default()));
        let a = repo.create(Counter::default()).await.unwrap();
        let b = repo.create(Counter::default()).await.unwrap();
        assert_eq!((a, b), (1, 2));
    }

    #[tokio::test]
    async fn integer_keys_fetch_in_numeric_order() {
        let repo = TableRepository::<Counter>::new(Arc::new(TableService::default()));
        for _ in 0..12 {
            repo.create(Counter::default()).await.unwrap();
        }
        let ids: Vec<i64> = repo
            .to_list(&repo.queryable())
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, (1..=12).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn queries_evaluate_in_memory() {
        let repo = TableRepository::<Shelf>::new(Arc::new(TableService::default()));
        repo.create(shelf("east", "1", "Poetry", 40)).await.unwrap();
        repo.create(shelf("east", "2", "Drama", 10)).await.unwrap();
        repo.create(shelf("west", "1", "Maps", 25)).await.unwrap();

        let east = repo.queryable().where_eq("partition", "east");
        assert_eq!(repo.count(&east).await.unwrap(), 2);
        assert_eq!(repo.sum(&east, "capacity").await.unwrap(), FieldValue::Int(50));

        let biggest = repo.queryable().order_by_desc("capacity");
        assert_eq!(repo.first(&biggest).await.unwrap().label, "Poetry");
    }

    #[tokio::test]
    async fn clear_data_drops_the_table() {
        let service = Arc::new(TableService::default());
        let repo = TableRepository::<Shelf>::new(service.clone());
        repo.create(shelf("east", "1", "Poetry", 40)).await.unwrap();

        repo.clear_data().await.unwrap();
        assert!(!service.table_exists("shelves"));
        repo.clear_data().await.unwrap();
        assert_eq!(repo.count(&repo.queryable()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn session_is_detached() {
        let repo = TableRepository::<Shelf>::new(Arc::new(TableService::default()));
        assert!(matches!(repo.session().unwrap(), Session::Detached));
        repo.dispose();
        repo.dispose();
        assert!(matches!(repo.read(&TableKey::invalid()).await, Err(StoreError::Disposed)));
    }
}
