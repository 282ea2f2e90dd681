//! In-memory backing store for tests and development.
//!
//! One list per record kind, shared by every repository of that kind created
//! from the same [`MemoryStore`].

use std::any::Any;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use crudkit_core::{Query, Record, RecordKey, RecordKind};
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::config::BackendType;
use crate::error::StoreError;
use crate::repository::{Repository, Session};

pub struct MemoryList<R> {
    items: RwLock<Vec<R>>,
    sequence: AtomicU64,
}

impl<R> Default for MemoryList<R> {
    fn default() -> Self {
        Self {
            items: RwLock::new(Vec::new()),
            sequence: AtomicU64::new(0),
        }
    }
}

impl<R: Record> MemoryList<R> {
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    pub fn snapshot(&self) -> Vec<R> {
        self.items.read().clone()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    lists: DashMap<RecordKind, Arc<dyn Any + Send + Sync>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared list for `R`, created on first request.
    pub fn list<R: Record>(&self) -> Arc<MemoryList<R>> {
        let entry = self
            .lists
            .entry(R::KIND)
            .or_insert_with(|| Arc::new(MemoryList::<R>::default()) as Arc<dyn Any + Send + Sync>)
            .clone();
        match entry.downcast::<MemoryList<R>>() {
            Ok(list) => list,
            Err(_) => panic!(
                "record kind '{}' is declared by two different record types",
                R::KIND
            ),
        }
    }

    pub fn clear(&self) {
        self.lists.clear();
    }
}

pub struct MemoryRepository<R> {
    list: Arc<MemoryList<R>>,
    disposed: AtomicBool,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> MemoryRepository<R> {
    pub fn new(store: &MemoryStore) -> Self {
        Self {
            list: store.list::<R>(),
            disposed: AtomicBool::new(false),
            _record: PhantomData,
        }
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    fn check_open(&self) -> Result<(), StoreError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(StoreError::Disposed);
        }
        Ok(())
    }

    fn not_found(key: &R::Key) -> StoreError {
        StoreError::NotFound(format!("{} {key}", R::KIND))
    }
}

#[async_trait]
impl<R: Record> Repository<R> for MemoryRepository<R> {
    fn backend(&self) -> BackendType {
        BackendType::Memory
    }

    async fn create(&self, mut record: R) -> Result<R::Key, StoreError> {
        self.check_open()?;
        if R::KEY_AUTOGENERATED {
            let next = self.list.sequence.fetch_add(1, Ordering::AcqRel) + 1;
            record.set_key(<R::Key as RecordKey>::generate(next));
        }
        let key = record.key();
        let mut items = self.list.items.write();
        if items.iter().any(|r| r.key() == key) {
            return Err(StoreError::Conflict(format!("{} {key} already exists", R::KIND)));
        }
        items.push(record);
        Ok(key)
    }

    async fn read(&self, key: &R::Key) -> Result<Option<R>, StoreError> {
        self.check_open()?;
        Ok(self.list.items.read().iter().find(|r| &r.key() == key).cloned())
    }

    async fn update(&self, record: &R) -> Result<(), StoreError> {
        self.check_open()?;
        let key = record.key();
        let mut items = self.list.items.write();
        match items.iter_mut().find(|r| r.key() == key) {
            Some(slot) => {
                *slot = record.clone();
                Ok(())
            }
            None => Err(Self::not_found(&key)),
        }
    }

    async fn delete(&self, key: &R::Key) -> Result<(), StoreError> {
        self.check_open()?;
        let mut items = self.list.items.write();
        match items.iter().position(|r| &r.key() == key) {
            Some(index) => {
                items.remove(index);
                Ok(())
            }
            None => Err(Self::not_found(key)),
        }
    }

    async fn fetch(&self, query: &Query<R>) -> Result<Vec<R>, StoreError> {
        self.check_open()?;
        Ok(query.apply(self.list.snapshot())?)
    }

    async fn clear_data(&self) -> Result<(), StoreError> {
        self.check_open()?;
        self.list.items.write().clear();
        Ok(())
    }

    fn session(&self) -> Result<Session, StoreError> {
        Ok(Session::Detached)
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }
}
