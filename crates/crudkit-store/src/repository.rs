//! The uniform repository surface shared by every backend.

use std::collections::HashMap;

use async_trait::async_trait;
use crudkit_core::query::aggregate;
use crudkit_core::{Aggregate, FieldValue, Query, Record};

use crate::config::BackendType;
use crate::database::Database;
use crate::error::StoreError;

/// The backend session a repository runs on.
#[derive(Clone, Debug)]
pub enum Session {
    /// A relational connection that other repositories can join.
    Relational(Database),
    /// The backend has no session to share.
    Detached,
}

impl Session {
    pub fn database(&self) -> Option<&Database> {
        match self {
            Session::Relational(db) => Some(db),
            Session::Detached => None,
        }
    }
}

/// Per-record-type storage handle.
///
/// `read` reports absence as `Ok(None)`. `update` and `delete` of a key that
/// is not stored fail with [`StoreError::NotFound`] on every backend.
#[async_trait]
pub trait Repository<R: Record>: Send + Sync {
    fn backend(&self) -> BackendType;

    async fn create(&self, record: R) -> Result<R::Key, StoreError>;

    async fn read(&self, key: &R::Key) -> Result<Option<R>, StoreError>;

    async fn update(&self, record: &R) -> Result<(), StoreError>;

    async fn delete(&self, key: &R::Key) -> Result<(), StoreError>;

    /// Base projection over every stored record.
    fn queryable(&self) -> Query<R> {
        Query::new()
    }

    /// Evaluate a projection.
    async fn fetch(&self, query: &Query<R>) -> Result<Vec<R>, StoreError>;

    async fn count(&self, query: &Query<R>) -> Result<u64, StoreError> {
        Ok(self.fetch(query).await?.len() as u64)
    }

    async fn aggregate(&self, query: &Query<R>, op: &Aggregate) -> Result<FieldValue, StoreError> {
        let records = self.fetch(query).await?;
        Ok(aggregate(&records, op)?)
    }

    /// Destroy all stored records of this type. Safe to repeat.
    async fn clear_data(&self) -> Result<(), StoreError>;

    /// The session this repository runs on, opening it if needed.
    fn session(&self) -> Result<Session, StoreError>;

    /// Release the repository. Idempotent; never fails.
    fn dispose(&self);
}

pub type BoxRepository<R> = Box<dyn Repository<R>>;

/// Terminal operations over projections, available on every repository.
#[async_trait]
pub trait RepositoryExt<R: Record>: Repository<R> {
    async fn to_list(&self, query: &Query<R>) -> Result<Vec<R>, StoreError> {
        self.fetch(query).await
    }

    async fn to_dictionary(&self, query: &Query<R>) -> Result<HashMap<R::Key, R>, StoreError> {
        let mut map = HashMap::new();
        for record in self.fetch(query).await? {
            let key = record.key();
            if map.contains_key(&key) {
                return Err(StoreError::DuplicateKey(key.to_string()));
            }
            map.insert(key, record);
        }
        Ok(map)
    }

    async fn any(&self, query: &Query<R>) -> Result<bool, StoreError> {
        Ok(self.count(&query.clone().take(1)).await? > 0)
    }

    async fn any_where<F>(&self, query: &Query<R>, predicate: F) -> Result<bool, StoreError>
    where
        F: Fn(&R) -> bool + Send + Sync + 'static,
    {
        self.any(&query.clone().filter(predicate)).await
    }

    async fn all<F>(&self, query: &Query<R>, predicate: F) -> Result<bool, StoreError>
    where
        F: Fn(&R) -> bool + Send + Sync + 'static,
    {
        let violations = query.clone().filter(move |r| !predicate(r));
        Ok(!self.any(&violations).await?)
    }

    async fn count_where<F>(&self, query: &Query<R>, predicate: F) -> Result<u64, StoreError>
    where
        F: Fn(&R) -> bool + Send + Sync + 'static,
    {
        self.count(&query.clone().filter(predicate)).await
    }

    async fn sum(&self, query: &Query<R>, field: &str) -> Result<FieldValue, StoreError> {
        self.aggregate(query, &Aggregate::Sum(field.to_string())).await
    }

    async fn average(&self, query: &Query<R>, field: &str) -> Result<FieldValue, StoreError> {
        self.aggregate(query, &Aggregate::Average(field.to_string())).await
    }

    async fn min(&self, query: &Query<R>, field: &str) -> Result<FieldValue, StoreError> {
        self.aggregate(query, &Aggregate::Min(field.to_string())).await
    }

    async fn max(&self, query: &Query<R>, field: &str) -> Result<FieldValue, StoreError> {
        self.aggregate(query, &Aggregate::Max(field.to_string())).await
    }

    async fn first_or_none(&self, query: &Query<R>) -> Result<Option<R>, StoreError> {
        Ok(self.fetch(&query.clone().take(1)).await?.into_iter().next())
    }

    async fn first(&self, query: &Query<R>) -> Result<R, StoreError> {
        self.first_or_none(query).await?.ok_or(StoreError::EmptySequence)
    }

    async fn first_where<F>(&self, query: &Query<R>, predicate: F) -> Result<R, StoreError>
    where
        F: Fn(&R) -> bool + Send + Sync + 'static,
    {
        self.first(&query.clone().filter(predicate)).await
    }

    async fn single_or_none(&self, query: &Query<R>) -> Result<Option<R>, StoreError> {
        let mut found = self.fetch(&query.clone().take(2)).await?;
        match found.len() {
            0 => Ok(None),
            1 => Ok(found.pop()),
            _ => Err(StoreError::NotSingle),
        }
    }

    async fn single(&self, query: &Query<R>) -> Result<R, StoreError> {
        self.single_or_none(query).await?.ok_or(StoreError::EmptySequence)
    }
}

impl<R: Record, T: Repository<R> + ?Sized> RepositoryExt<R> for T {}
