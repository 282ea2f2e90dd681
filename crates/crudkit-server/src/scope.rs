use std::sync::Arc;

use crudkit_core::{ApiError, Record};
use crudkit_store::{BoxRepository, Repository, RepositoryExt, RepositoryFactory};
use tracing::debug;

use crate::error::{backend_failure, rejected};

/// The repository a single request works through. Disposed when the scope
/// is dropped, on every exit path.
pub struct RequestScope<R: Record> {
    factory: Arc<RepositoryFactory>,
    repository: BoxRepository<R>,
}

impl<R: Record> RequestScope<R> {
    pub fn open(factory: &Arc<RepositoryFactory>) -> Self {
        Self {
            factory: Arc::clone(factory),
            repository: factory.get_repository::<R>(),
        }
    }

    pub fn repository(&self) -> &dyn Repository<R> {
        self.repository.as_ref()
    }

    pub fn factory(&self) -> &Arc<RepositoryFactory> {
        &self.factory
    }

    /// A scope for `O` running on this scope's session.
    pub fn join<O: Record>(&self) -> Result<RequestScope<O>, ApiError> {
        let repository = self
            .factory
            .get_context_sharing_repository::<O, R>(self.repository())
            .map_err(backend_failure)?;
        Ok(RequestScope {
            factory: Arc::clone(&self.factory),
            repository,
        })
    }

    /// Check that a referenced `O` exists, reading through this scope's
    /// session so references created earlier in the same unit of work count.
    /// A missing reference is a conflict with `message`; `None` passes only
    /// when `allow_null` is set.
    pub async fn ensure_referenced_entity_is_present<O: Record>(
        &self,
        allow_null: bool,
        key: Option<&O::Key>,
        message: &str,
    ) -> Result<(), ApiError> {
        let Some(key) = key else {
            if allow_null {
                return Ok(());
            }
            return Err(rejected(ApiError::Conflict(message.to_string())));
        };

        let other = self.join::<O>()?;
        match other.repository().read(key).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(rejected(ApiError::Conflict(message.to_string()))),
            Err(e) => Err(backend_failure(e)),
        }
    }

    /// Whether any stored record has `selector(record) == value`. Scans the
    /// full record set in process.
    pub async fn value_is_present<V, F>(&self, selector: F, value: &V) -> Result<bool, ApiError>
    where
        V: PartialEq + Sync,
        F: Fn(&R) -> V + Send,
    {
        let records = self.all_records().await?;
        Ok(records.iter().any(|r| &selector(r) == value))
    }

    /// Like [`value_is_present`](Self::value_is_present), ignoring the record
    /// stored under `key`. Edits use it so a record may keep its own value.
    pub async fn value_is_held_by_another<V, F>(
        &self,
        key: &R::Key,
        selector: F,
        value: &V,
    ) -> Result<bool, ApiError>
    where
        V: PartialEq + Sync,
        F: Fn(&R) -> V + Send,
    {
        let records = self.all_records().await?;
        Ok(records
            .iter()
            .any(|r| &r.key() != key && &selector(r) == value))
    }

    async fn all_records(&self) -> Result<Vec<R>, ApiError> {
        let repo = self.repository();
        repo.to_list(&repo.queryable())
            .await
            .map_err(backend_failure)
    }
}

impl<R: Record> Drop for RequestScope<R> {
    fn drop(&mut self) {
        self.repository.dispose();
        debug!(record = %R::KIND, "request scope closed");
    }
}
