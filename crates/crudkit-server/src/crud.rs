//! Get/Post/Put/Delete pipeline over a DTO and its record.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use crudkit_core::{ApiError, CreationResponse, DataExchange, Record};
use crudkit_store::RepositoryFactory;
use tracing::{info, instrument};

use crate::error::{backend_failure, rejected};
use crate::scope::RequestScope;

/// Domain checks run after the structural validity check. Post only ever
/// calls `check_creation` and Put only ever calls `check_editing`, so a rule
/// never has to guess the operation from the DTO.
#[async_trait]
pub trait ValidationRules<D, R: Record>: Send + Sync
where
    D: Send + Sync + 'static,
{
    async fn check_creation(&self, _scope: &RequestScope<R>, _dto: &D) -> Result<(), ApiError> {
        Ok(())
    }

    async fn check_editing(&self, _scope: &RequestScope<R>, _dto: &D) -> Result<(), ApiError> {
        Ok(())
    }
}

/// Accepts every structurally valid DTO.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoRules;

impl<D: Send + Sync + 'static, R: Record> ValidationRules<D, R> for NoRules {}

pub struct CrudController<D: Send + Sync + 'static, R: Record> {
    factory: Arc<RepositoryFactory>,
    rules: Arc<dyn ValidationRules<D, R>>,
    _dto: PhantomData<fn() -> D>,
}

impl<D: Send + Sync + 'static, R: Record> Clone for CrudController<D, R> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            rules: Arc::clone(&self.rules),
            _dto: PhantomData,
        }
    }
}

impl<D: DataExchange<R>, R: Record> CrudController<D, R> {
    pub fn new(factory: Arc<RepositoryFactory>) -> Self {
        Self::with_rules(factory, NoRules)
    }

    pub fn with_rules(
        factory: Arc<RepositoryFactory>,
        rules: impl ValidationRules<D, R> + 'static,
    ) -> Self {
        Self {
            factory,
            rules: Arc::new(rules),
            _dto: PhantomData,
        }
    }

    pub fn factory(&self) -> &Arc<RepositoryFactory> {
        &self.factory
    }

    fn scope(&self) -> RequestScope<R> {
        RequestScope::open(&self.factory)
    }

    /// Fetch one record by key.
    #[instrument(skip_all, fields(record = %R::KIND, key = %key))]
    pub async fn get(&self, key: &R::Key) -> Result<D, ApiError> {
        let scope = self.scope();
        let record = self.stored(&scope, key).await?;
        Ok(D::from_model(&record))
    }

    async fn stored(&self, scope: &RequestScope<R>, key: &R::Key) -> Result<R, ApiError> {
        match scope.repository().read(key).await {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Err(rejected(ApiError::no_data_found())),
            Err(e) => Err(backend_failure(e)),
        }
    }

    /// Create a record. Caller-supplied keys must not be in use already.
    #[instrument(skip_all, fields(record = %R::KIND))]
    pub async fn post(&self, dto: Option<D>) -> Result<CreationResponse<R::Key>, ApiError> {
        let dto = match dto {
            Some(dto) if dto.is_valid_for_creation() => dto,
            _ => return Err(rejected(ApiError::invalid_request())),
        };

        let scope = self.scope();
        self.rules.check_creation(&scope, &dto).await?;

        let mut record = R::default();
        dto.update_model(&mut record);

        if !R::KEY_AUTOGENERATED {
            match self.stored(&scope, &record.key()).await {
                Ok(_) => return Err(rejected(ApiError::id_in_use())),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        let key = scope
            .repository()
            .create(record.clone())
            .await
            .map_err(backend_failure)?;
        record.set_key(key.clone());
        info!(key = %record.key(), "record created");
        Ok(CreationResponse { id: key })
    }

    /// Replace a stored record with the incoming DTO merged over it. Fields
    /// the DTO leaves unset keep their stored values.
    #[instrument(skip_all, fields(record = %R::KIND))]
    pub async fn put(&self, dto: Option<D>) -> Result<(), ApiError> {
        let dto = match dto {
            Some(dto) if dto.is_valid_for_editing() => dto,
            _ => return Err(rejected(ApiError::invalid_request())),
        };

        let scope = self.scope();
        self.rules.check_editing(&scope, &dto).await?;

        let mut shell = R::default();
        dto.update_model(&mut shell);
        let mut record = self.stored(&scope, &shell.key()).await?;
        dto.update_existing(&mut record);

        scope
            .repository()
            .update(&record)
            .await
            .map_err(backend_failure)?;
        info!(key = %record.key(), "record updated");
        Ok(())
    }

    #[instrument(skip_all, fields(record = %R::KIND, key = %key))]
    pub async fn delete(&self, key: &R::Key) -> Result<(), ApiError> {
        let scope = self.scope();
        let record = self.stored(&scope, key).await?;
        scope
            .repository()
            .delete(&record.key())
            .await
            .map_err(backend_failure)?;
        info!(key = %key, "record deleted");
        Ok(())
    }
}
