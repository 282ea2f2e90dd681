//! Paged search over a record set.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use crudkit_core::search::page_bounds;
use crudkit_core::{ApiError, DataExchange, Query, Record, SearchQuery, SearchResponse};
use crudkit_store::{Repository, RepositoryExt, RepositoryFactory};
use serde::Serialize;
use tracing::debug;

use crate::error::backend_failure;
use crate::scope::RequestScope;

/// Default upper bound on page size.
pub const DEFAULT_MAX_TAKE: u64 = 100;

/// Produces a search response for a client query.
#[async_trait]
pub trait SearchGenerator<Q>: Send + Sync {
    type Item: Serialize + Send;

    async fn generate_search_response(
        &self,
        query: &Q,
    ) -> Result<SearchResponse<Self::Item>, ApiError>;
}

/// Search that projects records of `R` through the DTO `D`.
pub struct ModelSearch<D, R> {
    factory: Arc<RepositoryFactory>,
    max_take: u64,
    _types: PhantomData<fn() -> (D, R)>,
}

impl<D, R> ModelSearch<D, R> {
    pub fn new(factory: Arc<RepositoryFactory>) -> Self {
        Self::with_max_take(factory, DEFAULT_MAX_TAKE)
    }

    pub fn with_max_take(factory: Arc<RepositoryFactory>, max_take: u64) -> Self {
        Self {
            factory,
            max_take,
            _types: PhantomData,
        }
    }

    pub fn max_take(&self) -> u64 {
        self.max_take
    }
}

#[async_trait]
impl<Q, D, R> SearchGenerator<Q> for ModelSearch<D, R>
where
    Q: SearchQuery<R>,
    D: DataExchange<R>,
    R: Record,
{
    type Item = D;

    async fn generate_search_response(&self, query: &Q) -> Result<SearchResponse<D>, ApiError> {
        let scope = RequestScope::<R>::open(&self.factory);
        let repo = scope.repository();
        let filtered = query.generate_search_query(repo.queryable());
        format_response(
            repo,
            query.num_to_take(),
            query.num_to_skip(),
            self.max_take,
            filtered,
            D::from_model,
        )
        .await
    }
}

/// Page `filtered` and project the page through `project`.
///
/// `take` is bounded to `[0, max_take]` and `skip` to `[0, ..)`. The page is
/// taken after skipping; the total counts the whole filtered set.
pub async fn format_response<R, T, F>(
    repo: &dyn Repository<R>,
    num_to_take: i64,
    num_to_skip: i64,
    max_take: u64,
    filtered: Query<R>,
    project: F,
) -> Result<SearchResponse<T>, ApiError>
where
    R: Record,
    T: Send,
    F: Fn(&R) -> T + Send,
{
    let (take, skip) = page_bounds(num_to_take, num_to_skip, max_take);
    let page = filtered.clone().skip(skip).take(take);

    let records = repo.to_list(&page).await.map_err(backend_failure)?;
    let total_results = repo.count(&filtered).await.map_err(backend_failure)?;
    debug!(
        record = %R::KIND,
        returned = records.len(),
        total_results,
        skip,
        "search page built"
    );

    Ok(SearchResponse {
        results: records.iter().map(project).collect(),
        total_results,
        skipped: skip,
    })
}

/// Front door for searches of one resource.
pub struct SearchController<Q, G> {
    generator: Arc<G>,
    _query: PhantomData<fn(Q)>,
}

impl<Q, G> Clone for SearchController<Q, G> {
    fn clone(&self) -> Self {
        Self {
            generator: Arc::clone(&self.generator),
            _query: PhantomData,
        }
    }
}

impl<Q, G: SearchGenerator<Q>> SearchController<Q, G> {
    pub fn new(generator: G) -> Self {
        Self {
            generator: Arc::new(generator),
            _query: PhantomData,
        }
    }

    pub async fn get(&self, query: &Q) -> Result<SearchResponse<G::Item>, ApiError> {
        self.generator.generate_search_response(query).await
    }
}
