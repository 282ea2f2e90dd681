use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::query::Query;
use crate::record::Record;

/// Client search request. The query object owns the filter and sort; the
/// search pipeline only bounds the page it asks for.
pub trait SearchQuery<R: Record>: DeserializeOwned + Send + Sync + 'static {
    fn num_to_take(&self) -> i64;

    fn num_to_skip(&self) -> i64;

    /// Narrow the repository's base projection.
    fn generate_search_query(&self, base: Query<R>) -> Query<R>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse<T> {
    pub results: Vec<T>,
    pub total_results: u64,
    pub skipped: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreationResponse<K> {
    pub id: K,
}

/// Bounded page parameters: `take` is clamped to `[0, max_take]`,
/// `skip` to `[0, ..)`.
pub fn page_bounds(num_to_take: i64, num_to_skip: i64, max_take: u64) -> (u64, u64) {
    let take = u64::try_from(num_to_take.max(0)).unwrap_or(0).min(max_take);
    let skip = u64::try_from(num_to_skip.max(0)).unwrap_or(0);
    (take, skip)
}
