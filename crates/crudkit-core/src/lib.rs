pub mod errors;
pub mod exchange;
pub mod keys;
pub mod query;
pub mod record;
pub mod search;
pub mod value;

pub use errors::ApiError;
pub use exchange::DataExchange;
pub use keys::{KeyKind, KeyParseError, RecordKey, TableKey};
pub use query::{Aggregate, CompareOp, Query, QueryError};
pub use record::{Record, RecordKind};
pub use search::{CreationResponse, SearchQuery, SearchResponse};
pub use value::FieldValue;

#[doc(hidden)]
pub mod __private {
    pub use uuid::Uuid;
}
