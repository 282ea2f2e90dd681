pub mod auth;
pub mod crud;
pub mod error;
pub mod routes;
pub mod scope;
pub mod search;
pub mod server;

#[cfg(test)]
pub(crate) mod testing;

pub use crud::{CrudController, NoRules, ValidationRules};
pub use error::{backend_failure, HttpError};
pub use routes::{Resource, DEFAULT_CACHE_MAX_AGE};
pub use scope::RequestScope;
pub use search::{format_response, ModelSearch, SearchController, SearchGenerator, DEFAULT_MAX_TAKE};
pub use server::{build_router, start, ServerConfig, ServerHandle};
