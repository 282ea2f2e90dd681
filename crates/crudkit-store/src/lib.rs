pub mod config;
pub mod database;
pub mod error;
pub mod factory;
pub mod memory;
pub mod relational;
pub mod repository;
pub mod row_helpers;
pub mod schema;
pub mod tables;

pub use config::{BackendType, StorageConfig};
pub use database::Database;
pub use error::StoreError;
pub use factory::{Backend, RegistryBuilder, RepositoryContext, RepositoryFactory};
pub use memory::{MemoryRepository, MemoryStore};
pub use relational::{SqlRecord, SqliteRepository};
pub use repository::{BoxRepository, Repository, RepositoryExt, Session};
pub use schema::{Column, SqlType};
pub use tables::{TableEntity, TableRepository, TableService};
