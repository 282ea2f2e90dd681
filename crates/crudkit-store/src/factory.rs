//! Repository resolution.
//!
//! A [`RepositoryFactory`] owns the backend handle and a resolution table
//! mapping `(RecordKind, KeyKind)` to a repository constructor. The table is
//! produced by the deployment's registration function the first time any
//! repository is requested, and is read-only afterwards.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use crudkit_core::{KeyKind, Record, RecordKey, RecordKind};
use tracing::{debug, info};

use crate::config::{BackendType, StorageConfig};
use crate::database::Database;
use crate::error::StoreError;
use crate::memory::{MemoryRepository, MemoryStore};
use crate::relational::{SqlRecord, SqliteRepository};
use crate::repository::{BoxRepository, Repository, Session};
use crate::tables::{TableEntity, TableRepository, TableService};

/// Backend-wide handle passed to every constructor.
#[derive(Clone)]
pub enum Backend {
    Relational { path: PathBuf },
    Tables(Arc<TableService>),
    Memory(Arc<MemoryStore>),
}

impl Backend {
    pub fn from_config(config: &StorageConfig) -> Result<Self, StoreError> {
        match config.backend {
            BackendType::Relational => {
                let path = config.expose_connection_string().ok_or_else(|| {
                    StoreError::Config("relational backend needs a database path".into())
                })?;
                Ok(Backend::Relational {
                    path: PathBuf::from(path),
                })
            }
            BackendType::Tables => {
                let account = config.expose_connection_string().unwrap_or("devstore");
                Ok(Backend::Tables(Arc::new(TableService::new(account))))
            }
            BackendType::Memory => Ok(Backend::Memory(Arc::new(MemoryStore::new()))),
        }
    }

    pub fn memory() -> Self {
        Backend::Memory(Arc::new(MemoryStore::new()))
    }

    pub fn backend_type(&self) -> BackendType {
        match self {
            Backend::Relational { .. } => BackendType::Relational,
            Backend::Tables(_) => BackendType::Tables,
            Backend::Memory(_) => BackendType::Memory,
        }
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Relational { .. } => f.write_str("Backend::Relational"),
            Backend::Tables(service) => write!(f, "Backend::Tables({})", service.account()),
            Backend::Memory(_) => f.write_str("Backend::Memory"),
        }
    }
}

/// What a constructor receives: the backend, plus the session to join when
/// building a context-sharing repository.
#[derive(Clone, Debug)]
pub struct RepositoryContext {
    pub backend: Backend,
    pub session: Option<Database>,
}

pub type Constructor<R> = Arc<dyn Fn(RepositoryContext) -> BoxRepository<R> + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RegistryKey {
    pub record: RecordKind,
    pub key: KeyKind,
}

impl RegistryKey {
    pub fn of<R: Record>() -> Self {
        Self {
            record: R::KIND,
            key: <R::Key as RecordKey>::KIND,
        }
    }
}

impl fmt::Display for RegistryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.record, self.key)
    }
}

/// Collects constructors while the resolution table is being built.
pub struct RegistryBuilder {
    backend: BackendType,
    entries: HashMap<RegistryKey, Box<dyn Any + Send + Sync>>,
}

impl RegistryBuilder {
    fn new(backend: BackendType) -> Self {
        Self {
            backend,
            entries: HashMap::new(),
        }
    }

    pub fn backend(&self) -> BackendType {
        self.backend
    }

    /// Register an arbitrary constructor for `R`.
    ///
    /// # Panics
    /// If `R`'s (record kind, key kind) pair is already registered.
    pub fn register<R, F>(&mut self, constructor: F) -> &mut Self
    where
        R: Record,
        F: Fn(RepositoryContext) -> BoxRepository<R> + Send + Sync + 'static,
    {
        let key = RegistryKey::of::<R>();
        let constructor: Constructor<R> = Arc::new(constructor);
        if self.entries.insert(key, Box::new(constructor)).is_some() {
            panic!("repository for {key} registered twice");
        }
        self
    }

    pub fn relational<R: SqlRecord>(&mut self) -> &mut Self {
        self.expect_backend::<R>(BackendType::Relational);
        self.register::<R, _>(|ctx| -> BoxRepository<R> {
            match (ctx.session, ctx.backend) {
                (Some(db), _) => Box::new(SqliteRepository::<R>::with_session(db)),
                (None, Backend::Relational { path }) => Box::new(SqliteRepository::<R>::open(path)),
                (None, other) => panic!("relational repository built on {other:?}"),
            }
        })
    }

    pub fn tables<R: TableEntity>(&mut self) -> &mut Self {
        self.expect_backend::<R>(BackendType::Tables);
        self.register::<R, _>(|ctx| -> BoxRepository<R> {
            match ctx.backend {
                Backend::Tables(service) => Box::new(TableRepository::<R>::new(service)),
                other => panic!("table repository built on {other:?}"),
            }
        })
    }

    pub fn memory<R: Record>(&mut self) -> &mut Self {
        self.expect_backend::<R>(BackendType::Memory);
        self.register::<R, _>(|ctx| -> BoxRepository<R> {
            match ctx.backend {
                Backend::Memory(store) => Box::new(MemoryRepository::<R>::new(&store)),
                other => panic!("memory repository built on {other:?}"),
            }
        })
    }

    /// Register `R` with whichever backend this factory runs on.
    pub fn record<R: SqlRecord + TableEntity>(&mut self) -> &mut Self {
        match self.backend {
            BackendType::Relational => self.relational::<R>(),
            BackendType::Tables => self.tables::<R>(),
            BackendType::Memory => self.memory::<R>(),
        }
    }

    fn expect_backend<R: Record>(&self, wanted: BackendType) {
        if self.backend != wanted {
            panic!(
                "{} registered as {wanted} on a {} factory",
                RegistryKey::of::<R>(),
                self.backend
            );
        }
    }
}

/// The immutable result of registration.
pub struct ResolutionTable {
    entries: HashMap<RegistryKey, Box<dyn Any + Send + Sync>>,
}

impl ResolutionTable {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &RegistryKey) -> bool {
        self.entries.contains_key(key)
    }

    fn constructor<R: Record>(&self) -> &Constructor<R> {
        let key = RegistryKey::of::<R>();
        let entry = match self.entries.get(&key) {
            Some(entry) => entry,
            None => panic!("no repository registered for {key}"),
        };
        match entry.downcast_ref::<Constructor<R>>() {
            Some(constructor) => constructor,
            None => panic!("repository registered for {key} belongs to another record type"),
        }
    }
}

type Registration = dyn Fn(&mut RegistryBuilder) + Send + Sync;

pub struct RepositoryFactory {
    backend: Backend,
    registration: Box<Registration>,
    table: OnceLock<ResolutionTable>,
}

impl RepositoryFactory {
    pub fn new<F>(backend: Backend, registration: F) -> Self
    where
        F: Fn(&mut RegistryBuilder) + Send + Sync + 'static,
    {
        Self {
            backend,
            registration: Box::new(registration),
            table: OnceLock::new(),
        }
    }

    pub fn from_config<F>(config: &StorageConfig, registration: F) -> Result<Self, StoreError>
    where
        F: Fn(&mut RegistryBuilder) + Send + Sync + 'static,
    {
        Ok(Self::new(Backend::from_config(config)?, registration))
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// The resolution table, built on first access.
    pub fn table(&self) -> &ResolutionTable {
        self.table.get_or_init(|| {
            let mut builder = RegistryBuilder::new(self.backend.backend_type());
            (self.registration)(&mut builder);
            info!(
                backend = %self.backend.backend_type(),
                entries = builder.entries.len(),
                "repository resolution table built"
            );
            ResolutionTable {
                entries: builder.entries,
            }
        })
    }

    /// A fresh repository for `R`.
    ///
    /// # Panics
    /// If `R` was not registered.
    pub fn get_repository<R: Record>(&self) -> BoxRepository<R> {
        let constructor = self.table().constructor::<R>();
        constructor(RepositoryContext {
            backend: self.backend.clone(),
            session: None,
        })
    }

    /// A repository for `R` on the same session as `source`.
    ///
    /// Relational sources hand over their connection, so both repositories see
    /// each other's uncommitted writes. Table and memory sources have no
    /// session; the result is then an ordinary repository.
    pub fn get_context_sharing_repository<R: Record, S: Record>(
        &self,
        source: &dyn Repository<S>,
    ) -> Result<BoxRepository<R>, StoreError> {
        let constructor = self.table().constructor::<R>();
        match source.session()? {
            Session::Relational(db) => Ok(constructor(RepositoryContext {
                backend: self.backend.clone(),
                session: Some(db),
            })),
            Session::Detached => {
                if let Backend::Relational { .. } = self.backend {
                    panic!(
                        "relational factory asked to share the session of a {} repository",
                        source.backend()
                    );
                }
                debug!(
                    record = %R::KIND,
                    source = %S::KIND,
                    backend = %self.backend.backend_type(),
                    "backend has no shared session, resolving independently"
                );
                Ok(constructor(RepositoryContext {
                    backend: self.backend.clone(),
                    session: None,
                }))
            }
        }
    }
}
