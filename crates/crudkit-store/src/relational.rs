//! SQLite-backed repositories.
//!
//! Each repository lazily opens its own [`Database`] session on first use,
//! unless it was constructed on an existing session for context sharing.
//! Field criteria, ordering, the skip/take window, counts and aggregates are
//! translated to SQL; closure criteria force in-memory evaluation of the
//! rows that pass the translated criteria.

use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use crudkit_core::query::CompareOp;
use crudkit_core::{Aggregate, FieldValue, KeyKind, Query, QueryError, Record, RecordKey};
use once_cell::sync::OnceCell;
use rusqlite::types::Value;
use tracing::{debug, instrument, warn};

use crate::config::BackendType;
use crate::database::Database;
use crate::error::StoreError;
use crate::repository::{Repository, Session};
use crate::row_helpers::{escape_like, from_sql, to_sql};
use crate::schema::{create_table_sql, Column, SqlType};

/// A record with a relational table mapping. Column names equal the field
/// names reported by [`Record::field`]; `from_row` receives the key columns
/// followed by `COLUMNS`, in declaration order.
pub trait SqlRecord: Record {
    const TABLE: &'static str;
    const KEY_COLUMNS: &'static [Column];
    const COLUMNS: &'static [Column];

    fn from_row(row: &rusqlite::Row<'_>) -> Result<Self, StoreError>;
}

pub struct SqliteRepository<R> {
    path: PathBuf,
    session: OnceCell<Database>,
    owns_session: bool,
    disposed: AtomicBool,
    _record: PhantomData<fn() -> R>,
}

impl<R: SqlRecord> SqliteRepository<R> {
    /// Repository that opens its own session at `path` on first use.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            session: OnceCell::new(),
            owns_session: true,
            disposed: AtomicBool::new(false),
            _record: PhantomData,
        }
    }

    /// Repository joining an existing session.
    pub fn with_session(db: Database) -> Self {
        Self {
            path: db.path().to_owned(),
            session: OnceCell::with_value(db),
            owns_session: false,
            disposed: AtomicBool::new(false),
            _record: PhantomData,
        }
    }

    pub fn owns_session(&self) -> bool {
        self.owns_session
    }

    fn db(&self) -> Result<&Database, StoreError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(StoreError::Disposed);
        }
        let db = self.session.get_or_try_init(|| Database::open(&self.path))?;
        db.ensure_table(R::TABLE, &Self::ddl())?;
        Ok(db)
    }

    fn ddl() -> String {
        create_table_sql(R::TABLE, R::KEY_COLUMNS, R::COLUMNS, Self::rowid_key())
    }

    /// Integer keys the backend assigns come from SQLite's rowid.
    fn rowid_key() -> bool {
        R::KEY_AUTOGENERATED && <R::Key as RecordKey>::KIND == KeyKind::Integer
    }

    fn column(name: &str) -> Option<&'static Column> {
        R::KEY_COLUMNS
            .iter()
            .chain(R::COLUMNS.iter())
            .find(|c| c.name == name)
    }

    fn check_column(name: &str) -> Result<&'static Column, StoreError> {
        Self::column(name).ok_or_else(|| {
            StoreError::Query(QueryError::UnknownField {
                kind: R::KIND.as_str(),
                field: name.to_string(),
            })
        })
    }

    fn select_list() -> String {
        R::KEY_COLUMNS
            .iter()
            .chain(R::COLUMNS.iter())
            .map(|c| c.name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn key_predicate(first_param: usize) -> String {
        R::KEY_COLUMNS
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = ?{}", c.name, first_param + i))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    fn key_params(key: &R::Key) -> Result<Vec<Value>, StoreError> {
        let fields = key.to_fields();
        if fields.len() != R::KEY_COLUMNS.len() {
            return Err(StoreError::Database(format!(
                "{} key has {} fields, table {} has {} key columns",
                R::KIND,
                fields.len(),
                R::TABLE,
                R::KEY_COLUMNS.len()
            )));
        }
        Ok(fields.iter().map(to_sql).collect())
    }

    fn column_values(record: &R) -> Result<Vec<Value>, StoreError> {
        R::COLUMNS
            .iter()
            .map(|c| {
                record.field(c.name).map(|v| to_sql(&v)).ok_or_else(|| {
                    StoreError::Query(QueryError::UnknownField {
                        kind: R::KIND.as_str(),
                        field: c.name.to_string(),
                    })
                })
            })
            .collect()
    }

    /// `SELECT <list> FROM <table> [WHERE ..] [ORDER BY .. LIMIT ..]`.
    /// Ordering and window are only emitted for fully translatable queries.
    fn build_select(query: &Query<R>, list: &str, params: &mut Vec<Value>) -> Result<String, StoreError> {
        for name in query.referenced_fields() {
            Self::check_column(name)?;
        }

        let mut sql = format!("SELECT {list} FROM {}", R::TABLE);

        let mut clauses = Vec::new();
        for filter in query.field_filters() {
            params.push(match filter.op {
                CompareOp::Contains => {
                    Value::Text(format!("%{}%", escape_like(&filter.value.to_string())))
                }
                _ => to_sql(&filter.value),
            });
            let n = params.len();
            let col = &filter.field;
            clauses.push(match filter.op {
                CompareOp::Eq => format!("{col} IS ?{n}"),
                CompareOp::Ne => format!("{col} IS NOT ?{n}"),
                CompareOp::Lt => format!("{col} < ?{n}"),
                CompareOp::Le => format!("{col} <= ?{n}"),
                CompareOp::Gt => format!("{col} > ?{n}"),
                CompareOp::Ge => format!("{col} >= ?{n}"),
                CompareOp::Contains => format!("{col} LIKE ?{n} ESCAPE '\\'"),
            });
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        if query.is_translatable() {
            let order: Vec<String> = query
                .sort_keys()
                .iter()
                .map(|s| format!("{} {}", s.field, if s.descending { "DESC" } else { "ASC" }))
                .collect();
            if !order.is_empty() {
                sql.push_str(" ORDER BY ");
                sql.push_str(&order.join(", "));
            }
            match query.limit() {
                Some(take) => sql.push_str(&format!(" LIMIT {take} OFFSET {}", query.offset())),
                None if query.offset() > 0 => {
                    sql.push_str(&format!(" LIMIT -1 OFFSET {}", query.offset()))
                }
                None => {}
            }
        }
        Ok(sql)
    }

    fn load(db: &Database, sql: &str, params: &[Value]) -> Result<Vec<R>, StoreError> {
        db.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(R::from_row(row)?);
            }
            Ok(out)
        })
    }

    fn scalar(db: &Database, sql: &str, params: &[Value]) -> Result<FieldValue, StoreError> {
        db.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
            match rows.next()? {
                Some(row) => from_sql(row.get_ref(0)?),
                None => Ok(FieldValue::Null),
            }
        })
    }

    fn not_found(key: &R::Key) -> StoreError {
        StoreError::NotFound(format!("{} {key}", R::KIND))
    }
}

#[async_trait]
impl<R: SqlRecord> Repository<R> for SqliteRepository<R> {
    fn backend(&self) -> BackendType {
        BackendType::Relational
    }

    #[instrument(skip_all, fields(table = R::TABLE))]
    async fn create(&self, mut record: R) -> Result<R::Key, StoreError> {
        let db = self.db()?;
        let rowid = Self::rowid_key();
        if R::KEY_AUTOGENERATED && !rowid {
            record.set_key(<R::Key as RecordKey>::generate(0));
        }

        let mut names: Vec<&str> = Vec::new();
        let mut values = Vec::new();
        if !rowid {
            names.extend(R::KEY_COLUMNS.iter().map(|c| c.name));
            values.extend(Self::key_params(&record.key())?);
        }
        names.extend(R::COLUMNS.iter().map(|c| c.name));
        values.extend(Self::column_values(&record)?);

        let sql = if names.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", R::TABLE)
        } else {
            let slots: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                R::TABLE,
                names.join(", "),
                slots.join(", ")
            )
        };

        let rowid_value = db.with_conn(|conn| {
            conn.execute(&sql, rusqlite::params_from_iter(values.iter()))?;
            Ok(conn.last_insert_rowid())
        })?;

        let key = if rowid {
            <R::Key as RecordKey>::from_fields(&[FieldValue::Int(rowid_value)])
                .map_err(|e| StoreError::Database(e.to_string()))?
        } else {
            record.key()
        };
        debug!(key = %key, "record created");
        Ok(key)
    }

    #[instrument(skip_all, fields(table = R::TABLE, key = %key))]
    async fn read(&self, key: &R::Key) -> Result<Option<R>, StoreError> {
        let db = self.db()?;
        let sql = format!(
            "SELECT {} FROM {} WHERE {}",
            Self::select_list(),
            R::TABLE,
            Self::key_predicate(1)
        );
        let params = Self::key_params(key)?;
        Ok(Self::load(db, &sql, &params)?.into_iter().next())
    }

    #[instrument(skip_all, fields(table = R::TABLE))]
    async fn update(&self, record: &R) -> Result<(), StoreError> {
        let db = self.db()?;
        let key = record.key();
        if R::COLUMNS.is_empty() {
            return match self.read(&key).await? {
                Some(_) => Ok(()),
                None => Err(Self::not_found(&key)),
            };
        }

        let assignments: Vec<String> = R::COLUMNS
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = ?{}", c.name, i + 1))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            R::TABLE,
            assignments.join(", "),
            Self::key_predicate(R::COLUMNS.len() + 1)
        );
        let mut values = Self::column_values(record)?;
        values.extend(Self::key_params(&key)?);

        let changed = db.with_conn(|conn| {
            Ok(conn.execute(&sql, rusqlite::params_from_iter(values.iter()))?)
        })?;
        if changed == 0 {
            return Err(Self::not_found(&key));
        }
        Ok(())
    }

    #[instrument(skip_all, fields(table = R::TABLE, key = %key))]
    async fn delete(&self, key: &R::Key) -> Result<(), StoreError> {
        let db = self.db()?;
        let sql = format!("DELETE FROM {} WHERE {}", R::TABLE, Self::key_predicate(1));
        let params = Self::key_params(key)?;
        let changed = db.with_conn(|conn| {
            Ok(conn.execute(&sql, rusqlite::params_from_iter(params.iter()))?)
        })?;
        if changed == 0 {
            return Err(Self::not_found(key));
        }
        Ok(())
    }

    async fn fetch(&self, query: &Query<R>) -> Result<Vec<R>, StoreError> {
        let db = self.db()?;
        let mut params = Vec::new();
        let sql = Self::build_select(query, &Self::select_list(), &mut params)?;
        let rows = Self::load(db, &sql, &params)?;
        if query.is_translatable() {
            Ok(rows)
        } else {
            Ok(query.apply(rows)?)
        }
    }

    async fn count(&self, query: &Query<R>) -> Result<u64, StoreError> {
        if !query.is_translatable() {
            return Ok(self.fetch(query).await?.len() as u64);
        }
        let db = self.db()?;
        let mut params = Vec::new();
        let inner = Self::build_select(query, "1", &mut params)?;
        let sql = format!("SELECT COUNT(*) FROM ({inner})");
        let count = Self::scalar(db, &sql, &params)?;
        Ok(count.as_i64().map_or(0, |c| c.max(0) as u64))
    }

    async fn aggregate(&self, query: &Query<R>, op: &Aggregate) -> Result<FieldValue, StoreError> {
        let column = Self::check_column(op.field())?;
        if !query.is_translatable() {
            let records = self.fetch(query).await?;
            return Ok(crudkit_core::query::aggregate(&records, op)?);
        }

        let function = match op {
            Aggregate::Sum(_) => "SUM",
            Aggregate::Average(_) => "AVG",
            Aggregate::Min(_) => "MIN",
            Aggregate::Max(_) => "MAX",
        };
        if matches!(op, Aggregate::Sum(_) | Aggregate::Average(_)) && column.sql_type == SqlType::Text {
            return Err(QueryError::NotNumeric(column.name.to_string()).into());
        }

        let db = self.db()?;
        let mut params = Vec::new();
        let inner = Self::build_select(query, column.name, &mut params)?;
        let sql = format!("SELECT {function}({}) FROM ({inner})", column.name);
        Self::scalar(db, &sql, &params)
    }

    #[instrument(skip_all, fields(table = R::TABLE))]
    async fn clear_data(&self) -> Result<(), StoreError> {
        let db = self.db()?;
        let removed = db.with_conn(|conn| Ok(conn.execute(&format!("DELETE FROM {}", R::TABLE), [])?))?;
        debug!(removed, "table cleared");
        Ok(())
    }

    fn session(&self) -> Result<Session, StoreError> {
        Ok(Session::Relational(self.db()?.clone()))
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if !self.owns_session {
            return;
        }
        if let Some(db) = self.session.get() {
            if db.in_transaction() {
                if let Err(e) = db.rollback() {
                    warn!(table = R::TABLE, error = %e, "rollback on dispose failed");
                } else {
                    debug!(table = R::TABLE, "open transaction rolled back on dispose");
                }
            }
        }
    }
}
