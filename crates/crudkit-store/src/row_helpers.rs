use crudkit_core::FieldValue;
use rusqlite::types::{Value, ValueRef};

use crate::error::StoreError;

/// Get a required column value from a row, returning CorruptRow on failure.
pub fn get<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Get an optional column value.
pub fn get_opt<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<Option<T>, StoreError> {
    get(row, idx, table, column)
}

/// Bind form of a field value. Booleans are stored as 0/1.
pub fn to_sql(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Bool(b) => Value::Integer(i64::from(*b)),
        FieldValue::Int(v) => Value::Integer(*v),
        FieldValue::Real(v) => Value::Real(*v),
        FieldValue::Text(s) => Value::Text(s.clone()),
    }
}

pub fn from_sql(value: ValueRef<'_>) -> Result<FieldValue, StoreError> {
    Ok(match value {
        ValueRef::Null => FieldValue::Null,
        ValueRef::Integer(v) => FieldValue::Int(v),
        ValueRef::Real(v) => FieldValue::Real(v),
        ValueRef::Text(bytes) => FieldValue::Text(
            std::str::from_utf8(bytes)
                .map_err(|e| StoreError::Serialization(format!("non-utf8 text: {e}")))?
                .to_owned(),
        ),
        ValueRef::Blob(_) => {
            return Err(StoreError::Serialization("blob columns are not supported".into()))
        }
    })
}

/// Make `%`, `_` and `\` match literally under `LIKE ... ESCAPE '\'`.
pub fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_wildcards_match_literally() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let hits = |title: &str, needle: &str| -> bool {
            conn.query_row(
                "SELECT ?1 LIKE ?2 ESCAPE '\\'",
                [title, format!("%{}%", escape_like(needle)).as_str()],
                |row| row.get(0),
            )
            .unwrap()
        };
        assert!(hits("100% Cotton", "100%"));
        assert!(!hits("1000 Cotton", "100%"));
        assert!(!hits("snake case", "e_c"));
        assert!(hits(r"C:\books", r"C:\"));
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn booleans_bind_as_integers() {
        assert_eq!(to_sql(&FieldValue::Bool(true)), Value::Integer(1));
        assert_eq!(to_sql(&FieldValue::Null), Value::Null);
    }

    #[test]
    fn sql_values_read_back() {
        assert_eq!(from_sql(ValueRef::Integer(7)).unwrap(), FieldValue::Int(7));
        assert_eq!(from_sql(ValueRef::Text(b"ok")).unwrap(), FieldValue::from("ok"));
        assert!(from_sql(ValueRef::Blob(b"\x00")).is_err());
    }

    #[test]
    fn corrupt_row_names_the_column() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let err = conn
            .query_row("SELECT 'not a number'", [], |row| {
                Ok(get::<i64>(row, 0, "authors", "id"))
            })
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, StoreError::CorruptRow { table: "authors", column: "id", .. }));
    }
}
