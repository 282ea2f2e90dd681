/// Connection pragmas. WAL lets readers on other sessions proceed while a
/// shared session holds an open write transaction.
pub const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    Real,
    Text,
}

impl SqlType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Text => "TEXT",
        }
    }
}

/// A persisted column. Column names double as record field names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: SqlType,
    pub nullable: bool,
}

impl Column {
    pub const fn required(name: &'static str, sql_type: SqlType) -> Self {
        Self {
            name,
            sql_type,
            nullable: false,
        }
    }

    pub const fn nullable(name: &'static str, sql_type: SqlType) -> Self {
        Self {
            name,
            sql_type,
            nullable: true,
        }
    }
}

/// DDL for a record table. A single integer key column with `rowid_key`
/// becomes an alias of SQLite's rowid so inserts can omit it.
pub fn create_table_sql(
    table: &str,
    key_columns: &[Column],
    columns: &[Column],
    rowid_key: bool,
) -> String {
    let mut defs = Vec::with_capacity(key_columns.len() + columns.len() + 1);
    let single_rowid = rowid_key && key_columns.len() == 1 && key_columns[0].sql_type == SqlType::Integer;

    for col in key_columns {
        if single_rowid {
            defs.push(format!("    {} INTEGER PRIMARY KEY", col.name));
        } else {
            defs.push(format!("    {} {} NOT NULL", col.name, col.sql_type.as_sql()));
        }
    }
    for col in columns {
        let null = if col.nullable { "" } else { " NOT NULL" };
        defs.push(format!("    {} {}{}", col.name, col.sql_type.as_sql(), null));
    }
    if !single_rowid {
        let names: Vec<&str> = key_columns.iter().map(|c| c.name).collect();
        defs.push(format!("    PRIMARY KEY ({})", names.join(", ")));
    }

    format!("CREATE TABLE IF NOT EXISTS {table} (\n{}\n);", defs.join(",\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [Column; 1] = [Column::required("id", SqlType::Integer)];
    const COLS: [Column; 2] = [
        Column::required("name", SqlType::Text),
        Column::nullable("country", SqlType::Text),
    ];

    #[test]
    fn rowid_key_table() {
        let sql = create_table_sql("authors", &KEY, &COLS, true);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS authors"));
        assert!(sql.contains("id INTEGER PRIMARY KEY"));
        assert!(sql.contains("name TEXT NOT NULL"));
        assert!(sql.contains("country TEXT\n"));
        assert!(!sql.contains("PRIMARY KEY ("));
    }

    #[test]
    fn composite_key_table() {
        let keys = [
            Column::required("shelf", SqlType::Text),
            Column::required("slot", SqlType::Text),
        ];
        let sql = create_table_sql("shelves", &keys, &COLS, false);
        assert!(sql.contains("shelf TEXT NOT NULL"));
        assert!(sql.contains("PRIMARY KEY (shelf, slot)"));
    }

    #[test]
    fn ddl_executes() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(&create_table_sql("authors", &KEY, &COLS, true)).unwrap();
        conn.execute("INSERT INTO authors (name) VALUES ('Le Guin')", []).unwrap();
        assert_eq!(conn.last_insert_rowid(), 1);
    }
}
