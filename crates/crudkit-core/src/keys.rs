use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value::FieldValue;

/// The closed set of key shapes the repository factory resolves on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Integer,
    Text,
    Uuid,
    PartitionRow,
}

impl KeyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Text => "text",
            Self::Uuid => "uuid",
            Self::PartitionRow => "partition_row",
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} key: {detail}")]
pub struct KeyParseError {
    pub kind: KeyKind,
    pub detail: String,
}

impl KeyParseError {
    fn new(kind: KeyKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// Identity of a stored record.
pub trait RecordKey:
    Clone + Eq + Hash + fmt::Debug + fmt::Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const KIND: KeyKind;

    /// Sentinel that never identifies a stored record.
    fn invalid() -> Self;

    /// Produce a fresh server-side key. `sequence` is a per-record-type counter
    /// that integer keys use directly; other shapes may ignore it.
    fn generate(sequence: u64) -> Self;

    /// Parse the textual form used in request paths.
    fn parse(raw: &str) -> Result<Self, KeyParseError>;

    /// Column values, in key-column order.
    fn to_fields(&self) -> Vec<FieldValue>;

    fn from_fields(fields: &[FieldValue]) -> Result<Self, KeyParseError>;

    /// (partition, row) address used by the partitioned table store.
    fn table_address(&self) -> (String, String) {
        (String::new(), self.to_string())
    }
}

fn single_field(kind: KeyKind, fields: &[FieldValue]) -> Result<&FieldValue, KeyParseError> {
    match fields {
        [value] => Ok(value),
        _ => Err(KeyParseError::new(
            kind,
            format!("expected 1 field, got {}", fields.len()),
        )),
    }
}

impl RecordKey for i64 {
    const KIND: KeyKind = KeyKind::Integer;

    fn invalid() -> Self {
        -1
    }

    fn generate(sequence: u64) -> Self {
        i64::try_from(sequence).unwrap_or(i64::MAX)
    }

    fn parse(raw: &str) -> Result<Self, KeyParseError> {
        raw.trim()
            .parse()
            .map_err(|e| KeyParseError::new(KeyKind::Integer, format!("{raw:?}: {e}")))
    }

    fn to_fields(&self) -> Vec<FieldValue> {
        vec![FieldValue::Int(*self)]
    }

    fn from_fields(fields: &[FieldValue]) -> Result<Self, KeyParseError> {
        single_field(KeyKind::Integer, fields)?
            .as_i64()
            .ok_or_else(|| KeyParseError::new(KeyKind::Integer, "not an integer"))
    }

    /// Fixed-width row key whose text order is numeric order. The sign bit is
    /// flipped so negative keys sort before positive ones.
    fn table_address(&self) -> (String, String) {
        let biased = (*self as u64) ^ (1 << 63);
        (String::new(), format!("{biased:020}"))
    }
}

impl RecordKey for String {
    const KIND: KeyKind = KeyKind::Text;

    fn invalid() -> Self {
        String::new()
    }

    fn generate(_sequence: u64) -> Self {
        Uuid::now_v7().to_string()
    }

    fn parse(raw: &str) -> Result<Self, KeyParseError> {
        if raw.is_empty() {
            return Err(KeyParseError::new(KeyKind::Text, "empty"));
        }
        Ok(raw.to_owned())
    }

    fn to_fields(&self) -> Vec<FieldValue> {
        vec![FieldValue::Text(self.clone())]
    }

    fn from_fields(fields: &[FieldValue]) -> Result<Self, KeyParseError> {
        single_field(KeyKind::Text, fields)?
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| KeyParseError::new(KeyKind::Text, "not text"))
    }
}

impl RecordKey for Uuid {
    const KIND: KeyKind = KeyKind::Uuid;

    fn invalid() -> Self {
        Uuid::nil()
    }

    fn generate(_sequence: u64) -> Self {
        Uuid::now_v7()
    }

    fn parse(raw: &str) -> Result<Self, KeyParseError> {
        Uuid::parse_str(raw).map_err(|e| KeyParseError::new(KeyKind::Uuid, e.to_string()))
    }

    fn to_fields(&self) -> Vec<FieldValue> {
        vec![FieldValue::Text(self.to_string())]
    }

    fn from_fields(fields: &[FieldValue]) -> Result<Self, KeyParseError> {
        let raw = single_field(KeyKind::Uuid, fields)?
            .as_str()
            .ok_or_else(|| KeyParseError::new(KeyKind::Uuid, "not text"))?;
        Self::parse(raw)
    }
}

/// Composite key of the partitioned table store.
/// Textual form is `partition:row`; the partition may not contain `:`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableKey {
    pub partition: String,
    pub row: String,
}

impl TableKey {
    pub fn new(partition: impl Into<String>, row: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            row: row.into(),
        }
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.partition, self.row)
    }
}

impl RecordKey for TableKey {
    const KIND: KeyKind = KeyKind::PartitionRow;

    fn invalid() -> Self {
        Self::default()
    }

    fn generate(_sequence: u64) -> Self {
        Self::new("", Uuid::now_v7().to_string())
    }

    fn parse(raw: &str) -> Result<Self, KeyParseError> {
        let (partition, row) = raw
            .split_once(':')
            .ok_or_else(|| KeyParseError::new(KeyKind::PartitionRow, format!("{raw:?} has no ':'")))?;
        if row.is_empty() {
            return Err(KeyParseError::new(KeyKind::PartitionRow, "empty row"));
        }
        Ok(Self::new(partition, row))
    }

    fn to_fields(&self) -> Vec<FieldValue> {
        vec![
            FieldValue::Text(self.partition.clone()),
            FieldValue::Text(self.row.clone()),
        ]
    }

    fn from_fields(fields: &[FieldValue]) -> Result<Self, KeyParseError> {
        match fields {
            [FieldValue::Text(partition), FieldValue::Text(row)] => Ok(Self::new(partition, row)),
            _ => Err(KeyParseError::new(
                KeyKind::PartitionRow,
                "expected two text fields",
            )),
        }
    }

    fn table_address(&self) -> (String, String) {
        (self.partition.clone(), self.row.clone())
    }
}

/// Declare a prefixed text key, generated as `<prefix>_<uuid v7>`.
#[macro_export]
macro_rules! branded_key {
    ($name:ident, $prefix:expr) => {
        #[derive(Clone, Debug, Default, Hash, Eq, PartialEq, ::serde::Serialize, ::serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, $crate::__private::Uuid::now_v7()))
            }

            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl ::std::convert::AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl $crate::keys::RecordKey for $name {
            const KIND: $crate::keys::KeyKind = $crate::keys::KeyKind::Text;

            fn invalid() -> Self {
                Self(String::new())
            }

            fn generate(_sequence: u64) -> Self {
                Self::new()
            }

            fn parse(raw: &str) -> Result<Self, $crate::keys::KeyParseError> {
                <String as $crate::keys::RecordKey>::parse(raw).map(Self)
            }

            fn to_fields(&self) -> Vec<$crate::value::FieldValue> {
                vec![$crate::value::FieldValue::Text(self.0.clone())]
            }

            fn from_fields(
                fields: &[$crate::value::FieldValue],
            ) -> Result<Self, $crate::keys::KeyParseError> {
                <String as $crate::keys::RecordKey>::from_fields(fields).map(Self)
            }
        }
    };
}

impl FromStr for TableKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as RecordKey>::parse(s)
    }
}
