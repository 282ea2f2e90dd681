use std::fmt;

use crate::keys::RecordKey;
use crate::value::FieldValue;

/// Static tag naming a record type in the repository registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKind(&'static str);

impl RecordKind {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// A uniquely keyed, persistence-shaped entity.
///
/// `Default` is the empty record shell that DTOs are mapped onto.
pub trait Record: Clone + Default + fmt::Debug + Send + Sync + 'static {
    type Key: RecordKey;

    const KIND: RecordKind;

    /// Whether the backend assigns the key on create.
    const KEY_AUTOGENERATED: bool;

    fn key(&self) -> Self::Key;

    fn set_key(&mut self, key: Self::Key);

    /// Named field access for query evaluation. `None` means the record has
    /// no such field; a present-but-empty field is `Some(FieldValue::Null)`.
    fn field(&self, name: &str) -> Option<FieldValue>;

    /// Compare everything except the key.
    fn contents_equal(&self, other: &Self) -> bool;

    fn key_equal(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    #[derive(Clone, Debug, Default, PartialEq)]
    pub struct Gadget {
        pub id: i64,
        pub name: String,
        pub weight: Option<f64>,
    }

    impl Gadget {
        pub fn new(id: i64, name: &str, weight: Option<f64>) -> Self {
            Self {
                id,
                name: name.to_string(),
                weight,
            }
        }
    }

    impl Record for Gadget {
        type Key = i64;
        const KIND: RecordKind = RecordKind::new("gadget");
        const KEY_AUTOGENERATED: bool = true;

        fn key(&self) -> i64 {
            self.id
        }

        fn set_key(&mut self, key: i64) {
            self.id = key;
        }

        fn field(&self, name: &str) -> Option<FieldValue> {
            match name {
                "id" => Some(self.id.into()),
                "name" => Some(self.name.as_str().into()),
                "weight" => Some(self.weight.into()),
                _ => None,
            }
        }

        fn contents_equal(&self, other: &Self) -> bool {
            self.name == other.name && self.weight == other.weight
        }
    }
}
