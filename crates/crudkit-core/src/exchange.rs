use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::record::Record;

/// Wire-facing representation of a record.
///
/// Fields a client may omit are `Option`s; mapping onto a record only
/// overwrites with values that are present (see [`assign`]).
pub trait DataExchange<R: Record>: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn is_valid_for_creation(&self) -> bool;

    fn is_valid_for_editing(&self) -> bool;

    fn from_model(record: &R) -> Self;

    /// Copy every present field onto `record`.
    fn update_model(&self, record: &mut R);

    /// Apply this DTO as an edit of an already stored record. Override to
    /// leave fields that may only be set at creation untouched.
    fn update_existing(&self, record: &mut R) {
        self.update_model(record);
    }

    fn contents_equal(&self, other: &Self) -> bool {
        let mut mine = R::default();
        let mut theirs = R::default();
        self.update_model(&mut mine);
        other.update_model(&mut theirs);
        mine.contents_equal(&theirs)
    }
}

/// Overwrite `target` only when `incoming` carries a value.
pub fn assign<T: Clone>(target: &mut T, incoming: &Option<T>) {
    if let Some(value) = incoming {
        *target = value.clone();
    }
}

/// Like [`assign`], for nullable record fields.
pub fn assign_opt<T: Clone>(target: &mut Option<T>, incoming: &Option<T>) {
    if incoming.is_some() {
        *target = incoming.clone();
    }
}

/// A required DTO field. Empty strings count as missing.
pub trait Presence {
    fn is_present(&self) -> bool;
}

impl Presence for Option<String> {
    fn is_present(&self) -> bool {
        self.as_deref().is_some_and(|s| !s.is_empty())
    }
}

macro_rules! scalar_presence {
    ($($t:ty),*) => {
        $(impl Presence for Option<$t> {
            fn is_present(&self) -> bool {
                self.is_some()
            }
        })*
    };
}

scalar_presence!(bool, i32, i64, u32, u64, f64);

pub fn all_present(fields: &[&dyn Presence]) -> bool {
    fields.iter().all(|f| f.is_present())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::fixtures::Gadget;
    use serde::Deserialize;

    #[derive(Clone, Debug, Default, Serialize, Deserialize)]
    struct GadgetDto {
        id: Option<i64>,
        name: Option<String>,
        weight: Option<f64>,
    }

    impl DataExchange<Gadget> for GadgetDto {
        fn is_valid_for_creation(&self) -> bool {
            all_present(&[&self.name])
        }

        fn is_valid_for_editing(&self) -> bool {
            all_present(&[&self.id, &self.name])
        }

        fn from_model(record: &Gadget) -> Self {
            Self {
                id: Some(record.id),
                name: Some(record.name.clone()),
                weight: record.weight,
            }
        }

        fn update_model(&self, record: &mut Gadget) {
            assign(&mut record.id, &self.id);
            assign(&mut record.name, &self.name);
            assign_opt(&mut record.weight, &self.weight);
        }
    }

    #[test]
    fn empty_string_is_not_present() {
        let dto = GadgetDto {
            name: Some(String::new()),
            ..Default::default()
        };
        assert!(!dto.is_valid_for_creation());
    }

    #[test]
    fn editing_requires_key() {
        let dto = GadgetDto {
            name: Some("lamp".into()),
            ..Default::default()
        };
        assert!(dto.is_valid_for_creation());
        assert!(!dto.is_valid_for_editing());
    }

    #[test]
    fn update_model_keeps_unset_fields() {
        let mut record = Gadget::new(4, "chair", Some(7.0));
        let dto = GadgetDto {
            weight: Some(6.5),
            ..Default::default()
        };
        dto.update_model(&mut record);
        assert_eq!(record, Gadget::new(4, "chair", Some(6.5)));
    }

    #[test]
    fn contents_equal_ignores_key() {
        let a = GadgetDto::from_model(&Gadget::new(1, "pen", None));
        let b = GadgetDto {
            id: None,
            name: Some("pen".into()),
            weight: None,
        };
        assert!(a.contents_equal(&b));
        let c = GadgetDto {
            weight: Some(0.1),
            ..b.clone()
        };
        assert!(!a.contents_equal(&c));
    }
}
