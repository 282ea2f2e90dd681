//! Deferred record projections.
//!
//! A [`Query`] describes filtering, ordering and a skip/take window without
//! executing anything. Backends either translate it (field criteria, sort keys
//! and the window are SQL-expressible) or evaluate it in memory with
//! [`Query::apply`]. Closure criteria added with [`Query::filter`] are always
//! evaluated in memory.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::record::Record;
use crate::value::FieldValue;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("unknown field '{field}' on {kind}")]
    UnknownField { kind: &'static str, field: String },

    #[error("cannot aggregate non-numeric field '{0}'")]
    NotNumeric(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Substring match on text fields.
    Contains,
}

impl CompareOp {
    fn test(self, left: &FieldValue, right: &FieldValue) -> bool {
        match self {
            Self::Eq => left.compare(right) == Some(Ordering::Equal),
            Self::Ne => left.compare(right) != Some(Ordering::Equal),
            Self::Lt => left.compare(right) == Some(Ordering::Less),
            Self::Le => matches!(left.compare(right), Some(Ordering::Less | Ordering::Equal)),
            Self::Gt => left.compare(right) == Some(Ordering::Greater),
            Self::Ge => matches!(left.compare(right), Some(Ordering::Greater | Ordering::Equal)),
            Self::Contains => left.contains(right),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub op: CompareOp,
    pub value: FieldValue,
}

pub type Predicate<R> = Arc<dyn Fn(&R) -> bool + Send + Sync>;

pub enum Criterion<R> {
    Field(FieldFilter),
    Matches(Predicate<R>),
}

impl<R> Clone for Criterion<R> {
    fn clone(&self) -> Self {
        match self {
            Self::Field(f) => Self::Field(f.clone()),
            Self::Matches(p) => Self::Matches(Arc::clone(p)),
        }
    }
}

impl<R> fmt::Debug for Criterion<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(filter) => f.debug_tuple("Field").field(filter).finish(),
            Self::Matches(_) => f.write_str("Matches(..)"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

/// Column aggregate over a projection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Aggregate {
    Sum(String),
    Average(String),
    Min(String),
    Max(String),
}

impl Aggregate {
    pub fn field(&self) -> &str {
        match self {
            Self::Sum(f) | Self::Average(f) | Self::Min(f) | Self::Max(f) => f,
        }
    }
}

pub struct Query<R> {
    criteria: Vec<Criterion<R>>,
    sort: Vec<SortKey>,
    skip: u64,
    take: Option<u64>,
}

impl<R> Clone for Query<R> {
    fn clone(&self) -> Self {
        Self {
            criteria: self.criteria.clone(),
            sort: self.sort.clone(),
            skip: self.skip,
            take: self.take,
        }
    }
}

impl<R> fmt::Debug for Query<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("criteria", &self.criteria)
            .field("sort", &self.sort)
            .field("skip", &self.skip)
            .field("take", &self.take)
            .finish()
    }
}

impl<R> Default for Query<R> {
    fn default() -> Self {
        Self {
            criteria: Vec::new(),
            sort: Vec::new(),
            skip: 0,
            take: None,
        }
    }
}

impl<R: Record> Query<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_field(mut self, field: &str, op: CompareOp, value: impl Into<FieldValue>) -> Self {
        self.criteria.push(Criterion::Field(FieldFilter {
            field: field.to_string(),
            op,
            value: value.into(),
        }));
        self
    }

    pub fn where_eq(self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.where_field(field, CompareOp::Eq, value)
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&R) -> bool + Send + Sync + 'static,
    {
        self.criteria.push(Criterion::Matches(Arc::new(predicate)));
        self
    }

    pub fn order_by(mut self, field: &str) -> Self {
        self.sort.push(SortKey {
            field: field.to_string(),
            descending: false,
        });
        self
    }

    pub fn order_by_desc(mut self, field: &str) -> Self {
        self.sort.push(SortKey {
            field: field.to_string(),
            descending: true,
        });
        self
    }

    /// Skip `n` more elements of the current window.
    pub fn skip(mut self, n: u64) -> Self {
        self.skip = self.skip.saturating_add(n);
        self.take = self.take.map(|t| t.saturating_sub(n));
        self
    }

    /// Limit the current window to at most `n` elements.
    pub fn take(mut self, n: u64) -> Self {
        self.take = Some(self.take.map_or(n, |t| t.min(n)));
        self
    }

    /// Drop the window, keeping criteria and ordering.
    pub fn unpaged(mut self) -> Self {
        self.skip = 0;
        self.take = None;
        self
    }

    pub fn criteria(&self) -> &[Criterion<R>] {
        &self.criteria
    }

    pub fn field_filters(&self) -> impl Iterator<Item = &FieldFilter> {
        self.criteria.iter().filter_map(|c| match c {
            Criterion::Field(f) => Some(f),
            Criterion::Matches(_) => None,
        })
    }

    pub fn sort_keys(&self) -> &[SortKey] {
        &self.sort
    }

    pub fn offset(&self) -> u64 {
        self.skip
    }

    pub fn limit(&self) -> Option<u64> {
        self.take
    }

    /// True when no closure criteria are present.
    pub fn is_translatable(&self) -> bool {
        self.criteria.iter().all(|c| matches!(c, Criterion::Field(_)))
    }

    /// Field names referenced by criteria and sort keys.
    pub fn referenced_fields(&self) -> impl Iterator<Item = &str> {
        self.field_filters()
            .map(|f| f.field.as_str())
            .chain(self.sort.iter().map(|s| s.field.as_str()))
    }

    pub fn matches(&self, record: &R) -> Result<bool, QueryError> {
        for criterion in &self.criteria {
            let pass = match criterion {
                Criterion::Field(filter) => {
                    let value = field_of(record, &filter.field)?;
                    filter.op.test(&value, &filter.value)
                }
                Criterion::Matches(predicate) => predicate(record),
            };
            if !pass {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Evaluate the projection over materialised records.
    pub fn apply(&self, records: Vec<R>) -> Result<Vec<R>, QueryError> {
        let mut kept = Vec::with_capacity(records.len());
        for record in records {
            if self.matches(&record)? {
                kept.push(record);
            }
        }

        if !self.sort.is_empty() {
            let mut keyed = Vec::with_capacity(kept.len());
            for record in kept {
                let values = self
                    .sort
                    .iter()
                    .map(|s| field_of(&record, &s.field))
                    .collect::<Result<Vec<_>, _>>()?;
                keyed.push((values, record));
            }
            keyed.sort_by(|(a, _), (b, _)| self.compare_sort_values(a, b));
            kept = keyed.into_iter().map(|(_, r)| r).collect();
        }

        let skip = usize::try_from(self.skip).unwrap_or(usize::MAX);
        let window = kept.into_iter().skip(skip);
        Ok(match self.take {
            Some(take) => window.take(usize::try_from(take).unwrap_or(usize::MAX)).collect(),
            None => window.collect(),
        })
    }

    fn compare_sort_values(&self, a: &[FieldValue], b: &[FieldValue]) -> Ordering {
        for (key, (x, y)) in self.sort.iter().zip(a.iter().zip(b)) {
            // Nulls first, like SQLite.
            let ord = match (x.is_null(), y.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => x.compare(y).unwrap_or(Ordering::Equal),
            };
            let ord = if key.descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

fn field_of<R: Record>(record: &R, name: &str) -> Result<FieldValue, QueryError> {
    record.field(name).ok_or_else(|| QueryError::UnknownField {
        kind: R::KIND.as_str(),
        field: name.to_string(),
    })
}

/// Compute an aggregate over materialised records. Nulls are ignored; an
/// empty input yields `Null`.
pub fn aggregate<R: Record>(records: &[R], op: &Aggregate) -> Result<FieldValue, QueryError> {
    let mut values = Vec::with_capacity(records.len());
    for record in records {
        let value = field_of(record, op.field())?;
        if !value.is_null() {
            values.push(value);
        }
    }
    if values.is_empty() {
        return Ok(FieldValue::Null);
    }

    match op {
        Aggregate::Sum(field) | Aggregate::Average(field) => {
            let all_int = values.iter().all(|v| matches!(v, FieldValue::Int(_)));
            let mut total = 0f64;
            let mut int_total = 0i64;
            for v in &values {
                let x = v
                    .as_f64()
                    .ok_or_else(|| QueryError::NotNumeric(field.clone()))?;
                total += x;
                if let FieldValue::Int(i) = v {
                    int_total = int_total.saturating_add(*i);
                }
            }
            Ok(match op {
                Aggregate::Sum(_) if all_int => FieldValue::Int(int_total),
                Aggregate::Sum(_) => FieldValue::Real(total),
                _ => FieldValue::Real(total / values.len() as f64),
            })
        }
        Aggregate::Min(_) | Aggregate::Max(_) => {
            let want = if matches!(op, Aggregate::Min(_)) {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            let mut best = values[0].clone();
            for v in values.into_iter().skip(1) {
                if v.compare(&best) == Some(want) {
                    best = v;
                }
            }
            Ok(best)
        }
    }
}
