//! Records, DTOs and factories shared by the pipeline tests.

use std::sync::Arc;

use async_trait::async_trait;
use crudkit_core::exchange::{all_present, assign, assign_opt};
use crudkit_core::{ApiError, DataExchange, FieldValue, Query, Record, RecordKind, SearchQuery};
use crudkit_store::row_helpers::{get, get_opt};
use crudkit_store::{
    Backend, Column, RegistryBuilder, RepositoryFactory, SqlRecord, SqlType, StorageConfig,
    StoreError,
};
use serde::{Deserialize, Serialize};

use crate::crud::ValidationRules;
use crate::scope::RequestScope;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Maker {
    pub id: String,
    pub name: String,
}

impl Record for Maker {
    type Key = String;
    const KIND: RecordKind = RecordKind::new("maker");
    const KEY_AUTOGENERATED: bool = false;

    fn key(&self) -> String {
        self.id.clone()
    }

    fn set_key(&mut self, key: String) {
        self.id = key;
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "id" => Some(self.id.as_str().into()),
            "name" => Some(self.name.as_str().into()),
            _ => None,
        }
    }

    fn contents_equal(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl SqlRecord for Maker {
    const TABLE: &'static str = "makers";
    const KEY_COLUMNS: &'static [Column] = &[Column::required("id", SqlType::Text)];
    const COLUMNS: &'static [Column] = &[Column::required("name", SqlType::Text)];

    fn from_row(row: &rusqlite::Row<'_>) -> Result<Self, StoreError> {
        Ok(Self {
            id: get(row, 0, Self::TABLE, "id")?,
            name: get(row, 1, Self::TABLE, "name")?,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MakerDto {
    pub id: Option<String>,
    pub name: Option<String>,
}

impl DataExchange<Maker> for MakerDto {
    fn is_valid_for_creation(&self) -> bool {
        all_present(&[&self.id, &self.name])
    }

    fn is_valid_for_editing(&self) -> bool {
        self.is_valid_for_creation()
    }

    fn from_model(record: &Maker) -> Self {
        Self {
            id: Some(record.id.clone()),
            name: Some(record.name.clone()),
        }
    }

    fn update_model(&self, record: &mut Maker) {
        assign(&mut record.id, &self.id);
        assign(&mut record.name, &self.name);
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Widget {
    pub id: i64,
    pub name: String,
    pub maker: Option<String>,
    pub price: Option<f64>,
}

impl Record for Widget {
    type Key = i64;
    const KIND: RecordKind = RecordKind::new("widget");
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
            "maker" => Some(self.maker.clone().into()),
            "price" => Some(self.price.into()),
            _ => None,
        }
    }

    fn contents_equal(&self, other: &Self) -> bool {
        self.name == other.name && self.maker == other.maker && self.price == other.price
    }
}

impl SqlRecord for Widget {
    const TABLE: &'static str = "widgets";
    const KEY_COLUMNS: &'static [Column] = &[Column::required("id", SqlType::Integer)];
    const COLUMNS: &'static [Column] = &[
        Column::required("name", SqlType::Text),
        Column::nullable("maker", SqlType::Text),
        Column::nullable("price", SqlType::Real),
    ];

    fn from_row(row: &rusqlite::Row<'_>) -> Result<Self, StoreError> {
        Ok(Self {
            id: get(row, 0, Self::TABLE, "id")?,
            name: get(row, 1, Self::TABLE, "name")?,
            maker: get_opt(row, 2, Self::TABLE, "maker")?,
            price: get_opt(row, 3, Self::TABLE, "price")?,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WidgetDto {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub maker: Option<String>,
    pub price: Option<f64>,
}

impl WidgetDto {
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::default()
        }
    }
}

impl DataExchange<Widget> for WidgetDto {
    fn is_valid_for_creation(&self) -> bool {
        all_present(&[&self.name])
    }

    fn is_valid_for_editing(&self) -> bool {
        all_present(&[&self.id])
    }

    fn from_model(record: &Widget) -> Self {
        Self {
            id: Some(record.id),
            name: Some(record.name.clone()),
            maker: record.maker.clone(),
            price: record.price,
        }
    }

    fn update_model(&self, record: &mut Widget) {
        assign(&mut record.id, &self.id);
        assign(&mut record.name, &self.name);
        assign_opt(&mut record.maker, &self.maker);
        assign_opt(&mut record.price, &self.price);
    }
}

/// Widgets may only reference known makers.
pub struct WidgetRules;

impl WidgetRules {
    async fn known_maker(scope: &RequestScope<Widget>, dto: &WidgetDto) -> Result<(), ApiError> {
        scope
            .ensure_referenced_entity_is_present::<Maker>(true, dto.maker.as_ref(), "Unknown maker")
            .await
    }
}

#[async_trait]
impl ValidationRules<WidgetDto, Widget> for WidgetRules {
    async fn check_creation(&self, scope: &RequestScope<Widget>, dto: &WidgetDto) -> Result<(), ApiError> {
        Self::known_maker(scope, dto).await
    }

    async fn check_editing(&self, scope: &RequestScope<Widget>, dto: &WidgetDto) -> Result<(), ApiError> {
        Self::known_maker(scope, dto).await
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct WidgetSearch {
    #[serde(default)]
    pub take: i64,
    #[serde(default)]
    pub skip: i64,
    pub name: Option<String>,
}

impl SearchQuery<Widget> for WidgetSearch {
    fn num_to_take(&self) -> i64 {
        self.take
    }

    fn num_to_skip(&self) -> i64 {
        self.skip
    }

    fn generate_search_query(&self, base: Query<Widget>) -> Query<Widget> {
        let base = base.order_by("id");
        match &self.name {
            Some(name) => base.where_field("name", crudkit_core::CompareOp::Contains, name.as_str()),
            None => base,
        }
    }
}

pub fn register(r: &mut RegistryBuilder) {
    match r.backend() {
        crudkit_store::BackendType::Relational => {
            r.relational::<Widget>().relational::<Maker>();
        }
        _ => {
            r.memory::<Widget>().memory::<Maker>();
        }
    }
}

pub fn memory_factory() -> Arc<RepositoryFactory> {
    Arc::new(RepositoryFactory::new(Backend::memory(), register))
}

pub fn relational_factory(dir: &tempfile::TempDir) -> Arc<RepositoryFactory> {
    let config = StorageConfig::relational(dir.path().join("pipeline.db").to_string_lossy());
    match RepositoryFactory::from_config(&config, register) {
        Ok(factory) => Arc::new(factory),
        Err(e) => panic!("relational factory: {e}"),
    }
}
