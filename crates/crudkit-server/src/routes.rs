//! Generic resource routes: one CRUD controller and one search controller
//! mounted under a path.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query as QueryParams, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use crudkit_core::{ApiError, DataExchange, Record, RecordKey};
use serde::de::DeserializeOwned;

use crate::crud::CrudController;
use crate::error::{rejected, HttpError};
use crate::search::{SearchController, SearchGenerator};

/// Default `Cache-Control` max-age for search responses, in seconds.
pub const DEFAULT_CACHE_MAX_AGE: u64 = 3600;

pub struct Resource<D: Send + Sync + 'static, R: Record, Q, G> {
    crud: CrudController<D, R>,
    search: SearchController<Q, G>,
    cache_max_age: u64,
}

impl<D, R, Q, G> Resource<D, R, Q, G>
where
    D: DataExchange<R>,
    R: Record,
    Q: DeserializeOwned + Send + Sync + 'static,
    G: SearchGenerator<Q> + 'static,
{
    pub fn new(crud: CrudController<D, R>, search: SearchController<Q, G>) -> Self {
        Self {
            crud,
            search,
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
        }
    }

    pub fn cache_max_age(mut self, seconds: u64) -> Self {
        self.cache_max_age = seconds;
        self
    }

    /// Mount the resource at `path`:
    /// `GET|DELETE {path}/{id}`, `POST|PUT {path}` and `GET {path}?query`.
    pub fn into_router(self, path: &str) -> Router {
        let state = Arc::new(self);
        let base = format!("/{}", path.trim_matches('/'));
        Router::new()
            .route(
                &base,
                get(search::<D, R, Q, G>)
                    .post(create::<D, R, Q, G>)
                    .put(update::<D, R, Q, G>),
            )
            .route(
                &format!("{base}/{{id}}"),
                get(fetch::<D, R, Q, G>).delete(remove::<D, R, Q, G>),
            )
            .with_state(state)
    }
}

type Shared<D, R, Q, G> = State<Arc<Resource<D, R, Q, G>>>;

/// Empty bodies and a literal `null` both mean "no DTO".
fn parse_body<D: DeserializeOwned>(body: &[u8]) -> Result<Option<D>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice::<Option<D>>(body).map_err(|_| rejected(ApiError::invalid_request()))
}

fn parse_key<K: RecordKey>(raw: &str) -> Result<K, ApiError> {
    K::parse(raw).map_err(|_| rejected(ApiError::invalid_request()))
}

async fn fetch<D, R, Q, G>(
    State(res): Shared<D, R, Q, G>,
    Path(id): Path<String>,
) -> Result<Json<D>, HttpError>
where
    D: DataExchange<R>,
    R: Record,
    Q: DeserializeOwned + Send + Sync + 'static,
    G: SearchGenerator<Q> + 'static,
{
    let key = parse_key::<R::Key>(&id)?;
    Ok(Json(res.crud.get(&key).await?))
}

async fn create<D, R, Q, G>(State(res): Shared<D, R, Q, G>, body: Bytes) -> Result<Response, HttpError>
where
    D: DataExchange<R>,
    R: Record,
    Q: DeserializeOwned + Send + Sync + 'static,
    G: SearchGenerator<Q> + 'static,
{
    let dto = parse_body::<D>(&body)?;
    let created = res.crud.post(dto).await?;
    Ok((StatusCode::CREATED, Json(created)).into_response())
}

async fn update<D, R, Q, G>(State(res): Shared<D, R, Q, G>, body: Bytes) -> Result<StatusCode, HttpError>
where
    D: DataExchange<R>,
    R: Record,
    Q: DeserializeOwned + Send + Sync + 'static,
    G: SearchGenerator<Q> + 'static,
{
    let dto = parse_body::<D>(&body)?;
    res.crud.put(dto).await?;
    Ok(StatusCode::OK)
}

async fn remove<D, R, Q, G>(
    State(res): Shared<D, R, Q, G>,
    Path(id): Path<String>,
) -> Result<StatusCode, HttpError>
where
    D: DataExchange<R>,
    R: Record,
    Q: DeserializeOwned + Send + Sync + 'static,
    G: SearchGenerator<Q> + 'static,
{
    let key = parse_key::<R::Key>(&id)?;
    res.crud.delete(&key).await?;
    Ok(StatusCode::OK)
}

async fn search<D, R, Q, G>(
    State(res): Shared<D, R, Q, G>,
    QueryParams(query): QueryParams<Q>,
) -> Result<Response, HttpError>
where
    D: DataExchange<R>,
    R: Record,
    Q: DeserializeOwned + Send + Sync + 'static,
    G: SearchGenerator<Q> + 'static,
{
    let found = res.search.get(&query).await?;
    let cache = format!("public, max-age={}", res.cache_max_age);
    Ok(([(header::CACHE_CONTROL, cache)], Json(found)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::WidgetDto;

    #[test]
    fn empty_and_null_bodies_are_absent() {
        assert!(parse_body::<WidgetDto>(b"").unwrap().is_none());
        assert!(parse_body::<WidgetDto>(b"  \n").unwrap().is_none());
        assert!(parse_body::<WidgetDto>(b"null").unwrap().is_none());
    }

    #[test]
    fn malformed_body_is_invalid_request() {
        let err = parse_body::<WidgetDto>(b"{\"name\":").unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn body_parses_into_dto() {
        let dto = parse_body::<WidgetDto>(br#"{"name":"gear","price":2.5}"#)
            .unwrap()
            .unwrap();
        assert_eq!(dto.name.as_deref(), Some("gear"));
        assert_eq!(dto.price, Some(2.5));
    }

    #[test]
    fn bad_path_key_is_invalid_request() {
        assert!(parse_key::<i64>("abc").is_err());
        assert_eq!(parse_key::<i64>("17").unwrap(), 17);
    }
}
