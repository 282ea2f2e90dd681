//! Demo catalog: authors, the books they wrote, and reader reviews.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use crudkit_core::exchange::{all_present, assign, assign_opt};
use crudkit_core::{
    ApiError, CompareOp, DataExchange, FieldValue, Query, Record, RecordKind, SearchQuery,
};
use crudkit_server::{
    CrudController, ModelSearch, RequestScope, Resource, SearchController, ValidationRules,
};
use crudkit_store::row_helpers::{get, get_opt};
use crudkit_store::{Column, RegistryBuilder, RepositoryFactory, SqlRecord, SqlType, StoreError, TableEntity};
use serde::{Deserialize, Serialize};

use crate::settings::Settings;

crudkit_core::branded_key!(ReviewId, "rev");

// ── Authors ────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: i64,
    pub name: String,
    pub country: Option<String>,
}

impl Record for Author {
    type Key = i64;
    const KIND: RecordKind = RecordKind::new("author");
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
            "country" => Some(self.country.clone().into()),
            _ => None,
        }
    }

    fn contents_equal(&self, other: &Self) -> bool {
        self.name == other.name && self.country == other.country
    }
}

impl SqlRecord for Author {
    const TABLE: &'static str = "authors";
    const KEY_COLUMNS: &'static [Column] = &[Column::required("id", SqlType::Integer)];
    const COLUMNS: &'static [Column] = &[
        Column::required("name", SqlType::Text),
        Column::nullable("country", SqlType::Text),
    ];

    fn from_row(row: &rusqlite::Row<'_>) -> Result<Self, StoreError> {
        Ok(Self {
            id: get(row, 0, Self::TABLE, "id")?,
            name: get(row, 1, Self::TABLE, "name")?,
            country: get_opt(row, 2, Self::TABLE, "country")?,
        })
    }
}

impl TableEntity for Author {
    const TABLE_NAME: &'static str = "authors";
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorDto {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub country: Option<String>,
}

impl DataExchange<Author> for AuthorDto {
    fn is_valid_for_creation(&self) -> bool {
        all_present(&[&self.name])
    }

    fn is_valid_for_editing(&self) -> bool {
        all_present(&[&self.id])
    }

    fn from_model(record: &Author) -> Self {
        Self {
            id: Some(record.id),
            name: Some(record.name.clone()),
            country: record.country.clone(),
        }
    }

    fn update_model(&self, record: &mut Author) {
        assign(&mut record.id, &self.id);
        assign(&mut record.name, &self.name);
        assign_opt(&mut record.country, &self.country);
    }
}

const AUTHOR_NAME_IN_USE: &str = "Author name is already in use";

/// Author names are unique across the catalog.
pub struct AuthorRules;

#[async_trait]
impl ValidationRules<AuthorDto, Author> for AuthorRules {
    async fn check_creation(&self, scope: &RequestScope<Author>, dto: &AuthorDto) -> Result<(), ApiError> {
        let Some(name) = dto.name.as_ref() else {
            return Ok(());
        };
        if scope.value_is_present(|a| a.name.clone(), name).await? {
            return Err(ApiError::Conflict(AUTHOR_NAME_IN_USE.into()));
        }
        Ok(())
    }

    async fn check_editing(&self, scope: &RequestScope<Author>, dto: &AuthorDto) -> Result<(), ApiError> {
        let (Some(id), Some(name)) = (dto.id, dto.name.as_ref()) else {
            return Ok(());
        };
        if scope.value_is_held_by_another(&id, |a| a.name.clone(), name).await? {
            return Err(ApiError::Conflict(AUTHOR_NAME_IN_USE.into()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthorSearch {
    pub take: Option<i64>,
    pub skip: i64,
    pub name: Option<String>,
    pub country: Option<String>,
}

impl SearchQuery<Author> for AuthorSearch {
    fn num_to_take(&self) -> i64 {
        self.take.unwrap_or(DEFAULT_PAGE)
    }

    fn num_to_skip(&self) -> i64 {
        self.skip
    }

    fn generate_search_query(&self, base: Query<Author>) -> Query<Author> {
        let mut query = base.order_by("name");
        if let Some(name) = &self.name {
            query = query.where_field("name", CompareOp::Contains, name.as_str());
        }
        if let Some(country) = &self.country {
            query = query.where_eq("country", country.as_str());
        }
        query
    }
}

// ── Books ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub isbn: String,
    pub title: String,
    pub author_id: i64,
    pub year: Option<i64>,
}

impl Record for Book {
    type Key = String;
    const KIND: RecordKind = RecordKind::new("book");
    const KEY_AUTOGENERATED: bool = false;

    fn key(&self) -> String {
        self.isbn.clone()
    }

    fn set_key(&mut self, key: String) {
        self.isbn = key;
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "isbn" => Some(self.isbn.as_str().into()),
            "title" => Some(self.title.as_str().into()),
            "author_id" => Some(self.author_id.into()),
            "year" => Some(self.year.into()),
            _ => None,
        }
    }

    fn contents_equal(&self, other: &Self) -> bool {
        self.title == other.title && self.author_id == other.author_id && self.year == other.year
    }
}

impl SqlRecord for Book {
    const TABLE: &'static str = "books";
    const KEY_COLUMNS: &'static [Column] = &[Column::required("isbn", SqlType::Text)];
    const COLUMNS: &'static [Column] = &[
        Column::required("title", SqlType::Text),
        Column::required("author_id", SqlType::Integer),
        Column::nullable("year", SqlType::Integer),
    ];

    fn from_row(row: &rusqlite::Row<'_>) -> Result<Self, StoreError> {
        Ok(Self {
            isbn: get(row, 0, Self::TABLE, "isbn")?,
            title: get(row, 1, Self::TABLE, "title")?,
            author_id: get(row, 2, Self::TABLE, "author_id")?,
            year: get_opt(row, 3, Self::TABLE, "year")?,
        })
    }
}

impl TableEntity for Book {
    const TABLE_NAME: &'static str = "books";
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookDto {
    pub isbn: Option<String>,
    pub title: Option<String>,
    pub author_id: Option<i64>,
    pub year: Option<i64>,
}

impl DataExchange<Book> for BookDto {
    fn is_valid_for_creation(&self) -> bool {
        all_present(&[&self.isbn, &self.title, &self.author_id])
    }

    fn is_valid_for_editing(&self) -> bool {
        all_present(&[&self.isbn])
    }

    fn from_model(record: &Book) -> Self {
        Self {
            isbn: Some(record.isbn.clone()),
            title: Some(record.title.clone()),
            author_id: Some(record.author_id),
            year: record.year,
        }
    }

    fn update_model(&self, record: &mut Book) {
        assign(&mut record.isbn, &self.isbn);
        assign(&mut record.title, &self.title);
        assign(&mut record.author_id, &self.author_id);
        assign_opt(&mut record.year, &self.year);
    }
}

const UNKNOWN_AUTHOR: &str = "Author does not exist";

pub struct BookRules;

#[async_trait]
impl ValidationRules<BookDto, Book> for BookRules {
    async fn check_creation(&self, scope: &RequestScope<Book>, dto: &BookDto) -> Result<(), ApiError> {
        scope
            .ensure_referenced_entity_is_present::<Author>(false, dto.author_id.as_ref(), UNKNOWN_AUTHOR)
            .await
    }

    /// An edit may leave the author unset, which keeps the stored one.
    async fn check_editing(&self, scope: &RequestScope<Book>, dto: &BookDto) -> Result<(), ApiError> {
        scope
            .ensure_referenced_entity_is_present::<Author>(true, dto.author_id.as_ref(), UNKNOWN_AUTHOR)
            .await
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookSearch {
    pub take: Option<i64>,
    pub skip: i64,
    pub author_id: Option<i64>,
    pub title: Option<String>,
    pub published_after: Option<i64>,
}

impl SearchQuery<Book> for BookSearch {
    fn num_to_take(&self) -> i64 {
        self.take.unwrap_or(DEFAULT_PAGE)
    }

    fn num_to_skip(&self) -> i64 {
        self.skip
    }

    fn generate_search_query(&self, base: Query<Book>) -> Query<Book> {
        let mut query = base.order_by("title");
        if let Some(author_id) = self.author_id {
            query = query.where_eq("author_id", author_id);
        }
        if let Some(title) = &self.title {
            query = query.where_field("title", CompareOp::Contains, title.as_str());
        }
        if let Some(year) = self.published_after {
            query = query.where_field("year", CompareOp::Gt, year);
        }
        query
    }
}

// ── Reviews ────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub book_isbn: String,
    pub rating: i64,
    pub body: Option<String>,
}

impl Record for Review {
    type Key = ReviewId;
    const KIND: RecordKind = RecordKind::new("review");
    const KEY_AUTOGENERATED: bool = true;

    fn key(&self) -> ReviewId {
        self.id.clone()
    }

    fn set_key(&mut self, key: ReviewId) {
        self.id = key;
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "id" => Some(self.id.as_str().into()),
            "book_isbn" => Some(self.book_isbn.as_str().into()),
            "rating" => Some(self.rating.into()),
            "body" => Some(self.body.clone().into()),
            _ => None,
        }
    }

    fn contents_equal(&self, other: &Self) -> bool {
        self.book_isbn == other.book_isbn && self.rating == other.rating && self.body == other.body
    }
}

impl SqlRecord for Review {
    const TABLE: &'static str = "reviews";
    const KEY_COLUMNS: &'static [Column] = &[Column::required("id", SqlType::Text)];
    const COLUMNS: &'static [Column] = &[
        Column::required("book_isbn", SqlType::Text),
        Column::required("rating", SqlType::Integer),
        Column::nullable("body", SqlType::Text),
    ];

    fn from_row(row: &rusqlite::Row<'_>) -> Result<Self, StoreError> {
        let id: String = get(row, 0, Self::TABLE, "id")?;
        Ok(Self {
            id: ReviewId::from_raw(id),
            book_isbn: get(row, 1, Self::TABLE, "book_isbn")?,
            rating: get(row, 2, Self::TABLE, "rating")?,
            body: get_opt(row, 3, Self::TABLE, "body")?,
        })
    }
}

impl TableEntity for Review {
    const TABLE_NAME: &'static str = "reviews";
}

const RATINGS: std::ops::RangeInclusive<i64> = 1..=5;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewDto {
    pub id: Option<ReviewId>,
    pub book_isbn: Option<String>,
    pub rating: Option<i64>,
    pub body: Option<String>,
}

impl DataExchange<Review> for ReviewDto {
    fn is_valid_for_creation(&self) -> bool {
        all_present(&[&self.book_isbn]) && self.rating.is_some_and(|r| RATINGS.contains(&r))
    }

    fn is_valid_for_editing(&self) -> bool {
        self.id.is_some() && self.rating.map_or(true, |r| RATINGS.contains(&r))
    }

    fn from_model(record: &Review) -> Self {
        Self {
            id: Some(record.id.clone()),
            book_isbn: Some(record.book_isbn.clone()),
            rating: Some(record.rating),
            body: record.body.clone(),
        }
    }

    fn update_model(&self, record: &mut Review) {
        assign(&mut record.id, &self.id);
        assign(&mut record.book_isbn, &self.book_isbn);
        assign(&mut record.rating, &self.rating);
        assign_opt(&mut record.body, &self.body);
    }

    /// A review stays attached to the book it was written for.
    fn update_existing(&self, record: &mut Review) {
        assign(&mut record.rating, &self.rating);
        assign_opt(&mut record.body, &self.body);
    }
}

/// Edits cannot move a review to another book, so only creation looks the
/// book up.
pub struct ReviewRules;

#[async_trait]
impl ValidationRules<ReviewDto, Review> for ReviewRules {
    async fn check_creation(&self, scope: &RequestScope<Review>, dto: &ReviewDto) -> Result<(), ApiError> {
        scope
            .ensure_referenced_entity_is_present::<Book>(false, dto.book_isbn.as_ref(), "Book does not exist")
            .await
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReviewSearch {
    pub take: Option<i64>,
    pub skip: i64,
    pub book_isbn: Option<String>,
    pub min_rating: Option<i64>,
}

impl SearchQuery<Review> for ReviewSearch {
    fn num_to_take(&self) -> i64 {
        self.take.unwrap_or(DEFAULT_PAGE)
    }

    fn num_to_skip(&self) -> i64 {
        self.skip
    }

    fn generate_search_query(&self, base: Query<Review>) -> Query<Review> {
        let mut query = base.order_by_desc("rating").order_by("id");
        if let Some(isbn) = &self.book_isbn {
            query = query.where_eq("book_isbn", isbn.as_str());
        }
        if let Some(min) = self.min_rating {
            query = query.where_field("rating", CompareOp::Ge, min);
        }
        query
    }
}

// ── Wiring ─────────────────────────────────────────────────────────────────

/// Page size when a search does not ask for one.
const DEFAULT_PAGE: i64 = 20;

/// Deployment registration: every catalog record on whichever backend the
/// factory was built for.
pub fn register(r: &mut RegistryBuilder) {
    r.record::<Author>().record::<Book>().record::<Review>();
}

/// HTTP routes for the whole catalog.
pub fn routes(factory: &Arc<RepositoryFactory>, settings: &Settings) -> Router {
    let max_take = settings.server.max_take;
    let max_age = settings.server.cache_max_age_secs;

    let authors = Resource::new(
        CrudController::<AuthorDto, Author>::with_rules(Arc::clone(factory), AuthorRules),
        SearchController::<AuthorSearch, _>::new(ModelSearch::<AuthorDto, Author>::with_max_take(
            Arc::clone(factory),
            max_take,
        )),
    )
    .cache_max_age(max_age);

    let books = Resource::new(
        CrudController::<BookDto, Book>::with_rules(Arc::clone(factory), BookRules),
        SearchController::<BookSearch, _>::new(ModelSearch::<BookDto, Book>::with_max_take(
            Arc::clone(factory),
            max_take,
        )),
    )
    .cache_max_age(max_age);

    let reviews = Resource::new(
        CrudController::<ReviewDto, Review>::with_rules(Arc::clone(factory), ReviewRules),
        SearchController::<ReviewSearch, _>::new(ModelSearch::<ReviewDto, Review>::with_max_take(
            Arc::clone(factory),
            max_take,
        )),
    )
    .cache_max_age(max_age);

    Router::new()
        .merge(authors.into_router("authors"))
        .merge(books.into_router("books"))
        .merge(reviews.into_router("reviews"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crudkit_core::errors::ID_IN_USE;
    use crudkit_store::{Backend, StorageConfig};

    fn memory() -> Arc<RepositoryFactory> {
        Arc::new(RepositoryFactory::new(Backend::memory(), register))
    }

    fn controllers(
        factory: &Arc<RepositoryFactory>,
    ) -> (
        CrudController<AuthorDto, Author>,
        CrudController<BookDto, Book>,
        CrudController<ReviewDto, Review>,
    ) {
        (
            CrudController::with_rules(Arc::clone(factory), AuthorRules),
            CrudController::with_rules(Arc::clone(factory), BookRules),
            CrudController::with_rules(Arc::clone(factory), ReviewRules),
        )
    }

    fn author(name: &str) -> AuthorDto {
        AuthorDto {
            name: Some(name.into()),
            ..AuthorDto::default()
        }
    }

    fn book(isbn: &str, title: &str, author_id: i64) -> BookDto {
        BookDto {
            isbn: Some(isbn.into()),
            title: Some(title.into()),
            author_id: Some(author_id),
            year: None,
        }
    }

    /// Runs the same catalog scenario against any backend.
    async fn exercise(factory: Arc<RepositoryFactory>) {
        let (authors, books, reviews) = controllers(&factory);

        let le_guin = authors.post(Some(author("Ursula K. Le Guin"))).await.unwrap().id;
        let dupe = authors.post(Some(author("Ursula K. Le Guin"))).await.unwrap_err();
        assert_eq!(dupe, ApiError::Conflict(AUTHOR_NAME_IN_USE.into()));
        let keyed_dupe = authors
            .post(Some(AuthorDto {
                id: Some(77),
                ..author("Ursula K. Le Guin")
            }))
            .await
            .unwrap_err();
        assert_eq!(keyed_dupe, ApiError::Conflict(AUTHOR_NAME_IN_USE.into()));

        let banks = authors.post(Some(author("Iain M. Banks"))).await.unwrap().id;
        let rename = authors
            .put(Some(AuthorDto {
                id: Some(banks),
                ..author("Ursula K. Le Guin")
            }))
            .await
            .unwrap_err();
        assert_eq!(rename, ApiError::Conflict(AUTHOR_NAME_IN_USE.into()));
        authors
            .put(Some(AuthorDto {
                id: Some(banks),
                country: Some("Scotland".into()),
                ..author("Iain M. Banks")
            }))
            .await
            .unwrap();
        assert_eq!(authors.get(&banks).await.unwrap().name.as_deref(), Some("Iain M. Banks"));

        let orphan = books.post(Some(book("978-0", "Nowhere", 999))).await.unwrap_err();
        assert_eq!(orphan, ApiError::Conflict("Author does not exist".into()));

        books
            .post(Some(book("978-0441478125", "The Left Hand of Darkness", le_guin)))
            .await
            .unwrap();
        let again = books
            .post(Some(book("978-0441478125", "Copy", le_guin)))
            .await
            .unwrap_err();
        assert_eq!(again, ApiError::Conflict(ID_IN_USE.into()));

        books
            .put(Some(BookDto {
                isbn: Some("978-0441478125".into()),
                year: Some(1969),
                ..BookDto::default()
            }))
            .await
            .unwrap();
        let stored = books.get(&"978-0441478125".to_string()).await.unwrap();
        assert_eq!(stored.title.as_deref(), Some("The Left Hand of Darkness"));
        assert_eq!(stored.year, Some(1969));

        let review = reviews
            .post(Some(ReviewDto {
                book_isbn: Some("978-0441478125".into()),
                rating: Some(5),
                ..ReviewDto::default()
            }))
            .await
            .unwrap()
            .id;
        assert!(review.as_str().starts_with("rev_"));

        let keyed_orphan = reviews
            .post(Some(ReviewDto {
                id: Some(ReviewId::new()),
                book_isbn: Some("no-such-book".into()),
                rating: Some(4),
                ..ReviewDto::default()
            }))
            .await
            .unwrap_err();
        assert_eq!(keyed_orphan, ApiError::Conflict("Book does not exist".into()));

        reviews
            .put(Some(ReviewDto {
                id: Some(review.clone()),
                book_isbn: Some("somewhere-else".into()),
                body: Some("Still great".into()),
                ..ReviewDto::default()
            }))
            .await
            .unwrap();
        let stored = reviews.get(&review).await.unwrap();
        assert_eq!(stored.book_isbn.as_deref(), Some("978-0441478125"));
        assert_eq!(stored.rating, Some(5));
        assert_eq!(stored.body.as_deref(), Some("Still great"));

        reviews.delete(&review).await.unwrap();
        assert!(reviews.get(&review).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn catalog_on_memory() {
        exercise(memory()).await;
    }

    #[tokio::test]
    async fn catalog_on_tables() {
        let factory = RepositoryFactory::from_config(&StorageConfig::tables(), register).unwrap();
        exercise(Arc::new(factory)).await;
    }

    #[tokio::test]
    async fn catalog_on_relational() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig::relational(dir.path().join("catalog.db").to_string_lossy());
        let factory = RepositoryFactory::from_config(&config, register).unwrap();
        exercise(Arc::new(factory)).await;
    }

    #[test]
    fn review_rating_bounds() {
        let mut dto = ReviewDto {
            book_isbn: Some("x".into()),
            rating: Some(6),
            ..ReviewDto::default()
        };
        assert!(!dto.is_valid_for_creation());
        dto.rating = Some(1);
        assert!(dto.is_valid_for_creation());
        assert!(!dto.is_valid_for_editing());
    }

    #[tokio::test]
    async fn search_over_http() {
        let factory = memory();
        let settings = Settings::default();
        let (authors, books, _) = controllers(&factory);
        let id = authors.post(Some(author("Octavia E. Butler"))).await.unwrap().id;
        for (isbn, title, year) in [
            ("1", "Kindred", 1979),
            ("2", "Parable of the Sower", 1993),
            ("3", "Parable of the Talents", 1998),
            ("4", "Dawn", 1987),
        ] {
            books
                .post(Some(BookDto {
                    year: Some(year),
                    ..book(isbn, title, id)
                }))
                .await
                .unwrap();
        }

        let config = crudkit_server::ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            ..settings.server_config()
        };
        let handle = crudkit_server::start(config, routes(&factory, &settings))
            .await
            .unwrap();
        let url = format!(
            "http://127.0.0.1:{}/books?authorId={id}&publishedAfter=1980&take=2&skip=1",
            handle.port
        );

        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["cache-control"], "public, max-age=3600");
        let page: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(page["totalResults"], 3);
        assert_eq!(page["skipped"], 1);
        assert_eq!(page["results"][0]["title"], "Parable of the Sower");
        assert_eq!(page["results"][1]["title"], "Parable of the Talents");
        handle.shutdown();
    }
}
