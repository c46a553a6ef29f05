//! Repository layer: the record store interface and its backends

pub mod authors;
pub mod book_instances;
pub mod books;
pub mod genres;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        Author, AuthorForm, Book, BookForm, BookInstance, CopyFilter, CreateBookInstance, Genre,
        GenreForm, LoanStatus,
    },
};

/// Storage of book copies
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BookInstanceStore: Send + Sync {
    /// Fails with `NotFound` when the copy does not exist
    async fn get(&self, id: Uuid) -> AppResult<BookInstance>;
    async fn filter(&self, filter: &CopyFilter) -> AppResult<Vec<BookInstance>>;
    async fn create(&self, copy: &CreateBookInstance) -> AppResult<BookInstance>;
    /// Write status, borrower, due-back and imprint of an existing copy
    async fn save(&self, copy: &BookInstance) -> AppResult<()>;
    async fn delete(&self, id: Uuid) -> AppResult<()>;
    async fn count(&self, status: Option<LoanStatus>) -> AppResult<i64>;
}

/// Storage of books, including their genre links
#[async_trait]
pub trait BookStore: Send + Sync {
    async fn get(&self, id: i32) -> AppResult<Book>;
    /// All books ordered by title
    async fn list(&self) -> AppResult<Vec<Book>>;
    async fn list_by_author(&self, author_id: i32) -> AppResult<Vec<Book>>;
    async fn create(&self, book: &BookForm) -> AppResult<Book>;
    async fn update(&self, id: i32, book: &BookForm) -> AppResult<Book>;
    async fn delete(&self, id: i32) -> AppResult<()>;
    async fn count(&self) -> AppResult<i64>;
    /// Books whose title contains `needle`, ignoring case
    async fn count_title_contains(&self, needle: &str) -> AppResult<i64>;
}

#[async_trait]
pub trait AuthorStore: Send + Sync {
    async fn get(&self, id: i32) -> AppResult<Author>;
    /// All authors ordered by last then first name
    async fn list(&self) -> AppResult<Vec<Author>>;
    async fn create(&self, author: &AuthorForm) -> AppResult<Author>;
    async fn update(&self, id: i32, author: &AuthorForm) -> AppResult<Author>;
    async fn delete(&self, id: i32) -> AppResult<()>;
    async fn count(&self) -> AppResult<i64>;
}

#[async_trait]
pub trait GenreStore: Send + Sync {
    async fn get(&self, id: i32) -> AppResult<Genre>;
    async fn list(&self) -> AppResult<Vec<Genre>>;
    async fn create(&self, genre: &GenreForm) -> AppResult<Genre>;
    async fn delete(&self, id: i32) -> AppResult<()>;
    async fn count(&self) -> AppResult<i64>;
}

/// Main repository struct holding one store per record type
#[derive(Clone)]
pub struct Repository {
    pub pool: Option<Pool<Postgres>>,
    pub books: Arc<dyn BookStore>,
    pub authors: Arc<dyn AuthorStore>,
    pub genres: Arc<dyn GenreStore>,
    pub copies: Arc<dyn BookInstanceStore>,
}

impl Repository {
    /// Create a repository backed by the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            books: Arc::new(books::BooksRepository::new(pool.clone())),
            authors: Arc::new(authors::AuthorsRepository::new(pool.clone())),
            genres: Arc::new(genres::GenresRepository::new(pool.clone())),
            copies: Arc::new(book_instances::BookInstancesRepository::new(pool.clone())),
            pool: Some(pool),
        }
    }

    /// Create a repository keeping every record in process memory
    pub fn in_memory() -> Self {
        let store = memory::MemoryStore::default();
        Self {
            books: Arc::new(store.clone()),
            authors: Arc::new(store.clone()),
            genres: Arc::new(store.clone()),
            copies: Arc::new(store),
            pool: None,
        }
    }

    /// Check that the backing database answers
    pub async fn ping(&self) -> AppResult<()> {
        if let Some(pool) = &self.pool {
            sqlx::query("SELECT 1").execute(pool).await?;
        }
        Ok(())
    }
}
