//! Catalog management service: books, authors, genres and copies

use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        book_instance::check_holding, Author, AuthorDetails, AuthorForm, Book, BookDetails,
        BookForm, BookInstance, CatalogSummary, CopyFilter, CreateBookInstance, Genre, GenreForm,
        LoanStatus, UpdateBookInstance,
    },
    repository::Repository,
};

/// A dangling reference in a form is a field error, not a missing page
fn missing_as_invalid(err: AppError, field: &str) -> AppError {
    match err {
        AppError::NotFound(msg) => AppError::Validation(format!("{}: {}", field, msg)),
        other => other,
    }
}

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Check that the record store answers
    pub async fn ping(&self) -> AppResult<()> {
        self.repository.ping().await
    }

    /// Counters for the catalog home page (visits are filled by the caller)
    pub async fn summary(&self) -> AppResult<CatalogSummary> {
        let repo = &self.repository;
        Ok(CatalogSummary {
            num_books: repo.books.count().await?,
            num_instances: repo.copies.count(None).await?,
            num_instances_available: repo.copies.count(Some(LoanStatus::Available)).await?,
            num_authors: repo.authors.count().await?,
            num_genres: repo.genres.count().await?,
            num_books_with_the: repo.books.count_title_contains("the").await?,
            num_visits: 0,
        })
    }

    // =========================================================================
    // BOOKS
    // =========================================================================

    pub async fn list_books(&self) -> AppResult<Vec<Book>> {
        self.repository.books.list().await
    }

    /// Book with its author and every copy
    pub async fn get_book(&self, id: i32) -> AppResult<BookDetails> {
        let book = self.repository.books.get(id).await?;
        let author = self.repository.authors.get(book.author_id).await?;
        let copies = self
            .repository
            .copies
            .filter(&CopyFilter {
                book_id: Some(id),
                ..Default::default()
            })
            .await?;
        Ok(BookDetails {
            book,
            author,
            copies,
        })
    }

    async fn check_book_refs(&self, form: &BookForm) -> AppResult<()> {
        form.validate()?;
        self.repository
            .authors
            .get(form.author_id)
            .await
            .map_err(|e| missing_as_invalid(e, "author_id"))?;
        for genre_id in &form.genre_ids {
            self.repository
                .genres
                .get(*genre_id)
                .await
                .map_err(|e| missing_as_invalid(e, "genre_ids"))?;
        }
        Ok(())
    }

    pub async fn create_book(&self, form: BookForm) -> AppResult<Book> {
        self.check_book_refs(&form).await?;
        let book = self.repository.books.create(&form).await?;
        tracing::info!("Book {} created: {}", book.id, book.title);
        Ok(book)
    }

    pub async fn update_book(&self, id: i32, form: BookForm) -> AppResult<Book> {
        self.repository.books.get(id).await?;
        self.check_book_refs(&form).await?;
        self.repository.books.update(id, &form).await
    }

    /// Delete a book; with `force`, its copies are deleted too
    pub async fn delete_book(&self, id: i32, force: bool) -> AppResult<()> {
        self.repository.books.get(id).await?;
        let copies = self
            .repository
            .copies
            .filter(&CopyFilter {
                book_id: Some(id),
                ..Default::default()
            })
            .await?;

        if !copies.is_empty() && !force {
            return Err(AppError::StillReferenced(format!(
                "Book {} still has {} copies",
                id,
                copies.len()
            )));
        }

        for copy in &copies {
            self.delete_copy(copy.id).await?;
        }
        self.repository.books.delete(id).await?;
        tracing::info!("Book {} deleted with {} copies", id, copies.len());
        Ok(())
    }

    // =========================================================================
    // AUTHORS
    // =========================================================================

    pub async fn list_authors(&self) -> AppResult<Vec<Author>> {
        self.repository.authors.list().await
    }

    pub async fn get_author(&self, id: i32) -> AppResult<AuthorDetails> {
        let author = self.repository.authors.get(id).await?;
        let books = self.repository.books.list_by_author(id).await?;
        Ok(AuthorDetails { author, books })
    }

    pub async fn create_author(&self, form: AuthorForm) -> AppResult<Author> {
        form.validate()?;
        let author = self.repository.authors.create(&form).await?;
        tracing::info!("Author {} created: {}", author.id, author.display_name());
        Ok(author)
    }

    pub async fn update_author(&self, id: i32, form: AuthorForm) -> AppResult<Author> {
        form.validate()?;
        self.repository.authors.update(id, &form).await
    }

    /// Delete an author; with `force`, their books (and copies) go too
    pub async fn delete_author(&self, id: i32, force: bool) -> AppResult<()> {
        self.repository.authors.get(id).await?;
        let books = self.repository.books.list_by_author(id).await?;

        if !books.is_empty() && !force {
            return Err(AppError::StillReferenced(format!(
                "Author {} still has {} books",
                id,
                books.len()
            )));
        }

        for book in &books {
            self.delete_book(book.id, true).await?;
        }
        self.repository.authors.delete(id).await?;
        tracing::info!("Author {} deleted with {} books", id, books.len());
        Ok(())
    }

    // =========================================================================
    // GENRES
    // =========================================================================

    pub async fn list_genres(&self) -> AppResult<Vec<Genre>> {
        self.repository.genres.list().await
    }

    pub async fn create_genre(&self, form: GenreForm) -> AppResult<Genre> {
        form.validate()?;
        self.repository.genres.create(&form).await
    }

    pub async fn delete_genre(&self, id: i32) -> AppResult<()> {
        self.repository.genres.delete(id).await
    }

    // =========================================================================
    // COPIES
    // =========================================================================

    pub async fn get_copy(&self, id: Uuid) -> AppResult<BookInstance> {
        self.repository.copies.get(id).await
    }

    pub async fn create_copy(&self, form: CreateBookInstance) -> AppResult<BookInstance> {
        form.validate()?;
        self.repository
            .books
            .get(form.book_id)
            .await
            .map_err(|e| missing_as_invalid(e, "book_id"))?;
        check_holding(
            form.status.unwrap_or(LoanStatus::Available),
            form.borrower_id,
            form.borrower_username.as_deref(),
            form.due_back,
        )?;

        let copy = self.repository.copies.create(&form).await?;
        tracing::info!("Copy {} of book {} created", copy.id, copy.book_id);
        Ok(copy)
    }

    /// Direct staff edit; the only way into or out of maintenance
    pub async fn update_copy(&self, id: Uuid, update: UpdateBookInstance) -> AppResult<BookInstance> {
        update.validate()?;
        let mut copy = self.repository.copies.get(id).await?;
        let status = update.status.unwrap_or(copy.status);

        let (borrower_id, borrower_username, due_back) = if status.is_held() {
            // a new borrower never inherits the previous holder's name
            let borrower_changed =
                update.borrower_id.is_some() && update.borrower_id != copy.borrower_id;
            let kept_username = if borrower_changed {
                None
            } else {
                copy.borrower_username.take()
            };
            (
                update.borrower_id.or(copy.borrower_id),
                update.borrower_username.or(kept_username),
                update.due_back.or(copy.due_back),
            )
        } else {
            (update.borrower_id, update.borrower_username, update.due_back)
        };
        check_holding(status, borrower_id, borrower_username.as_deref(), due_back)?;

        if let Some(imprint) = update.imprint {
            copy.imprint = imprint;
        }
        if status != copy.status {
            tracing::info!("Copy {} status set from {} to {} by staff", id, copy.status, status);
        }
        copy.status = status;
        copy.borrower_id = borrower_id;
        copy.borrower_username = borrower_username;
        copy.due_back = due_back;

        self.repository.copies.save(&copy).await?;
        Ok(copy)
    }

    /// Unconditional delete, even of a copy currently held
    pub async fn delete_copy(&self, id: Uuid) -> AppResult<()> {
        let copy = self.repository.copies.get(id).await?;
        if copy.status.is_held() {
            tracing::warn!(
                "Deleting copy {} while {} by {:?}",
                id,
                copy.status,
                copy.borrower_username
            );
        }
        self.repository.copies.delete(id).await
    }
}
