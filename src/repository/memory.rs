//! In-process record store used for development and tests

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AuthorStore, BookInstanceStore, BookStore, GenreStore};
use crate::{
    error::{AppError, AppResult},
    models::{
        Author, AuthorForm, Book, BookForm, BookInstance, CopyFilter, CopyOrder,
        CreateBookInstance, Genre, GenreForm, LoanStatus,
    },
};

#[derive(Default)]
struct Tables {
    authors: BTreeMap<i32, Author>,
    books: BTreeMap<i32, (Book, Vec<i32>)>,
    genres: BTreeMap<i32, Genre>,
    copies: HashMap<Uuid, BookInstance>,
    next_id: i32,
}

impl Tables {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn book(&self, id: i32) -> Option<Book> {
        self.books.get(&id).map(|(book, genre_ids)| {
            let mut book = book.clone();
            let mut genres: Vec<Genre> = genre_ids
                .iter()
                .filter_map(|gid| self.genres.get(gid).cloned())
                .collect();
            genres.sort_by(|a, b| a.name.cmp(&b.name));
            book.genres = genres;
            book
        })
    }

    fn copy(&self, copy: &BookInstance) -> BookInstance {
        let mut copy = copy.clone();
        copy.book_title = self.books.get(&copy.book_id).map(|(b, _)| b.title.clone());
        copy
    }
}

/// Cheap to clone; clones share the same tables
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

fn by_title(a: &Book, b: &Book) -> Ordering {
    a.title.cmp(&b.title).then(a.id.cmp(&b.id))
}

// None sorts after every date, as NULLS LAST does
fn nulls_last<T: Ord>(a: &Option<T>, b: &Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn sort_copies(copies: &mut [BookInstance], order: CopyOrder) {
    match order {
        CopyOrder::Imprint => copies.sort_by(|a, b| a.imprint.cmp(&b.imprint).then(a.id.cmp(&b.id))),
        CopyOrder::DueBack => {
            copies.sort_by(|a, b| nulls_last(&a.due_back, &b.due_back).then(a.id.cmp(&b.id)))
        }
        CopyOrder::BorrowerThenDueBack => copies.sort_by(|a, b| {
            nulls_last(&a.borrower_id, &b.borrower_id)
                .then(nulls_last(&a.due_back, &b.due_back))
                .then(a.id.cmp(&b.id))
        }),
    }
}

#[async_trait]
impl BookInstanceStore for MemoryStore {
    async fn get(&self, id: Uuid) -> AppResult<BookInstance> {
        let tables = self.tables.read().await;
        tables
            .copies
            .get(&id)
            .map(|c| tables.copy(c))
            .ok_or_else(|| AppError::NotFound(format!("Book instance {} not found", id)))
    }

    async fn filter(&self, filter: &CopyFilter) -> AppResult<Vec<BookInstance>> {
        let tables = self.tables.read().await;
        let mut copies: Vec<BookInstance> = tables
            .copies
            .values()
            .filter(|c| filter.matches(c))
            .map(|c| tables.copy(c))
            .collect();
        sort_copies(&mut copies, filter.order);
        Ok(copies)
    }

    async fn create(&self, copy: &CreateBookInstance) -> AppResult<BookInstance> {
        let mut tables = self.tables.write().await;
        let created = BookInstance {
            id: Uuid::new_v4(),
            book_id: copy.book_id,
            imprint: copy.imprint.clone(),
            due_back: copy.due_back,
            status: copy.status.unwrap_or(LoanStatus::Available),
            borrower_id: copy.borrower_id,
            borrower_username: copy.borrower_username.clone(),
            book_title: None,
        };
        tables.copies.insert(created.id, created.clone());
        Ok(tables.copy(&created))
    }

    async fn save(&self, copy: &BookInstance) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        match tables.copies.get_mut(&copy.id) {
            Some(stored) => {
                *stored = BookInstance {
                    book_title: None,
                    ..copy.clone()
                };
                Ok(())
            }
            None => Err(AppError::NotFound(format!("Book instance {} not found", copy.id))),
        }
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .copies
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("Book instance {} not found", id)))
    }

    async fn count(&self, status: Option<LoanStatus>) -> AppResult<i64> {
        let tables = self.tables.read().await;
        let count = tables
            .copies
            .values()
            .filter(|c| status.map_or(true, |s| c.status == s))
            .count();
        Ok(count as i64)
    }
}

#[async_trait]
impl BookStore for MemoryStore {
    async fn get(&self, id: i32) -> AppResult<Book> {
        let tables = self.tables.read().await;
        tables
            .book(id)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    async fn list(&self) -> AppResult<Vec<Book>> {
        let tables = self.tables.read().await;
        let mut books: Vec<Book> = tables.books.keys().filter_map(|id| tables.book(*id)).collect();
        books.sort_by(by_title);
        Ok(books)
    }

    async fn list_by_author(&self, author_id: i32) -> AppResult<Vec<Book>> {
        let tables = self.tables.read().await;
        let mut books: Vec<Book> = tables
            .books
            .values()
            .filter(|(b, _)| b.author_id == author_id)
            .filter_map(|(b, _)| tables.book(b.id))
            .collect();
        books.sort_by(by_title);
        Ok(books)
    }

    async fn create(&self, book: &BookForm) -> AppResult<Book> {
        let mut tables = self.tables.write().await;
        let id = tables.next_id();
        let record = Book {
            id,
            title: book.title.clone(),
            author_id: book.author_id,
            summary: book.summary.clone(),
            isbn: book.isbn.clone(),
            genres: Vec::new(),
        };
        tables.books.insert(id, (record, book.genre_ids.clone()));
        tables
            .book(id)
            .ok_or_else(|| AppError::Internal(format!("Book {} vanished after insert", id)))
    }

    async fn update(&self, id: i32, book: &BookForm) -> AppResult<Book> {
        let mut tables = self.tables.write().await;
        let (stored, genre_ids) = tables
            .books
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;
        stored.title = book.title.clone();
        stored.author_id = book.author_id;
        stored.summary = book.summary.clone();
        stored.isbn = book.isbn.clone();
        *genre_ids = book.genre_ids.clone();
        tables
            .book(id)
            .ok_or_else(|| AppError::Internal(format!("Book {} vanished after update", id)))
    }

    async fn delete(&self, id: i32) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .books
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    async fn count(&self) -> AppResult<i64> {
        Ok(self.tables.read().await.books.len() as i64)
    }

    async fn count_title_contains(&self, needle: &str) -> AppResult<i64> {
        let needle = needle.to_lowercase();
        let tables = self.tables.read().await;
        let count = tables
            .books
            .values()
            .filter(|(b, _)| b.title.to_lowercase().contains(&needle))
            .count();
        Ok(count as i64)
    }
}

#[async_trait]
impl AuthorStore for MemoryStore {
    async fn get(&self, id: i32) -> AppResult<Author> {
        self.tables
            .read()
            .await
            .authors
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Author with id {} not found", id)))
    }

    async fn list(&self) -> AppResult<Vec<Author>> {
        let mut authors: Vec<Author> = self.tables.read().await.authors.values().cloned().collect();
        authors.sort_by(|a, b| {
            a.last_name
                .cmp(&b.last_name)
                .then_with(|| a.first_name.cmp(&b.first_name))
                .then(a.id.cmp(&b.id))
        });
        Ok(authors)
    }

    async fn create(&self, author: &AuthorForm) -> AppResult<Author> {
        let mut tables = self.tables.write().await;
        let created = Author {
            id: tables.next_id(),
            first_name: author.first_name.clone(),
            last_name: author.last_name.clone(),
            date_of_birth: author.date_of_birth,
            date_of_death: author.date_of_death,
        };
        tables.authors.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, id: i32, author: &AuthorForm) -> AppResult<Author> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .authors
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Author with id {} not found", id)))?;
        stored.first_name = author.first_name.clone();
        stored.last_name = author.last_name.clone();
        stored.date_of_birth = author.date_of_birth;
        stored.date_of_death = author.date_of_death;
        Ok(stored.clone())
    }

    async fn delete(&self, id: i32) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .authors
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("Author with id {} not found", id)))
    }

    async fn count(&self) -> AppResult<i64> {
        Ok(self.tables.read().await.authors.len() as i64)
    }
}

#[async_trait]
impl GenreStore for MemoryStore {
    async fn get(&self, id: i32) -> AppResult<Genre> {
        self.tables
            .read()
            .await
            .genres
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Genre with id {} not found", id)))
    }

    async fn list(&self) -> AppResult<Vec<Genre>> {
        let mut genres: Vec<Genre> = self.tables.read().await.genres.values().cloned().collect();
        genres.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(genres)
    }

    async fn create(&self, genre: &GenreForm) -> AppResult<Genre> {
        let mut tables = self.tables.write().await;
        let wanted = genre.name.to_lowercase();
        if tables.genres.values().any(|g| g.name.to_lowercase() == wanted) {
            return Err(AppError::Duplicate(format!("Genre {} already exists", genre.name)));
        }
        let created = Genre {
            id: tables.next_id(),
            name: genre.name.clone(),
        };
        tables.genres.insert(created.id, created.clone());
        Ok(created)
    }

    async fn delete(&self, id: i32) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .genres
            .remove(&id)
            .ok_or_else(|| AppError::NotFound(format!("Genre with id {} not found", id)))?;
        for (_, genre_ids) in tables.books.values_mut() {
            genre_ids.retain(|gid| *gid != id);
        }
        Ok(())
    }

    async fn count(&self) -> AppResult<i64> {
        Ok(self.tables.read().await.genres.len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    async fn seed_book(store: &MemoryStore, title: &str) -> Book {
        let author = AuthorStore::create(
            store,
            &AuthorForm {
                first_name: "Ursula".into(),
                last_name: "Le Guin".into(),
                date_of_birth: None,
                date_of_death: None,
            },
        )
        .await
        .unwrap();
        BookStore::create(
            store,
            &BookForm {
                title: title.into(),
                author_id: author.id,
                summary: String::new(),
                isbn: "9780553383041".into(),
                genre_ids: vec![],
            },
        )
        .await
        .unwrap()
    }

    fn held(book_id: i32, borrower: i32, due: (i32, u32, u32), status: LoanStatus) -> CreateBookInstance {
        CreateBookInstance {
            book_id,
            imprint: "Ace, 1969".into(),
            status: Some(status),
            due_back: NaiveDate::from_ymd_opt(due.0, due.1, due.2),
            borrower_id: Some(borrower),
            borrower_username: Some(format!("user{}", borrower)),
        }
    }

    #[tokio::test]
    async fn filter_orders_by_borrower_then_due_back() {
        let store = MemoryStore::default();
        let book = seed_book(&store, "The Left Hand of Darkness").await;

        for form in [
            held(book.id, 2, (2024, 3, 1), LoanStatus::OnLoan),
            held(book.id, 1, (2024, 5, 1), LoanStatus::OnLoan),
            held(book.id, 1, (2024, 4, 1), LoanStatus::OnLoan),
            held(book.id, 1, (2024, 1, 1), LoanStatus::Reserved),
        ] {
            BookInstanceStore::create(&store, &form).await.unwrap();
        }

        let filter = CopyFilter {
            status: Some(LoanStatus::OnLoan),
            order: CopyOrder::BorrowerThenDueBack,
            ..Default::default()
        };
        let copies = store.filter(&filter).await.unwrap();
        let keys: Vec<_> = copies.iter().map(|c| (c.borrower_id, c.due_back)).collect();

        assert_eq!(
            keys,
            vec![
                (Some(1), NaiveDate::from_ymd_opt(2024, 4, 1)),
                (Some(1), NaiveDate::from_ymd_opt(2024, 5, 1)),
                (Some(2), NaiveDate::from_ymd_opt(2024, 3, 1)),
            ]
        );
        assert!(copies
            .iter()
            .all(|c| c.book_title.as_deref() == Some("The Left Hand of Darkness")));
    }

    #[tokio::test]
    async fn missing_records_are_not_found() {
        let store = MemoryStore::default();
        assert!(matches!(
            BookInstanceStore::get(&store, Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(BookStore::get(&store, 42).await, Err(AppError::NotFound(_))));
        assert!(matches!(AuthorStore::delete(&store, 42).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn deleting_a_genre_unlinks_it_from_books() {
        let store = MemoryStore::default();
        let genre = GenreStore::create(&store, &GenreForm { name: "Science Fiction".into() })
            .await
            .unwrap();
        let book = seed_book(&store, "The Dispossessed").await;
        let form = BookForm {
            title: book.title.clone(),
            author_id: book.author_id,
            summary: book.summary.clone(),
            isbn: book.isbn.clone(),
            genre_ids: vec![genre.id],
        };
        let updated = BookStore::update(&store, book.id, &form).await.unwrap();
        assert_eq!(updated.genres, vec![genre.clone()]);

        GenreStore::delete(&store, genre.id).await.unwrap();
        assert!(BookStore::get(&store, book.id).await.unwrap().genres.is_empty());
        assert!(matches!(
            GenreStore::create(&store, &GenreForm { name: "science fiction".into() }).await,
            Ok(_)
        ));
    }

    #[tokio::test]
    async fn duplicate_genre_names_are_rejected() {
        let store = MemoryStore::default();
        GenreStore::create(&store, &GenreForm { name: "Horror".into() })
            .await
            .unwrap();

        let err = GenreStore::create(&store, &GenreForm { name: "HORROR".into() }).await;
        assert!(matches!(err, Err(AppError::Duplicate(_))));
        assert_eq!(GenreStore::count(&store).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn title_search_ignores_case() {
        let store = MemoryStore::default();
        seed_book(&store, "The Lathe of Heaven").await;
        seed_book(&store, "Always Coming Home").await;
        seed_book(&store, "Lavinia").await;

        assert_eq!(store.count_title_contains("the").await.unwrap(), 1);
        assert_eq!(store.count_title_contains("HOME").await.unwrap(), 1);
        assert_eq!(BookStore::count(&store).await.unwrap(), 3);
    }
}
