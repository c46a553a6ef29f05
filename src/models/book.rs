//! Book (catalog title) model and forms

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use super::author::Author;
use super::book_instance::BookInstance;
use super::genre::Genre;

static ISBN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{13}$").expect("valid ISBN pattern"));

/// Book model from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub author_id: i32,
    pub summary: String,
    pub isbn: String,
    #[sqlx(skip)]
    #[serde(default)]
    pub genres: Vec<Genre>,
}

/// Book detail with its author and copies
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BookDetails {
    #[serde(flatten)]
    pub book: Book,
    pub author: Author,
    pub copies: Vec<BookInstance>,
}

/// Create or replace a book (staff)
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct BookForm {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,
    pub author_id: i32,
    #[validate(length(max = 1000, message = "Summary must be at most 1000 characters"))]
    #[serde(default)]
    pub summary: String,
    /// 13 character ISBN
    #[validate(regex(path = *ISBN_RE, message = "ISBN must be 13 digits"))]
    pub isbn: String,
    #[serde(default)]
    pub genre_ids: Vec<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(isbn: &str) -> BookForm {
        BookForm {
            title: "The Hobbit".into(),
            author_id: 1,
            summary: String::new(),
            isbn: isbn.into(),
            genre_ids: vec![],
        }
    }

    #[test]
    fn isbn_must_be_thirteen_digits() {
        assert!(form("9780261103344").validate().is_ok());
        assert!(form("978-0261103344").validate().is_err());
        assert!(form("0261103342").validate().is_err());
    }
}
