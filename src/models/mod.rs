//! Data models for the Local Library catalog

pub mod author;
pub mod book;
pub mod book_instance;
pub mod genre;
pub mod summary;
pub mod user;

// Re-export commonly used types
pub use author::{Author, AuthorDetails, AuthorForm};
pub use book::{Book, BookDetails, BookForm};
pub use book_instance::{
    BookInstance, CopyAction, CopyDetails, CopyFilter, CopyOrder, CreateBookInstance, LoanStatus,
    UpdateBookInstance,
};
pub use genre::{Genre, GenreForm};
pub use summary::CatalogSummary;
pub use user::{Capability, UserClaims};
