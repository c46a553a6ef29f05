//! Catalog home page counters

use serde::Serialize;
use utoipa::ToSchema;

/// Counts shown on the catalog home page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct CatalogSummary {
    pub num_books: i64,
    pub num_instances: i64,
    pub num_instances_available: i64,
    pub num_authors: i64,
    pub num_genres: i64,
    /// Books whose title contains "the", ignoring case
    pub num_books_with_the: i64,
    /// Visits in this session before the current one
    pub num_visits: i64,
}
