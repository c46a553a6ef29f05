//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{authors, books, catalog, copies, genres, health};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Local Library API",
        version = "0.1.0",
        description = "Catalog and book copy lending REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    modifiers(&SecurityAddon),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Catalog
        catalog::index,
        // Books
        books::list_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        // Authors
        authors::list_authors,
        authors::get_author,
        authors::create_author,
        authors::update_author,
        authors::delete_author,
        // Genres
        genres::list_genres,
        genres::create_genre,
        genres::delete_genre,
        // Copies
        copies::get_copy,
        copies::create_copy,
        copies::update_copy,
        copies::delete_copy,
        copies::reserve_copy,
        copies::renewal_proposal,
        copies::renew_copy,
        copies::return_copy,
        copies::my_borrowed,
        copies::my_reserved,
        copies::all_borrowed,
    ),
    components(
        schemas(
            crate::models::Book,
            crate::models::BookDetails,
            crate::models::BookForm,
            crate::models::Author,
            crate::models::AuthorDetails,
            crate::models::AuthorForm,
            crate::models::Genre,
            crate::models::GenreForm,
            crate::models::BookInstance,
            crate::models::CopyDetails,
            crate::models::CreateBookInstance,
            crate::models::UpdateBookInstance,
            crate::models::LoanStatus,
            crate::models::CatalogSummary,
            copies::ReserveResponse,
            copies::RenewalProposal,
            copies::RenewRequest,
            health::HealthResponse,
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "catalog", description = "Catalog home page"),
        (name = "books", description = "Book management"),
        (name = "authors", description = "Author management"),
        (name = "genres", description = "Genre management"),
        (name = "copies", description = "Book copies and their lending lifecycle")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            let mut scheme = Http::new(HttpAuthScheme::Bearer);
            scheme.bearer_format = Some("JWT".to_string());
            components.add_security_scheme("bearer_auth", SecurityScheme::Http(scheme));
        }
    }
}

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
