//! Catalog home page endpoint

use axum::{extract::State, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar};

use crate::{error::AppResult, models::CatalogSummary, services::session::SessionContext};

use super::AuthenticatedUser;

/// Cookie carrying the session id
pub const SESSION_COOKIE: &str = "sessionid";

/// Catalog counters and the session visit count
#[utoipa::path(
    get,
    path = "/catalog",
    tag = "catalog",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Catalog summary", body = CatalogSummary),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn index(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<CatalogSummary>)> {
    let session = SessionContext::open(
        jar.get(SESSION_COOKIE).map(|c| c.value().to_string()),
        state.services.sessions.clone(),
    );

    let mut summary = state.services.catalog.summary().await?;
    summary.num_visits = session.record_visit().await?;

    let jar = if session.is_new {
        jar.add(
            Cookie::build((SESSION_COOKIE, session.id.clone()))
                .path("/")
                .http_only(true),
        )
    } else {
        jar
    };

    Ok((jar, Json(summary)))
}
