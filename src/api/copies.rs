//! Book copy endpoints: staff edits and the reserve/renew/return lifecycle

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{BookInstance, CopyDetails, CreateBookInstance, UpdateBookInstance},
    services::lifecycle::LifecycleService,
};

use super::AuthenticatedUser;

/// Reserve response
#[derive(Serialize, ToSchema)]
pub struct ReserveResponse {
    /// Book owning the reserved copy
    pub book_id: i32,
}

/// Renewal form offered to librarians
#[derive(Serialize, ToSchema)]
pub struct RenewalProposal {
    pub copy: BookInstance,
    pub proposed_renewal_date: NaiveDate,
}

/// Renew request
#[derive(Deserialize, ToSchema)]
pub struct RenewRequest {
    pub renewal_date: NaiveDate,
}

fn with_overdue(copies: Vec<BookInstance>) -> Vec<CopyDetails> {
    let today = LifecycleService::today();
    copies
        .into_iter()
        .map(|copy| CopyDetails::new(copy, today))
        .collect()
}

/// Get a copy
#[utoipa::path(
    get,
    path = "/copies/{id}",
    tag = "copies",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Copy ID")
    ),
    responses(
        (status = 200, description = "Copy details", body = CopyDetails),
        (status = 404, description = "Copy not found")
    )
)]
pub async fn get_copy(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<CopyDetails>> {
    let copy = state.services.catalog.get_copy(id).await?;
    Ok(Json(CopyDetails::new(copy, LifecycleService::today())))
}

/// Create a copy of a book
#[utoipa::path(
    post,
    path = "/copies",
    tag = "copies",
    security(("bearer_auth" = [])),
    request_body = CreateBookInstance,
    responses(
        (status = 201, description = "Copy created", body = BookInstance),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Staff only")
    )
)]
pub async fn create_copy(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(form): Json<CreateBookInstance>,
) -> AppResult<(StatusCode, Json<BookInstance>)> {
    claims.require_staff()?;

    let created = state.services.catalog.create_copy(form).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Edit a copy
#[utoipa::path(
    put,
    path = "/copies/{id}",
    tag = "copies",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Copy ID")
    ),
    request_body = UpdateBookInstance,
    responses(
        (status = 200, description = "Copy updated", body = BookInstance),
        (status = 400, description = "Borrower and due date do not match the status"),
        (status = 404, description = "Copy not found")
    )
)]
pub async fn update_copy(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(update): Json<UpdateBookInstance>,
) -> AppResult<Json<BookInstance>> {
    claims.require_staff()?;

    let updated = state.services.catalog.update_copy(id, update).await?;
    Ok(Json(updated))
}

/// Delete a copy
#[utoipa::path(
    delete,
    path = "/copies/{id}",
    tag = "copies",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Copy ID")
    ),
    responses(
        (status = 204, description = "Copy deleted"),
        (status = 404, description = "Copy not found")
    )
)]
pub async fn delete_copy(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    claims.require_staff()?;

    state.services.catalog.delete_copy(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Reserve a copy for the current user
#[utoipa::path(
    post,
    path = "/copies/{id}/reserve",
    tag = "copies",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Copy ID")
    ),
    responses(
        (status = 200, description = "Copy reserved", body = ReserveResponse),
        (status = 404, description = "Copy not found"),
        (status = 409, description = "Copy cannot be reserved")
    )
)]
pub async fn reserve_copy(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ReserveResponse>> {
    let book_id = state.services.lifecycle.reserve(id, &claims).await?;
    Ok(Json(ReserveResponse { book_id }))
}

/// Copy and proposed date for the renewal form
#[utoipa::path(
    get,
    path = "/copies/{id}/renew",
    tag = "copies",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Copy ID")
    ),
    responses(
        (status = 200, description = "Renewal proposal", body = RenewalProposal),
        (status = 403, description = "Missing can_mark_returned"),
        (status = 404, description = "Copy not found")
    )
)]
pub async fn renewal_proposal(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<RenewalProposal>> {
    let (copy, proposed_renewal_date) = state
        .services
        .lifecycle
        .renewal_proposal(id, &claims)
        .await?;

    Ok(Json(RenewalProposal {
        copy,
        proposed_renewal_date,
    }))
}

/// Renew a held copy until the given date
#[utoipa::path(
    post,
    path = "/copies/{id}/renew",
    tag = "copies",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Copy ID")
    ),
    request_body = RenewRequest,
    responses(
        (status = 200, description = "Copy renewed", body = BookInstance),
        (status = 400, description = "Renewal date outside the allowed window"),
        (status = 403, description = "Missing can_mark_returned"),
        (status = 404, description = "Copy not found"),
        (status = 409, description = "Copy is not held")
    )
)]
pub async fn renew_copy(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<RenewRequest>,
) -> AppResult<Json<BookInstance>> {
    let copy = state
        .services
        .lifecycle
        .renew(id, &claims, request.renewal_date)
        .await?;
    Ok(Json(copy))
}

/// Return a copy to the shelf
#[utoipa::path(
    post,
    path = "/copies/{id}/return",
    tag = "copies",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Copy ID")
    ),
    responses(
        (status = 200, description = "Copy returned", body = BookInstance),
        (status = 404, description = "Copy not found")
    )
)]
pub async fn return_copy(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BookInstance>> {
    let copy = state.services.lifecycle.return_copy(id, &claims).await?;
    Ok(Json(copy))
}

/// Copies on loan to the current user
#[utoipa::path(
    get,
    path = "/mybooks",
    tag = "copies",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Borrowed copies", body = Vec<CopyDetails>)
    )
)]
pub async fn my_borrowed(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<CopyDetails>>> {
    let copies = state.services.lifecycle.list_on_loan_for(&claims).await?;
    Ok(Json(with_overdue(copies)))
}

/// Copies reserved by the current user
#[utoipa::path(
    get,
    path = "/myreserved",
    tag = "copies",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Reserved copies", body = Vec<CopyDetails>)
    )
)]
pub async fn my_reserved(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<CopyDetails>>> {
    let copies = state.services.lifecycle.list_reserved_for(&claims).await?;
    Ok(Json(with_overdue(copies)))
}

/// Every copy on loan
#[utoipa::path(
    get,
    path = "/borrowed",
    tag = "copies",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All borrowed copies", body = Vec<CopyDetails>),
        (status = 403, description = "Missing can_mark_returned")
    )
)]
pub async fn all_borrowed(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<CopyDetails>>> {
    let copies = state.services.lifecycle.list_all_on_loan(&claims).await?;
    Ok(Json(with_overdue(copies)))
}
