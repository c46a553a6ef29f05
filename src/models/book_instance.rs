//! Book instance (lendable copy) model, loan status and transition table

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, FromRow, Postgres};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};

/// Loan status of a copy, stored as its one-letter code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Available,
    Maintenance,
    OnLoan,
    Reserved,
}

impl LoanStatus {
    pub fn code(&self) -> &'static str {
        match self {
            LoanStatus::Available => "a",
            LoanStatus::Maintenance => "m",
            LoanStatus::OnLoan => "o",
            LoanStatus::Reserved => "r",
        }
    }

    /// Whether a copy in this status carries a borrower and a due-back date
    pub fn is_held(&self) -> bool {
        matches!(self, LoanStatus::OnLoan | LoanStatus::Reserved)
    }

    /// Outcome of applying a lifecycle action to a copy in this status
    pub fn transition(self, action: CopyAction) -> Transition {
        use CopyAction::*;
        use LoanStatus::*;

        match (self, action) {
            (Available, Reserve) => Transition::Allowed(Reserved),
            (Maintenance | OnLoan | Reserved, Reserve) => Transition::Override(Reserved),

            (OnLoan, Renew) => Transition::Allowed(OnLoan),
            (Reserved, Renew) => Transition::Allowed(Reserved),
            // a due date on a copy nobody holds would be meaningless
            (Available | Maintenance, Renew) => Transition::Denied,

            (Available | OnLoan | Reserved, Return) => Transition::Allowed(Available),
            (Maintenance, Return) => Transition::Override(Available),
        }
    }

    /// Resolve the next status, honouring overrides only when not strict
    pub fn next(self, action: CopyAction, strict: bool) -> AppResult<LoanStatus> {
        match self.transition(action) {
            Transition::Allowed(next) => Ok(next),
            Transition::Override(next) if !strict => Ok(next),
            Transition::Override(_) | Transition::Denied => Err(AppError::Conflict(format!(
                "Cannot {} a copy that is {}",
                action, self
            ))),
        }
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            LoanStatus::Available => "available",
            LoanStatus::Maintenance => "in maintenance",
            LoanStatus::OnLoan => "on loan",
            LoanStatus::Reserved => "reserved",
        };
        write!(f, "{}", label)
    }
}

impl std::str::FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "a" => Ok(LoanStatus::Available),
            "m" => Ok(LoanStatus::Maintenance),
            "o" => Ok(LoanStatus::OnLoan),
            "r" => Ok(LoanStatus::Reserved),
            _ => Err(format!("Invalid loan status code: {}", s)),
        }
    }
}

// SQLx conversion for LoanStatus
impl sqlx::Type<Postgres> for LoanStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<Postgres>>::compatible(ty)
    }
}

impl<'r> Decode<'r, Postgres> for LoanStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for LoanStatus {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&str as Encode<Postgres>>::encode(self.code(), buf)
    }
}

/// Lifecycle operations that mutate a copy's status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyAction {
    Reserve,
    Renew,
    Return,
}

impl std::fmt::Display for CopyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verb = match self {
            CopyAction::Reserve => "reserve",
            CopyAction::Renew => "renew",
            CopyAction::Return => "return",
        };
        write!(f, "{}", verb)
    }
}

/// Entry of the status transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Always permitted
    Allowed(LoanStatus),
    /// Overwrites an existing hold or maintenance state; rejected in strict mode
    Override(LoanStatus),
    /// Never permitted
    Denied,
}

/// One lendable copy of a book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BookInstance {
    pub id: Uuid,
    pub book_id: i32,
    pub imprint: String,
    pub due_back: Option<NaiveDate>,
    pub status: LoanStatus,
    pub borrower_id: Option<i32>,
    pub borrower_username: Option<String>,
    // Computed field (populated when queried with a JOIN on books)
    #[sqlx(default)]
    #[serde(default)]
    pub book_title: Option<String>,
}

impl BookInstance {
    /// Borrower and due-back are present exactly when the copy is held
    pub fn is_consistent(&self) -> bool {
        let held = self.status.is_held();
        held == self.borrower_id.is_some()
            && held == self.borrower_username.is_some()
            && held == self.due_back.is_some()
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status == LoanStatus::OnLoan && self.due_back.map(|d| d < today).unwrap_or(false)
    }
}

/// Check the borrower/due-back invariant for a prospective copy state
pub fn check_holding(
    status: LoanStatus,
    borrower_id: Option<i32>,
    borrower_username: Option<&str>,
    due_back: Option<NaiveDate>,
) -> AppResult<()> {
    let has_borrower = borrower_id.is_some() && borrower_username.is_some();
    if status.is_held() {
        if !has_borrower || due_back.is_none() {
            return Err(AppError::Validation(format!(
                "A copy that is {} needs a borrower and a due-back date",
                status
            )));
        }
    } else if borrower_id.is_some() || borrower_username.is_some() || due_back.is_some() {
        return Err(AppError::Validation(format!(
            "A copy that is {} cannot have a borrower or a due-back date",
            status
        )));
    }
    Ok(())
}

/// Copy with presentation fields for list views
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CopyDetails {
    #[serde(flatten)]
    pub copy: BookInstance,
    pub is_overdue: bool,
}

impl CopyDetails {
    pub fn new(copy: BookInstance, today: NaiveDate) -> Self {
        let is_overdue = copy.is_overdue(today);
        Self { copy, is_overdue }
    }
}

/// Create copy request (staff)
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateBookInstance {
    pub book_id: i32,
    #[validate(length(min = 1, max = 200, message = "Imprint must be 1-200 characters"))]
    pub imprint: String,
    pub status: Option<LoanStatus>,
    pub due_back: Option<NaiveDate>,
    pub borrower_id: Option<i32>,
    #[validate(length(max = 150, message = "Borrower name must be at most 150 characters"))]
    pub borrower_username: Option<String>,
}

/// Direct staff edit of a copy
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateBookInstance {
    #[validate(length(min = 1, max = 200, message = "Imprint must be 1-200 characters"))]
    pub imprint: Option<String>,
    pub status: Option<LoanStatus>,
    pub due_back: Option<NaiveDate>,
    pub borrower_id: Option<i32>,
    #[validate(length(max = 150, message = "Borrower name must be at most 150 characters"))]
    pub borrower_username: Option<String>,
}

/// Ordering applied to a copy filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CopyOrder {
    #[default]
    Imprint,
    DueBack,
    BorrowerThenDueBack,
}

/// Field filter over copies; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CopyFilter {
    pub book_id: Option<i32>,
    pub status: Option<LoanStatus>,
    pub borrower_id: Option<i32>,
    pub order: CopyOrder,
}

impl CopyFilter {
    pub fn matches(&self, copy: &BookInstance) -> bool {
        self.book_id.map_or(true, |id| copy.book_id == id)
            && self.status.map_or(true, |s| copy.status == s)
            && self.borrower_id.map_or(true, |id| copy.borrower_id == Some(id))
    }
}
