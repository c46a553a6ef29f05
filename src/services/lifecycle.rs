//! Book copy lifecycle: reservation, renewal and return of copies
//!
//! Every operation is a single read-modify-write of one copy against the
//! record store. There is no locking; concurrent writers to the same copy
//! race and the last save wins.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use uuid::Uuid;

use crate::{
    config::LifecycleConfig,
    error::{AppError, AppResult},
    models::{BookInstance, CopyAction, CopyFilter, CopyOrder, LoanStatus, UserClaims},
    repository::BookInstanceStore,
};

/// Longest borrower name a copy can store
pub const BORROWER_NAME_MAX: usize = 150;

/// `today` moved by `days`; an unrepresentable result is a configuration error
fn offset(today: NaiveDate, days: i64) -> AppResult<NaiveDate> {
    Duration::try_days(days)
        .and_then(|delta| today.checked_add_signed(delta))
        .ok_or_else(|| {
            AppError::Internal(format!("Date offset of {} days from {} is out of range", days, today))
        })
}

#[derive(Clone)]
pub struct LifecycleService {
    copies: Arc<dyn BookInstanceStore>,
    policy: LifecycleConfig,
}

impl LifecycleService {
    pub fn new(copies: Arc<dyn BookInstanceStore>, policy: LifecycleConfig) -> Self {
        Self { copies, policy }
    }

    pub fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    /// Reserve a copy for the principal; returns the id of the copy's book
    pub async fn reserve(&self, copy_id: Uuid, principal: &UserClaims) -> AppResult<i32> {
        self.reserve_on(copy_id, principal, Self::today()).await
    }

    pub async fn reserve_on(
        &self,
        copy_id: Uuid,
        principal: &UserClaims,
        today: NaiveDate,
    ) -> AppResult<i32> {
        if principal.username().chars().count() > BORROWER_NAME_MAX {
            return Err(AppError::Validation(format!(
                "borrower_username: must be at most {} characters",
                BORROWER_NAME_MAX
            )));
        }
        let due_back = offset(today, self.policy.reservation_days)?;

        let mut copy = self.copies.get(copy_id).await?;
        let next = copy
            .status
            .next(CopyAction::Reserve, self.policy.strict_transitions)?;

        if copy.status != LoanStatus::Available {
            tracing::warn!(
                "Reservation of copy {} by {} overrides status {} (borrower {:?})",
                copy.id,
                principal.username(),
                copy.status,
                copy.borrower_username
            );
        }

        copy.status = next;
        copy.borrower_id = Some(principal.user_id);
        copy.borrower_username = Some(principal.username().to_string());
        copy.due_back = Some(due_back);
        self.copies.save(&copy).await?;

        tracing::info!(
            "Copy {} reserved by {} until {:?}",
            copy.id,
            principal.username(),
            copy.due_back
        );
        Ok(copy.book_id)
    }

    /// Renewal date offered to staff before they pick one
    pub fn proposed_renewal_date(&self) -> AppResult<NaiveDate> {
        self.proposed_renewal_date_from(Self::today())
    }

    pub fn proposed_renewal_date_from(&self, today: NaiveDate) -> AppResult<NaiveDate> {
        offset(today, self.policy.renewal_default_weeks.saturating_mul(7))
    }

    /// The copy about to be renewed and the proposed date
    pub async fn renewal_proposal(
        &self,
        copy_id: Uuid,
        principal: &UserClaims,
    ) -> AppResult<(BookInstance, NaiveDate)> {
        principal.require_mark_returned()?;
        let copy = self.copies.get(copy_id).await?;
        Ok((copy, self.proposed_renewal_date()?))
    }

    /// Move the due-back date of a held copy
    pub async fn renew(
        &self,
        copy_id: Uuid,
        principal: &UserClaims,
        renewal_date: NaiveDate,
    ) -> AppResult<BookInstance> {
        self.renew_on(copy_id, principal, renewal_date, Self::today())
            .await
    }

    pub async fn renew_on(
        &self,
        copy_id: Uuid,
        principal: &UserClaims,
        renewal_date: NaiveDate,
        today: NaiveDate,
    ) -> AppResult<BookInstance> {
        principal.require_mark_returned()?;

        let mut copy = self.copies.get(copy_id).await?;
        self.check_renewal_date(renewal_date, today)?;
        copy.status
            .next(CopyAction::Renew, self.policy.strict_transitions)?;

        copy.due_back = Some(renewal_date);
        self.copies.save(&copy).await?;

        tracing::info!(
            "Copy {} renewed by {} until {}",
            copy.id,
            principal.username(),
            renewal_date
        );
        Ok(copy)
    }

    fn check_renewal_date(&self, date: NaiveDate, today: NaiveDate) -> AppResult<()> {
        if let Some(min) = self.policy.renewal_min_days {
            let earliest = offset(today, min)?;
            if date < earliest {
                return Err(AppError::Validation(format!(
                    "renewal_date: must not be before {}",
                    earliest
                )));
            }
        }
        if let Some(max) = self.policy.renewal_max_days {
            let latest = offset(today, max)?;
            if date > latest {
                return Err(AppError::Validation(format!(
                    "renewal_date: must not be after {}",
                    latest
                )));
            }
        }
        Ok(())
    }

    /// Mark a copy as back on the shelf
    pub async fn return_copy(&self, copy_id: Uuid, principal: &UserClaims) -> AppResult<BookInstance> {
        let mut copy = self.copies.get(copy_id).await?;
        let next = copy
            .status
            .next(CopyAction::Return, self.policy.strict_transitions)?;

        if copy.status == LoanStatus::Available {
            tracing::debug!("Copy {} returned while already available", copy.id);
        }

        copy.status = next;
        copy.borrower_id = None;
        copy.borrower_username = None;
        copy.due_back = None;
        self.copies.save(&copy).await?;

        tracing::info!("Copy {} returned by {}", copy.id, principal.username());
        Ok(copy)
    }

    /// Copies on loan to the principal, soonest due first
    pub async fn list_on_loan_for(&self, principal: &UserClaims) -> AppResult<Vec<BookInstance>> {
        self.copies
            .filter(&CopyFilter {
                status: Some(LoanStatus::OnLoan),
                borrower_id: Some(principal.user_id),
                order: CopyOrder::DueBack,
                ..Default::default()
            })
            .await
    }

    /// Copies reserved by the principal, soonest due first
    pub async fn list_reserved_for(&self, principal: &UserClaims) -> AppResult<Vec<BookInstance>> {
        self.copies
            .filter(&CopyFilter {
                status: Some(LoanStatus::Reserved),
                borrower_id: Some(principal.user_id),
                order: CopyOrder::DueBack,
                ..Default::default()
            })
            .await
    }

    /// Every copy on loan, grouped by borrower; staff only
    pub async fn list_all_on_loan(&self, principal: &UserClaims) -> AppResult<Vec<BookInstance>> {
        principal.require_mark_returned()?;

        self.copies
            .filter(&CopyFilter {
                status: Some(LoanStatus::OnLoan),
                order: CopyOrder::BorrowerThenDueBack,
                ..Default::default()
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuthorForm, BookForm, Capability, CreateBookInstance};
    use crate::repository::{memory::MemoryStore, AuthorStore, BookStore, MockBookInstanceStore};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn reader(id: i32, name: &str) -> UserClaims {
        UserClaims::new(id, name, false, vec![], 1)
    }

    fn librarian() -> UserClaims {
        UserClaims::new(99, "librarian", false, vec![Capability::CanMarkReturned], 1)
    }

    struct Fixture {
        store: MemoryStore,
        service: LifecycleService,
        book_id: i32,
    }

    async fn fixture(policy: LifecycleConfig) -> Fixture {
        let store = MemoryStore::default();
        let author = AuthorStore::create(
            &store,
            &AuthorForm {
                first_name: "Patrick".into(),
                last_name: "Rothfuss".into(),
                date_of_birth: None,
                date_of_death: None,
            },
        )
        .await
        .unwrap();
        let book = BookStore::create(
            &store,
            &BookForm {
                title: "The Name of the Wind".into(),
                author_id: author.id,
                summary: String::new(),
                isbn: "9780756404741".into(),
                genre_ids: vec![],
            },
        )
        .await
        .unwrap();
        let service = LifecycleService::new(Arc::new(store.clone()), policy);
        Fixture {
            store,
            service,
            book_id: book.id,
        }
    }

    impl Fixture {
        async fn copy(&self, status: LoanStatus, holder: Option<(&UserClaims, NaiveDate)>) -> Uuid {
            let form = CreateBookInstance {
                book_id: self.book_id,
                imprint: "DAW, 2007".into(),
                status: Some(status),
                due_back: holder.map(|(_, d)| d),
                borrower_id: holder.map(|(u, _)| u.user_id),
                borrower_username: holder.map(|(u, _)| u.username().to_string()),
            };
            BookInstanceStore::create(&self.store, &form).await.unwrap().id
        }

        async fn load(&self, id: Uuid) -> BookInstance {
            BookInstanceStore::get(&self.store, id).await.unwrap()
        }
    }

    #[tokio::test]
    async fn reserve_then_return_an_available_copy() {
        let fx = fixture(LifecycleConfig::default()).await;
        let user_a = reader(1, "userA");
        let c101 = fx.copy(LoanStatus::Available, None).await;

        let book_id = fx.service.reserve_on(c101, &user_a, date(2024, 1, 1)).await.unwrap();
        assert_eq!(book_id, fx.book_id);

        let copy = fx.load(c101).await;
        assert_eq!(copy.status, LoanStatus::Reserved);
        assert_eq!(copy.borrower_id, Some(1));
        assert_eq!(copy.borrower_username.as_deref(), Some("userA"));
        assert_eq!(copy.due_back, Some(date(2024, 1, 8)));
        assert!(copy.is_consistent());

        let returned = fx.service.return_copy(c101, &user_a).await.unwrap();
        assert_eq!(returned.status, LoanStatus::Available);
        let copy = fx.load(c101).await;
        assert_eq!(copy.borrower_id, None);
        assert_eq!(copy.due_back, None);
        assert!(copy.is_consistent());
    }

    #[tokio::test]
    async fn renew_moves_due_date_only() {
        let fx = fixture(LifecycleConfig::default()).await;
        let borrower = reader(5, "ann");
        let c102 = fx
            .copy(LoanStatus::OnLoan, Some((&borrower, date(2024, 2, 1))))
            .await;

        let renewed = fx
            .service
            .renew_on(c102, &librarian(), date(2024, 2, 22), date(2024, 1, 30))
            .await
            .unwrap();
        assert_eq!(renewed.due_back, Some(date(2024, 2, 22)));

        let copy = fx.load(c102).await;
        assert_eq!(copy.status, LoanStatus::OnLoan);
        assert_eq!(copy.borrower_id, Some(5));
        assert_eq!(copy.due_back, Some(date(2024, 2, 22)));
    }

    #[tokio::test]
    async fn renew_accepts_any_date_without_policy() {
        let fx = fixture(LifecycleConfig::default()).await;
        let borrower = reader(5, "ann");
        let copy = fx
            .copy(LoanStatus::OnLoan, Some((&borrower, date(2024, 2, 1))))
            .await;

        // in the past and far in the future are both accepted
        for due in [date(2020, 1, 1), date(2099, 12, 31)] {
            fx.service
                .renew_on(copy, &librarian(), due, date(2024, 1, 30))
                .await
                .unwrap();
            assert_eq!(fx.load(copy).await.due_back, Some(due));
        }
    }

    #[tokio::test]
    async fn renew_policy_bounds_the_date() {
        let policy = LifecycleConfig {
            renewal_min_days: Some(0),
            renewal_max_days: Some(28),
            ..Default::default()
        };
        let fx = fixture(policy).await;
        let borrower = reader(5, "ann");
        let copy = fx
            .copy(LoanStatus::OnLoan, Some((&borrower, date(2024, 2, 1))))
            .await;
        let today = date(2024, 2, 1);

        for bad in [date(2024, 1, 31), date(2024, 3, 1)] {
            let err = fx.service.renew_on(copy, &librarian(), bad, today).await;
            assert!(matches!(err, Err(AppError::Validation(_))));
        }
        fx.service
            .renew_on(copy, &librarian(), date(2024, 2, 29), today)
            .await
            .unwrap();
        assert_eq!(fx.load(copy).await.due_back, Some(date(2024, 2, 29)));
    }

    #[tokio::test]
    async fn renew_of_unknown_copy_is_not_found() {
        let fx = fixture(LifecycleConfig::default()).await;
        let err = fx
            .service
            .renew_on(Uuid::new_v4(), &librarian(), date(2024, 2, 22), date(2024, 2, 1))
            .await;
        assert!(matches!(err, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn renew_of_unheld_copy_conflicts() {
        let fx = fixture(LifecycleConfig::default()).await;
        let copy = fx.copy(LoanStatus::Available, None).await;
        let err = fx
            .service
            .renew_on(copy, &librarian(), date(2024, 2, 22), date(2024, 2, 1))
            .await;
        assert!(matches!(err, Err(AppError::Conflict(_))));
        assert!(fx.load(copy).await.is_consistent());
    }

    #[tokio::test]
    async fn reserve_overwrites_a_loan_unless_strict() {
        let holder = reader(5, "ann");
        let thief = reader(6, "bob");

        let fx = fixture(LifecycleConfig::default()).await;
        let copy = fx.copy(LoanStatus::OnLoan, Some((&holder, date(2024, 2, 1)))).await;
        fx.service.reserve_on(copy, &thief, date(2024, 1, 10)).await.unwrap();
        let stored = fx.load(copy).await;
        assert_eq!(stored.status, LoanStatus::Reserved);
        assert_eq!(stored.borrower_id, Some(6));
        assert_eq!(stored.due_back, Some(date(2024, 1, 17)));

        let strict = LifecycleConfig {
            strict_transitions: true,
            ..Default::default()
        };
        let fx = fixture(strict).await;
        let copy = fx.copy(LoanStatus::OnLoan, Some((&holder, date(2024, 2, 1)))).await;
        let err = fx.service.reserve_on(copy, &thief, date(2024, 1, 10)).await;
        assert!(matches!(err, Err(AppError::Conflict(_))));
        let stored = fx.load(copy).await;
        assert_eq!(stored.status, LoanStatus::OnLoan);
        assert_eq!(stored.borrower_id, Some(5));
    }

    #[tokio::test]
    async fn returning_an_available_copy_is_a_no_op() {
        let fx = fixture(LifecycleConfig::default()).await;
        let copy = fx.copy(LoanStatus::Available, None).await;
        let returned = fx.service.return_copy(copy, &reader(1, "a")).await.unwrap();
        assert_eq!(returned.status, LoanStatus::Available);
        assert!(returned.is_consistent());
    }

    #[tokio::test]
    async fn per_user_lists_are_filtered_and_sorted() {
        let fx = fixture(LifecycleConfig::default()).await;
        let ann = reader(5, "ann");
        let bob = reader(6, "bob");

        let late = fx.copy(LoanStatus::OnLoan, Some((&ann, date(2024, 3, 1)))).await;
        let soon = fx.copy(LoanStatus::OnLoan, Some((&ann, date(2024, 2, 1)))).await;
        let reserved = fx.copy(LoanStatus::Reserved, Some((&ann, date(2024, 1, 1)))).await;
        let _other = fx.copy(LoanStatus::OnLoan, Some((&bob, date(2024, 1, 15)))).await;
        let _shelf = fx.copy(LoanStatus::Available, None).await;

        let on_loan: Vec<Uuid> = fx
            .service
            .list_on_loan_for(&ann)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(on_loan, vec![soon, late]);

        let held: Vec<Uuid> = fx
            .service
            .list_reserved_for(&ann)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(held, vec![reserved]);

        assert!(fx
            .service
            .list_on_loan_for(&reader(7, "nobody"))
            .await
            .unwrap()
            .is_empty());

        let all = fx.service.list_all_on_loan(&librarian()).await.unwrap();
        let borrowers: Vec<Option<i32>> = all.iter().map(|c| c.borrower_id).collect();
        assert_eq!(borrowers, vec![Some(5), Some(5), Some(6)]);
    }

    #[tokio::test]
    async fn listing_all_loans_needs_capability_before_any_read() {
        // no expectations: any store call would panic
        let store = MockBookInstanceStore::new();
        let service = LifecycleService::new(Arc::new(store), LifecycleConfig::default());

        let err = service.list_all_on_loan(&reader(1, "userA")).await;
        assert!(matches!(err, Err(AppError::Authorization(_))));

        let err = service
            .renew_on(Uuid::new_v4(), &reader(1, "userA"), date(2024, 2, 22), date(2024, 2, 1))
            .await;
        assert!(matches!(err, Err(AppError::Authorization(_))));
    }

    #[tokio::test]
    async fn store_failures_propagate() {
        let mut store = MockBookInstanceStore::new();
        let id = Uuid::new_v4();
        store.expect_get().returning(|id| {
            Ok(BookInstance {
                id,
                book_id: 3,
                imprint: "x".into(),
                due_back: None,
                status: LoanStatus::Available,
                borrower_id: None,
                borrower_username: None,
                book_title: None,
            })
        });
        store
            .expect_save()
            .times(1)
            .returning(|_| Err(AppError::Internal("disk full".into())));
        let service = LifecycleService::new(Arc::new(store), LifecycleConfig::default());

        let err = service.reserve_on(id, &reader(1, "a"), date(2024, 1, 1)).await;
        assert!(matches!(err, Err(AppError::Internal(_))));
    }

    #[test]
    fn proposed_renewal_is_three_weeks_out() {
        let service = LifecycleService::new(
            Arc::new(MockBookInstanceStore::new()),
            LifecycleConfig::default(),
        );
        assert_eq!(
            service.proposed_renewal_date_from(date(2024, 1, 1)).unwrap(),
            date(2024, 1, 22)
        );
    }

    #[tokio::test]
    async fn absurd_offsets_fail_without_panicking() {
        let policy = LifecycleConfig {
            reservation_days: i64::MAX,
            renewal_default_weeks: i64::MAX,
            renewal_max_days: Some(i64::MIN),
            ..Default::default()
        };
        let fx = fixture(policy).await;
        let copy = fx.copy(LoanStatus::Available, None).await;

        let err = fx.service.reserve_on(copy, &reader(1, "a"), date(2024, 1, 1)).await;
        assert!(matches!(err, Err(AppError::Internal(_))));
        assert_eq!(fx.load(copy).await.status, LoanStatus::Available);

        assert!(matches!(
            fx.service.proposed_renewal_date_from(date(2024, 1, 1)),
            Err(AppError::Internal(_))
        ));

        let borrower = reader(5, "ann");
        let held = fx
            .copy(LoanStatus::OnLoan, Some((&borrower, date(2024, 2, 1))))
            .await;
        let err = fx
            .service
            .renew_on(held, &librarian(), date(2024, 2, 22), date(2024, 2, 1))
            .await;
        assert!(matches!(err, Err(AppError::Internal(_))));
    }

    #[tokio::test]
    async fn reserve_rejects_overlong_usernames_before_reading() {
        // no expectations: any store call would panic
        let service = LifecycleService::new(
            Arc::new(MockBookInstanceStore::new()),
            LifecycleConfig::default(),
        );
        let long_name = "x".repeat(BORROWER_NAME_MAX + 1);

        let err = service
            .reserve_on(Uuid::new_v4(), &reader(1, &long_name), date(2024, 1, 1))
            .await;
        assert!(matches!(err, Err(AppError::Validation(_))));
    }
}
