//! Book instances (copies) repository for database operations

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use super::BookInstanceStore;
use crate::{
    error::{AppError, AppResult},
    models::{BookInstance, CopyFilter, CopyOrder, CreateBookInstance, LoanStatus},
};

const COPY_SELECT: &str = r#"
    SELECT bi.id, bi.book_id, bi.imprint, bi.due_back, bi.status,
           bi.borrower_id, bi.borrower_username, b.title AS book_title
    FROM book_instances bi
    JOIN books b ON b.id = bi.book_id
"#;

#[derive(Clone)]
pub struct BookInstancesRepository {
    pool: Pool<Postgres>,
}

impl BookInstancesRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn order_clause(order: CopyOrder) -> &'static str {
    match order {
        CopyOrder::Imprint => "ORDER BY bi.imprint, bi.id",
        CopyOrder::DueBack => "ORDER BY bi.due_back ASC NULLS LAST, bi.id",
        CopyOrder::BorrowerThenDueBack => {
            "ORDER BY bi.borrower_id ASC NULLS LAST, bi.due_back ASC NULLS LAST, bi.id"
        }
    }
}

#[async_trait]
impl BookInstanceStore for BookInstancesRepository {
    async fn get(&self, id: Uuid) -> AppResult<BookInstance> {
        sqlx::query_as::<_, BookInstance>(&format!("{} WHERE bi.id = $1", COPY_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book instance {} not found", id)))
    }

    async fn filter(&self, filter: &CopyFilter) -> AppResult<Vec<BookInstance>> {
        let mut conditions = Vec::new();
        let mut idx = 1;

        if filter.book_id.is_some() {
            conditions.push(format!("bi.book_id = ${}", idx));
            idx += 1;
        }
        if filter.status.is_some() {
            conditions.push(format!("bi.status = ${}", idx));
            idx += 1;
        }
        if filter.borrower_id.is_some() {
            conditions.push(format!("bi.borrower_id = ${}", idx));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let query = format!("{} {} {}", COPY_SELECT, where_clause, order_clause(filter.order));

        let mut builder = sqlx::query_as::<_, BookInstance>(&query);
        if let Some(book_id) = filter.book_id {
            builder = builder.bind(book_id);
        }
        if let Some(status) = filter.status {
            builder = builder.bind(status);
        }
        if let Some(borrower_id) = filter.borrower_id {
            builder = builder.bind(borrower_id);
        }

        let rows = builder.fetch_all(&self.pool).await?;
        Ok(rows)
    }

    async fn create(&self, copy: &CreateBookInstance) -> AppResult<BookInstance> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO book_instances (id, book_id, imprint, due_back, status, borrower_id, borrower_username)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(id)
        .bind(copy.book_id)
        .bind(&copy.imprint)
        .bind(copy.due_back)
        .bind(copy.status.unwrap_or(LoanStatus::Available))
        .bind(copy.borrower_id)
        .bind(&copy.borrower_username)
        .execute(&self.pool)
        .await?;

        self.get(id).await
    }

    async fn save(&self, copy: &BookInstance) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE book_instances
            SET imprint = $1, due_back = $2, status = $3, borrower_id = $4, borrower_username = $5
            WHERE id = $6
            "#,
        )
        .bind(&copy.imprint)
        .bind(copy.due_back)
        .bind(copy.status)
        .bind(copy.borrower_id)
        .bind(&copy.borrower_username)
        .bind(copy.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book instance {} not found", copy.id)));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM book_instances WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book instance {} not found", id)));
        }
        Ok(())
    }

    async fn count(&self, status: Option<LoanStatus>) -> AppResult<i64> {
        let count: i64 = match status {
            Some(status) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM book_instances WHERE status = $1")
                    .bind(status)
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM book_instances")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count)
    }
}
