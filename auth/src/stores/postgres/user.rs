//! PostgreSQL user repository implementation.
//!
//! Local users live in a single `users` table. The partial unique index
//! `users_external_id_key` is what makes concurrent first logins safe: the
//! losing insert fails with a unique violation, reported as
//! `DuplicateIdentity`.
//!
//! Status columns are stored as `SMALLINT` codes (see [`UserStatus::code`]).
//!
//! # Example
//!
//! ```no_run
//! use identity_bridge::stores::postgres::PostgresUserRepository;
//! use sqlx::PgPool;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = PgPool::connect("postgresql://localhost/identity").await?;
//! let repo = PostgresUserRepository::new(pool);
//! repo.migrate().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{IdentityBridgeError, Result};
use crate::providers::UserRepository;
use crate::state::{
    EmailStatus, ExternalId, LocalUser, NoticeStatus, ProfileUpdate, UserId, UserStatus,
};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::{PgArguments, PgQueryResult};

/// Name of the unique index on `users.external_id`.
const EXTERNAL_ID_CONSTRAINT: &str = "users_external_id_key";

const SELECT_USER: &str = r"
    SELECT id, external_id, username, display_name, email, local_secret,
           access_token, token_expires_at, status, email_status, notice_status,
           answer_count, question_count, last_login_at, created_at
    FROM users
";

/// `PostgreSQL` user repository.
#[derive(Clone)]
pub struct PostgresUserRepository {
    /// `PostgreSQL` connection pool.
    pool: PgPool,
}

impl PostgresUserRepository {
    /// Create a new `PostgreSQL` user repository.
    ///
    /// # Arguments
    ///
    /// * `pool` - `PostgreSQL` connection pool
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns error if migrations fail.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| IdentityBridgeError::StorageError(format!("Migration failed: {e}")))?;
        Ok(())
    }

    async fn fetch_optional(&self, query: UserQuery<'_>) -> Result<Option<LocalUser>> {
        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| IdentityBridgeError::StorageError(format!("Failed to get user: {e}")))?;

        row.map(UserRow::into_user).transpose()
    }
}

type UserQuery<'q> = sqlx::query::QueryAs<'q, sqlx::Postgres, UserRow, PgArguments>;

fn select_where(clause: &str) -> String {
    format!("{SELECT_USER} WHERE {clause}")
}

impl std::fmt::Debug for PostgresUserRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresUserRepository").finish_non_exhaustive()
    }
}

impl UserRepository for PostgresUserRepository {
    async fn get_by_id(&self, user_id: UserId) -> Result<Option<LocalUser>> {
        let sql = select_where("id = $1");
        self.fetch_optional(sqlx::query_as(&sql).bind(user_id.0)).await
    }

    async fn get_by_external_id(&self, external_id: ExternalId) -> Result<Option<LocalUser>> {
        let sql = select_where("external_id = $1");
        self.fetch_optional(sqlx::query_as(&sql).bind(external_id.0))
            .await
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<LocalUser>> {
        let sql = select_where("username = $1 LIMIT 1");
        self.fetch_optional(sqlx::query_as(&sql).bind(username)).await
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<LocalUser>> {
        let sql = select_where("email = $1 LIMIT 1");
        self.fetch_optional(sqlx::query_as(&sql).bind(email)).await
    }

    async fn batch_get_by_ids(&self, user_ids: &[UserId]) -> Result<Vec<LocalUser>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<uuid::Uuid> = user_ids.iter().map(|id| id.0).collect();
        let sql = select_where("id = ANY($1)");
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| IdentityBridgeError::StorageError(format!("Failed to get users: {e}")))?;

        rows.into_iter().map(UserRow::into_user).collect()
    }

    async fn insert(&self, user: &LocalUser) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO users
                (id, external_id, username, display_name, email, local_secret,
                 access_token, token_expires_at, status, email_status, notice_status,
                 answer_count, question_count, last_login_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ",
        )
        .bind(user.id.0)
        .bind(user.external_id.map(|id| id.0))
        .bind(&user.username)
        .bind(&user.display_name)
        .bind(&user.email)
        .bind(&user.local_secret)
        .bind(&user.access_token)
        .bind(user.token_expires_at)
        .bind(user.status.code())
        .bind(user.email_status.code())
        .bind(user.notice_status.code())
        .bind(user.answer_count)
        .bind(user.question_count)
        .bind(user.last_login_at)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_unique_violation() && db_err.constraint() == Some(EXTERNAL_ID_CONSTRAINT) {
                    if let Some(external_id) = user.external_id {
                        return IdentityBridgeError::DuplicateIdentity {
                            external_id: external_id.0,
                        };
                    }
                }
            }
            IdentityBridgeError::StorageError(format!("Failed to create user: {e}"))
        })?;

        Ok(())
    }

    async fn update_token_fields(
        &self,
        user_id: UserId,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE users SET access_token = $2, token_expires_at = $3 WHERE id = $1",
        )
        .bind(user_id.0)
        .bind(access_token)
        .bind(expires_at)
        .execute(&self.pool)
        .await;

        expect_one_row(result, "update token")
    }

    async fn update_last_login(&self, user_id: UserId, at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query("UPDATE users SET last_login_at = $2 WHERE id = $1")
            .bind(user_id.0)
            .bind(at)
            .execute(&self.pool)
            .await;

        expect_one_row(result, "update last login")
    }

    async fn update_status(&self, user_id: UserId, status: UserStatus) -> Result<()> {
        let result = sqlx::query("UPDATE users SET status = $2 WHERE id = $1")
            .bind(user_id.0)
            .bind(status.code())
            .execute(&self.pool)
            .await;

        expect_one_row(result, "update status")
    }

    async fn update_email_status(&self, user_id: UserId, status: EmailStatus) -> Result<()> {
        let result = sqlx::query("UPDATE users SET email_status = $2 WHERE id = $1")
            .bind(user_id.0)
            .bind(status.code())
            .execute(&self.pool)
            .await;

        expect_one_row(result, "update email status")
    }

    async fn update_notice_status(&self, user_id: UserId, status: NoticeStatus) -> Result<()> {
        let result = sqlx::query("UPDATE users SET notice_status = $2 WHERE id = $1")
            .bind(user_id.0)
            .bind(status.code())
            .execute(&self.pool)
            .await;

        expect_one_row(result, "update notice status")
    }

    async fn update_secret(&self, user_id: UserId, secret: &str) -> Result<()> {
        let result = sqlx::query("UPDATE users SET local_secret = $2 WHERE id = $1")
            .bind(user_id.0)
            .bind(secret)
            .execute(&self.pool)
            .await;

        expect_one_row(result, "update secret")
    }

    async fn update_email(&self, user_id: UserId, email: &str) -> Result<()> {
        let result = sqlx::query("UPDATE users SET email = $2 WHERE id = $1")
            .bind(user_id.0)
            .bind(email)
            .execute(&self.pool)
            .await;

        expect_one_row(result, "update email")
    }

    async fn update_info(&self, user_id: UserId, update: &ProfileUpdate) -> Result<()> {
        let result =
            sqlx::query("UPDATE users SET username = $2, display_name = $3 WHERE id = $1")
                .bind(user_id.0)
                .bind(&update.username)
                .bind(&update.display_name)
                .execute(&self.pool)
                .await;

        expect_one_row(result, "update info")
    }

    async fn increase_answer_count(&self, user_id: UserId, amount: i64) -> Result<()> {
        let result =
            sqlx::query("UPDATE users SET answer_count = answer_count + $2 WHERE id = $1")
                .bind(user_id.0)
                .bind(amount)
                .execute(&self.pool)
                .await;

        expect_one_row(result, "increase answer count")
    }

    async fn increase_question_count(&self, user_id: UserId, amount: i64) -> Result<()> {
        let result =
            sqlx::query("UPDATE users SET question_count = question_count + $2 WHERE id = $1")
                .bind(user_id.0)
                .bind(amount)
                .execute(&self.pool)
                .await;

        expect_one_row(result, "increase question count")
    }
}

/// Map an `UPDATE ... WHERE id = $1` result, treating zero rows as a missing user.
fn expect_one_row(
    result: std::result::Result<PgQueryResult, sqlx::Error>,
    operation: &str,
) -> Result<()> {
    let done = result
        .map_err(|e| IdentityBridgeError::StorageError(format!("Failed to {operation}: {e}")))?;

    if done.rows_affected() == 0 {
        return Err(IdentityBridgeError::UserNotFound);
    }
    Ok(())
}

/// Raw `users` row.
#[derive(sqlx::FromRow)]
struct UserRow {
    id: uuid::Uuid,
    external_id: Option<i64>,
    username: String,
    display_name: String,
    email: String,
    local_secret: String,
    access_token: String,
    token_expires_at: Option<DateTime<Utc>>,
    status: i16,
    email_status: i16,
    notice_status: i16,
    answer_count: i64,
    question_count: i64,
    last_login_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self) -> Result<LocalUser> {
        let status = UserStatus::from_code(self.status).ok_or_else(|| {
            IdentityBridgeError::StorageError(format!("Unknown user status code {}", self.status))
        })?;
        let email_status = EmailStatus::from_code(self.email_status).ok_or_else(|| {
            IdentityBridgeError::StorageError(format!(
                "Unknown email status code {}",
                self.email_status
            ))
        })?;
        let notice_status = NoticeStatus::from_code(self.notice_status).ok_or_else(|| {
            IdentityBridgeError::StorageError(format!(
                "Unknown notice status code {}",
                self.notice_status
            ))
        })?;

        Ok(LocalUser {
            id: UserId(self.id),
            external_id: self.external_id.map(ExternalId),
            username: self.username,
            display_name: self.display_name,
            email: self.email,
            local_secret: self.local_secret,
            access_token: self.access_token,
            token_expires_at: self.token_expires_at,
            status,
            email_status,
            notice_status,
            answer_count: self.answer_count,
            question_count: self.question_count,
            last_login_at: self.last_login_at,
            created_at: self.created_at,
        })
    }
}
