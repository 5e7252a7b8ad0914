//! PostgreSQL-backed [`UserRepository`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::{AttemptCounter, CredentialUpdate, RepoError, UserRepository};
use crate::models::auth::{CredentialRecord, NewCredential};
use crate::uuid::{parse_id, uuidv7};

const RETURNING_COLUMNS: &str = "id::text, email, profile_name, password_hash, is_active, \
     failed_attempts, last_failed_at, last_login, current_refresh_token, created_at";

#[derive(Debug, sqlx::FromRow)]
struct CredentialRow {
    id: String,
    email: String,
    profile_name: String,
    password_hash: String,
    is_active: bool,
    failed_attempts: i32,
    last_failed_at: Option<DateTime<Utc>>,
    last_login: Option<DateTime<Utc>>,
    current_refresh_token: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<CredentialRow> for CredentialRecord {
    fn from(row: CredentialRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            profile_name: row.profile_name,
            password_hash: row.password_hash,
            is_active: row.is_active,
            failed_attempts: u32::try_from(row.failed_attempts).unwrap_or(0),
            last_failed_at: row.last_failed_at,
            last_login: row.last_login,
            current_refresh_token: row.current_refresh_token,
            created_at: row.created_at,
        }
    }
}

/// Credential records in the `credentials` table.
#[derive(Debug, Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<CredentialRecord>, RepoError> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {RETURNING_COLUMNS} FROM credentials WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<CredentialRecord>, RepoError> {
        let Some(id) = parse_id(id) else {
            return Ok(None);
        };
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {RETURNING_COLUMNS} FROM credentials WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn insert(&self, credential: NewCredential) -> Result<String, RepoError> {
        let id = sqlx::query_scalar::<_, String>(
            "INSERT INTO credentials (id, email, profile_name, password_hash) \
             VALUES ($1, $2, $3, $4) RETURNING id::text",
        )
        .bind(uuidv7())
        .bind(&credential.email)
        .bind(&credential.profile_name)
        .bind(&credential.password_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn update_fields(
        &self,
        id: &str,
        update: CredentialUpdate,
    ) -> Result<Option<CredentialRecord>, RepoError> {
        let Some(id) = parse_id(id) else {
            return Ok(None);
        };
        let mut query = build_update(id, &update);
        let row = query
            .build_query_as::<CredentialRow>()
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }
}

/// One `UPDATE ... WHERE <preconditions> RETURNING ...` statement. Column
/// references on the right-hand side read the pre-update row, so the lock
/// decision and the increment see the same value.
fn build_update(id: uuid::Uuid, update: &CredentialUpdate) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::<Postgres>::new("UPDATE credentials SET ");
    let mut set = qb.separated(", ");
    let mut assigned = false;

    match update.failed_attempts {
        Some(AttemptCounter::Reset) => {
            set.push("failed_attempts = 0");
            assigned = true;
        }
        Some(AttemptCounter::Increment { lock_at }) => {
            set.push("failed_attempts = failed_attempts + 1");
            set.push("is_active = CASE WHEN failed_attempts + 1 >= ");
            set.push_bind_unseparated(i32::try_from(lock_at).unwrap_or(i32::MAX));
            set.push_unseparated(" THEN FALSE ELSE ");
            match update.is_active {
                Some(active) => {
                    set.push_bind_unseparated(active);
                }
                None => {
                    set.push_unseparated("is_active");
                }
            }
            set.push_unseparated(" END");
            assigned = true;
        }
        None => {
            if let Some(active) = update.is_active {
                set.push("is_active = ");
                set.push_bind_unseparated(active);
                assigned = true;
            }
        }
    }
    if let Some(at) = update.last_failed_at {
        set.push("last_failed_at = ");
        set.push_bind_unseparated(at);
        assigned = true;
    }
    if let Some(token) = &update.current_refresh_token {
        set.push("current_refresh_token = ");
        set.push_bind_unseparated(token.clone());
        assigned = true;
    }
    if let Some(at) = update.last_login {
        set.push("last_login = ");
        set.push_bind_unseparated(at);
        assigned = true;
    }
    if !assigned {
        set.push("id = id");
    }

    qb.push(" WHERE id = ");
    qb.push_bind(id);
    if update.require_active {
        qb.push(" AND is_active");
    }
    if let Some(expected) = &update.expect_refresh_token {
        qb.push(" AND current_refresh_token = ");
        qb.push_bind(expected.clone());
    }
    qb.push(" RETURNING ");
    qb.push(RETURNING_COLUMNS);
    qb
}
