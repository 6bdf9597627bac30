//! Local user directory: the persistent mapping from provider accounts to
//! local user records.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{LocalUser, NewLocalUser};

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A uniqueness rule was violated; carries the offending column.
    #[error("Duplicate value for {0}")]
    Duplicate(String),

    #[error("Directory unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Persist a new record and return its assigned id.
    async fn create(&self, user: NewLocalUser) -> Result<Uuid, DirectoryError>;

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<LocalUser>, DirectoryError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<LocalUser>, DirectoryError>;

    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<LocalUser>, DirectoryError>;
}

/// PostgreSQL-backed directory over the `local_users` table.
#[derive(Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Map a unique violation onto the column it guards.
fn classify_insert_error(err: sqlx::Error) -> DirectoryError {
    let column = match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            let constraint = db.constraint().unwrap_or_default();
            Some(
                constraint
                    .strip_prefix("local_users_")
                    .and_then(|rest| rest.strip_suffix("_key"))
                    .unwrap_or(constraint)
                    .to_string(),
            )
        }
        _ => None,
    };

    match column {
        Some(column) => DirectoryError::Duplicate(column),
        None => DirectoryError::Database(err),
    }
}

#[async_trait]
impl UserDirectory for PgDirectory {
    async fn create(&self, user: NewLocalUser) -> Result<Uuid, DirectoryError> {
        let record = LocalUser::from_new(user);

        sqlx::query(
            r#"
            INSERT INTO local_users (user_id, external_id, username, email, first_name, last_name, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.user_id)
        .bind(&record.external_id)
        .bind(&record.username)
        .bind(&record.email)
        .bind(&record.first_name)
        .bind(&record.last_name)
        .bind(record.created_utc)
        .bind(record.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(classify_insert_error)?;

        Ok(record.user_id)
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<LocalUser>, DirectoryError> {
        let user = sqlx::query_as::<_, LocalUser>("SELECT * FROM local_users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<LocalUser>, DirectoryError> {
        let user = sqlx::query_as::<_, LocalUser>("SELECT * FROM local_users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<LocalUser>, DirectoryError> {
        let user =
            sqlx::query_as::<_, LocalUser>("SELECT * FROM local_users WHERE external_id = $1")
                .bind(external_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(user)
    }
}

/// Directory held in process memory. Same uniqueness rules as the table.
#[derive(Default)]
pub struct InMemoryDirectory {
    users: Mutex<HashMap<Uuid, LocalUser>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.lock().map(|users| users.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn find<F>(&self, predicate: F) -> Result<Option<LocalUser>, DirectoryError>
    where
        F: Fn(&LocalUser) -> bool,
    {
        let users = self
            .users
            .lock()
            .map_err(|e| DirectoryError::Unavailable(format!("Lock poisoned: {}", e)))?;
        Ok(users.values().find(|user| predicate(user)).cloned())
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn create(&self, user: NewLocalUser) -> Result<Uuid, DirectoryError> {
        let mut users = self
            .users
            .lock()
            .map_err(|e| DirectoryError::Unavailable(format!("Lock poisoned: {}", e)))?;

        for existing in users.values() {
            if existing.external_id == user.external_id {
                return Err(DirectoryError::Duplicate("external_id".to_string()));
            }
            if existing.username == user.username {
                return Err(DirectoryError::Duplicate("username".to_string()));
            }
            if existing.email == user.email {
                return Err(DirectoryError::Duplicate("email".to_string()));
            }
        }

        let record = LocalUser::from_new(user);
        let user_id = record.user_id;
        users.insert(user_id, record);
        Ok(user_id)
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<LocalUser>, DirectoryError> {
        let users = self
            .users
            .lock()
            .map_err(|e| DirectoryError::Unavailable(format!("Lock poisoned: {}", e)))?;
        Ok(users.get(&user_id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<LocalUser>, DirectoryError> {
        self.find(|user| user.username == username)
    }

    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<LocalUser>, DirectoryError> {
        self.find(|user| user.external_id == external_id)
    }
}
