//! User repository for database operations.
//!
//! Registration writes the user and its profile in one transaction; the
//! profile always comes from [`Profile::for_new_user`].

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use bazaar_core::{Email, Role, UserId};

use super::RepositoryError;
use crate::models::{Profile, User};

#[derive(sqlx::FromRow)]
struct UserRow {
    id: UserId,
    email: String,
    name: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;
        Ok(Self {
            id: row.id,
            email,
            name: row.name,
            created_at: row.created_at,
        })
    }
}

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a user by their ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the email in the database is invalid.
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        sqlx::query_as::<_, UserRow>(
            r"
            SELECT id, email, name, created_at
            FROM storefront.users
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .map(User::try_from)
        .transpose()
    }

    /// Get a user by email, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the email in the database is invalid.
    pub async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        sqlx::query_as::<_, UserRow>(
            r"
            SELECT id, email, name, created_at
            FROM storefront.users
            WHERE LOWER(email) = LOWER($1)
            ",
        )
        .bind(email)
        .fetch_optional(self.pool)
        .await?
        .map(User::try_from)
        .transpose()
    }

    /// Register a user together with its profile.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email already exists.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn register(
        &self,
        email: &Email,
        name: &str,
        role: Option<Role>,
    ) -> Result<(User, Profile), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, UserRow>(
            r"
            INSERT INTO storefront.users (email, name)
            VALUES ($1, $2)
            RETURNING id, email, name, created_at
            ",
        )
        .bind(email)
        .bind(name)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return RepositoryError::Conflict("email already exists".to_owned());
            }
            RepositoryError::Database(e)
        })?;

        let user = User::try_from(row)?;
        let profile = Profile::for_new_user(user.id, role);

        sqlx::query(
            r"
            INSERT INTO storefront.profiles (user_id, role)
            VALUES ($1, $2)
            ",
        )
        .bind(profile.user_id)
        .bind(profile.role)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(user_id = %user.id, role = ?profile.role, "User registered");
        Ok((user, profile))
    }
}
