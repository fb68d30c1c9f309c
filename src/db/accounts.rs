//! Users and API tokens.
//!
//! Token lookup is the authentication step: callers resolve a bearer token
//! to a [`User`] here, then hand the user id to the task operations.

use chrono::Utc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{ApiToken, User, UserId};

impl super::Db {
    /// Create a user. Usernames are unique.
    pub async fn create_user(&self, username: &str) -> Result<User> {
        let username = username.trim();
        if username.is_empty() {
            return Err(Error::Validation("username must not be empty".to_string()));
        }

        let row: Option<(Uuid, String, chrono::DateTime<Utc>)> = sqlx::query_as(
            "INSERT INTO users (id, username, created_at) VALUES ($1, $2, $3)
             ON CONFLICT (username) DO NOTHING
             RETURNING id, username, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx(e, None))?;

        let (id, username, created_at) = row
            .ok_or_else(|| Error::Validation(format!("username '{username}' is taken")))?;
        Ok(User {
            id: UserId(id),
            username,
            created_at,
        })
    }

    /// Look a user up by username.
    pub async fn find_user(&self, username: &str) -> Result<User> {
        let row: Option<(Uuid, String, chrono::DateTime<Utc>)> =
            sqlx::query_as("SELECT id, username, created_at FROM users WHERE username = $1")
                .bind(username)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| Error::from_sqlx(e, None))?;

        let (id, username, created_at) =
            row.ok_or_else(|| Error::NotFound(format!("user {username}")))?;
        Ok(User {
            id: UserId(id),
            username,
            created_at,
        })
    }

    /// Return the user's API token, creating one on first use.
    pub async fn issue_token(&self, user_id: UserId) -> Result<ApiToken> {
        sqlx::query(
            "INSERT INTO api_tokens (token, user_id, created_at) VALUES ($1, $2, $3)
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(user_id.0)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                Error::NotFound(format!("user {user_id}"))
            }
            other => Error::from_sqlx(other, None),
        })?;

        let (token, created_at): (Uuid, chrono::DateTime<Utc>) =
            sqlx::query_as("SELECT token, created_at FROM api_tokens WHERE user_id = $1")
                .bind(user_id.0)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| Error::from_sqlx(e, None))?;

        Ok(ApiToken {
            token,
            user_id,
            created_at,
        })
    }

    /// Resolve a bearer token to its user.
    ///
    /// # Errors
    ///
    /// Returns `Error::Unauthorized` if the token is malformed or unknown.
    pub async fn authenticate(&self, token: &str) -> Result<User> {
        let token = Uuid::parse_str(token.trim()).map_err(|_| Error::Unauthorized)?;

        let row: Option<(Uuid, String, chrono::DateTime<Utc>)> = sqlx::query_as(
            "SELECT u.id, u.username, u.created_at
             FROM api_tokens t JOIN users u ON u.id = t.user_id
             WHERE t.token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx(e, None))?;

        let (id, username, created_at) = row.ok_or(Error::Unauthorized)?;
        tracing::debug!(user = %username, "authenticated API token");
        Ok(User {
            id: UserId(id),
            username,
            created_at,
        })
    }
}
