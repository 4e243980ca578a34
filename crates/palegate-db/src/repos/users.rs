//! User repository

use sqlx::SqliteExecutor;

use crate::{DbResult, UserRow};

/// Users are auto-created on first reference; `roll` is the primary key.
pub struct UserRepo;

impl UserRepo {
    /// Idempotent upsert of a roll
    pub async fn get_or_create(exec: impl SqliteExecutor<'_>, roll: &str) -> DbResult<()> {
        sqlx::query("INSERT INTO users (roll) VALUES (?) ON CONFLICT (roll) DO NOTHING")
            .bind(roll)
            .execute(exec)
            .await?;
        Ok(())
    }

    /// Find a user by roll
    pub async fn find(exec: impl SqliteExecutor<'_>, roll: &str) -> DbResult<Option<UserRow>> {
        let user = sqlx::query_as::<_, UserRow>("SELECT roll FROM users WHERE roll = ?")
            .bind(roll)
            .fetch_optional(exec)
            .await?;
        Ok(user)
    }

    /// Total registered rolls
    pub async fn count(exec: impl SqliteExecutor<'_>) -> DbResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(exec)
            .await?;
        Ok(count)
    }
}
