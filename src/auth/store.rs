//! Persisted user and session storage
//!
//! Thin query layer over the shared pool. Handlers own the error mapping;
//! everything here surfaces raw `sqlx::Error`.

use sqlx::SqlitePool;

use super::models::{Session, User};
use crate::common::generate_user_id;

/// Profile fields written on every login.
#[derive(Debug)]
pub struct UserProfile<'a> {
    pub steam_id: &'a str,
    pub username: &'a str,
    pub avatar_url: Option<&'a str>,
    pub profile_url: Option<&'a str>,
    pub real_name: Option<&'a str>,
}

/// Atomic upsert keyed by steam_id.
///
/// Concurrent logins for the same identity race on the UNIQUE constraint, not
/// on a read-then-write, so exactly one row can ever exist per steam_id. The
/// freshly generated id is discarded when the row already exists; local id and
/// steam_id are invariant across logins.
pub async fn upsert_user(
    pool: &SqlitePool,
    profile: &UserProfile<'_>,
) -> Result<User, sqlx::Error> {
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, steam_id, username, avatar_url, profile_url, real_name, last_login)
        VALUES (?, ?, ?, ?, ?, ?, datetime('now'))
        ON CONFLICT(steam_id) DO UPDATE SET
            username = excluded.username,
            avatar_url = excluded.avatar_url,
            profile_url = excluded.profile_url,
            real_name = excluded.real_name,
            last_login = excluded.last_login
        RETURNING *
        "#,
    )
    .bind(generate_user_id())
    .bind(profile.steam_id)
    .bind(profile.username)
    .bind(profile.avatar_url)
    .bind(profile.profile_url)
    .bind(profile.real_name)
    .fetch_one(pool)
    .await
}

/// Soft-invalidate every active session of a user. Returns the count.
pub async fn deactivate_sessions_for_user(
    pool: &SqlitePool,
    user_id: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE user_sessions SET is_active = 0 WHERE user_id = ? AND is_active = 1")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Insert a fresh active session with expiry = now + ttl.
pub async fn insert_session(
    pool: &SqlitePool,
    user_id: &str,
    session_token: &str,
    ttl_days: i64,
) -> Result<Session, sqlx::Error> {
    sqlx::query_as::<_, Session>(
        r#"
        INSERT INTO user_sessions (id, user_id, session_token, expires_at, is_active)
        VALUES (?, ?, ?, datetime('now', ?), 1)
        RETURNING *
        "#,
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(session_token)
    .bind(format!("+{} days", ttl_days))
    .fetch_one(pool)
    .await
}

pub async fn find_session(
    pool: &SqlitePool,
    session_token: &str,
) -> Result<Option<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>("SELECT * FROM user_sessions WHERE session_token = ?")
        .bind(session_token)
        .fetch_optional(pool)
        .await
}

pub async fn find_user(pool: &SqlitePool, user_id: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

/// Soft-invalidate a single session by token (logout).
pub async fn deactivate_session(
    pool: &SqlitePool,
    session_token: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE user_sessions SET is_active = 0 WHERE session_token = ?")
        .bind(session_token)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
