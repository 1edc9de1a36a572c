//! Authentication data models

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// User database model
#[derive(FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: String,
    pub steam_id: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub profile_url: Option<String>,
    pub real_name: Option<String>,
    pub created_at: Option<String>,
    pub last_login: Option<String>,
}

/// Session database model
///
/// A token is valid only while `is_active` is true and the current time is
/// strictly before `expires_at`. Rows are soft-invalidated, never mutated
/// beyond the active flag.
#[derive(FromRow, Debug, Clone)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub session_token: String,
    pub created_at: Option<String>,
    pub expires_at: String,
    pub is_active: bool,
}

impl Session {
    /// Expiry timestamps are written by SQLite as `YYYY-MM-DD HH:MM:SS` (UTC).
    /// An unparseable expiry counts as expired.
    pub fn is_expired(&self, now: chrono::NaiveDateTime) -> bool {
        match chrono::NaiveDateTime::parse_from_str(&self.expires_at, "%Y-%m-%d %H:%M:%S") {
            Ok(expires_at) => now >= expires_at,
            Err(_) => true,
        }
    }
}

/// Public-safe user projection returned over the wire and cached by clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub steam_id: String,
    pub username: String,
    pub avatar: Option<String>,
    pub profile_url: Option<String>,
    pub real_name: Option<String>,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        PublicUser {
            id: user.id,
            steam_id: user.steam_id,
            username: user.username,
            avatar: user.avatar_url,
            profile_url: user.profile_url,
            real_name: user.real_name,
        }
    }
}

/// Body of `POST /auth`
///
/// A missing field deserializes to an empty string and is rejected by
/// validation with a 400 rather than a framework-level rejection.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SteamAuthPayload {
    #[serde(default)]
    pub steam_id: String,
}

/// Body of `POST /auth/verify` and `POST /auth/logout`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokenPayload {
    #[serde(default)]
    pub session_token: String,
}

/// Response of `POST /auth`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub success: bool,
    pub user: PublicUser,
    pub session_token: String,
}

/// Response of `POST /auth/verify` and `GET /auth/me`
#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub success: bool,
    pub user: PublicUser,
}
