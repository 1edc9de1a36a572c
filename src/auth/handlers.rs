//! Authentication handlers

use axum::extract::{Extension, Json, Query};
use axum::response::{Html, Redirect};
use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use super::extractors::AuthedUser;
use super::models::{
    AuthResponse, SessionTokenPayload, SteamAuthPayload, User, VerifyResponse,
};
use super::{openid, store};
use crate::common::{generate_session_token, ApiError, AppState};
use crate::relay::PopupMessage;
use crate::services::steam::SteamError;
use crate::services::SteamService;

impl From<SteamError> for ApiError {
    fn from(e: SteamError) -> Self {
        match e {
            SteamError::NotConfigured => ApiError::InternalServer("Steam API key not configured".to_string()),
            SteamError::ProfileNotFound => ApiError::NotFound("Steam profile not found".to_string()),
            SteamError::RequestFailed(msg) => {
                ApiError::UpstreamError(format!("Steam API request failed: {}", msg))
            }
            SteamError::BadStatus(status) => {
                ApiError::UpstreamError(format!("Steam API returned status {}", status))
            }
        }
    }
}

/// Core of the session exchange: claimed Steam id in, local user + fresh
/// bearer token out.
///
/// The profile is always re-fetched server-to-server; nothing the browser
/// relayed beyond the id itself is trusted. Issuing the new session
/// deactivates every previous session of the user (single active session).
pub async fn exchange_identity(
    db: &SqlitePool,
    steam: &SteamService,
    session_ttl_days: i64,
    steam_id: &str,
) -> Result<(User, String), ApiError> {
    if steam_id.is_empty() || !steam_id.chars().all(|c| c.is_ascii_digit()) {
        warn!(steam_id = %steam_id, "Rejected exchange request with malformed Steam id");
        return Err(ApiError::BadRequest(
            "steamId must be a numeric Steam identifier".to_string(),
        ));
    }

    let profile = steam.get_player_summary(steam_id).await?;

    let user = store::upsert_user(
        db,
        &store::UserProfile {
            steam_id,
            username: &profile.personaname,
            avatar_url: profile.avatarfull.as_deref().or(profile.avatar.as_deref()),
            profile_url: profile.profileurl.as_deref(),
            real_name: profile.realname.as_deref(),
        },
    )
    .await
    .map_err(ApiError::DatabaseError)?;

    let deactivated = store::deactivate_sessions_for_user(db, &user.id)
        .await
        .map_err(ApiError::DatabaseError)?;
    if deactivated > 0 {
        debug!(user_id = %user.id, count = deactivated, "Deactivated previous sessions");
    }

    let session_token = generate_session_token();
    store::insert_session(db, &user.id, &session_token, session_ttl_days)
        .await
        .map_err(ApiError::DatabaseError)?;

    info!(
        user_id = %user.id,
        steam_id = %user.steam_id,
        username = %user.username,
        "User authentication successful via Steam"
    );

    Ok((user, session_token))
}

/// Resolve a bearer token to its user.
///
/// Success iff a session row exists with that token, is still active, and the
/// current time is strictly before its expiry. Side-effect-free.
pub async fn verify_session_token(db: &SqlitePool, session_token: &str) -> Result<User, ApiError> {
    if session_token.is_empty() {
        return Err(ApiError::BadRequest("sessionToken is required".to_string()));
    }

    let session = store::find_session(db, session_token)
        .await
        .map_err(ApiError::DatabaseError)?
        .ok_or_else(|| ApiError::Unauthorized("invalid session".to_string()))?;

    if !session.is_active {
        debug!(user_id = %session.user_id, "Rejected token for deactivated session");
        return Err(ApiError::Unauthorized("session is no longer active".to_string()));
    }

    if session.is_expired(Utc::now().naive_utc()) {
        debug!(user_id = %session.user_id, expires_at = %session.expires_at, "Rejected expired session");
        return Err(ApiError::Unauthorized("session expired".to_string()));
    }

    let user = store::find_user(db, &session.user_id)
        .await
        .map_err(ApiError::DatabaseError)?
        .ok_or_else(|| ApiError::Unauthorized("user not found".to_string()))?;

    Ok(user)
}

/// POST /auth
/// Exchanges a verified Steam id for a local user and a session token
///
/// # Request Body
/// ```json
/// {
///   "steamId": "76561198000000000"
/// }
/// ```
///
/// # Response
/// ```json
/// {
///   "success": true,
///   "user": { ... },
///   "sessionToken": "<opaque token>"
/// }
/// ```
pub async fn steam_auth(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(payload): Json<SteamAuthPayload>,
) -> Result<Json<AuthResponse>, ApiError> {
    info!("🔐 Received Steam auth request");
    let state = state_lock.read().await.clone();

    let (user, session_token) = exchange_identity(
        &state.db,
        &state.steam_service,
        state.session_ttl_days,
        &payload.steam_id,
    )
    .await?;

    Ok(Json(AuthResponse {
        success: true,
        user: user.into(),
        session_token,
    }))
}

/// POST /auth/verify
/// Validates a session token and returns the owning user
pub async fn verify_handler(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(payload): Json<SessionTokenPayload>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let state = state_lock.read().await.clone();

    let user = verify_session_token(&state.db, &payload.session_token).await?;

    Ok(Json(VerifyResponse {
        success: true,
        user: user.into(),
    }))
}

/// POST /auth/logout
/// Deactivates the named session server-side; the client purges its own cache
pub async fn logout_handler(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(payload): Json<SessionTokenPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if payload.session_token.is_empty() {
        return Err(ApiError::BadRequest("sessionToken is required".to_string()));
    }

    let state = state_lock.read().await.clone();

    let deactivated = store::deactivate_session(&state.db, &payload.session_token)
        .await
        .map_err(ApiError::DatabaseError)?;

    info!(deactivated = deactivated, "User logout");

    Ok(Json(json!({ "success": true })))
}

/// GET /auth/me
/// Returns the current authenticated user's information
pub async fn me_handler(authed: AuthedUser) -> Result<Json<VerifyResponse>, ApiError> {
    Ok(Json(VerifyResponse {
        success: true,
        user: authed.user.into(),
    }))
}

/// GET /auth/steam - Start the Steam OpenID flow
/// Redirects the popup to Steam's login page
///
/// Accepts an optional `return_to` query parameter; its origin must match the
/// deployment's public URL or one of the configured CORS origins, otherwise
/// the request is rejected (open-redirect guard). Defaults to the deployment's
/// own callback route.
pub async fn steam_login(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Redirect, ApiError> {
    let state = state_lock.read().await.clone();

    let return_url = match params.get("return_to") {
        Some(raw) => {
            let url = Url::parse(raw)
                .map_err(|_| ApiError::BadRequest("return_to must be an absolute URL".to_string()))?;
            let origin = openid::origin_of(&url);
            if origin != openid::origin_of(&state.public_url)
                && !state.allowed_origins.contains(&origin)
            {
                warn!(origin = %origin, "Rejected return_to with unknown origin");
                return Err(ApiError::BadRequest(
                    "return_to origin is not allowed".to_string(),
                ));
            }
            url
        }
        None => state
            .public_url
            .join("/auth/steam/return")
            .map_err(|e| ApiError::InternalServer(format!("invalid public URL: {}", e)))?,
    };

    let auth_url = openid::build_auth_url(&return_url);

    debug!(return_to = %return_url, realm = %openid::realm_of(&return_url), "Redirecting to Steam OpenID login");

    Ok(Redirect::to(auth_url.as_str()))
}

/// GET /auth/steam/return - Steam OpenID callback page
///
/// Runs in the popup window. Parses the provider query and posts the result to
/// the opener, scoped to this deployment's origin, then closes itself. The
/// nonce rides along as an opaque correlation value only.
pub async fn steam_return(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Html<String>, ApiError> {
    let state = state_lock.read().await.clone();
    let target_origin = openid::origin_of(&state.public_url);

    let (title, detail, message) = match openid::parse_callback(&params) {
        Ok(identity) => {
            info!(steam_id = %identity.steam_id, "Steam callback parsed successfully");
            (
                "Authentication Successful",
                "Redirecting you back...",
                PopupMessage::Success {
                    steam_id: identity.steam_id,
                    ticket: identity.nonce.unwrap_or_else(|| "verified".to_string()),
                },
            )
        }
        Err(openid::CallbackError::Cancelled) => {
            info!("Steam authentication cancelled by user");
            (
                "Authentication Cancelled",
                "This window will close automatically...",
                PopupMessage::Error {
                    error: "Authentication cancelled by user".to_string(),
                },
            )
        }
        Err(openid::CallbackError::MalformedResponse) => {
            warn!("Steam callback had no usable OpenID response");
            (
                "Authentication Failed",
                "This window will close automatically...",
                PopupMessage::Error {
                    error: "Authentication failed - invalid response from Steam".to_string(),
                },
            )
        }
    };

    let message_json = serde_json::to_string(&message)
        .map_err(|e| ApiError::InternalServer(format!("failed to encode relay message: {}", e)))?;
    let origin_json = serde_json::to_string(&target_origin)
        .map_err(|e| ApiError::InternalServer(format!("failed to encode origin: {}", e)))?;

    Ok(Html(format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>{title}</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
               background: #0b0b0f; color: #e5e5e5; display: flex;
               align-items: center; justify-content: center; min-height: 100vh; }}
        .card {{ background: #15151c; border: 1px solid #2a2a35; padding: 30px 40px;
                border-radius: 12px; text-align: center; }}
        h1 {{ font-size: 1.2rem; margin: 0 0 10px; }}
        p {{ color: #9a9aa5; margin: 0; }}
    </style>
</head>
<body>
    <div class="card">
        <h1>{title}</h1>
        <p>{detail}</p>
    </div>
    <script>
        const message = {message_json};
        if (window.opener) {{
            window.opener.postMessage(message, {origin_json});
            setTimeout(() => window.close(), 1000);
        }} else {{
            setTimeout(() => {{ window.location.href = '/'; }}, 2000);
        }}
    </script>
</body>
</html>
"#
    )))
}
