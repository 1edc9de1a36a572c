//! Authentication routes

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers;

/// Creates and returns the authentication router
///
/// # Routes
/// - `POST /auth` - Steam id exchange, issues a session token
/// - `POST /auth/verify` - Session token verification
/// - `POST /auth/logout` - Server-side session deactivation
/// - `GET /auth/me` - Current user (bearer token)
/// - `GET /auth/steam` - Redirect to Steam OpenID login
/// - `GET /auth/steam/return` - OpenID callback page (popup)
pub fn auth_routes() -> Router {
    Router::new()
        .route("/auth", post(handlers::steam_auth))
        .route("/auth/verify", post(handlers::verify_handler))
        .route("/auth/logout", post(handlers::logout_handler))
        .route("/auth/me", get(handlers::me_handler))
        .route("/auth/steam", get(handlers::steam_login))
        .route("/auth/steam/return", get(handlers::steam_return))
}
