// Application state shared across all modules

use reqwest::Client;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::Arc;
use url::Url;

use crate::services::SteamService;

/// Application state containing database pool, services, and configuration
///
/// Constructed once in `main` and injected via an axum `Extension` - there is
/// no process-wide singleton client, which keeps test substitution trivial.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub http: Client,
    pub steam_service: Arc<SteamService>,
    /// Public base URL of this deployment; the OpenID return URL and the
    /// relay message origin are derived from it.
    pub public_url: Url,
    /// Origins (scheme://host[:port]) allowed as OpenID return targets in
    /// addition to `public_url`.
    pub allowed_origins: HashSet<String>,
    pub session_ttl_days: i64,
}
