//! # Client Module
//!
//! The client session manager: the one component an end-user shell (the
//! signin utility, a desktop wrapper) talks to. It caches the current session
//! token and user on disk, re-validates on startup, and for interactive
//! sign-in orchestrates the OpenID adapter, the popup relay, and the
//! `/auth` exchange endpoint.
//!
//! Methods take `&mut self`: overlapping sign-in attempts on one manager are
//! ruled out by the exclusive borrow rather than by a runtime race.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::models::{AuthResponse, PublicUser, VerifyResponse};
use crate::auth::openid;
use crate::relay::{RelayChannel, RelayError, WindowOpener};

#[cfg(test)]
mod tests;

/// Default cache file under the user's home directory.
const DEFAULT_CACHE_DIR: &str = ".leaderboard";
const CACHE_FILE: &str = "session.json";

#[derive(Debug, Error)]
pub enum SignInError {
    #[error("popup blocked - please allow popups for this site")]
    PopupBlocked,

    #[error("authentication cancelled by user")]
    Cancelled,

    #[error("steam authentication failed: {0}")]
    Provider(String),

    #[error("authentication service unavailable: {0}")]
    Service(String),

    #[error("unexpected response from authentication service")]
    MalformedResponse,
}

impl From<RelayError> for SignInError {
    fn from(e: RelayError) -> Self {
        match e {
            RelayError::PopupBlocked => SignInError::PopupBlocked,
            RelayError::Cancelled => SignInError::Cancelled,
            RelayError::Failed(msg) => SignInError::Provider(msg),
        }
    }
}

/// What gets persisted between runs.
#[derive(Debug, Serialize, Deserialize)]
struct CachedSession {
    session_token: String,
    user: PublicUser,
}

pub struct SessionManager {
    http: Client,
    api_base: Url,
    return_url: Url,
    cache_path: PathBuf,
    session_token: Option<String>,
    user: Option<PublicUser>,
}

impl SessionManager {
    pub fn new(http: Client, api_base: Url, return_url: Url, cache_path: PathBuf) -> Self {
        Self {
            http,
            api_base,
            return_url,
            cache_path,
            session_token: None,
            user: None,
        }
    }

    /// Default cache location: ~/.leaderboard/session.json
    pub fn default_cache_path() -> PathBuf {
        home::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_CACHE_DIR)
            .join(CACHE_FILE)
    }

    pub fn user(&self) -> Option<&PublicUser> {
        self.user.as_ref()
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some() && self.session_token.is_some()
    }

    /// Startup path: load the cached session and re-validate it against the
    /// service. Any failure (missing cache, dead token, unreachable service)
    /// silently purges local state and reports signed-out.
    pub async fn restore(&mut self) -> Option<PublicUser> {
        let cached = match self.load_cache() {
            Some(c) => c,
            None => {
                debug!("No cached session to restore");
                return None;
            }
        };

        self.session_token = Some(cached.session_token.clone());
        self.user = Some(cached.user);

        let url = match self.api_base.join("/auth/verify") {
            Ok(u) => u,
            Err(_) => {
                self.purge();
                return None;
            }
        };

        let response = self
            .http
            .post(url)
            .json(&serde_json::json!({ "sessionToken": cached.session_token }))
            .send()
            .await;

        let verified: Option<VerifyResponse> = match response {
            Ok(r) if r.status().is_success() => r.json().await.ok(),
            Ok(r) => {
                debug!(http_status = %r.status(), "Cached session rejected by service");
                None
            }
            Err(e) => {
                warn!(error = %e, "Session verification request failed");
                None
            }
        };

        match verified {
            Some(body) if body.success => {
                info!(username = %body.user.username, "Session restored");
                // The service may have refreshed display fields; keep its copy.
                self.user = Some(body.user.clone());
                self.persist();
                Some(body.user)
            }
            _ => {
                debug!("Purging invalid cached session");
                self.purge();
                None
            }
        }
    }

    /// Full interactive sign-in: build the provider URL, open the popup, wait
    /// for the relayed identity, exchange it for a session.
    pub async fn sign_in(
        &mut self,
        opener: &dyn WindowOpener,
    ) -> Result<PublicUser, SignInError> {
        let auth_url = openid::build_auth_url(&self.return_url);
        let expected_origin = openid::origin_of(&self.return_url);

        info!("Starting Steam authentication");

        let opened = opener.open(&auth_url)?;
        let relay = RelayChannel::new(expected_origin);
        let outcome = relay.await_result(opened).await?;

        self.complete_sign_in(&outcome.steam_id).await
    }

    /// Exchange a relayed Steam id for a session and persist it.
    pub async fn complete_sign_in(&mut self, steam_id: &str) -> Result<PublicUser, SignInError> {
        let url = self
            .api_base
            .join("/auth")
            .map_err(|e| SignInError::Service(e.to_string()))?;

        let response = self
            .http
            .post(url)
            .json(&serde_json::json!({ "steamId": steam_id }))
            .send()
            .await
            .map_err(|e| SignInError::Service(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(http_status = %status, body = %body, "Session exchange rejected");
            return Err(SignInError::Service(format!(
                "authentication failed: {}",
                status
            )));
        }

        let body: AuthResponse = response
            .json()
            .await
            .map_err(|_| SignInError::MalformedResponse)?;

        if !body.success {
            return Err(SignInError::MalformedResponse);
        }

        info!(username = %body.user.username, "Authentication successful");

        self.session_token = Some(body.session_token);
        self.user = Some(body.user.clone());
        self.persist();

        Ok(body.user)
    }

    /// Deactivate the session server-side (best effort) and purge the cache.
    pub async fn sign_out(&mut self) {
        if let Some(token) = self.session_token.clone() {
            if let Ok(url) = self.api_base.join("/auth/logout") {
                let result = self
                    .http
                    .post(url)
                    .json(&serde_json::json!({ "sessionToken": token }))
                    .send()
                    .await;
                if let Err(e) = result {
                    warn!(error = %e, "Server-side logout failed, purging local session anyway");
                }
            }
        }

        info!("Signed out");
        self.purge();
    }

    // ---- Local cache ----

    fn load_cache(&self) -> Option<CachedSession> {
        let raw = std::fs::read_to_string(&self.cache_path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(cached) => Some(cached),
            Err(e) => {
                warn!(error = %e, path = %self.cache_path.display(), "Discarding unreadable session cache");
                let _ = std::fs::remove_file(&self.cache_path);
                None
            }
        }
    }

    fn persist(&self) {
        let (Some(token), Some(user)) = (&self.session_token, &self.user) else {
            return;
        };
        let cached = CachedSession {
            session_token: token.clone(),
            user: user.clone(),
        };

        if let Err(e) = write_cache(&self.cache_path, &cached) {
            warn!(error = %e, path = %self.cache_path.display(), "Failed to persist session cache");
        }
    }

    fn purge(&mut self) {
        self.session_token = None;
        self.user = None;
        let _ = std::fs::remove_file(&self.cache_path);
    }
}

fn write_cache(path: &Path, cached: &CachedSession) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let raw = serde_json::to_string_pretty(cached)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    std::fs::write(path, raw)
}
