// src/services/steam.rs
//! Server-to-server Steam Web API client.
//!
//! The profile fetch here is the trust anchor of the sign-in flow: the browser
//! only relays a claimed Steam id, and everything displayed for that identity
//! comes from `GetPlayerSummaries` fetched with our own API key.

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

const DEFAULT_API_BASE_URL: &str = "https://api.steampowered.com";

#[derive(Debug, Error)]
pub enum SteamError {
    #[error("Steam API key not configured")]
    NotConfigured,

    #[error("Steam profile not found")]
    ProfileNotFound,

    #[error("Steam API request failed: {0}")]
    RequestFailed(String),

    #[error("Steam API returned status {0}")]
    BadStatus(u16),
}

/// Player summary as returned by `ISteamUser/GetPlayerSummaries`.
///
/// Field names mirror the Steam wire format.
#[derive(Debug, Clone, Deserialize)]
pub struct SteamProfile {
    pub steamid: String,
    pub personaname: String,
    pub profileurl: Option<String>,
    pub avatar: Option<String>,
    pub avatarmedium: Option<String>,
    pub avatarfull: Option<String>,
    pub realname: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlayerSummariesBody {
    response: PlayerSummariesResponse,
}

#[derive(Debug, Deserialize)]
struct PlayerSummariesResponse {
    #[serde(default)]
    players: Vec<SteamProfile>,
}

pub struct SteamService {
    http: Client,
    api_key: Option<String>,
    base_url: String,
}

impl SteamService {
    /// The HTTP client is built once in `main` with a bounded request timeout;
    /// a timed-out profile fetch surfaces as `RequestFailed`.
    pub fn new(http: Client, api_key: Option<String>, base_url: Option<String>) -> Self {
        Self {
            http,
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
        }
    }

    /// Fetch the canonical profile for a Steam id.
    pub async fn get_player_summary(&self, steam_id: &str) -> Result<SteamProfile, SteamError> {
        let api_key = self.api_key.as_deref().ok_or(SteamError::NotConfigured)?;

        let url = format!(
            "{}/ISteamUser/GetPlayerSummaries/v0002/?key={}&steamids={}",
            self.base_url, api_key, steam_id
        );

        debug!(steam_id = %steam_id, "Fetching player summary from Steam Web API");

        let response = self.http.get(&url).send().await.map_err(|e| {
            warn!(error = %e, steam_id = %steam_id, "HTTP error contacting Steam Web API");
            SteamError::RequestFailed(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(http_status = %status, steam_id = %steam_id, "Steam Web API returned error status");
            return Err(SteamError::BadStatus(status.as_u16()));
        }

        let body: PlayerSummariesBody = response.json().await.map_err(|e| {
            warn!(error = %e, steam_id = %steam_id, "Failed to parse Steam Web API response");
            SteamError::RequestFailed(e.to_string())
        })?;

        let profile = body
            .response
            .players
            .into_iter()
            .next()
            .ok_or(SteamError::ProfileNotFound)?;

        debug!(
            steam_id = %profile.steamid,
            persona = %profile.personaname,
            "Fetched Steam player summary"
        );

        Ok(profile)
    }
}
