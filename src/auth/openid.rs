//! Steam OpenID 2.0 adapter
//!
//! Builds the outbound login redirect and parses the provider's callback
//! query. Both operations are pure; the actual trust decision happens later
//! in the session exchange, which re-fetches the profile server-to-server.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use thiserror::Error;
use url::Url;

/// Steam community OpenID endpoint
pub const STEAM_OPENID_ENDPOINT: &str = "https://steamcommunity.com/openid/login";

const OPENID_NS: &str = "http://specs.openid.net/auth/2.0";
const IDENTIFIER_SELECT: &str = "http://specs.openid.net/auth/2.0/identifier_select";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CallbackError {
    /// The user backed out on the Steam login page.
    #[error("authentication cancelled by user")]
    Cancelled,

    /// No success marker and no cancel marker: provider error pages, proxy
    /// errors, or an empty callback.
    #[error("malformed authentication response")]
    MalformedResponse,
}

/// Identity extracted from a successful callback.
///
/// `nonce` is the provider's per-attempt correlation value. It is carried
/// through the relay untouched but is NOT an authentication ticket; only the
/// server-side profile re-fetch establishes trust.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackIdentity {
    pub steam_id: String,
    pub nonce: Option<String>,
}

/// Build the Steam login URL for a given return URL.
///
/// The realm is the scheme+host of the return URL with no path; Steam rejects
/// callbacks whose return URL falls outside the realm it was shown.
pub fn build_auth_url(return_url: &Url) -> Url {
    let realm = realm_of(return_url);

    // Static endpoint, parse cannot fail.
    let mut auth_url = Url::parse(STEAM_OPENID_ENDPOINT).unwrap();

    auth_url
        .query_pairs_mut()
        .append_pair("openid.ns", OPENID_NS)
        .append_pair("openid.mode", "checkid_setup")
        .append_pair("openid.return_to", return_url.as_str())
        .append_pair("openid.realm", &realm)
        .append_pair("openid.identity", IDENTIFIER_SELECT)
        .append_pair("openid.claimed_id", IDENTIFIER_SELECT);

    auth_url
}

/// Scheme+host of a URL, no path and no port.
pub fn realm_of(url: &Url) -> String {
    format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default())
}

/// Full ASCII origin (scheme://host[:port]) - what relay messages are scoped by.
pub fn origin_of(url: &Url) -> String {
    url.origin().ascii_serialization()
}

fn claimed_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"/id/(\d+)$").unwrap())
}

/// Parse the query parameters Steam appended to the return URL.
pub fn parse_callback(
    params: &HashMap<String, String>,
) -> Result<CallbackIdentity, CallbackError> {
    match params.get("openid.mode").map(String::as_str) {
        Some("id_res") => {
            let identity = params
                .get("openid.claimed_id")
                .or_else(|| params.get("openid.identity"))
                .ok_or(CallbackError::MalformedResponse)?;

            let steam_id = claimed_id_pattern()
                .captures(identity)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
                .ok_or(CallbackError::MalformedResponse)?;

            Ok(CallbackIdentity {
                steam_id,
                nonce: params.get("openid.response_nonce").cloned(),
            })
        }
        Some("cancel") => Err(CallbackError::Cancelled),
        _ => Err(CallbackError::MalformedResponse),
    }
}
