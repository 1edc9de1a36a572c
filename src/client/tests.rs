//! Tests for the client session manager
//!
//! These run the real router in-process against an in-memory database and a
//! stubbed Steam Web API, and drive sign-in through scripted popup windows.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::Query;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tokio::sync::{mpsc, RwLock};
use url::Url;

use super::{SessionManager, SignInError};
use crate::auth::{auth_routes, openid};
use crate::common::{migrations, AppState};
use crate::relay::{
    AuthWindow, OpenedWindow, PopupMessage, RelayError, WindowMessage, WindowOpener,
};
use crate::services::SteamService;

// ---- Test doubles ----

struct FakeWindow {
    closed: bool,
}

impl AuthWindow for FakeWindow {
    fn is_closed(&self) -> bool {
        self.closed
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Simulates the whole popup leg: the provider accepting the login, the
/// callback page parsing the redirect query and posting the result back.
struct ScriptedOpener {
    steam_id: String,
    origin: String,
}

impl WindowOpener for ScriptedOpener {
    fn open(&self, url: &Url) -> Result<OpenedWindow, RelayError> {
        assert!(
            url.as_str().starts_with(openid::STEAM_OPENID_ENDPOINT),
            "popup must be pointed at the Steam login endpoint, got {}",
            url
        );

        // Provider success redirect, parsed exactly like the callback page
        // parses it.
        let mut params = HashMap::new();
        params.insert("openid.mode".to_string(), "id_res".to_string());
        params.insert(
            "openid.claimed_id".to_string(),
            format!("https://steamcommunity.com/openid/id/{}", self.steam_id),
        );
        params.insert(
            "openid.response_nonce".to_string(),
            "2026-01-01T00:00:00Znonce".to_string(),
        );
        let identity = openid::parse_callback(&params).expect("scripted callback parses");

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(WindowMessage {
            origin: self.origin.clone(),
            message: PopupMessage::Success {
                steam_id: identity.steam_id,
                ticket: identity.nonce.unwrap_or_else(|| "verified".to_string()),
            },
        })
        .expect("send scripted message");

        Ok(OpenedWindow {
            window: Box::new(FakeWindow { closed: false }),
            messages: rx,
        })
    }
}

/// The user closes the popup without completing the login.
struct ClosingOpener;

impl WindowOpener for ClosingOpener {
    fn open(&self, _url: &Url) -> Result<OpenedWindow, RelayError> {
        let (_tx, rx) = mpsc::unbounded_channel();
        Ok(OpenedWindow {
            window: Box::new(FakeWindow { closed: true }),
            messages: rx,
        })
    }
}

struct BlockedOpener;

impl WindowOpener for BlockedOpener {
    fn open(&self, _url: &Url) -> Result<OpenedWindow, RelayError> {
        Err(RelayError::PopupBlocked)
    }
}

// ---- In-process server ----

async fn spawn_steam_stub() -> String {
    let app = Router::new().route(
        "/ISteamUser/GetPlayerSummaries/v0002/",
        get(|Query(params): Query<HashMap<String, String>>| async move {
            let steam_id = params.get("steamids").cloned().unwrap_or_default();
            Json(json!({
                "response": {
                    "players": [{
                        "steamid": steam_id,
                        "personaname": "Alice",
                        "profileurl": format!("https://steamcommunity.com/id/{}", steam_id),
                        "avatar": "https://avatars.example/small.jpg",
                        "avatarfull": "https://avatars.example/full.jpg",
                    }]
                }
            }))
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Boot the auth service the way `main` assembles it, on an ephemeral port.
async fn spawn_app() -> (Url, SqlitePool) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    migrations::run_migrations(&pool).await.unwrap();

    let steam_base = spawn_steam_stub().await;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let public_url = Url::parse(&format!("http://{}", addr)).unwrap();

    let state = AppState {
        db: pool.clone(),
        http: reqwest::Client::new(),
        steam_service: Arc::new(SteamService::new(
            reqwest::Client::new(),
            Some("test-key".to_string()),
            Some(steam_base),
        )),
        public_url: public_url.clone(),
        allowed_origins: HashSet::new(),
        session_ttl_days: 30,
    };
    let shared = Arc::new(RwLock::new(state));

    let app = Router::new().merge(auth_routes()).layer(Extension(shared));
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });

    (public_url, pool)
}

fn manager_for(api_base: &Url, cache_path: PathBuf) -> SessionManager {
    let return_url = api_base.join("/auth/steam/return").unwrap();
    SessionManager::new(reqwest::Client::new(), api_base.clone(), return_url, cache_path)
}

// ---- Scenarios ----

#[tokio::test]
async fn test_end_to_end_sign_in_verify_and_reissue() {
    let (api_base, _pool) = spawn_app().await;
    let cache_dir = tempfile::tempdir().unwrap();
    let cache_path = cache_dir.path().join("session.json");

    let opener = ScriptedOpener {
        steam_id: "76561198000000100".to_string(),
        origin: openid::origin_of(&api_base),
    };

    // Fresh manager: nothing cached.
    let mut manager = manager_for(&api_base, cache_path.clone());
    assert!(manager.restore().await.is_none());

    // Sign in through the scripted popup.
    let user = manager.sign_in(&opener).await.unwrap();
    assert_eq!(user.username, "Alice");
    assert_eq!(user.steam_id, "76561198000000100");
    assert!(manager.is_authenticated());
    assert!(cache_path.exists(), "session must be persisted");

    let first_token = manager.session_token().unwrap().to_string();

    // A second manager sharing the cache restores the same session.
    let mut restored = manager_for(&api_base, cache_path.clone());
    let restored_user = restored.restore().await.unwrap();
    assert_eq!(restored_user.username, "Alice");

    // Signing in again issues a fresh token and kills the old one.
    let _ = manager.sign_in(&opener).await.unwrap();
    let second_token = manager.session_token().unwrap().to_string();
    assert_ne!(first_token, second_token);

    let response = reqwest::Client::new()
        .post(api_base.join("/auth/verify").unwrap())
        .json(&json!({ "sessionToken": first_token }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    let response = reqwest::Client::new()
        .post(api_base.join("/auth/verify").unwrap())
        .json(&json!({ "sessionToken": second_token }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_restore_purges_dead_cached_session() {
    let (api_base, _pool) = spawn_app().await;
    let cache_dir = tempfile::tempdir().unwrap();
    let cache_path = cache_dir.path().join("session.json");

    std::fs::write(
        &cache_path,
        json!({
            "session_token": "DEAD-TOKEN",
            "user": {
                "id": "U_XXXXXX",
                "steamId": "76561198000000101",
                "username": "Ghost",
                "avatar": null,
                "profileUrl": null,
                "realName": null
            }
        })
        .to_string(),
    )
    .unwrap();

    let mut manager = manager_for(&api_base, cache_path.clone());
    assert!(manager.restore().await.is_none());
    assert!(!manager.is_authenticated());
    assert!(!cache_path.exists(), "dead session cache must be purged");
}

#[tokio::test]
async fn test_sign_out_deactivates_server_session_and_purges_cache() {
    let (api_base, pool) = spawn_app().await;
    let cache_dir = tempfile::tempdir().unwrap();
    let cache_path = cache_dir.path().join("session.json");

    let opener = ScriptedOpener {
        steam_id: "76561198000000102".to_string(),
        origin: openid::origin_of(&api_base),
    };

    let mut manager = manager_for(&api_base, cache_path.clone());
    manager.sign_in(&opener).await.unwrap();
    let token = manager.session_token().unwrap().to_string();

    manager.sign_out().await;
    assert!(!manager.is_authenticated());
    assert!(!cache_path.exists());

    let session = crate::auth::store::find_session(&pool, &token)
        .await
        .unwrap()
        .unwrap();
    assert!(!session.is_active, "logout must deactivate the server session");
}

#[tokio::test]
async fn test_closed_popup_surfaces_cancelled() {
    let (api_base, _pool) = spawn_app().await;
    let cache_dir = tempfile::tempdir().unwrap();

    let mut manager = manager_for(&api_base, cache_dir.path().join("session.json"));
    let err = manager.sign_in(&ClosingOpener).await.unwrap_err();
    assert!(matches!(err, SignInError::Cancelled));
    assert!(!manager.is_authenticated());
}

#[tokio::test]
async fn test_blocked_popup_surfaces_popup_blocked() {
    let (api_base, _pool) = spawn_app().await;
    let cache_dir = tempfile::tempdir().unwrap();

    let mut manager = manager_for(&api_base, cache_dir.path().join("session.json"));
    let err = manager.sign_in(&BlockedOpener).await.unwrap_err();
    assert!(matches!(err, SignInError::PopupBlocked));
}
