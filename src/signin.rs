// signin.rs
// Terminal sign-in utility. Drives the client session manager without a
// browser popup: prints the Steam login URL, then exchanges the pasted
// redirect URL for a session.

use dotenv::dotenv;
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use url::Url;

use leaderboard_api::auth::openid;
use leaderboard_api::client::SessionManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let api_base = Url::parse(
        &std::env::var("API_BASE_URL").unwrap_or_else(|_| "http://localhost:8080".to_string()),
    )?;
    let return_url = api_base.join("/auth/steam/return")?;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let mut manager = SessionManager::new(
        http,
        api_base,
        return_url.clone(),
        SessionManager::default_cache_path(),
    );

    let wants_logout = std::env::args().any(|a| a == "--logout");

    if let Some(user) = manager.restore().await {
        if wants_logout {
            manager.sign_out().await;
            println!("Signed out {}.", user.username);
        } else {
            println!("Already signed in as {}", user.username);
            println!("Pass --logout to sign out.");
        }
        return Ok(());
    }

    if wants_logout {
        println!("No active session.");
        return Ok(());
    }

    let auth_url = openid::build_auth_url(&return_url);

    println!("Open this URL in your browser and sign in through Steam:\n");
    println!("  {}\n", auth_url);
    println!("After signing in, Steam redirects the browser back to this service.");
    print!("Paste the full redirected URL here: ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;

    let pasted = Url::parse(line.trim())?;
    let params: HashMap<String, String> = pasted.query_pairs().into_owned().collect();

    let identity = match openid::parse_callback(&params) {
        Ok(identity) => identity,
        Err(e) => anyhow::bail!("could not use the pasted URL: {}", e),
    };

    let user = manager.complete_sign_in(&identity.steam_id).await?;

    println!("\n✅ Signed in as {}", user.username);
    println!("Session cached at {}", SessionManager::default_cache_path().display());

    Ok(())
}
