// Steam-authenticated leaderboard backend: OpenID sign-in, session exchange
// and verification, plus the client-side session manager used by the signin
// utility and desktop shells.

pub mod auth;
pub mod client;
pub mod common;
pub mod relay;
pub mod services;
