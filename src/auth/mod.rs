//! # Auth Module
//!
//! This module handles all authentication-related functionality including:
//! - Steam OpenID redirect construction and callback parsing
//! - Session exchange (identity in, user + bearer token out)
//! - Session verification and logout
//! - AuthedUser extractor for protected routes

pub mod extractors;
pub mod handlers;
pub mod models;
pub mod openid;
pub mod routes;
pub mod store;


pub use extractors::AuthedUser;
pub use models::{PublicUser, User};
pub use routes::auth_routes;
