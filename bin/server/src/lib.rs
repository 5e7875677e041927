//! Stan Connect sign-in server.
//!
//! Wires the OIDC client, identity resolver and session manager behind an
//! axum router. See [`app::router`] for the routes.

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
