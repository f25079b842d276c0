//! HTTP handlers for the questionnaire API
//!
//! Thin layer over the retrieval engine: validate input, call the engine,
//! shape the response. Routes are organized by domain and split into public
//! (no auth) and protected (auth required) sets in `router`.

pub mod health;
pub mod lifecycle;
pub mod questionnaire;
pub mod resolve;
pub mod router;
pub mod rules;
pub mod state;
pub mod types;

pub use router::{build_protected_routes, build_public_routes};
pub use state::{AppState, ServiceState};
