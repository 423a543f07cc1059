//! API service
//!
//! Category and product endpoints on top of the marketplace services.
//! Authentication reuses the middleware of the auth service.

pub mod models;
pub mod routes;
pub mod state;

pub use state::AppState;
