//! Application state shared across handlers

use auth::middleware::AuthState;
use marketplace::Marketplace;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub market: Marketplace,
    pub auth: AuthState,
}
