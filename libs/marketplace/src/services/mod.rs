//! Domain services
//!
//! Each service takes explicit handles to the repositories and the
//! notification engine it uses; nothing is looked up globally.

pub mod categories;
pub mod identity;
pub mod products;

pub use categories::CategoryRegistry;
pub use identity::IdentityStore;
pub use products::ProductCatalog;

use uuid::Uuid;

use crate::error::{MarketError, MarketResult};

/// Parse an identifier received as text
pub fn parse_id(raw: &str) -> MarketResult<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| MarketError::Validation(format!("'{}' is not a valid UUID", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_ids_are_validation_errors() {
        assert!(matches!(parse_id("abc"), Err(MarketError::Validation(_))));
        let id = Uuid::new_v4();
        assert_eq!(parse_id(&id.to_string()).unwrap(), id);
    }
}
