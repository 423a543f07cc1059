//! PostgreSQL repositories built on `sqlx` runtime queries

mod categories;
mod products;
mod users;

pub use categories::PgCategoryRepository;
pub use products::PgProductRepository;
pub use users::PgUserRepository;
