//! Storage implementations for the identity bridge.
//!
//! - **User Store** (PostgreSQL) - Persistent local users with a unique
//!   index on the external identity

pub mod postgres;

// Re-exports
pub use postgres::PostgresUserRepository;
