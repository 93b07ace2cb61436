//! Identity bridge providers.
//!
//! This module defines traits for the two external collaborators of the
//! bridge, plus the production HTTP implementation of the identity provider.
//!
//! # Architecture
//!
//! Providers are **interfaces**. The synchronizer depends on these traits;
//! the application wires in concrete implementations.
//!
//! ```text
//! ┌──────────────────┐   login / profile   ┌──────────────────────┐
//! │ UserSynchronizer │────────────────────▶│ IdentityProvider     │
//! │                  │                     │ (HTTP, JSON envelope)│
//! │                  │   find / insert     ├──────────────────────┤
//! │                  │────────────────────▶│ UserRepository       │
//! └──────────────────┘   update tokens     │ (PostgreSQL / mocks) │
//!                                          └──────────────────────┘
//! ```
//!
//! This enables:
//! - **Testing**: Use mocks (in-memory, deterministic)
//! - **Production**: Use `HttpIdentityProvider` and the PostgreSQL store
//! - **Multiple processes**: uniqueness lives in the store, not in memory

pub mod http;
pub mod idp;
pub mod user;

// Re-export provider traits
pub use http::HttpIdentityProvider;
pub use idp::{IdentityProvider, IdpLoginResult, IdpProfile};
pub use user::UserRepository;
