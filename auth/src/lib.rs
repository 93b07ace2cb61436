//! # Identity Bridge
//!
//! Bridges an external identity provider (IdP) into a local user store.
//!
//! The IdP is authoritative for credentials; the local store is the system of
//! record for everything else. A successful IdP login is mapped to exactly one
//! local user, created on first sight and refreshed on every later login, even
//! when several first logins for the same principal race each other.
//!
//! ## Components
//!
//! - **IdP transport** ([`providers::HttpIdentityProvider`]): login and
//!   profile calls over HTTP with a JSON envelope and a bounded timeout
//! - **User synchronizer** ([`UserSynchronizer`]): login, profile, then
//!   find-or-create against the store's uniqueness constraint
//! - **User store** ([`providers::UserRepository`]): trait, with in-memory
//!   mocks and a PostgreSQL implementation (`postgres` feature)
//! - **Session cache** ([`SessionCache`]): process-scoped TTL cache of each
//!   user's authorization fields, kept coherent by [`AccountService`] and
//!   read through [`SessionResolver`]
//!
//! ## Architecture
//!
//! ```text
//! credentials ─▶ UserSynchronizer ─▶ IdentityProvider (login, profile)
//!                       │
//!                       ▼
//!                 UserRepository ◀── AccountService ──▶ SessionCache
//!                       ▲                                   ▲
//!                       └────────── SessionResolver ────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use identity_bridge::config::IdpConfig;
//! use identity_bridge::mocks::MockUserRepository;
//! use identity_bridge::providers::HttpIdentityProvider;
//! use identity_bridge::UserSynchronizer;
//!
//! # async fn example() -> identity_bridge::Result<()> {
//! let idp = HttpIdentityProvider::new(IdpConfig::from_env()?)?;
//! let sync = UserSynchronizer::new(idp, MockUserRepository::new());
//!
//! let user = sync.authenticate_via_idp("a@x.com", "p").await?;
//! println!("signed in as {}", user.username);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

// Public modules
pub mod account;
pub mod cache;
pub mod config;
pub mod constants;
pub mod environment;
pub mod error;
pub mod providers;
pub mod session;
pub mod state;
pub mod synchronizer;
pub mod utils;

// Storage implementations
#[cfg(feature = "postgres")]
pub mod stores;

// Mock implementations for testing
#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

// Re-export main types for convenience
pub use account::AccountService;
pub use cache::{FillToken, SessionCache, SessionCacheEntry, SweeperHandle};
pub use error::{IdentityBridgeError, Result};
pub use session::SessionResolver;
pub use state::{EmailStatus, ExternalId, LocalUser, NoticeStatus, UserId, UserStatus};
pub use synchronizer::UserSynchronizer;
