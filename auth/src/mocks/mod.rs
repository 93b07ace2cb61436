//! Mock provider implementations for testing.
//!
//! In-memory, deterministic implementations of the provider traits plus a
//! manually driven clock, for use in unit and integration tests.

pub mod clock;
pub mod idp;
pub mod user;

pub use clock::ManualClock;
pub use idp::MockIdentityProvider;
pub use user::MockUserRepository;
