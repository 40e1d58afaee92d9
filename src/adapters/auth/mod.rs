//! Token verification adapters.
//!
//! - [`jwt`] - HS256 shared-secret verification against the auth service
//! - [`mock`] - table-backed verifier for tests

pub mod jwt;
pub mod mock;

pub use jwt::JwtTokenVerifier;
pub use mock::MockTokenVerifier;
