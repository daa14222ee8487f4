//! Domain models for the auth and session layer.

pub mod identity;

pub use identity::{ResolvedIdentity, Session, User};
