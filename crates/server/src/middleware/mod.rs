//! Request middleware: the access gate and identity extractors.

pub mod auth;
pub mod gate;

pub use auth::{OptionalIdentity, RequireIdentity};
pub use gate::access_gate;
