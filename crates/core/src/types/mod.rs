//! Core types for Parlor.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod user_type;

pub use email::{Email, EmailError, GUEST_EMAIL_PREFIXES, is_guest_email};
pub use id::UserId;
pub use user_type::UserType;
