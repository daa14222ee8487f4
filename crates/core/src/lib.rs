//! Parlor Core - Shared types library.
//!
//! This crate provides common types used across all Parlor components:
//! - `server` - Chat web application (auth and session layer)
//! - `integration-tests` - End-to-end test harness
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients. This keeps
//! it lightweight and allows it to be used anywhere, including test fakes.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for emails, user IDs, and user kinds

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
