//! Integration tests for Parlor.
//!
//! # Running Tests
//!
//! ```bash
//! # Start the server
//! cargo run -p parlor-server
//!
//! # Run integration tests
//! cargo test -p parlor-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `gate` - Access control gate behavior against a live server
//! - `guest` - Guest session bootstrap and cookie lifecycle
//! - `auth` - Credential sign-in, registration, and sign-out flows
//!
//! Tests default to `http://localhost:3000`; override with `PARLOR_BASE_URL`.
