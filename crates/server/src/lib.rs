//! Parlor server library.
//!
//! Auth and session layer for the Parlor chat application: identity provider
//! adapter, guest session codec, session resolver, access control gate, and
//! the HTTP route surface that ties them together.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod config;
pub mod error;
pub mod identity;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
