//! Session persistence and resolution.
//!
//! Two cookies back the identity state: the provider session cookie for
//! provider-issued sessions, and the guest cookie for locally synthesized
//! guest identities. The resolver arbitrates between them; the store exposes
//! the result reactively to long-lived clients.

pub mod guest;
pub mod resolver;
pub mod session_cookie;
pub mod store;

pub use guest::{GUEST_COOKIE, GuestSessionRecord};
pub use resolver::{GUEST_COOKIE_PRECEDENCE, SessionResolver};
pub use session_cookie::SESSION_COOKIE;
pub use store::{AuthState, AuthStore, CookieStateSource};
