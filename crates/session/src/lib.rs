//! Session credential accessor
//!
//! A narrow key-value boundary over whatever storage the host provides for the
//! two per-browser session values: the access token and the user profile
//! snapshot. The accessor makes no network calls and knows nothing about the
//! remote API; the gateway reads the token through it and clears both values
//! when the API rejects the token.
//!
//! Credential lifecycle:
//! 1. Login stores both values via `SessionCredentials::establish()`
//! 2. Every authenticated gateway call reads `access_token`
//! 3. Profile edits rewrite only `user_data` via `SessionCredentials::update_profile()`
//! 4. Logout or a 401 from the API removes both via `SessionCredentials::clear()`

pub mod credentials;
pub mod memory;
pub mod policy;
pub mod store;

pub use credentials::SessionCredentials;
pub use memory::MemoryStore;
pub use policy::{CookiePolicy, SameSite, SessionPolicy};
pub use store::{ACCESS_TOKEN, CredentialStore, USER_PROFILE};
