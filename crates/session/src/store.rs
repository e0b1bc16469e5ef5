//! The credential store contract

use crate::policy::CookiePolicy;

/// Storage name of the bearer token. Always written server-only.
pub const ACCESS_TOKEN: &str = "access_token";

/// Storage name of the JSON user profile snapshot. Readable by page scripts.
pub const USER_PROFILE: &str = "user_data";

/// Read/write/delete of named session values against host-provided storage.
///
/// Implementations use interior mutability: a store is shared by reference
/// with the gateway for the duration of one call, and the gateway only writes
/// to it on the auth-failure path. Everything here is synchronous because the
/// backing storage (a request's cookie jar, an in-memory map) never blocks.
pub trait CredentialStore: Send + Sync {
    /// Stored value, or `None` when absent. Never fails, no side effects.
    fn get(&self, name: &str) -> Option<String>;

    /// Store `value` under `name` with the given persistence policy.
    fn set(&self, name: &str, value: &str, policy: &CookiePolicy);

    /// Remove `name`. Deleting an absent value is not an error.
    fn delete(&self, name: &str, policy: &CookiePolicy);
}

impl<S: CredentialStore + ?Sized> CredentialStore for &S {
    fn get(&self, name: &str) -> Option<String> {
        (**self).get(name)
    }

    fn set(&self, name: &str, value: &str, policy: &CookiePolicy) {
        (**self).set(name, value, policy);
    }

    fn delete(&self, name: &str, policy: &CookiePolicy) {
        (**self).delete(name, policy);
    }
}
