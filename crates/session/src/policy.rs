//! Persistence policies for stored session values

use std::time::Duration;

/// Cross-site sending mode for a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

/// How a single value is persisted on the browser side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookiePolicy {
    /// URL path scope
    pub path: String,
    /// Hidden from page scripts when true
    pub http_only: bool,
    /// Only sent over HTTPS when true
    pub secure: bool,
    pub same_site: SameSite,
    /// `None` means the value lives for the browser session
    pub max_age: Option<Duration>,
}

/// Session-wide settings from which the per-value policies are derived.
///
/// Both values are scoped to `/` with strict same-site handling. The token is
/// never exposed to scripts; the profile is, so pages can render the signed-in
/// user without a round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPolicy {
    pub secure: bool,
    pub max_age: Option<Duration>,
}

impl SessionPolicy {
    pub fn new(secure: bool, max_age: Option<Duration>) -> Self {
        Self { secure, max_age }
    }

    /// Policy for `access_token`.
    pub fn token_policy(&self) -> CookiePolicy {
        self.policy(true)
    }

    /// Policy for `user_data`.
    pub fn profile_policy(&self) -> CookiePolicy {
        self.policy(false)
    }

    fn policy(&self, http_only: bool) -> CookiePolicy {
        CookiePolicy {
            path: "/".to_string(),
            http_only,
            secure: self.secure,
            same_site: SameSite::Strict,
            max_age: self.max_age,
        }
    }
}
