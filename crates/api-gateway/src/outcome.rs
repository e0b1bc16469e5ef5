//! Non-error results of a gateway call

use serde_json::Value;

/// Query marker appended to the login path after an auth failure.
pub const SESSION_EXPIRED_MARKER: &str = "session=expired";

/// Why the caller must be sent to the login page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectReason {
    /// The caller expected a session but no token was stored
    NoSession,
    /// The API rejected the stored token (401); the session has been cleared
    SessionExpired,
}

impl RedirectReason {
    /// Navigation target for this reason, relative to `login_path`.
    pub fn location(&self, login_path: &str) -> String {
        match self {
            RedirectReason::NoSession => login_path.to_string(),
            RedirectReason::SessionExpired => {
                let separator = if login_path.contains('?') { '&' } else { '?' };
                format!("{login_path}{separator}{SESSION_EXPIRED_MARKER}")
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RedirectReason::NoSession => "no_session",
            RedirectReason::SessionExpired => "session_expired",
        }
    }
}

/// What a call produced when it did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Parsed JSON body, or `None` for 204 / empty / non-JSON success bodies
    Success(Option<Value>),
    /// Control flow must leave the current page for the login page
    Redirect(RedirectReason),
}

impl Outcome {
    /// Payload of a successful call. `None` for redirects and empty bodies.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Outcome::Success(payload) => payload.as_ref(),
            Outcome::Redirect(_) => None,
        }
    }

    pub fn redirect_reason(&self) -> Option<RedirectReason> {
        match self {
            Outcome::Redirect(reason) => Some(*reason),
            Outcome::Success(_) => None,
        }
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self, Outcome::Redirect(_))
    }

    /// Short label for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success(_) => "success",
            Outcome::Redirect(reason) => reason.label(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redirect_locations_are_distinguishable() {
        let no_session = RedirectReason::NoSession.location("/auth/login");
        let expired = RedirectReason::SessionExpired.location("/auth/login");
        assert_eq!(no_session, "/auth/login");
        assert_eq!(expired, "/auth/login?session=expired");
        assert_ne!(no_session, expired);
    }

    #[test]
    fn expired_marker_appends_to_existing_query() {
        let location = RedirectReason::SessionExpired.location("/auth/login?lang=id");
        assert_eq!(location, "/auth/login?lang=id&session=expired");
    }

    #[test]
    fn accessors_follow_variant() {
        let success = Outcome::Success(Some(json!({"data": {"id": 1}})));
        assert_eq!(success.payload().unwrap()["data"]["id"], 1);
        assert!(success.redirect_reason().is_none());
        assert_eq!(success.label(), "success");

        let redirect = Outcome::Redirect(RedirectReason::SessionExpired);
        assert!(redirect.is_redirect());
        assert!(redirect.payload().is_none());
        assert_eq!(redirect.label(), "session_expired");
    }
}
