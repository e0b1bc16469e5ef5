//! Paired access-token / profile operations over a `CredentialStore`

use common::Secret;
use serde_json::Value;
use tracing::{debug, warn};

use crate::policy::SessionPolicy;
use crate::store::{ACCESS_TOKEN, CredentialStore, USER_PROFILE};

/// The two session values of one browser, viewed through a store.
///
/// Keeps the token and profile in step: they are written together on login
/// and removed together on logout or auth failure. Only `update_profile`
/// touches one without the other, and it never removes the token.
pub struct SessionCredentials<'a> {
    store: &'a dyn CredentialStore,
    policy: SessionPolicy,
}

impl<'a> SessionCredentials<'a> {
    pub fn new(store: &'a dyn CredentialStore, policy: SessionPolicy) -> Self {
        Self { store, policy }
    }

    /// Stored bearer token. Blank values count as absent.
    pub fn access_token(&self) -> Option<Secret<String>> {
        self.store
            .get(ACCESS_TOKEN)
            .map(Secret::new)
            .filter(|t| !t.is_blank())
    }

    /// Stored profile, if present and valid JSON.
    pub fn user_profile(&self) -> Option<Value> {
        self.store
            .get(USER_PROFILE)
            .and_then(|raw| serde_json::from_str(&raw).ok())
    }

    /// Store both values after a successful login.
    pub fn establish(&self, access_token: &str, profile: &Value) {
        self.store.set(ACCESS_TOKEN, access_token, &self.policy.token_policy());
        self.store.set(
            USER_PROFILE,
            &profile.to_string(),
            &self.policy.profile_policy(),
        );
        debug!("session established");
    }

    /// Replace the profile snapshot, leaving the token untouched.
    pub fn update_profile(&self, profile: &Value) {
        self.store.set(
            USER_PROFILE,
            &profile.to_string(),
            &self.policy.profile_policy(),
        );
        debug!("session profile refreshed");
    }

    /// Remove both values. Safe to call when either or both are absent.
    pub fn clear(&self) {
        self.store.delete(ACCESS_TOKEN, &self.policy.token_policy());
        self.store.delete(USER_PROFILE, &self.policy.profile_policy());
        debug!("session cleared");
    }

    /// Signed-in user for page rendering.
    ///
    /// Requires both values. A present but unparseable profile means the
    /// session is corrupt, so both values are dropped and `None` returned.
    /// Token validity is not checked here; the first API call that gets a
    /// 401 takes care of expired tokens.
    pub fn current_user(&self) -> Option<Value> {
        self.access_token()?;
        let raw = self.store.get(USER_PROFILE)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "failed to parse stored user profile, clearing session");
                self.clear();
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use serde_json::json;
    use std::time::Duration;

    fn session(store: &MemoryStore) -> SessionCredentials<'_> {
        SessionCredentials::new(store, SessionPolicy::default())
    }

    #[test]
    fn establish_sets_both_with_distinct_exposure() {
        let store = MemoryStore::new();
        session(&store).establish("at_1", &json!({"id": 1, "firstname": "Sari"}));

        assert_eq!(store.get(ACCESS_TOKEN).as_deref(), Some("at_1"));
        assert!(store.policy_of(ACCESS_TOKEN).unwrap().http_only);
        assert!(!store.policy_of(USER_PROFILE).unwrap().http_only);

        let profile = session(&store).user_profile().unwrap();
        assert_eq!(profile["firstname"], "Sari");
    }

    #[test]
    fn access_token_is_redacted_and_exposed_on_demand() {
        let store = MemoryStore::new();
        session(&store).establish("at_secret", &json!({}));

        let token = session(&store).access_token().unwrap();
        assert_eq!(format!("{token:?}"), "[REDACTED]");
        assert_eq!(token.expose(), "at_secret");
    }

    #[test]
    fn blank_token_counts_as_absent() {
        let store = MemoryStore::new();
        store.set(ACCESS_TOKEN, "", &SessionPolicy::default().token_policy());
        assert!(session(&store).access_token().is_none());
    }

    #[test]
    fn update_profile_keeps_token() {
        let store = MemoryStore::new();
        let creds = session(&store);
        creds.establish("at_1", &json!({"store_name": "old"}));

        creds.update_profile(&json!({"store_name": "new"}));

        assert_eq!(store.get(ACCESS_TOKEN).as_deref(), Some("at_1"));
        assert_eq!(creds.user_profile().unwrap()["store_name"], "new");
    }

    #[test]
    fn clear_removes_both_and_is_idempotent() {
        let store = MemoryStore::new();
        let creds = session(&store);
        creds.establish("at_1", &json!({"id": 1}));

        creds.clear();
        creds.clear();

        assert!(store.is_empty());
    }

    #[test]
    fn current_user_requires_both_values() {
        let store = MemoryStore::new();
        store.set(
            USER_PROFILE,
            r#"{"id":1}"#,
            &SessionPolicy::default().profile_policy(),
        );
        assert!(session(&store).current_user().is_none());

        session(&store).establish("at_1", &json!({"id": 1}));
        assert_eq!(session(&store).current_user(), Some(json!({"id": 1})));
    }

    #[test]
    fn current_user_clears_session_on_corrupt_profile() {
        let store = MemoryStore::new();
        let policy = SessionPolicy::default();
        store.set(ACCESS_TOKEN, "at_1", &policy.token_policy());
        store.set(USER_PROFILE, "{not json", &policy.profile_policy());

        assert!(session(&store).current_user().is_none());
        assert!(store.get(ACCESS_TOKEN).is_none());
        assert!(store.get(USER_PROFILE).is_none());
    }

    #[test]
    fn policy_settings_flow_into_stored_values() {
        let store = MemoryStore::new();
        let week = Duration::from_secs(604_800);
        SessionCredentials::new(&store, SessionPolicy::new(true, Some(week)))
            .establish("at_1", &json!({}));

        let token_policy = store.policy_of(ACCESS_TOKEN).unwrap();
        assert!(token_policy.secure);
        assert_eq!(token_policy.max_age, Some(week));
    }
}
