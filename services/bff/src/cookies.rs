//! Cookie-backed credential store
//!
//! Adapts the request's `CookieJar` to `session::CredentialStore`. Writes and
//! deletes accumulate in the jar, which the handler hands back to axum so the
//! changes reach the browser as `Set-Cookie` headers.

use std::sync::{Mutex, MutexGuard, PoisonError};

use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{self, Cookie};
use session::{CookiePolicy, CredentialStore, SameSite};
use tracing::debug;

/// One request's cookies viewed as a credential store.
#[derive(Debug)]
pub struct CookieJarStore {
    jar: Mutex<CookieJar>,
}

impl CookieJarStore {
    pub fn new(jar: CookieJar) -> Self {
        Self {
            jar: Mutex::new(jar),
        }
    }

    /// Give the jar back, with every pending cookie change.
    pub fn into_jar(self) -> CookieJar {
        self.jar
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock(&self) -> MutexGuard<'_, CookieJar> {
        self.jar.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn put(&self, cookie: Cookie<'static>) {
        let mut jar = self.lock();
        *jar = jar.clone().add(cookie);
    }
}

impl CredentialStore for CookieJarStore {
    fn get(&self, name: &str) -> Option<String> {
        self.lock()
            .get(name)
            .filter(|c| !is_removal(c))
            .map(|c| c.value().to_string())
    }

    fn set(&self, name: &str, value: &str, policy: &CookiePolicy) {
        self.put(build_cookie(name, value, policy));
        debug!(cookie = name, "cookie set");
    }

    fn delete(&self, name: &str, policy: &CookiePolicy) {
        self.put(build_clear_cookie(name, policy));
        debug!(cookie = name, "cookie cleared");
    }
}

fn build_cookie(name: &str, value: &str, policy: &CookiePolicy) -> Cookie<'static> {
    let mut builder = Cookie::build((name.to_string(), value.to_string()))
        .path(policy.path.clone())
        .http_only(policy.http_only)
        .same_site(same_site(policy.same_site));

    if policy.secure {
        builder = builder.secure(true);
    }
    if let Some(max_age) = policy.max_age {
        let secs = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
        builder = builder.max_age(time::Duration::seconds(secs));
    }

    builder.build()
}

/// Expires the browser's copy. Path must match the one it was set with.
fn build_clear_cookie(name: &str, policy: &CookiePolicy) -> Cookie<'static> {
    Cookie::build((name.to_string(), ""))
        .path(policy.path.clone())
        .max_age(time::Duration::seconds(0))
        .http_only(policy.http_only)
        .same_site(same_site(policy.same_site))
        .build()
}

fn is_removal(cookie: &Cookie<'_>) -> bool {
    cookie.max_age() == Some(time::Duration::ZERO)
}

fn same_site(mode: SameSite) -> cookie::SameSite {
    match mode {
        SameSite::Strict => cookie::SameSite::Strict,
        SameSite::Lax => cookie::SameSite::Lax,
        SameSite::None => cookie::SameSite::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue, header};
    use axum::response::IntoResponse;
    use serde_json::json;
    use session::{ACCESS_TOKEN, SessionCredentials, SessionPolicy, USER_PROFILE};
    use std::time::Duration;

    fn jar_with(cookie_header: &str) -> CookieJar {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(cookie_header).unwrap();
        headers.insert(header::COOKIE, value);
        CookieJar::from_headers(&headers)
    }

    fn set_cookies(jar: CookieJar) -> Vec<String> {
        let response = (jar, ()).into_response();
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    fn find<'a>(cookies: &'a [String], name: &str) -> &'a str {
        cookies
            .iter()
            .find(|c| c.starts_with(&format!("{name}=")))
            .unwrap_or_else(|| panic!("no Set-Cookie for {name} in {cookies:?}"))
    }

    #[test]
    fn reads_request_cookies() {
        let store = CookieJarStore::new(jar_with("access_token=at_1; theme=dark"));
        assert_eq!(store.get(ACCESS_TOKEN).as_deref(), Some("at_1"));
        assert!(store.get(USER_PROFILE).is_none());
    }

    #[test]
    fn establish_emits_cookies_with_policy_attributes() {
        let store = CookieJarStore::new(CookieJar::new());
        let week = Duration::from_secs(604_800);
        SessionCredentials::new(&store, SessionPolicy::new(true, Some(week)))
            .establish("at_1", &json!({"id": 1}));

        let cookies = set_cookies(store.into_jar());
        let token = find(&cookies, ACCESS_TOKEN);
        assert!(token.contains("HttpOnly"), "got: {token}");
        assert!(token.contains("SameSite=Strict"));
        assert!(token.contains("Secure"));
        assert!(token.contains("Path=/"));
        assert!(token.contains("Max-Age=604800"));

        let profile = find(&cookies, USER_PROFILE);
        assert!(!profile.contains("HttpOnly"), "profile must be script-readable: {profile}");
        assert!(profile.contains("SameSite=Strict"));
    }

    #[test]
    fn insecure_session_cookies_omit_secure_and_max_age() {
        let store = CookieJarStore::new(CookieJar::new());
        let policy = SessionPolicy::default().token_policy();
        store.set(ACCESS_TOKEN, "at_1", &policy);

        let cookies = set_cookies(store.into_jar());
        let token = find(&cookies, ACCESS_TOKEN);
        assert!(!token.contains("Secure"), "got: {token}");
        assert!(!token.contains("Max-Age"));
    }

    #[test]
    fn delete_expires_cookie_and_hides_it_from_get() {
        let store = CookieJarStore::new(jar_with("access_token=at_1; user_data={}"));
        SessionCredentials::new(&store, SessionPolicy::default()).clear();

        assert!(store.get(ACCESS_TOKEN).is_none());
        assert!(store.get(USER_PROFILE).is_none());

        let cookies = set_cookies(store.into_jar());
        for name in [ACCESS_TOKEN, USER_PROFILE] {
            let cleared = find(&cookies, name);
            assert!(cleared.contains("Max-Age=0"), "got: {cleared}");
            assert!(cleared.contains("Path=/"));
        }
    }

    #[test]
    fn delete_of_absent_cookie_is_harmless() {
        let store = CookieJarStore::new(CookieJar::new());
        let policy = SessionPolicy::default().token_policy();
        store.delete(ACCESS_TOKEN, &policy);
        store.delete(ACCESS_TOKEN, &policy);
        assert!(store.get(ACCESS_TOKEN).is_none());
    }

    #[test]
    fn set_after_delete_restores_value() {
        let store = CookieJarStore::new(jar_with("access_token=old"));
        let policy = SessionPolicy::default().token_policy();
        store.delete(ACCESS_TOKEN, &policy);
        store.set(ACCESS_TOKEN, "new", &policy);
        assert_eq!(store.get(ACCESS_TOKEN).as_deref(), Some("new"));
    }
}
