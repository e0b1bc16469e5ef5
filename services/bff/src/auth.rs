//! Session actions: login, registration, logout, current user, profile
//! update and account deletion
//!
//! All of them read and write the session through `CookieJarStore`, so every
//! credential change travels back to the browser on the same response.

use api_gateway::{Error as GatewayError, Gateway, Outcome, QueryParams, RedirectReason};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Redirect, Response};
use axum_extra::extract::CookieJar;
use common::Secret;
use serde::Deserialize;
use serde_json::{Value, json};
use session::{SessionCredentials, SessionPolicy};
use tracing::{debug, info, instrument, warn};

use crate::config::SessionConfig;
use crate::cookies::CookieJarStore;
use crate::error::{Error, Result};

const CREDENTIALS_REQUIRED: &str = "Email and password are required.";
const INCORRECT_CREDENTIALS: &str = "Incorrect email or password. Please try again.";
const ACCOUNT_NOT_FOUND: &str = "Account not found.";
const SERVER_PROBLEM: &str = "Server problem, please try again shortly.";
const LOGIN_UNEXPECTED: &str = "Login failed due to an unexpected problem.";
const PROFILE_FIELDS_REQUIRED: &str = "First name, last name and store name are required.";
const REGISTRATION_FIELDS_REQUIRED: &str = "All fields are required.";
const INVALID_EMAIL: &str = "Invalid email format.";
const PASSWORD_TOO_SHORT: &str = "Password must be at least 8 characters.";
const INVALID_REGISTRATION: &str = "Invalid registration data. Please check your input.";
const EMAIL_TAKEN: &str = "Email is already registered. Use another email or log in.";
const REGISTRATION_UNEXPECTED: &str = "Registration failed due to an unexpected problem.";

const MIN_PASSWORD_CHARS: usize = 8;

const REGISTERED_MARKER: &str = "registered=true";
const DELETED_MARKER: &str = "deleted=true";

/// Where to send the browser, and how to persist its session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub login_path: String,
    pub home_path: String,
    pub policy: SessionPolicy,
}

impl SessionSettings {
    /// Login page with a status marker in the query string.
    fn login_with(&self, marker: &str) -> String {
        let separator = if self.login_path.contains('?') { '&' } else { '?' };
        format!("{}{separator}{marker}", self.login_path)
    }
}

impl From<&SessionConfig> for SessionSettings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            login_path: config.login_path.clone(),
            home_path: config.home_path.clone(),
            policy: config.policy(),
        }
    }
}

/// `302 Found` to `location`.
pub fn found(location: &str) -> Response {
    (
        StatusCode::FOUND,
        [(header::LOCATION, location.to_string())],
    )
        .into_response()
}

/// Turn a gateway redirect outcome into a browser redirect to the login page.
pub fn redirect_to_login(reason: RedirectReason, settings: &SessionSettings) -> Response {
    found(&reason.location(&settings.login_path))
}

/// Login form fields. Missing fields deserialize as empty strings.
#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[instrument(skip_all, fields(request_id = %request_id))]
pub async fn login(
    gateway: &Gateway,
    settings: &SessionSettings,
    jar: CookieJar,
    form: LoginForm,
    request_id: &str,
) -> Response {
    match try_login(gateway, settings, jar, form).await {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, status = err.status().as_u16(), "login failed");
            err.render(request_id)
        }
    }
}

async fn try_login(
    gateway: &Gateway,
    settings: &SessionSettings,
    jar: CookieJar,
    form: LoginForm,
) -> Result<Response> {
    let email = form.email.trim().to_string();
    let password = Secret::new(form.password);
    if email.is_empty() || password.expose().is_empty() {
        return Err(Error::Validation(CREDENTIALS_REQUIRED.into()));
    }

    let body = json!({ "email": email, "password": password.expose() });
    let outcome = gateway
        .post("/auth/login", body, None, QueryParams::new())
        .await
        .map_err(login_failure)?;

    let payload = match outcome {
        Outcome::Success(payload) => payload,
        Outcome::Redirect(_) => {
            return Err(Error::Login {
                status: StatusCode::UNAUTHORIZED,
                message: INCORRECT_CREDENTIALS.into(),
            });
        }
    };
    let (token, user) = session_from_payload(payload.as_ref())?;

    let store = CookieJarStore::new(jar);
    SessionCredentials::new(&store, settings.policy.clone()).establish(token, user);
    info!("login succeeded, session established");

    Ok((store.into_jar(), Redirect::to(&settings.home_path)).into_response())
}

/// Pull `data.token.access_token` and `data.user` out of a login response.
fn session_from_payload(payload: Option<&Value>) -> Result<(&str, &Value)> {
    let data = payload
        .and_then(|p| p.get("data"))
        .ok_or_else(|| Error::UnexpectedPayload("login response has no data".into()))?;
    let token = data
        .pointer("/token/access_token")
        .and_then(Value::as_str)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| Error::UnexpectedPayload("login response has no access token".into()))?;
    let user = data
        .get("user")
        .filter(|u| u.is_object())
        .ok_or_else(|| Error::UnexpectedPayload("login response has no user".into()))?;
    Ok((token, user))
}

fn login_failure(err: GatewayError) -> Error {
    let (status, message) = match err {
        GatewayError::Api { status: 400, .. } => (StatusCode::BAD_REQUEST, INCORRECT_CREDENTIALS),
        GatewayError::Api { status: 404, .. } => (StatusCode::NOT_FOUND, ACCOUNT_NOT_FOUND),
        GatewayError::Api { status: 500, .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, SERVER_PROBLEM)
        }
        GatewayError::Api { status, .. } => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
            LOGIN_UNEXPECTED,
        ),
        other => return Error::Gateway(other),
    };
    Error::Login {
        status,
        message: message.into(),
    }
}

/// Registration form fields. Missing fields deserialize as empty strings.
#[derive(Default, Deserialize)]
#[serde(default)]
pub struct RegistrationForm {
    pub email: String,
    pub firstname: String,
    pub lastname: String,
    pub password: String,
    pub store_name: String,
}

impl RegistrationForm {
    fn validate(&self) -> Result<()> {
        let required = [
            &self.email,
            &self.firstname,
            &self.lastname,
            &self.store_name,
        ];
        if required.iter().any(|f| f.trim().is_empty()) || self.password.is_empty() {
            return Err(Error::Validation(REGISTRATION_FIELDS_REQUIRED.into()));
        }
        if !is_valid_email(self.email.trim()) {
            return Err(Error::Validation(INVALID_EMAIL.into()));
        }
        if self.password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(Error::Validation(PASSWORD_TOO_SHORT.into()));
        }
        Ok(())
    }
}

/// `local@domain.tld`: no whitespace, one `@`, and a dot inside the domain.
fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

#[instrument(skip_all, fields(request_id = %request_id))]
pub async fn register(
    gateway: &Gateway,
    settings: &SessionSettings,
    form: RegistrationForm,
    request_id: &str,
) -> Response {
    match try_register(gateway, settings, form).await {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, status = err.status().as_u16(), "registration failed");
            err.render(request_id)
        }
    }
}

async fn try_register(
    gateway: &Gateway,
    settings: &SessionSettings,
    form: RegistrationForm,
) -> Result<Response> {
    form.validate()?;
    let password = Secret::new(form.password);
    let body = json!({
        "email": form.email.trim(),
        "firstname": form.firstname.trim(),
        "lastname": form.lastname.trim(),
        "password": password.expose(),
        "store_name": form.store_name.trim(),
    });

    let outcome = gateway
        .post("/auth/register", body, None, QueryParams::new())
        .await
        .map_err(registration_failure)?;
    if outcome.is_redirect() {
        return Err(Error::Registration {
            status: StatusCode::UNAUTHORIZED,
            message: REGISTRATION_UNEXPECTED.into(),
        });
    }

    info!("account registered");
    Ok(Redirect::to(&settings.login_with(REGISTERED_MARKER)).into_response())
}

fn registration_failure(err: GatewayError) -> Error {
    let (status, message) = match err {
        GatewayError::Api { status: 400, .. } => (StatusCode::BAD_REQUEST, INVALID_REGISTRATION),
        GatewayError::Api { status: 409, .. } => (StatusCode::CONFLICT, EMAIL_TAKEN),
        GatewayError::Api { status: 500, .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, SERVER_PROBLEM)
        }
        GatewayError::Api { status, .. } => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
            REGISTRATION_UNEXPECTED,
        ),
        other => return Error::Gateway(other),
    };
    Error::Registration {
        status,
        message: message.into(),
    }
}

/// Clear both session cookies and go back to the login page.
pub fn logout(settings: &SessionSettings, jar: CookieJar) -> Response {
    let store = CookieJarStore::new(jar);
    SessionCredentials::new(&store, settings.policy.clone()).clear();
    info!("session cleared by logout");
    (store.into_jar(), found(&settings.login_path)).into_response()
}

/// The signed-in user, for page rendering.
///
/// A corrupt profile cookie clears the session, and the removal cookies go
/// out with this response.
pub fn current_session(settings: &SessionSettings, jar: CookieJar) -> Response {
    let store = CookieJarStore::new(jar);
    let user = SessionCredentials::new(&store, settings.policy.clone()).current_user();
    let body = json!({ "authenticated": user.is_some(), "user": user });
    (store.into_jar(), Json(body)).into_response()
}

/// Editable profile fields.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProfileUpdate {
    pub firstname: String,
    pub lastname: String,
    pub store_name: String,
}

impl ProfileUpdate {
    /// Trim every field; all of them must be non-blank.
    fn normalized(self) -> Result<Self> {
        let update = Self {
            firstname: self.firstname.trim().to_string(),
            lastname: self.lastname.trim().to_string(),
            store_name: self.store_name.trim().to_string(),
        };
        if update.firstname.is_empty()
            || update.lastname.is_empty()
            || update.store_name.is_empty()
        {
            return Err(Error::Validation(PROFILE_FIELDS_REQUIRED.into()));
        }
        Ok(update)
    }

    fn to_json(&self) -> Value {
        json!({
            "firstname": self.firstname,
            "lastname": self.lastname,
            "store_name": self.store_name,
        })
    }

    /// Overlay the edited fields on the stored profile snapshot. Without a
    /// stored object there is nothing to refresh.
    fn merge_into(&self, stored: Option<Value>) -> Option<Value> {
        let Some(Value::Object(mut profile)) = stored else {
            return None;
        };
        profile.insert("firstname".into(), self.firstname.clone().into());
        profile.insert("lastname".into(), self.lastname.clone().into());
        profile.insert("store_name".into(), self.store_name.clone().into());
        Some(Value::Object(profile))
    }
}

#[instrument(skip_all, fields(request_id = %request_id))]
pub async fn update_profile(
    gateway: &Gateway,
    settings: &SessionSettings,
    jar: CookieJar,
    update: ProfileUpdate,
    request_id: &str,
) -> Response {
    match try_update_profile(gateway, settings, jar, update).await {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, status = err.status().as_u16(), "profile update failed");
            err.render(request_id)
        }
    }
}

async fn try_update_profile(
    gateway: &Gateway,
    settings: &SessionSettings,
    jar: CookieJar,
    update: ProfileUpdate,
) -> Result<Response> {
    let update = update.normalized()?;
    let store = CookieJarStore::new(jar);

    let outcome = gateway
        .put(
            "/users/me",
            update.to_json(),
            Some(&store),
            QueryParams::new(),
        )
        .await?;

    let payload = match outcome {
        Outcome::Success(payload) => payload,
        Outcome::Redirect(reason) => {
            return Ok((store.into_jar(), redirect_to_login(reason, settings)).into_response());
        }
    };

    let session = SessionCredentials::new(&store, settings.policy.clone());
    match update.merge_into(session.user_profile()) {
        Some(profile) => session.update_profile(&profile),
        None => debug!("no stored profile, profile cookie left as is"),
    }
    info!("profile updated");

    let body = json!({
        "success": true,
        "message": "Profile updated successfully",
        "data": payload,
    });
    Ok((store.into_jar(), Json(body)).into_response())
}

/// Delete the signed-in account, then drop the session.
#[instrument(skip_all, fields(request_id = %request_id))]
pub async fn delete_account(
    gateway: &Gateway,
    settings: &SessionSettings,
    jar: CookieJar,
    request_id: &str,
) -> Response {
    match try_delete_account(gateway, settings, jar).await {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, status = err.status().as_u16(), "account deletion failed");
            err.render(request_id)
        }
    }
}

async fn try_delete_account(
    gateway: &Gateway,
    settings: &SessionSettings,
    jar: CookieJar,
) -> Result<Response> {
    let store = CookieJarStore::new(jar);
    let outcome = gateway
        .delete("/users/me", Some(&store), QueryParams::new())
        .await?;
    if let Outcome::Redirect(reason) = outcome {
        return Ok((store.into_jar(), redirect_to_login(reason, settings)).into_response());
    }

    SessionCredentials::new(&store, settings.policy.clone()).clear();
    info!("account deleted, session cleared");
    let location = settings.login_with(DELETED_MARKER);
    Ok((store.into_jar(), found(&location)).into_response())
}
