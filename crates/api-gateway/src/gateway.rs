//! Gateway call: one descriptor in, one HTTP attempt, one classified result out
//!
//! Per-call flow:
//! `Idle → ResolvingCredentials → (Redirect NoSession) | Building → Sending →
//! (Timeout | NetworkFailure) | Received → Classifying → Success |
//! Redirect SessionExpired | Api error`.
//!
//! Nothing is retried. Concurrent calls sharing a credential store may each see
//! a 401 and each clear the session; clearing is idempotent, so every such call
//! simply returns its own `SessionExpired` redirect.

use std::time::{Duration, Instant};

use common::Secret;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use session::{CredentialStore, SessionCredentials, SessionPolicy};
use tracing::{debug, error, instrument, warn};

use crate::error::{Error, Result};
use crate::outcome::{Outcome, RedirectReason};
use crate::request::{ApiRequest, Body, Method, QueryParams};

/// Ceiling for one attempt (connect + response + body).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the API lives and how long to wait for it.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// e.g. `http://202.155.95.111/api/v1`; endpoints are appended verbatim
    pub base_url: String,
    pub timeout: Duration,
    /// Policies used when the gateway clears a rejected session
    pub session: SessionPolicy,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
            session: SessionPolicy::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_session(mut self, session: SessionPolicy) -> Self {
        self.session = session;
        self
    }
}

/// The authenticated request gateway.
///
/// Cheap to clone: `reqwest::Client` shares its connection pool via `Arc`.
#[derive(Debug, Clone)]
pub struct Gateway {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    session: SessionPolicy,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Use an existing client, sharing its connection pool.
    pub fn with_client(client: reqwest::Client, config: GatewayConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout,
            session: config.session,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Perform one call and classify the result.
    ///
    /// `Ok(Outcome::Redirect(_))` must be passed up to the host unchanged;
    /// `Err(_)` carries a message fit for showing to the user.
    #[instrument(skip_all, fields(method = %request.method, endpoint = %request.endpoint))]
    pub async fn call(&self, request: ApiRequest<'_>) -> Result<Outcome> {
        let started = Instant::now();
        let method = request.method;
        let result = self.dispatch(request).await;
        crate::metrics::record_call(method, &result, started.elapsed());
        result
    }

    pub async fn get(
        &self,
        endpoint: &str,
        credentials: Option<&dyn CredentialStore>,
        query: QueryParams,
    ) -> Result<Outcome> {
        let request = ApiRequest::get(endpoint).with_query(query);
        self.call(with_credentials(request, credentials)).await
    }

    pub async fn post(
        &self,
        endpoint: &str,
        body: impl Into<Body>,
        credentials: Option<&dyn CredentialStore>,
        query: QueryParams,
    ) -> Result<Outcome> {
        let request = ApiRequest::post(endpoint).body(body).with_query(query);
        self.call(with_credentials(request, credentials)).await
    }

    pub async fn put(
        &self,
        endpoint: &str,
        body: impl Into<Body>,
        credentials: Option<&dyn CredentialStore>,
        query: QueryParams,
    ) -> Result<Outcome> {
        let request = ApiRequest::put(endpoint).body(body).with_query(query);
        self.call(with_credentials(request, credentials)).await
    }

    pub async fn patch(
        &self,
        endpoint: &str,
        body: impl Into<Body>,
        credentials: Option<&dyn CredentialStore>,
        query: QueryParams,
    ) -> Result<Outcome> {
        let request = ApiRequest::patch(endpoint).body(body).with_query(query);
        self.call(with_credentials(request, credentials)).await
    }

    pub async fn delete(
        &self,
        endpoint: &str,
        credentials: Option<&dyn CredentialStore>,
        query: QueryParams,
    ) -> Result<Outcome> {
        let request = ApiRequest::delete(endpoint).with_query(query);
        self.call(with_credentials(request, credentials)).await
    }

    async fn dispatch(&self, request: ApiRequest<'_>) -> Result<Outcome> {
        let ApiRequest {
            endpoint,
            method,
            body,
            query,
            credentials,
        } = request;
        let session = credentials.map(|store| SessionCredentials::new(store, self.session.clone()));

        let token = match &session {
            Some(session) => match session.access_token() {
                Some(token) => Some(token),
                None => {
                    warn!("no access token in session, redirecting to login");
                    return Ok(Outcome::Redirect(RedirectReason::NoSession));
                }
            },
            None => None,
        };

        let url = self.build_url(&endpoint, &query);
        let headers = build_headers(method, token.as_ref(), body.as_ref())?;

        let mut builder = self
            .client
            .request(method.into(), &url)
            .headers(headers)
            .timeout(self.timeout);
        match body {
            Some(_) if method == Method::Get => warn!("dropping body supplied with GET request"),
            Some(Body::Json(value)) => builder = builder.body(value.to_string()),
            Some(Body::Multipart(form)) => builder = builder.multipart(form),
            None => {}
        }

        debug!(%url, authenticated = token.is_some(), "sending request");
        let response = builder.send().await.map_err(transport_failure)?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            if let Some(session) = &session {
                session.clear();
            }
            warn!("access token rejected by API, redirecting to login");
            return Ok(Outcome::Redirect(RedirectReason::SessionExpired));
        }

        if status.as_u16() >= 400 {
            let body = response.bytes().await.unwrap_or_default();
            let err = Error::from_status(status, &body);
            warn!(status = status.as_u16(), error = %err, "API returned failure status");
            return Err(err);
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(Outcome::Success(None));
        }

        let body = response.bytes().await.map_err(transport_failure)?;
        match serde_json::from_slice(&body) {
            Ok(payload) => Ok(Outcome::Success(Some(payload))),
            Err(e) => {
                debug!(
                    status = status.as_u16(),
                    bytes = body.len(),
                    error = %e,
                    "success body is not JSON, returning empty payload"
                );
                Ok(Outcome::Success(None))
            }
        }
    }

    fn build_url(&self, endpoint: &str, query: &QueryParams) -> String {
        if query.is_empty() {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}{}?{}", self.base_url, endpoint, query.to_query_string())
        }
    }
}

fn with_credentials<'a>(
    request: ApiRequest<'a>,
    credentials: Option<&'a dyn CredentialStore>,
) -> ApiRequest<'a> {
    match credentials {
        Some(store) => request.credentials(store),
        None => request,
    }
}

/// Authorization only with a token; JSON content type on every non-GET
/// request whose body is not multipart.
fn build_headers(
    method: Method,
    token: Option<&Secret<String>>,
    body: Option<&Body>,
) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();

    if let Some(token) = token {
        let bearer = format!("Bearer {}", token.expose());
        let mut value = HeaderValue::from_str(&bearer)
            .map_err(|e| Error::InvalidRequest(format!("unusable access token: {e}")))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    if method != Method::Get && !body.is_some_and(Body::is_multipart) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }

    Ok(headers)
}

fn transport_failure(err: reqwest::Error) -> Error {
    let err = Error::from_transport(err);
    error!(error = %err, kind = err.label(), "request to API failed");
    err
}
