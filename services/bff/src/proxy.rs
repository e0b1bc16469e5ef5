//! Authenticated passthrough: `/api/{*path}` → gateway → remote API
//!
//! The inbound path (minus `/api`), method, query string and JSON body are
//! replayed through `Gateway::call` with the request's cookies as the
//! credential store. Success payloads come back as JSON; redirect outcomes
//! become `302` responses carrying any cookie changes.

use api_gateway::{ApiRequest, Gateway, Method, Outcome, QueryParams};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum_extra::extract::CookieJar;
use serde_json::Value;
use tracing::{debug, error, instrument, warn};

use crate::auth::{SessionSettings, redirect_to_login};
use crate::cookies::CookieJarStore;
use crate::error::{Error, Result};

/// Largest inbound body forwarded to the API.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

const API_PREFIX: &str = "/api";

#[instrument(skip_all, fields(request_id = %request_id, method = %request.method(), path = %request.uri().path()))]
pub async fn forward(
    gateway: &Gateway,
    settings: &SessionSettings,
    request: Request<Body>,
    request_id: &str,
) -> Response {
    match try_forward(gateway, settings, request).await {
        Ok(response) => response,
        Err(err) => {
            if err.status().is_server_error() {
                error!(error = %err, status = err.status().as_u16(), "passthrough failed");
            } else {
                warn!(error = %err, status = err.status().as_u16(), "passthrough rejected");
            }
            err.render(request_id)
        }
    }
}

async fn try_forward(
    gateway: &Gateway,
    settings: &SessionSettings,
    request: Request<Body>,
) -> Result<Response> {
    let method = Method::try_from(request.method())?;
    let endpoint = api_endpoint(request.uri().path()).to_string();
    let query = forwarded_query(request.uri().query());
    let jar = CookieJar::from_headers(request.headers());

    let bytes = axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES)
        .await
        .map_err(|e| Error::Validation(format!("invalid request body: {e}")))?;
    let body = if bytes.is_empty() {
        None
    } else {
        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Validation(format!("request body must be JSON: {e}")))?;
        Some(value)
    };
    debug!(%endpoint, params = query.len(), has_body = body.is_some(), "forwarding to API");

    let store = CookieJarStore::new(jar);
    let mut api_request = ApiRequest::new(method, endpoint)
        .with_query(query)
        .credentials(&store);
    if let Some(body) = body {
        api_request = api_request.json(body);
    }
    let outcome = gateway.call(api_request).await?;
    let jar = store.into_jar();

    Ok(match outcome {
        Outcome::Success(Some(payload)) => (jar, Json(payload)).into_response(),
        Outcome::Success(None) => (jar, StatusCode::NO_CONTENT).into_response(),
        Outcome::Redirect(reason) => (jar, redirect_to_login(reason, settings)).into_response(),
    })
}

/// `/api/products/7` → `/products/7`; a bare `/api` maps to `/`.
fn api_endpoint(path: &str) -> &str {
    match path.strip_prefix(API_PREFIX) {
        Some("") => "/",
        Some(rest) if rest.starts_with('/') => rest,
        _ => path,
    }
}

/// Inbound query pairs, decoded and kept in order.
fn forwarded_query(query: Option<&str>) -> QueryParams {
    query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect::<QueryParams>()
        })
        .unwrap_or_default()
}
