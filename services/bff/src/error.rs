//! Per-request failures and their JSON rendering
//!
//! Every failure leaves the BFF as
//! `{"error":{"type":"...","message":"...","request_id":"req_..."}}`.

use api_gateway::Error as GatewayError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The gateway call failed; the message is the gateway's
    #[error("{0}")]
    Gateway(#[from] GatewayError),

    /// The inbound request was incomplete or malformed
    #[error("{0}")]
    Validation(String),

    /// Credentials were refused or the login call failed
    #[error("{message}")]
    Login { status: StatusCode, message: String },

    /// The registration call was refused or failed
    #[error("{message}")]
    Registration { status: StatusCode, message: String },

    /// The API answered successfully but not in the expected shape
    #[error("unexpected response from API: {0}")]
    UnexpectedPayload(String),
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Gateway(GatewayError::Api { status, .. }) => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Error::Gateway(GatewayError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            Error::Gateway(GatewayError::Network(_)) => StatusCode::BAD_GATEWAY,
            Error::Gateway(GatewayError::InvalidRequest(_)) => StatusCode::BAD_REQUEST,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Login { status, .. } | Error::Registration { status, .. } => *status,
            Error::UnexpectedPayload(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Value of the `type` field in the error body.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Gateway(_) | Error::UnexpectedPayload(_) => "gateway_error",
            Error::Validation(_) => "invalid_request",
            Error::Login { .. } => "login_error",
            Error::Registration { .. } => "registration_error",
        }
    }

    pub fn render(self, request_id: &str) -> Response {
        error_response(self.status(), self.kind(), &self.to_string(), request_id)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub fn error_response(status: StatusCode, kind: &str, message: &str, request_id: &str) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": kind,
            "message": message,
            "request_id": request_id,
        }
    });
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// `req_<uuid>` identifier echoed in error bodies and request spans.
pub fn new_request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().as_simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_errors_map_to_http_statuses() {
        let api = Error::from(GatewayError::Api {
            status: 422,
            message: "stock must be a number".into(),
        });
        assert_eq!(api.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(api.to_string(), "stock must be a number");

        assert_eq!(
            Error::from(GatewayError::Timeout).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            Error::from(GatewayError::InvalidRequest("bad".into())).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn timeout_keeps_gateway_message() {
        let err = Error::from(GatewayError::Timeout);
        assert_eq!(err.to_string(), api_gateway::TIMEOUT_MESSAGE);
        assert_eq!(err.kind(), "gateway_error");
    }

    #[tokio::test]
    async fn error_body_has_type_message_and_request_id() {
        let response = Error::Validation("Email and password are required.".into())
            .render("req_abc123");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["type"], "invalid_request");
        assert_eq!(json["error"]["message"], "Email and password are required.");
        assert_eq!(json["error"]["request_id"], "req_abc123");
    }

    #[test]
    fn request_ids_are_prefixed_and_unique() {
        let a = new_request_id();
        let b = new_request_id();
        assert!(a.starts_with("req_"));
        assert_eq!(a.len(), 4 + 32);
        assert_ne!(a, b);
    }
}
