//! Authenticated request gateway for the storefront REST API
//!
//! Every call the BFF makes to the remote API goes through `Gateway::call`,
//! which turns one `ApiRequest` into exactly one HTTP attempt:
//!
//! 1. Resolve the access token from the caller's `CredentialStore` (if any);
//!    a store without a token short-circuits to `Outcome::Redirect(NoSession)`
//! 2. Build the URL (base + endpoint + ordered query string)
//! 3. Attach `Authorization: Bearer` and the JSON content type where they apply
//! 4. Send with a hard timeout, no retries
//! 5. Classify: transport failure, 401 (clear session + `SessionExpired`),
//!    other 4xx/5xx, 204, JSON body
//!
//! Redirects are `Outcome` values rather than errors, so an error handler
//! wrapped around a call can never swallow one.

pub mod error;
pub mod gateway;
pub mod metrics;
pub mod outcome;
pub mod request;

pub use error::{Error, Result, TIMEOUT_MESSAGE};
pub use gateway::{DEFAULT_TIMEOUT, Gateway, GatewayConfig};
pub use outcome::{Outcome, RedirectReason, SESSION_EXPIRED_MARKER};
pub use request::{ApiRequest, Body, Method, QueryParams, QueryValue};
pub use reqwest::multipart;
