//! Call metrics
//!
//! Recorded through the `metrics` facade; the host installs the exporter.
//!
//! - `gateway_calls_total` (counter): labels `method`, `outcome`
//! - `gateway_call_duration_seconds` (histogram): label `outcome`

use std::time::Duration;

use crate::error::Result;
use crate::outcome::Outcome;
use crate::request::Method;

/// Record one finished call.
///
/// `outcome` is `success`, `no_session`, `session_expired`, `client_error`,
/// `server_error`, `timeout`, `network_failure` or `invalid_request`.
pub fn record_call(method: Method, result: &Result<Outcome>, elapsed: Duration) {
    let outcome = match result {
        Ok(outcome) => outcome.label(),
        Err(err) => err.label(),
    };
    ::metrics::counter!("gateway_calls_total", "method" => method.as_str(), "outcome" => outcome)
        .increment(1);
    ::metrics::histogram!("gateway_call_duration_seconds", "outcome" => outcome)
        .record(elapsed.as_secs_f64());
}
