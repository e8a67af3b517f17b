//! Process-wide error handler for uncaught request failures

use harbor_config::RuntimeEnv;
use harbor_core::{Error, ResponsePayload, ResponseSink};
use http::StatusCode;
use std::fmt;

/// Produces a best-effort response for a failed request
pub trait ErrorHandler: Send + Sync + fmt::Debug {
    /// Handle an error that escaped the application
    ///
    /// Must not panic. If a response was already written, only record the
    /// failure.
    fn handle_exception(&self, error: &Error, response: &mut dyn ResponseSink, env: &RuntimeEnv);
}

/// Default handler: plain-text body, error details only in debug mode
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultErrorHandler;

impl ErrorHandler for DefaultErrorHandler {
    fn handle_exception(&self, error: &Error, response: &mut dyn ResponseSink, env: &RuntimeEnv) {
        let status = error.to_status_code();
        tracing::error!(status = %status, error = %error, "Request failed");

        if response.is_sent() {
            tracing::warn!("Response already sent, error not rendered");
            return;
        }

        let body = if env.debug {
            format!("{} {}\n\n{}", status.as_u16(), reason(status), error)
        } else {
            format!("{} {}", status.as_u16(), reason(status))
        };

        if let Err(e) = ResponsePayload::new(status).text(body).send(response) {
            tracing::error!(error = %e, "Failed to send error response");
        }
    }
}

fn reason(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Error")
}
