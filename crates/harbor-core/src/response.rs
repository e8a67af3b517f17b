//! Response payloads produced by the application and flushed to the native response

use crate::Result;
use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, Response, StatusCode};
use http_body_util::Full;
use serde::Serialize;

/// Body type alias
pub type Body = Full<Bytes>;

/// Destination a [`ResponsePayload`] is flushed into
///
/// Implemented by the worker's response adapter; a sink accepts exactly one
/// response.
pub trait ResponseSink {
    /// Write the response to the native connection
    fn send(&mut self, response: Response<Body>) -> Result<()>;

    /// Whether a response has already been written
    fn is_sent(&self) -> bool;
}

/// Response built by the application while handling a request
#[derive(Debug, Clone)]
pub struct ResponsePayload {
    status: StatusCode,
    headers: HeaderMap,
    cookies: Vec<String>,
    body: Bytes,
}

impl ResponsePayload {
    /// Create an empty response with the given status
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Status code
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Override the status code
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Headers set so far
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Body bytes
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Set a header, ignoring values that are not valid header text
    pub fn header(mut self, name: header::HeaderName, value: impl AsRef<str>) -> Self {
        if let Ok(value) = HeaderValue::from_str(value.as_ref()) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Add a `Set-Cookie` line
    pub fn cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.push(format!("{name}={value}; Path=/"));
        self
    }

    /// Plain text body
    pub fn text(self, body: impl Into<String>) -> Self {
        self.header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .with_body(body.into())
    }

    /// HTML body
    pub fn html(self, body: impl Into<String>) -> Self {
        self.header(header::CONTENT_TYPE, "text/html; charset=utf-8")
            .with_body(body.into())
    }

    /// JSON body
    pub fn json<T: Serialize>(self, body: &T) -> Result<Self> {
        let json = serde_json::to_vec(body)?;
        Ok(self
            .header(header::CONTENT_TYPE, "application/json")
            .with_body(json))
    }

    /// Raw body bytes
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// 302 redirect to `location`
    pub fn redirect(location: &str) -> Self {
        Self::new(StatusCode::FOUND).header(header::LOCATION, location)
    }

    /// Convert into the native hyper response
    pub fn into_response(self) -> Result<Response<Body>> {
        let mut response = Response::builder().status(self.status);

        for (name, value) in self.headers.iter() {
            response = response.header(name, value);
        }
        for cookie in &self.cookies {
            response = response.header(header::SET_COOKIE, cookie.as_str());
        }

        Ok(response.body(Full::new(self.body))?)
    }

    /// Flush this payload through the response sink
    pub fn send(self, sink: &mut dyn ResponseSink) -> Result<()> {
        let response = self.into_response()?;
        sink.send(response)
    }
}

impl Default for ResponsePayload {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}
