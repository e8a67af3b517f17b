//! Adapters between the native hyper request/response and the application

use bytes::Bytes;
use harbor_core::{Body, Error, ResponseSink, Result};
use http::{header, HeaderMap, Method, Request, Response, Uri};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::oneshot;

/// Application view of the native request
#[derive(Debug)]
pub struct RequestAdapter {
    inner: Request<Bytes>,
    remote_addr: Option<SocketAddr>,
}

impl RequestAdapter {
    /// Wrap a fully-buffered native request
    pub fn new(inner: Request<Bytes>, remote_addr: Option<SocketAddr>) -> Self {
        Self { inner, remote_addr }
    }

    /// HTTP method
    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    /// Request URI
    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    /// Path component of the URI
    pub fn path(&self) -> &str {
        self.inner.uri().path()
    }

    /// Request headers
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// A header value as text
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers().get(name).and_then(|v| v.to_str().ok())
    }

    /// Raw body
    pub fn body(&self) -> &Bytes {
        self.inner.body()
    }

    /// Peer address (absent for unix sockets)
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Decoded query string parameters
    pub fn query_params(&self) -> HashMap<String, String> {
        self.inner
            .uri()
            .query()
            .map(|query| {
                url::form_urlencoded::parse(query.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Cookies sent with the request
    pub fn cookies(&self) -> HashMap<String, String> {
        self.inner
            .headers()
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|line| line.split(';'))
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                Some((name.to_string(), value.to_string()))
            })
            .collect()
    }

    /// Body parameters from a form-urlencoded or JSON body
    pub fn body_params(&self) -> Result<HashMap<String, serde_json::Value>> {
        let content_type = self.header(header::CONTENT_TYPE.as_str()).unwrap_or("");

        if content_type.starts_with("application/json") {
            if self.body().is_empty() {
                return Ok(HashMap::new());
            }
            let value: serde_json::Value = serde_json::from_slice(self.body())?;
            return match value {
                serde_json::Value::Object(map) => Ok(map.into_iter().collect()),
                _ => Err(Error::InvalidRequest(
                    "JSON body must be an object".to_string(),
                )),
            };
        }

        if content_type.starts_with("application/x-www-form-urlencoded") {
            return Ok(url::form_urlencoded::parse(self.body())
                .into_owned()
                .map(|(k, v)| (k, serde_json::Value::String(v)))
                .collect());
        }

        Ok(HashMap::new())
    }

    /// Whether the request was made by a script (`X-Requested-With`)
    pub fn is_ajax(&self) -> bool {
        self.header("x-requested-with") == Some("XMLHttpRequest")
    }
}

/// Receiving half of the native response slot
pub type ResponseReceiver = oneshot::Receiver<Response<Body>>;

/// Application view of the native response
///
/// Writes exactly one response into the connection's response slot.
#[derive(Debug)]
pub struct ResponseAdapter {
    slot: Option<oneshot::Sender<Response<Body>>>,
}

impl ResponseAdapter {
    /// Create an adapter and the receiver the connection waits on
    pub fn channel() -> (Self, ResponseReceiver) {
        let (sender, receiver) = oneshot::channel();
        (Self { slot: Some(sender) }, receiver)
    }
}

impl ResponseSink for ResponseAdapter {
    fn send(&mut self, response: Response<Body>) -> Result<()> {
        let slot = self.slot.take().ok_or(Error::ResponseAlreadySent)?;
        let status = response.status();
        if slot.send(response).is_err() {
            tracing::debug!(status = %status, "Client went away before the response was written");
        }
        Ok(())
    }

    fn is_sent(&self) -> bool {
        self.slot.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harbor_core::ResponsePayload;
    use http::StatusCode;

    fn request(uri: &str, content_type: &str, body: &'static str) -> RequestAdapter {
        let req = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::COOKIE, "session=abc; theme=dark")
            .header("x-requested-with", "XMLHttpRequest")
            .body(Bytes::from_static(body.as_bytes()))
            .unwrap();
        RequestAdapter::new(req, Some("127.0.0.1:4000".parse().unwrap()))
    }

    #[test]
    fn test_query_and_cookies() {
        let req = request("/site/index?page=2&q=hello%20world", "text/plain", "");

        assert_eq!(req.path(), "/site/index");
        let query = req.query_params();
        assert_eq!(query["page"], "2");
        assert_eq!(query["q"], "hello world");

        let cookies = req.cookies();
        assert_eq!(cookies["session"], "abc");
        assert_eq!(cookies["theme"], "dark");
        assert!(req.is_ajax());
    }

    #[test]
    fn test_form_body() {
        let req = request("/login", "application/x-www-form-urlencoded", "user=ann&pass=x%26y");
        let params = req.body_params().unwrap();
        assert_eq!(params["user"], serde_json::json!("ann"));
        assert_eq!(params["pass"], serde_json::json!("x&y"));
    }

    #[test]
    fn test_json_body() {
        let req = request("/api", "application/json", r#"{"id": 7}"#);
        assert_eq!(req.body_params().unwrap()["id"], serde_json::json!(7));

        let bad = request("/api", "application/json", "[1,2]");
        assert!(bad.body_params().is_err());
    }

    #[tokio::test]
    async fn test_response_adapter_sends_once() {
        let (mut adapter, receiver) = ResponseAdapter::channel();
        assert!(!adapter.is_sent());

        ResponsePayload::new(StatusCode::CREATED)
            .text("made")
            .send(&mut adapter)
            .unwrap();
        assert!(adapter.is_sent());

        let second = ResponsePayload::default().send(&mut adapter);
        assert!(matches!(second, Err(Error::ResponseAlreadySent)));

        let response = receiver.await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[test]
    fn test_send_after_client_gone_is_ok() {
        let (mut adapter, receiver) = ResponseAdapter::channel();
        drop(receiver);
        assert!(ResponsePayload::default().send(&mut adapter).is_ok());
    }
}
