//! HTTP response handling and Swimlane error-envelope decoding.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use crate::error::{error_code_name, Error, ErrorKind, Result};

/// Wire shape of a Swimlane HTTP 400 body.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(rename = "ErrorCode")]
    error_code: i64,
    #[serde(rename = "Argument", default)]
    argument: Option<serde_json::Value>,
}

/// Wrapper around an HTTP response with Swimlane-specific decoding.
#[derive(Debug)]
pub struct Response {
    inner: reqwest::Response,
    url: String,
}

impl Response {
    /// Create a new Response from a reqwest::Response.
    pub(crate) fn new(inner: reqwest::Response) -> Self {
        let url = inner.url().to_string();
        Self { inner, url }
    }

    /// Get the HTTP status code.
    pub fn status(&self) -> u16 {
        self.inner.status().as_u16()
    }

    /// Returns true if the response status is successful (2xx).
    pub fn is_success(&self) -> bool {
        self.inner.status().is_success()
    }

    /// Returns true if this is a 204 No Content response.
    pub fn is_no_content(&self) -> bool {
        self.status() == 204
    }

    /// The URL the response came from.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Get a header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers().get(name)?.to_str().ok()
    }

    /// Get the Retry-After header as a Duration.
    pub fn retry_after(&self) -> Option<Duration> {
        let value = self.header("retry-after")?;
        value.parse::<u64>().ok().map(Duration::from_secs)
    }

    /// Cookies set by the response, as `name=value` pairs. Older Swimlane
    /// servers authenticate follow-on requests with a session cookie instead
    /// of a bearer token.
    pub fn cookies(&self) -> Vec<(String, String)> {
        self.inner
            .cookies()
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect()
    }

    /// Get the response body as text.
    pub async fn text(self) -> Result<String> {
        self.inner.text().await.map_err(Into::into)
    }

    /// Get the response body as bytes.
    pub async fn bytes(self) -> Result<bytes::Bytes> {
        self.inner.bytes().await.map_err(Into::into)
    }

    /// Deserialize the response body as JSON.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T> {
        self.inner.json().await.map_err(Into::into)
    }

    /// Translate protocol-level failures into the error taxonomy.
    ///
    /// HTTP 400 bodies are decoded against the fixed `{ErrorCode, Argument}`
    /// envelope; 401/403/404 map to their own kinds; other non-success
    /// statuses surface as plain HTTP errors. Success (and 204) pass through.
    pub async fn check_api_error(self) -> Result<Response> {
        let status = self.status();
        if self.is_success() || (300..400).contains(&status) {
            return Ok(self);
        }

        let url = self.url.clone();
        match status {
            400 => {
                let body = self.inner.text().await.unwrap_or_default();
                let (code, argument) = match serde_json::from_str::<ErrorEnvelope>(&body) {
                    Ok(envelope) => {
                        let argument = envelope.argument.and_then(|v| match v {
                            serde_json::Value::String(s) => Some(s),
                            serde_json::Value::Null => None,
                            other => Some(other.to_string()),
                        });
                        (envelope.error_code, argument)
                    }
                    Err(_) => (-1, None),
                };
                Err(Error::new(ErrorKind::BadRequest {
                    code,
                    name: error_code_name(code),
                    argument,
                    url,
                }))
            }
            401 => Err(Error::new(ErrorKind::Authentication(url))),
            403 => Err(Error::new(ErrorKind::Authorization(url))),
            404 => Err(Error::new(ErrorKind::NotFound(url))),
            _ => {
                let body = self.inner.text().await.unwrap_or_default();
                Err(Error::new(ErrorKind::Http {
                    status,
                    message: body,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn fetch(server: &MockServer, p: &str) -> Response {
        let resp = reqwest::get(format!("{}{}", server.uri(), p))
            .await
            .unwrap();
        Response::new(resp)
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"a": 1})))
            .mount(&server)
            .await;

        let resp = fetch(&server, "/ok").await.check_api_error().await.unwrap();
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["a"], 1);
    }

    #[tokio::test]
    async fn test_400_envelope_decoding() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bad"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "ErrorCode": 3002,
                "Argument": null,
            })))
            .mount(&server)
            .await;

        let err = fetch(&server, "/bad").await.check_api_error().await.unwrap_err();
        match err.kind {
            ErrorKind::BadRequest { code, name, ref argument, ref url } => {
                assert_eq!(code, 3002);
                assert_eq!(name, "RecordNotFound");
                assert!(argument.is_none());
                assert!(url.ends_with("/bad"));
            }
            ref other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_400_unparseable_body_maps_to_unknown() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/junk"))
            .respond_with(ResponseTemplate::new(400).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = fetch(&server, "/junk").await.check_api_error().await.unwrap_err();
        match err.kind {
            ErrorKind::BadRequest { code, name, .. } => {
                assert_eq!(code, -1);
                assert_eq!(name, "Unknown");
            }
            ref other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_401_and_404() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = fetch(&server, "/auth").await.check_api_error().await.unwrap_err();
        assert!(err.is_auth_error());

        let err = fetch(&server, "/gone").await.check_api_error().await.unwrap_err();
        assert!(matches!(err.kind, ErrorKind::NotFound(_)));
    }
}
