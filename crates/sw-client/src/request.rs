//! HTTP request building.

use bytes::Bytes;
use serde::Serialize;
use std::collections::HashMap;

use crate::error::Result;

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    Get,
    Post,
    Patch,
    Put,
    Delete,
}

impl RequestMethod {
    /// Convert to reqwest::Method.
    pub fn to_reqwest(&self) -> reqwest::Method {
        match self {
            RequestMethod::Get => reqwest::Method::GET,
            RequestMethod::Post => reqwest::Method::POST,
            RequestMethod::Patch => reqwest::Method::PATCH,
            RequestMethod::Put => reqwest::Method::PUT,
            RequestMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Builder for HTTP requests.
///
/// Cloneable so the session can replay a request after re-authenticating.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    pub(crate) method: RequestMethod,
    pub(crate) url: String,
    pub(crate) headers: HashMap<String, String>,
    pub(crate) query_params: Vec<(String, String)>,
    pub(crate) body: Option<RequestBody>,
    pub(crate) bearer_token: Option<String>,
}

/// Request body content.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(serde_json::Value),
    Text(String),
    Bytes(Bytes),
    /// Multipart form upload (attachment endpoint).
    Multipart(Vec<MultipartFile>),
}

/// One file part of a multipart upload.
#[derive(Debug, Clone)]
pub struct MultipartFile {
    /// Form field name (the attachment endpoint expects `file`).
    pub name: String,
    /// File name sent with the part.
    pub filename: String,
    /// Optional content type for the part.
    pub content_type: Option<String>,
    /// Raw file bytes.
    pub data: Bytes,
}

impl MultipartFile {
    /// Create a file part with the default `file` field name.
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: "file".to_string(),
            filename: filename.into(),
            content_type: None,
            data: data.into(),
        }
    }

    /// Set the content type of the part.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

impl RequestBuilder {
    /// Create a new request builder.
    pub fn new(method: RequestMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            query_params: Vec::new(),
            body: None,
            bearer_token: None,
        }
    }

    /// Set the bearer token for authentication.
    pub fn bearer_auth(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Add a query parameter.
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.push((name.into(), value.into()));
        self
    }

    /// Set JSON body.
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        let value = serde_json::to_value(body)?;
        self.body = Some(RequestBody::Json(value));
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        Ok(self)
    }

    /// Set raw JSON body.
    pub fn json_value(mut self, body: serde_json::Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        self
    }

    /// Set text body.
    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Text(body.into()));
        self.headers
            .insert("Content-Type".to_string(), "text/plain".to_string());
        self
    }

    /// Set bytes body.
    pub fn bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(RequestBody::Bytes(body.into()));
        self
    }

    /// Set a multipart file-upload body. The Content-Type header is left to
    /// the HTTP layer so the boundary is generated correctly.
    pub fn multipart(mut self, files: Vec<MultipartFile>) -> Self {
        self.body = Some(RequestBody::Multipart(files));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let req = RequestBuilder::new(RequestMethod::Get, "https://host/api/app")
            .bearer_auth("token123")
            .header("X-Custom", "value")
            .query("query", "admin");

        assert_eq!(req.method, RequestMethod::Get);
        assert_eq!(req.url, "https://host/api/app");
        assert_eq!(req.bearer_token, Some("token123".to_string()));
        assert_eq!(req.headers.get("X-Custom"), Some(&"value".to_string()));
        assert_eq!(req.query_params.len(), 1);
    }

    #[test]
    fn test_json_body() {
        let data = serde_json::json!({"userName": "admin"});
        let req = RequestBuilder::new(RequestMethod::Post, "https://host/api/user/login")
            .json(&data)
            .unwrap();

        assert!(matches!(req.body, Some(RequestBody::Json(_))));
        assert_eq!(
            req.headers.get("Content-Type"),
            Some(&"application/json".to_string())
        );
    }

    #[test]
    fn test_multipart_body() {
        let req = RequestBuilder::new(RequestMethod::Post, "https://host/api/attachment")
            .multipart(vec![
                MultipartFile::new("report.txt", &b"contents"[..]).with_content_type("text/plain"),
            ]);

        match req.body {
            Some(RequestBody::Multipart(ref files)) => {
                assert_eq!(files.len(), 1);
                assert_eq!(files[0].name, "file");
                assert_eq!(files[0].filename, "report.txt");
                assert_eq!(files[0].content_type.as_deref(), Some("text/plain"));
            }
            _ => panic!("expected multipart body"),
        }
        // No explicit Content-Type; the boundary comes from the HTTP layer
        assert!(req.headers.get("Content-Type").is_none());
    }
}
