//! Request descriptors produced by calls.

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Url};
use serde::Serialize;

use crate::errors::CallError;

/// Everything needed to issue one HTTP request.
///
/// The descriptor is immutable once built and can be turned into a fresh
/// `reqwest` request for every attempt the executor makes.
#[derive(Debug, Clone)]
pub struct CallRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl CallRequest {
    /// Creates a request descriptor, validating the URL.
    pub fn new(method: Method, url: &str) -> Result<Self, CallError> {
        let url = Url::parse(url).map_err(|e| CallError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        })
    }

    /// Creates a GET request descriptor.
    pub fn get(url: &str) -> Result<Self, CallError> {
        Self::new(Method::GET, url)
    }

    /// Creates a POST request descriptor.
    pub fn post(url: &str) -> Result<Self, CallError> {
        Self::new(Method::POST, url)
    }

    /// Appends a header.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, CallError> {
        let invalid = || CallError::InvalidHeader {
            name: name.to_string(),
        };
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        self.headers.append(header_name, header_value);
        Ok(self)
    }

    /// Sets `Accept: application/json`.
    #[must_use]
    pub fn accept_json(mut self) -> Self {
        self.headers
            .insert(ACCEPT, HeaderValue::from_static("application/json"));
        self
    }

    /// Sets a bearer `Authorization` header. The value is marked sensitive.
    pub fn with_bearer_token(mut self, token: &str) -> Result<Self, CallError> {
        let mut value =
            HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| CallError::InvalidHeader {
                name: AUTHORIZATION.to_string(),
            })?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(self)
    }

    /// Sets a raw body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `payload` as the JSON body.
    pub fn with_json<T: Serialize + ?Sized>(mut self, payload: &T) -> Result<Self, CallError> {
        let body = serde_json::to_vec(payload)?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(Bytes::from(body));
        Ok(self)
    }

    /// The HTTP method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// The target URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// The request headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The request body, if any.
    #[must_use]
    pub const fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub(crate) fn to_reqwest(&self, client: &reqwest::Client) -> reqwest::RequestBuilder {
        let builder = client
            .request(self.method.clone(), self.url.clone())
            .headers(self.headers.clone());
        match &self.body {
            Some(body) => builder.body(body.clone()),
            None => builder,
        }
    }
}
