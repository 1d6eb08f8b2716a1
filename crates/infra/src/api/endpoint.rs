//! Endpoint descriptor
//!
//! An [`Endpoint`] is an immutable description of one request: method,
//! target, headers, optional body and whether it needs a bearer token. The
//! pipeline never mutates the caller's descriptor; authorization produces an
//! adapted copy per attempt.

use bytes::Bytes;
use pawlink_domain::Priority;
use reqwest::Method;
use serde::Serialize;
use url::Url;

use super::errors::ApiError;

const AUTHORIZATION: &str = "Authorization";

/// Description of a single API request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    method: Method,
    target: String,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
    requires_auth: bool,
    priority: Priority,
}

impl Endpoint {
    /// Create an authenticated endpoint for `target`
    ///
    /// `target` is either a path relative to the client's base URL or an
    /// absolute `http(s)`/`ws(s)` URL.
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            headers: Vec::new(),
            body: None,
            requires_auth: true,
            priority: Priority::default(),
        }
    }

    pub fn get(target: impl Into<String>) -> Self {
        Self::new(Method::GET, target)
    }

    pub fn post(target: impl Into<String>) -> Self {
        Self::new(Method::POST, target)
    }

    pub fn put(target: impl Into<String>) -> Self {
        Self::new(Method::PUT, target)
    }

    pub fn patch(target: impl Into<String>) -> Self {
        Self::new(Method::PATCH, target)
    }

    pub fn delete(target: impl Into<String>) -> Self {
        Self::new(Method::DELETE, target)
    }

    /// Serialize `value` as the JSON body
    ///
    /// # Errors
    /// Returns `ApiError::ValidationFailed` naming `body` if serialization fails
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Result<Self, ApiError> {
        let encoded = serde_json::to_vec(value)
            .map_err(|e| ApiError::ValidationFailed(vec![format!("body: {e}")]))?;
        Ok(self.header("Content-Type", "application/json").body(encoded))
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Append a header, replacing any existing value with the same name
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    /// Mark the endpoint as not requiring authorization
    #[must_use]
    pub fn public(mut self) -> Self {
        self.requires_auth = false;
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Copy of this endpoint carrying `Authorization: Bearer <token>`
    #[must_use]
    pub fn with_bearer(&self, token: &str) -> Self {
        self.clone().header(AUTHORIZATION, format!("Bearer {token}"))
    }

    #[must_use]
    pub fn has_authorization(&self) -> bool {
        self.headers.iter().any(|(name, _)| name.eq_ignore_ascii_case(AUTHORIZATION))
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body_bytes(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub const fn requires_auth(&self) -> bool {
        self.requires_auth
    }

    pub const fn request_priority(&self) -> Priority {
        self.priority
    }

    /// Resolve the target against `base`
    ///
    /// # Errors
    /// Returns `ApiError::InvalidEndpoint` if the result is not a valid URL
    pub fn resolve(&self, base: &Url) -> Result<Url, ApiError> {
        let target = self.target.trim();
        if target.is_empty() {
            return Err(ApiError::InvalidEndpoint("empty endpoint target".into()));
        }

        if is_absolute(target) {
            return Url::parse(target)
                .map_err(|e| ApiError::InvalidEndpoint(format!("{target}: {e}")));
        }

        let joined = format!(
            "{}/{}",
            base.as_str().trim_end_matches('/'),
            target.trim_start_matches('/')
        );
        Url::parse(&joined).map_err(|e| ApiError::InvalidEndpoint(format!("{joined}: {e}")))
    }
}

fn is_absolute(target: &str) -> bool {
    ["http://", "https://", "ws://", "wss://"]
        .iter()
        .any(|scheme| target.get(..scheme.len()).is_some_and(|head| head.eq_ignore_ascii_case(scheme)))
}
