//! Read-only view of the hosting framework's request
//!
//! The pipeline never owns a request; it borrows one through [`HttpRequest`]
//! and takes a [`RequestMeta`] snapshot when an event is built.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{AuthError, ExtractError};
use crate::flatten::{Field, FieldSet};

/// Shared handle to a request, cheap to clone into scopes and frames
pub type RequestHandle = Arc<dyn HttpRequest>;

/// The user attached to a request
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub authenticated: bool,
    pub id: Option<Value>,
}

impl Principal {
    pub fn authenticated(id: impl Into<Value>) -> Self {
        Self {
            authenticated: true,
            id: Some(id.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self {
            authenticated: false,
            id: None,
        }
    }
}

/// What the pipeline needs from a framework request
pub trait HttpRequest: Send + Sync {
    /// Path including the query string
    fn full_path(&self) -> String;

    fn host(&self) -> String;

    fn method(&self) -> String;

    fn query_params(&self) -> IndexMap<String, Field>;

    /// Parsed body parameters for DELETE/PUT/POST
    fn method_params(&self, method: &str) -> Result<IndexMap<String, Field>, ExtractError>;

    /// Header by its CGI-style name, e.g. `HTTP_USER_AGENT`
    fn header(&self, name: &str) -> Option<String>;

    /// `None` when the request was never classified
    fn is_ios(&self) -> Option<bool> {
        None
    }

    /// `None` when the request was never classified
    fn is_android(&self) -> Option<bool> {
        None
    }

    fn principal(&self) -> Result<Principal, AuthError>;
}

impl fmt::Debug for dyn HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HttpRequest({} {})", self.method(), self.full_path())
    }
}

/// Header subset carried on every snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct HeaderMeta {
    pub http_host: Option<String>,
    pub http_referer: Option<String>,
    pub http_user_agent: Option<String>,
    pub http_x_forwarded_for: Option<String>,
    pub client: String,
}

/// Snapshot of a request at event-construction time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestMeta {
    pub path: String,
    pub host: String,
    #[serde(rename = "GET")]
    pub query_params: FieldSet,
    pub method: String,
    #[serde(rename = "META")]
    pub headers: HeaderMeta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(rename = "DELETE", skip_serializing_if = "Option::is_none")]
    pub delete_params: Option<FieldSet>,
    #[serde(rename = "PUT", skip_serializing_if = "Option::is_none")]
    pub put_params: Option<FieldSet>,
    #[serde(rename = "POST", skip_serializing_if = "Option::is_none")]
    pub post_params: Option<FieldSet>,
}

impl RequestMeta {
    /// Project a request into its wire snapshot
    pub fn capture(request: &dyn HttpRequest, app_version: Option<&str>) -> Self {
        let method = request.method();

        let mut meta = Self {
            path: request.full_path(),
            host: request.host(),
            query_params: coerce_map(&request.query_params()),
            method: method.clone(),
            headers: HeaderMeta {
                http_host: request.header("HTTP_HOST"),
                http_referer: request.header("HTTP_REFERER"),
                http_user_agent: request.header("HTTP_USER_AGENT"),
                http_x_forwarded_for: request.header("HTTP_X_FORWARDED_FOR"),
                client: classify_client(request).to_string(),
            },
            version: app_version.map(str::to_string),
            delete_params: None,
            put_params: None,
            post_params: None,
        };

        let slot = match method.as_str() {
            "DELETE" => Some(&mut meta.delete_params),
            "PUT" => Some(&mut meta.put_params),
            "POST" => Some(&mut meta.post_params),
            _ => None,
        };

        if let Some(slot) = slot {
            match request.method_params(&method) {
                Ok(params) => *slot = Some(coerce_map(&params)),
                Err(e) => log::debug!("Omitting {} params from request snapshot: {}", method, e),
            }
        }

        meta
    }
}

fn coerce_map(map: &IndexMap<String, Field>) -> FieldSet {
    map.iter().map(|(k, v)| (k.clone(), v.coerce())).collect()
}

/// Client classification.
///
/// Android wins whenever the request carries an android flag at all, even a
/// false one, unless the iOS flag is set. Requests never classified are OTHER.
pub fn classify_client(request: &dyn HttpRequest) -> &'static str {
    if request.is_android().is_none() {
        return "OTHER";
    }
    if request.is_ios() == Some(true) { "ios" } else { "android" }
}

/// Owned request description, for framework adapters and tests
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    pub method: String,
    pub host: String,
    pub full_path: String,
    pub query_params: IndexMap<String, Field>,
    pub body_params: Option<IndexMap<String, Field>>,
    pub headers: HashMap<String, String>,
    pub is_ios: Option<bool>,
    pub is_android: Option<bool>,
    pub principal: Option<Principal>,
}

impl RequestInfo {
    pub fn new(method: &str, host: &str, full_path: &str) -> Self {
        Self {
            method: method.to_uppercase(),
            host: host.to_string(),
            full_path: full_path.to_string(),
            ..Default::default()
        }
    }

    pub fn with_query(mut self, key: &str, value: impl Into<Field>) -> Self {
        self.query_params.insert(key.to_string(), value.into());
        self
    }

    pub fn with_body_param(mut self, key: &str, value: impl Into<Field>) -> Self {
        self.body_params
            .get_or_insert_with(IndexMap::new)
            .insert(key.to_string(), value.into());
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_client_flags(mut self, is_ios: Option<bool>, is_android: Option<bool>) -> Self {
        self.is_ios = is_ios;
        self.is_android = is_android;
        self
    }

    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn into_handle(self) -> RequestHandle {
        Arc::new(self)
    }
}

impl HttpRequest for RequestInfo {
    fn full_path(&self) -> String {
        self.full_path.clone()
    }

    fn host(&self) -> String {
        self.host.clone()
    }

    fn method(&self) -> String {
        self.method.clone()
    }

    fn query_params(&self) -> IndexMap<String, Field> {
        self.query_params.clone()
    }

    fn method_params(&self, method: &str) -> Result<IndexMap<String, Field>, ExtractError> {
        self.body_params.clone().ok_or_else(|| ExtractError {
            method: method.to_string(),
            reason: "request body was not parsed".to_string(),
        })
    }

    fn header(&self, name: &str) -> Option<String> {
        self.headers.get(name).cloned()
    }

    fn is_ios(&self) -> Option<bool> {
        self.is_ios
    }

    fn is_android(&self) -> Option<bool> {
        self.is_android
    }

    fn principal(&self) -> Result<Principal, AuthError> {
        self.principal
            .clone()
            .ok_or_else(|| AuthError("no user attached to request".to_string()))
    }
}
