//! Client context construction.
//!
//! A fixed set of request headers, plus the original method and request
//! target, travels to the function as a base64-encoded JSON document
//! nested under `"custom"`. The function sees it as its client context;
//! it never appears in the HTTP response.

use base64::prelude::*;
use http::{HeaderMap, Method, Uri};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::convert::uri_path_and_query;
use crate::error::ContextError;

pub const REQUEST_CONTEXT_HEADER: &str = "X-Request-Context";
pub const USER_CONTEXT_HEADER: &str = "X-User-Context";
pub const COOKIE_HEADER: &str = "Cookie";
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";
pub const ORIGINAL_METHOD_KEY: &str = "X-Original-Request-Method";
pub const ORIGINAL_URL_KEY: &str = "X-Original-Request-Url";

/// Upper bound the invoke API accepts for an encoded client context.
pub const DEFAULT_MAX_CONTEXT_BYTES: usize = 3583;

/// The document carried as the invocation's client context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientContext {
    pub custom: CustomContext,
}

/// The six forwarded values. Absent headers are empty strings.
///
/// Fields are declared in key order so the encoded document is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomContext {
    #[serde(rename = "Cookie")]
    pub cookie: String,
    #[serde(rename = "X-Auth-Token")]
    pub auth_token: String,
    #[serde(rename = "X-Original-Request-Method")]
    pub original_method: String,
    #[serde(rename = "X-Original-Request-Url")]
    pub original_url: String,
    #[serde(rename = "X-Request-Context")]
    pub request_context: String,
    #[serde(rename = "X-User-Context")]
    pub user_context: String,
}

impl ClientContext {
    /// Capture the forwarded values from an inbound request.
    pub fn from_parts(method: &Method, uri: &Uri, headers: &HeaderMap) -> Self {
        Self {
            custom: CustomContext {
                cookie: header_value(headers, COOKIE_HEADER),
                auth_token: header_value(headers, AUTH_TOKEN_HEADER),
                original_method: method.as_str().to_string(),
                original_url: uri_path_and_query(uri),
                request_context: header_value(headers, REQUEST_CONTEXT_HEADER),
                user_context: header_value(headers, USER_CONTEXT_HEADER),
            },
        }
    }

    /// Serialize to compact JSON and base64-encode it.
    pub fn encode(&self) -> Result<String, ContextError> {
        let json = serde_json::to_vec(self)?;
        Ok(BASE64_STANDARD.encode(json))
    }

    /// Like [`encode`](Self::encode), rejecting blobs longer than `limit`.
    pub fn encode_bounded(&self, limit: usize) -> Result<String, ContextError> {
        let blob = self.encode()?;
        if blob.len() > limit {
            return Err(ContextError::TooLarge {
                size: blob.len(),
                limit,
            });
        }
        debug!(size = blob.len(), "client context encoded");
        Ok(blob)
    }

    /// Decode a blob produced by [`encode`](Self::encode).
    pub fn decode(blob: &str) -> Result<Self, ContextError> {
        let json = BASE64_STANDARD
            .decode(blob)
            .map_err(|e| ContextError::Decode(e.to_string()))?;
        serde_json::from_slice(&json).map_err(|e| ContextError::Decode(e.to_string()))
    }
}

/// First value of `name`, or an empty string when absent.
fn header_value(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .unwrap_or_default()
}
