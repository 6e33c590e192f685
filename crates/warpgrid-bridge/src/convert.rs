//! Translation helpers between the inbound HTTP request, the invocation,
//! and the outbound response.

use bytes::Bytes;
use http::header::HOST;
use http::{HeaderMap, StatusCode, Uri};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Body;

use crate::error::{BridgeError, BridgeResult, PayloadStatusError};

/// JSON field of the result payload that carries the HTTP status.
pub const STATUS_CODE_FIELD: &str = "statusCode";

/// Extract the path and query from a URI.
pub fn uri_path_and_query(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string())
}

fn without_userinfo(authority: &str) -> &str {
    authority
        .rsplit_once('@')
        .map_or(authority, |(_, host)| host)
}

/// Name of the function a request targets: the URI authority without
/// userinfo, falling back to the `Host` header for origin-form request targets.
///
/// Userinfo is dropped. A qualified name such as `my-func:live` keeps its
/// qualifier.
pub fn function_name(uri: &Uri, headers: &HeaderMap) -> Option<String> {
    if let Some(authority) = uri.authority() {
        return Some(without_userinfo(authority.as_str()).to_string());
    }
    headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(|h| without_userinfo(h.trim()))
        .filter(|h| !h.is_empty())
        .map(str::to_string)
}

/// Buffer a whole request body, failing once it exceeds `limit` bytes.
pub async fn read_body<B>(body: B, limit: usize) -> BridgeResult<Bytes>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(BridgeError::BodyTooLarge { limit })
        }
        Err(e) => Err(BridgeError::BodyRead(e.to_string())),
    }
}

/// Read the `statusCode` field from a function result payload.
pub fn status_from_payload(payload: &[u8]) -> Result<StatusCode, PayloadStatusError> {
    let object: serde_json::Map<String, serde_json::Value> =
        serde_json::from_slice(payload).map_err(PayloadStatusError::NotAnObject)?;
    let value = object
        .get(STATUS_CODE_FIELD)
        .ok_or(PayloadStatusError::Missing)?;
    let code = value
        .as_i64()
        .ok_or_else(|| PayloadStatusError::NotAnInteger(value.to_string()))?;
    u16::try_from(code)
        .ok()
        .and_then(|c| StatusCode::from_u16(c).ok())
        .ok_or(PayloadStatusError::OutOfRange(code))
}
