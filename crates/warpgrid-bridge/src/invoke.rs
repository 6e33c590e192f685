//! Function invocation.
//!
//! [`FunctionInvoker`] is the boundary to the function-execution service.
//! [`HttpInvoker`] speaks the Lambda-compatible invoke API over plain
//! HTTP. It is built once at startup and shared by every request.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tracing::debug;

use crate::error::{ConfigError, InvokeError};

pub const INVOCATION_TYPE_HEADER: &str = "x-amz-invocation-type";
pub const CLIENT_CONTEXT_HEADER: &str = "x-amz-client-context";
pub const FUNCTION_ERROR_HEADER: &str = "x-amz-function-error";
pub const ERROR_TYPE_HEADER: &str = "x-amzn-errortype";

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// How the service runs the function. The bridge only ever waits for
/// the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationType {
    /// Run synchronously and return the function's result.
    RequestResponse,
}

impl InvocationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvocationType::RequestResponse => "RequestResponse",
        }
    }
}

/// One call to a named function.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub function_name: String,
    pub invocation_type: InvocationType,
    pub payload: Bytes,
    /// Base64-encoded client context.
    pub client_context: String,
}

/// The function-execution service.
///
/// Implementations own transport, authentication and any retry policy.
/// The returned bytes are the function's raw result payload.
pub trait FunctionInvoker: Send + Sync {
    fn invoke(&self, invocation: Invocation) -> BoxFuture<'_, Result<Bytes, InvokeError>>;
}

/// Invokes functions through `POST /2015-03-31/functions/{name}/invocations`.
pub struct HttpInvoker {
    client: Client<HttpConnector, Full<Bytes>>,
    endpoint: String,
    timeout: Duration,
}

impl HttpInvoker {
    /// Create an invoker for the service at `endpoint` (e.g.
    /// `http://127.0.0.1:9001`).
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ConfigError> {
        let uri: Uri = endpoint
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("invoker endpoint {endpoint:?}: {e}")))?;
        if uri.scheme_str() != Some("http") || uri.authority().is_none() {
            return Err(ConfigError::Invalid(format!(
                "invoker endpoint {endpoint:?} must be an absolute http:// URI"
            )));
        }

        let client = Client::builder(TokioExecutor::new()).build_http();
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn invocation_uri(&self, function_name: &str) -> Result<Uri, InvokeError> {
        if !is_valid_function_name(function_name) {
            return Err(InvokeError::new(
                "InvalidParameterValueException",
                format!("invalid function name {function_name:?}"),
            ));
        }
        format!(
            "{}/2015-03-31/functions/{}/invocations",
            self.endpoint, function_name
        )
        .parse()
        .map_err(|e| {
            InvokeError::new(
                "InvalidParameterValueException",
                format!("invalid function name {function_name:?}: {e}"),
            )
        })
    }

    async fn send(&self, invocation: Invocation) -> Result<Bytes, InvokeError> {
        let uri = self.invocation_uri(&invocation.function_name)?;
        let request = http::Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(INVOCATION_TYPE_HEADER, invocation.invocation_type.as_str())
            .header(CLIENT_CONTEXT_HEADER, invocation.client_context)
            .body(Full::new(invocation.payload))
            .map_err(|e| InvokeError::new("InvalidParameterValueException", e.to_string()))?;

        let exchange = async {
            let response = self
                .client
                .request(request)
                .await
                .map_err(|e| InvokeError::connection(e.to_string()))?;
            let (parts, body) = response.into_parts();
            let body = body
                .collect()
                .await
                .map_err(|e| InvokeError::connection(e.to_string()))?
                .to_bytes();
            Ok::<_, InvokeError>((parts, body))
        };

        let (parts, body) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| {
                InvokeError::timeout(format!(
                    "invocation did not complete within {}ms",
                    self.timeout.as_millis()
                ))
            })??;

        if !parts.status.is_success() {
            return Err(error_from_response(parts.status, &parts.headers, &body));
        }

        if let Some(kind) = parts.headers.get(FUNCTION_ERROR_HEADER) {
            debug!(
                function = %invocation.function_name,
                kind = ?kind,
                "function reported an error payload"
            );
        }
        Ok(body)
    }
}

impl FunctionInvoker for HttpInvoker {
    fn invoke(&self, invocation: Invocation) -> BoxFuture<'_, Result<Bytes, InvokeError>> {
        Box::pin(self.send(invocation))
    }
}

/// A function name, optionally qualified (`name:alias`), is a single path
/// segment made of ASCII letters, digits, `-`, `_` and `:`.
fn is_valid_function_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':'))
}

/// Build an [`InvokeError`] from a non-2xx service response.
fn error_from_response(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> InvokeError {
    let document: Option<serde_json::Value> = serde_json::from_slice(body).ok();
    let field = |names: &[&str]| -> Option<String> {
        let doc = document.as_ref()?;
        names
            .iter()
            .find_map(|name| doc.get(*name).and_then(|v| v.as_str()))
            .map(str::to_string)
    };

    let code = headers
        .get(ERROR_TYPE_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(':').next())
        .map(str::to_string)
        .or_else(|| field(&["Type", "__type"]))
        .map(|code| {
            code.rsplit_once('#')
                .map(|(_, short)| short.to_string())
                .unwrap_or(code)
        })
        .filter(|code| !code.is_empty());

    let message = field(&["message", "Message"]).unwrap_or_else(|| {
        let text = String::from_utf8_lossy(body).trim().to_string();
        if text.is_empty() {
            status.canonical_reason().unwrap_or_default().to_string()
        } else {
            text
        }
    });

    match code {
        Some(code) => InvokeError { code, message },
        None => InvokeError::service(message),
    }
}
