//! The invocation bridge.
//!
//! One inbound request becomes one synchronous function invocation,
//! and the invocation result becomes the response:
//!
//! ```text
//! request ──► client context + buffered body
//!                 │
//!                 ▼
//!          FunctionInvoker::invoke (RequestResponse)
//!                 │
//!                 ├── suppress_retries(writer)   always, after dispatch
//!                 │
//!                 ├── Err ──► 400, body = code + message
//!                 └── Ok  ──► status from payload.statusCode (default 200),
//!                             body = payload verbatim
//! ```

use std::sync::Arc;

use http::{Request, StatusCode};
use hyper::body::Body;
use tracing::{debug, error, warn};

use crate::context::{
    ClientContext, DEFAULT_MAX_CONTEXT_BYTES, REQUEST_CONTEXT_HEADER, USER_CONTEXT_HEADER,
};
use crate::convert::{function_name, read_body, status_from_payload};
use crate::error::{BridgeError, BridgeResult, PayloadStatusError};
use crate::invoke::{FunctionInvoker, Invocation, InvocationType};
use crate::record::ResponseCodeRecorder;
use crate::writer::{ResponseWriter, suppress_retries};

/// Default bound on a buffered request body (the synchronous payload limit).
pub const DEFAULT_MAX_BODY_BYTES: usize = 6 * 1024 * 1024;

/// Bridges HTTP requests to a function-execution service.
///
/// Holds no per-request state; one instance serves every request.
#[derive(Clone)]
pub struct InvocationBridge {
    invoker: Arc<dyn FunctionInvoker>,
    max_context_bytes: usize,
    max_body_bytes: usize,
}

impl InvocationBridge {
    pub fn new(invoker: Arc<dyn FunctionInvoker>) -> Self {
        Self {
            invoker,
            max_context_bytes: DEFAULT_MAX_CONTEXT_BYTES,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_context_bytes(mut self, limit: usize) -> Self {
        self.max_context_bytes = limit;
        self
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Handle one request, writing the response to `writer`.
    ///
    /// Errors are returned only for failures before dispatch; nothing has
    /// been written to `writer` in that case. Once the invocation has been
    /// dispatched, retries are disabled on `writer`'s chain and a response
    /// is always written, whatever the invocation outcome.
    pub async fn handle<B>(
        &self,
        request: Request<B>,
        writer: &mut dyn ResponseWriter,
        recorder: &dyn ResponseCodeRecorder,
    ) -> BridgeResult<()>
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (parts, body) = request.into_parts();

        let function_name =
            function_name(&parts.uri, &parts.headers).ok_or(BridgeError::MissingFunctionName)?;
        let client_context = ClientContext::from_parts(&parts.method, &parts.uri, &parts.headers)
            .encode_bounded(self.max_context_bytes)?;
        let payload = read_body(body, self.max_body_bytes).await?;

        debug!(
            function = %function_name,
            payload_len = payload.len(),
            "dispatching invocation"
        );
        let result = self
            .invoker
            .invoke(Invocation {
                function_name: function_name.clone(),
                invocation_type: InvocationType::RequestResponse,
                payload,
                client_context,
            })
            .await;

        // The call may already have had side effects.
        suppress_retries(writer);

        let headers = writer.headers_mut();
        headers.remove(USER_CONTEXT_HEADER);
        headers.remove(REQUEST_CONTEXT_HEADER);

        let payload = match result {
            Ok(payload) => payload,
            Err(err) => {
                warn!(
                    function = %function_name,
                    code = %err.code,
                    message = %err.message,
                    "invocation failed"
                );
                recorder.record_response_code(StatusCode::BAD_REQUEST);
                writer.write_status(StatusCode::BAD_REQUEST);
                writer.write_body(err.to_string().as_bytes());
                return Ok(());
            }
        };

        let status = match status_from_payload(&payload) {
            Ok(status) => status,
            Err(PayloadStatusError::Missing) => {
                debug!(function = %function_name, "result has no statusCode, using 200");
                StatusCode::OK
            }
            Err(e) => {
                error!(function = %function_name, error = %e, "failed to parse response status code");
                StatusCode::OK
            }
        };

        recorder.record_response_code(status);
        writer.write_status(status);
        writer.write_body(&payload);
        Ok(())
    }
}
