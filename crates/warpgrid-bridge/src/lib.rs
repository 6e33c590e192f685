//! warpgrid-bridge — HTTP to function invocation bridge.
//!
//! Sits in the request pipeline and turns each inbound HTTP request into
//! one synchronous invocation of a named function, then turns the
//! function's result back into the HTTP response.
//!
//! # Pipeline
//!
//! ```text
//! HTTP client
//!   │
//!   ▼
//! BridgeServer (hyper, one task per connection)
//!   │  body buffered up to limits.max_body_bytes
//!   ▼
//! Retry ── RetryWriter ──► BufferedWriter
//!   │
//!   ▼
//! InvocationBridge
//!   ├── client context: six forwarded values, JSON, base64
//!   ├── FunctionInvoker::invoke (RequestResponse)
//!   ├── suppress_retries: walk the writer chain, disable replay
//!   └── status from payload.statusCode, body = payload
//! ```
//!
//! The function name is the authority of the request URI. A failed
//! invocation becomes a `400` whose body is the error code followed by
//! its message.

pub mod bridge;
pub mod config;
pub mod context;
pub mod convert;
pub mod error;
pub mod handler;
pub mod invoke;
pub mod record;
pub mod retry;
pub mod server;
pub mod writer;

pub use bridge::InvocationBridge;
pub use config::BridgeConfig;
pub use context::ClientContext;
pub use error::{BridgeError, BridgeResult, ConfigError, ContextError, InvokeError};
pub use handler::{BufferedRequest, Handler};
pub use invoke::{FunctionInvoker, HttpInvoker, Invocation, InvocationType};
pub use record::ResponseCodeRecorder;
pub use retry::{Retry, RetryWriter};
pub use server::{BridgeServer, pipeline};
pub use writer::{BufferedWriter, ResponseWriter, RetryControl, suppress_retries};
