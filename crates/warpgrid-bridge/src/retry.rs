//! Whole-request retry.
//!
//! [`Retry`] replays the buffered request against the next stage when an
//! attempt answers with a gateway-class status (502, 503, 504). The
//! writer it hands down, [`RetryWriter`], holds each attempt's response
//! until the attempt ends and exposes [`RetryControl`], so a stage that
//! performs a non-idempotent call can switch replays off.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, Request, StatusCode};
use http_body_util::Full;
use tracing::{debug, warn};

use crate::error::BridgeResult;
use crate::handler::{BufferedRequest, Handler};
use crate::invoke::BoxFuture;
use crate::record::ResponseCodeRecorder;
use crate::writer::{ResponseWriter, RetryControl};

/// Whether a status means the attempt may be replayed.
pub fn is_retryable(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Decorator that holds one attempt's response.
///
/// Headers go straight to the wrapped writer. Status and body are kept
/// until [`finish`](Self::finish) decides between flushing them and
/// replaying the request.
pub struct RetryWriter<'a> {
    inner: &'a mut dyn ResponseWriter,
    should_retry: bool,
    status: Option<StatusCode>,
    body: BytesMut,
}

impl<'a> RetryWriter<'a> {
    pub fn new(inner: &'a mut dyn ResponseWriter, should_retry: bool) -> Self {
        Self {
            inner,
            should_retry,
            status: None,
            body: BytesMut::new(),
        }
    }

    pub fn should_retry(&self) -> bool {
        self.should_retry
    }

    /// End the attempt. Returns `true` when the request should be
    /// replayed; otherwise the held response is written through.
    pub fn finish(self) -> bool {
        if self.should_retry && self.status.is_some_and(is_retryable) {
            return true;
        }
        if let Some(status) = self.status {
            self.inner.write_status(status);
        }
        if !self.body.is_empty() {
            self.inner.write_body(&self.body);
        }
        false
    }
}

impl ResponseWriter for RetryWriter<'_> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_status(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.status = Some(status);
        }
    }

    fn write_body(&mut self, chunk: &[u8]) {
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
        self.body.extend_from_slice(chunk);
    }

    fn inner_mut(&mut self) -> Option<&mut dyn ResponseWriter> {
        Some(&mut self.inner)
    }

    fn retry_control(&mut self) -> Option<&mut dyn RetryControl> {
        Some(self)
    }
}

impl RetryControl for RetryWriter<'_> {
    fn disable_retries(&mut self) {
        if self.should_retry {
            debug!("request replay disabled");
        }
        self.should_retry = false;
    }
}

/// Pipeline stage that replays the request up to `attempts` times.
pub struct Retry {
    attempts: usize,
    next: Arc<dyn Handler>,
}

impl Retry {
    /// `attempts` counts the first try; values below 1 are treated as 1.
    pub fn new(attempts: usize, next: Arc<dyn Handler>) -> Self {
        Self {
            attempts: attempts.max(1),
            next,
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    async fn run(
        &self,
        request: BufferedRequest,
        writer: &mut dyn ResponseWriter,
        recorder: &dyn ResponseCodeRecorder,
    ) -> BridgeResult<()> {
        let (parts, body) = request.into_parts();
        let original_headers = writer.headers_mut().clone();

        for attempt in 1..=self.attempts {
            let replay = rebuild(&parts, body.clone());
            let mut attempt_writer = RetryWriter::new(&mut *writer, attempt < self.attempts);

            self.next.serve(replay, &mut attempt_writer, recorder).await?;

            if !attempt_writer.finish() {
                return Ok(());
            }
            warn!(attempt, uri = %parts.uri, "retrying request");
            *writer.headers_mut() = original_headers.clone();
        }
        Ok(())
    }
}

impl Handler for Retry {
    fn serve<'a>(
        &'a self,
        request: BufferedRequest,
        writer: &'a mut dyn ResponseWriter,
        recorder: &'a dyn ResponseCodeRecorder,
    ) -> BoxFuture<'a, BridgeResult<()>> {
        Box::pin(self.run(request, writer, recorder))
    }
}

fn rebuild(parts: &http::request::Parts, body: Full<Bytes>) -> BufferedRequest {
    let mut request = Request::new(body);
    *request.method_mut() = parts.method.clone();
    *request.uri_mut() = parts.uri.clone();
    *request.version_mut() = parts.version;
    *request.headers_mut() = parts.headers.clone();
    request
}
