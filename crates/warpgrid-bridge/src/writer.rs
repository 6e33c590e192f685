//! Response writer chain.
//!
//! The bridge writes its response through a [`ResponseWriter`] that may
//! be wrapped by any number of decorators installed further up the
//! pipeline. Decorators expose the writer they delegate to through
//! [`ResponseWriter::inner_mut`], and a decorator able to replay the
//! whole request exposes [`RetryControl`] through
//! [`ResponseWriter::retry_control`]. [`suppress_retries`] walks that
//! chain without knowing its depth or the concrete layer types.

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, Response, StatusCode};
use http_body_util::Full;
use tracing::debug;

/// Sink for one HTTP response.
///
/// Writing body bytes before a status implies `200 OK`. Only the first
/// status written takes effect.
pub trait ResponseWriter: Send {
    /// Headers that will be sent with the response.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    fn write_status(&mut self, status: StatusCode);

    fn write_body(&mut self, chunk: &[u8]);

    /// The writer this layer delegates to, if it is a decorator.
    fn inner_mut(&mut self) -> Option<&mut dyn ResponseWriter> {
        None
    }

    /// The retry-control capability of this layer, if it has one.
    fn retry_control(&mut self) -> Option<&mut dyn RetryControl> {
        None
    }
}

/// Capability of a layer that can transparently replay the request.
pub trait RetryControl {
    /// Prevent any further replay of the current request. Idempotent.
    fn disable_retries(&mut self);
}

macro_rules! forward_writer {
    () => {
        fn headers_mut(&mut self) -> &mut HeaderMap {
            (**self).headers_mut()
        }

        fn write_status(&mut self, status: StatusCode) {
            (**self).write_status(status)
        }

        fn write_body(&mut self, chunk: &[u8]) {
            (**self).write_body(chunk)
        }

        fn inner_mut(&mut self) -> Option<&mut dyn ResponseWriter> {
            (**self).inner_mut()
        }

        fn retry_control(&mut self) -> Option<&mut dyn RetryControl> {
            (**self).retry_control()
        }
    };
}

// Pointers are not layers: they answer for the writer they point to.
impl<W: ResponseWriter + ?Sized> ResponseWriter for &mut W {
    forward_writer!();
}

impl<W: ResponseWriter + ?Sized> ResponseWriter for Box<W> {
    forward_writer!();
}

/// Disable retries on the innermost layer of `writer`'s chain that
/// exposes [`RetryControl`].
///
/// The chain is followed through [`ResponseWriter::inner_mut`] until a
/// layer without a delegate is reached; the capability is then looked up
/// from that layer back outwards and the first match is disabled. Returns
/// whether a capability was found. Finding none is not an error.
pub fn suppress_retries(writer: &mut dyn ResponseWriter) -> bool {
    suppress_at(writer, 0)
}

fn suppress_at(writer: &mut dyn ResponseWriter, depth: usize) -> bool {
    if let Some(inner) = writer.inner_mut() {
        if suppress_at(inner, depth + 1) {
            return true;
        }
    }
    match writer.retry_control() {
        Some(control) => {
            control.disable_retries();
            debug!(depth, "retries disabled");
            true
        }
        None => false,
    }
}

/// Innermost writer: collects the response in memory until the
/// connection task turns it into a hyper response.
#[derive(Debug, Default)]
pub struct BufferedWriter {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
}

impl BufferedWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status written so far, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Finish the response. An untouched writer yields `200 OK` with an
    /// empty body.
    pub fn into_response(self) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(self.body.freeze()));
        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = self.headers;
        response
    }
}

impl ResponseWriter for BufferedWriter {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_status(&mut self, status: StatusCode) {
        match self.status {
            Some(existing) => {
                debug!(%existing, ignored = %status, "superfluous status write");
            }
            None => self.status = Some(status),
        }
    }

    fn write_body(&mut self, chunk: &[u8]) {
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
        self.body.extend_from_slice(chunk);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Writer layers for exercising chain traversal.

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Decorator with no capability of its own.
    pub struct Passthrough<W> {
        pub inner: W,
    }

    impl<W: ResponseWriter> ResponseWriter for Passthrough<W> {
        fn headers_mut(&mut self) -> &mut HeaderMap {
            self.inner.headers_mut()
        }

        fn write_status(&mut self, status: StatusCode) {
            self.inner.write_status(status);
        }

        fn write_body(&mut self, chunk: &[u8]) {
            self.inner.write_body(chunk);
        }

        fn inner_mut(&mut self) -> Option<&mut dyn ResponseWriter> {
            Some(&mut self.inner)
        }
    }

    /// Decorator that counts `disable_retries` calls.
    pub struct CountingRetry<W> {
        pub inner: W,
        pub disabled: Arc<AtomicUsize>,
    }

    impl<W> CountingRetry<W> {
        pub fn new(inner: W) -> (Self, Arc<AtomicUsize>) {
            let disabled = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    inner,
                    disabled: disabled.clone(),
                },
                disabled,
            )
        }
    }

    impl<W: ResponseWriter> ResponseWriter for CountingRetry<W> {
        fn headers_mut(&mut self) -> &mut HeaderMap {
            self.inner.headers_mut()
        }

        fn write_status(&mut self, status: StatusCode) {
            self.inner.write_status(status);
        }

        fn write_body(&mut self, chunk: &[u8]) {
            self.inner.write_body(chunk);
        }

        fn inner_mut(&mut self) -> Option<&mut dyn ResponseWriter> {
            Some(&mut self.inner)
        }

        fn retry_control(&mut self) -> Option<&mut dyn RetryControl> {
            Some(self)
        }
    }

    impl<W> RetryControl for CountingRetry<W> {
        fn disable_retries(&mut self) {
            self.disabled.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Innermost writer that is itself retry-capable.
    #[derive(Default)]
    pub struct RetryingSink {
        pub buffer: BufferedWriter,
        pub disabled: usize,
    }

    impl ResponseWriter for RetryingSink {
        fn headers_mut(&mut self) -> &mut HeaderMap {
            self.buffer.headers_mut()
        }

        fn write_status(&mut self, status: StatusCode) {
            self.buffer.write_status(status);
        }

        fn write_body(&mut self, chunk: &[u8]) {
            self.buffer.write_body(chunk);
        }

        fn retry_control(&mut self) -> Option<&mut dyn RetryControl> {
            Some(self)
        }
    }

    impl RetryControl for RetryingSink {
        fn disable_retries(&mut self) {
            self.disabled += 1;
        }
    }

    /// Wrap `writer` in `depth` passthrough layers.
    pub fn wrap(writer: Box<dyn ResponseWriter>, depth: usize) -> Box<dyn ResponseWriter> {
        (0..depth).fold(writer, |w, _| {
            Box::new(Passthrough { inner: w }) as Box<dyn ResponseWriter>
        })
    }

    pub fn disabled_count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn buffered_writer_defaults_to_ok() {
        let mut w = BufferedWriter::new();
        w.write_body(b"hello");
        assert_eq!(w.status(), Some(StatusCode::OK));
        assert_eq!(w.body(), b"hello");
    }

    #[test]
    fn buffered_writer_keeps_first_status() {
        let mut w = BufferedWriter::new();
        w.write_status(StatusCode::CREATED);
        w.write_status(StatusCode::BAD_GATEWAY);
        assert_eq!(w.status(), Some(StatusCode::CREATED));
    }

    #[test]
    fn buffered_writer_into_response() {
        let mut w = BufferedWriter::new();
        w.headers_mut()
            .insert("content-type", "application/json".parse().unwrap());
        w.write_status(StatusCode::ACCEPTED);
        w.write_body(b"{}");

        let resp = w.into_response();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(resp.headers()["content-type"], "application/json");
    }

    #[test]
    fn untouched_writer_is_empty_ok() {
        let resp = BufferedWriter::new().into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn no_capability_anywhere_is_a_noop() {
        for depth in 0..5 {
            let mut chain = wrap(Box::new(BufferedWriter::new()), depth);
            assert!(!suppress_retries(&mut chain));
        }
    }

    #[test]
    fn capability_on_outermost_layer() {
        let (mut layer, disabled) = CountingRetry::new(BufferedWriter::new());
        assert!(suppress_retries(&mut layer));
        assert_eq!(disabled_count(&disabled), 1);
    }

    #[test]
    fn capability_found_at_any_depth() {
        for above in 0..4 {
            for below in 0..4 {
                let inner = wrap(Box::new(BufferedWriter::new()), below);
                let (layer, disabled) = CountingRetry::new(inner);
                let mut chain = wrap(Box::new(layer), above);

                assert!(suppress_retries(&mut chain));
                assert_eq!(
                    disabled_count(&disabled),
                    1,
                    "above={above} below={below}"
                );
            }
        }
    }

    #[test]
    fn capability_on_innermost_sink() {
        let mut sink = RetryingSink::default();
        {
            let mut chain = Passthrough {
                inner: Passthrough { inner: &mut sink },
            };
            assert!(suppress_retries(&mut chain));
        }
        assert_eq!(sink.disabled, 1);
    }

    #[test]
    fn innermost_capable_layer_wins() {
        let (inner, inner_count) = CountingRetry::new(BufferedWriter::new());
        let (mut outer, outer_count) = CountingRetry::new(Passthrough { inner });

        assert!(suppress_retries(&mut outer));
        assert_eq!(disabled_count(&inner_count), 1);
        assert_eq!(disabled_count(&outer_count), 0);
    }

    #[test]
    fn decorators_delegate_writes() {
        let mut chain = wrap(Box::new(BufferedWriter::new()), 3);
        chain.write_status(StatusCode::NOT_FOUND);
        chain.write_body(b"missing");
        chain.headers_mut().insert("x-a", "1".parse().unwrap());

        assert_eq!(chain.headers_mut()["x-a"], "1");
    }
}
