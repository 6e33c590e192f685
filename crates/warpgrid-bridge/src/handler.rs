//! Pipeline handler abstraction.
//!
//! Every stage of the request pipeline takes a buffered request and the
//! writer handed down by the stage above it. Decorating stages wrap that
//! writer before passing it on.

use bytes::Bytes;
use http::Request;
use http_body_util::Full;

use crate::bridge::InvocationBridge;
use crate::error::BridgeResult;
use crate::invoke::BoxFuture;
use crate::record::ResponseCodeRecorder;
use crate::writer::ResponseWriter;

/// A request with its body already buffered, so it can be replayed.
pub type BufferedRequest = Request<Full<Bytes>>;

/// One stage of the request pipeline.
pub trait Handler: Send + Sync {
    fn serve<'a>(
        &'a self,
        request: BufferedRequest,
        writer: &'a mut dyn ResponseWriter,
        recorder: &'a dyn ResponseCodeRecorder,
    ) -> BoxFuture<'a, BridgeResult<()>>;
}

impl Handler for InvocationBridge {
    fn serve<'a>(
        &'a self,
        request: BufferedRequest,
        writer: &'a mut dyn ResponseWriter,
        recorder: &'a dyn ResponseCodeRecorder,
    ) -> BoxFuture<'a, BridgeResult<()>> {
        Box::pin(self.handle(request, writer, recorder))
    }
}
