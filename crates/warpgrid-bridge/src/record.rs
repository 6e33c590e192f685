//! Response-code recording for request spans.

use http::StatusCode;

/// Span field that carries the final status of a request.
pub const STATUS_CODE_FIELD: &str = "http.status_code";

/// Receives the status the bridge resolved for a request. Fire and forget.
pub trait ResponseCodeRecorder: Send + Sync {
    fn record_response_code(&self, status: StatusCode);
}

/// Records into the span's `http.status_code` field. The span must
/// declare the field (as `tracing::field::Empty`) when it is created.
impl ResponseCodeRecorder for tracing::Span {
    fn record_response_code(&self, status: StatusCode) {
        self.record(STATUS_CODE_FIELD, status.as_u16());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_span_accepts_records() {
        let span = tracing::Span::none();
        span.record_response_code(StatusCode::CREATED);
        assert!(span.is_disabled());
    }

    #[test]
    fn span_with_field_accepts_records() {
        let span = tracing::info_span!("request", http.status_code = tracing::field::Empty);
        span.record_response_code(StatusCode::BAD_REQUEST);
    }
}
