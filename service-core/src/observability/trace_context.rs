//! Correlation headers for outgoing HTTP calls.
//!
//! Relayed requests carry the caller's `x-request-id` and, when span export is
//! enabled, a W3C `traceparent`/`tracestate` pair so the upstream can be
//! joined with our spans. See https://www.w3.org/TR/trace-context/

use opentelemetry::propagation::{Injector, TextMapPropagator};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

pub const TRACEPARENT_HEADER: &str = "traceparent";
pub const TRACESTATE_HEADER: &str = "tracestate";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

struct HeaderInjector<'a>(&'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let Ok(name) = HeaderName::from_bytes(key.as_bytes())
            && let Ok(value) = HeaderValue::from_str(&value)
        {
            self.0.insert(name, value);
        }
    }
}

/// Headers to attach to a request made on behalf of the current span.
///
/// `traceparent` is only present when the span has a sampled OpenTelemetry
/// context, i.e. never with OTLP export disabled. A request id that is not a
/// valid header value is dropped.
pub fn outgoing_headers(request_id: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();

    let context = Span::current().context();
    TraceContextPropagator::new().inject_context(&context, &mut HeaderInjector(&mut headers));

    if let Some(id) = request_id
        && let Ok(value) = HeaderValue::from_str(id)
    {
        headers.insert(REQUEST_ID_HEADER, value);
    }

    headers
}

pub fn request_id_from(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_trace_headers_without_active_span() {
        let headers = outgoing_headers(None);
        assert!(headers.is_empty());
    }

    #[test]
    fn request_id_is_forwarded() {
        let headers = outgoing_headers(Some("upload-7"));

        assert!(headers.get(TRACEPARENT_HEADER).is_none());
        assert!(headers.get(TRACESTATE_HEADER).is_none());
        assert_eq!(request_id_from(&headers), Some("upload-7"));
    }

    #[test]
    fn invalid_request_id_is_dropped() {
        let headers = outgoing_headers(Some("bad\nvalue"));
        assert!(headers.is_empty());
    }

    #[test]
    fn injector_writes_lowercase_header() {
        let mut headers = HeaderMap::new();
        HeaderInjector(&mut headers).set("traceparent", "00-abc-def-01".to_string());

        assert_eq!(headers[TRACEPARENT_HEADER], "00-abc-def-01");
    }
}
