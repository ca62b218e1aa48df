//! Metric helpers for `wirepoll`.
//!
//! This module defines metric names and small helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! every helper is a no-op.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking exchanges that are reading, suspended, or
/// writing.
pub const EXCHANGES_ACTIVE: &str = "wirepoll_exchanges_active";
/// Name of the counter tracking JSON elements written to responses.
pub const ELEMENTS_WRITTEN: &str = "wirepoll_elements_written_total";
/// Name of the counter tracking failed exchanges.
pub const ERRORS_TOTAL: &str = "wirepoll_errors_total";

/// Kind of element written to a response array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Element {
    /// A message delivered from the session queue.
    Message,
    /// A reply to a request message.
    Reply,
}

impl Element {
    /// Label value used for this element kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Element::Message => "message",
            Element::Reply => "reply",
        }
    }
}

/// Increment the active exchanges gauge.
pub fn inc_exchanges() {
    #[cfg(feature = "metrics")]
    gauge!(EXCHANGES_ACTIVE).increment(1.0);
}

/// Decrement the active exchanges gauge.
pub fn dec_exchanges() {
    #[cfg(feature = "metrics")]
    gauge!(EXCHANGES_ACTIVE).decrement(1.0);
}

/// Record one element written to a response.
pub fn inc_elements(element: Element) {
    #[cfg(feature = "metrics")]
    counter!(ELEMENTS_WRITTEN, "kind" => element.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = element;
}

/// Record a failed exchange, labelled with the error kind.
pub fn inc_errors(kind: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(ERRORS_TOTAL, "kind" => kind).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = kind;
}

/// Install a Prometheus exporter listening on `addr`.
///
/// # Errors
///
/// Returns the exporter's build error, for example when the address is
/// already in use.
#[cfg(feature = "metrics")]
pub fn install_prometheus(
    addr: std::net::SocketAddr,
) -> Result<(), metrics_exporter_prometheus::BuildError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
}
