//! Broker instrumentation.
//!
//! Counters, gauges, and histograms for the session/timer domain,
//! exported in Prometheus format. Socket accounting is RAII: the
//! transport task opens a [`SocketGauge`] on accept, and dropping it
//! (however the task ends) closes the books and records how long the
//! connection lived. Rejected frames are labelled by the codec's own
//! error taxonomy so malformed traffic is visible by kind.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

use cadence_protocol::CodecError;

/// Metric names.
pub mod names {
    pub const SOCKETS_OPENED_TOTAL: &str = "cadence_sockets_opened_total";
    pub const SOCKETS_ACTIVE: &str = "cadence_sockets_active";
    pub const SOCKET_LIFETIME_SECONDS: &str = "cadence_socket_lifetime_seconds";
    pub const SOCKET_ERRORS_TOTAL: &str = "cadence_socket_errors_total";
    pub const SESSIONS_ACTIVE: &str = "cadence_sessions_active";
    pub const SESSIONS_REAPED_TOTAL: &str = "cadence_sessions_reaped_total";
    pub const USERS_REAPED_TOTAL: &str = "cadence_users_reaped_total";
    pub const FRAMES_TOTAL: &str = "cadence_frames_total";
    pub const FRAME_BYTES_TOTAL: &str = "cadence_frame_bytes_total";
    pub const FRAMES_REJECTED_TOTAL: &str = "cadence_frames_rejected_total";
    pub const DISPATCH_SECONDS: &str = "cadence_dispatch_seconds";
    pub const HEARTBEAT_DROPS_TOTAL: &str = "cadence_heartbeat_drops_total";
}

/// Register metric descriptions with the recorder.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::SOCKETS_OPENED_TOTAL,
        "Sockets accepted since server start"
    );
    metrics::describe_gauge!(names::SOCKETS_ACTIVE, "Currently open sockets");
    metrics::describe_histogram!(
        names::SOCKET_LIFETIME_SECONDS,
        "Socket lifetime from accept to close"
    );
    metrics::describe_counter!(names::SOCKET_ERRORS_TOTAL, "Transport-level socket failures");
    metrics::describe_gauge!(names::SESSIONS_ACTIVE, "Currently live sessions");
    metrics::describe_counter!(
        names::SESSIONS_REAPED_TOTAL,
        "Empty sessions deleted by the cleanup ticker"
    );
    metrics::describe_counter!(
        names::USERS_REAPED_TOTAL,
        "Offline users removed by the cleanup ticker"
    );
    metrics::describe_counter!(names::FRAMES_TOTAL, "Text frames by direction");
    metrics::describe_counter!(names::FRAME_BYTES_TOTAL, "Text frame bytes by direction");
    metrics::describe_counter!(
        names::FRAMES_REJECTED_TOTAL,
        "Inbound frames refused by the codec, by kind"
    );
    metrics::describe_histogram!(
        names::DISPATCH_SECONDS,
        "Time from frame receipt to handler completion"
    );
    metrics::describe_counter!(
        names::HEARTBEAT_DROPS_TOTAL,
        "Connections terminated for a missed liveness cycle"
    );

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// An inbound text frame arrived.
pub fn frame_received(bytes: usize) {
    frame(bytes, "inbound");
}

/// An outbound text frame left the broker.
pub fn frame_sent(bytes: usize) {
    frame(bytes, "outbound");
}

fn frame(bytes: usize, direction: &'static str) {
    counter!(names::FRAMES_TOTAL, "direction" => direction).increment(1);
    counter!(names::FRAME_BYTES_TOTAL, "direction" => direction).increment(bytes as u64);
}

/// The codec refused an inbound frame.
pub fn frame_rejected(error: &CodecError) {
    let kind = match error {
        CodecError::InvalidFormat => "format",
        CodecError::UnknownType => "unknown_type",
        CodecError::Invalid(_) => "validation",
        CodecError::Encode(_) => "encode",
    };
    counter!(names::FRAMES_REJECTED_TOTAL, "kind" => kind).increment(1);
}

/// Record the time spent handling one inbound frame.
pub fn dispatch_complete(started: Instant) {
    histogram!(names::DISPATCH_SECONDS).record(started.elapsed().as_secs_f64());
}

/// A transport-level read or write failed.
pub fn socket_error() {
    counter!(names::SOCKET_ERRORS_TOTAL).increment(1);
}

/// A connection was terminated for missing a liveness cycle.
pub fn heartbeat_drop() {
    counter!(names::HEARTBEAT_DROPS_TOTAL).increment(1);
}

/// Publish the current live-session count.
pub fn sessions_active(count: usize) {
    gauge!(names::SESSIONS_ACTIVE).set(count as f64);
}

/// The cleanup ticker removed an offline user.
pub fn user_reaped() {
    counter!(names::USERS_REAPED_TOTAL).increment(1);
}

/// The cleanup ticker deleted an empty session.
pub fn session_reaped() {
    counter!(names::SESSIONS_REAPED_TOTAL).increment(1);
}

/// RAII socket accounting: opening bumps the live gauge, dropping
/// releases it and records the connection's lifetime.
pub struct SocketGauge {
    opened_at: Instant,
}

impl SocketGauge {
    /// Account for a newly accepted socket.
    #[must_use]
    pub fn open() -> Self {
        counter!(names::SOCKETS_OPENED_TOTAL).increment(1);
        gauge!(names::SOCKETS_ACTIVE).increment(1.0);
        Self {
            opened_at: Instant::now(),
        }
    }
}

impl Drop for SocketGauge {
    fn drop(&mut self) {
        gauge!(names::SOCKETS_ACTIVE).decrement(1.0);
        histogram!(names::SOCKET_LIFETIME_SECONDS).record(self.opened_at.elapsed().as_secs_f64());
    }
}
