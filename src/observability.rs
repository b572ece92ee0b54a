use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "cowork_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "cowork_query_duration_seconds";

// ── Workflow ────────────────────────────────────────────────────

/// Counter: reservation status changes. Labels: status.
pub const RESERVATION_TRANSITIONS_TOTAL: &str = "cowork_reservation_transitions_total";

/// Counter: operations refused or warned because of a confirmed overlap.
/// Labels: operation.
pub const CONFLICTS_TOTAL: &str = "cowork_conflicts_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "cowork_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "cowork_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "cowork_connections_rejected_total";

/// Counter: startup/auth failures.
pub const AUTH_FAILURES_TOTAL: &str = "cowork_auth_failures_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertRoom { .. } => "insert_room",
        Command::UpdateRoom { .. } => "update_room",
        Command::DeleteRoom { .. } => "delete_room",
        Command::SelectRooms { .. } => "select_rooms",
        Command::InsertReservation { force: false, .. } => "insert_reservation",
        Command::InsertReservation { force: true, .. } => "force_insert_reservation",
        Command::Approve { .. } => "approve",
        Command::Reject { .. } => "reject",
        Command::Extend { .. } => "extend",
        Command::UpdateReservation { .. } => "update_reservation",
        Command::DeleteReservation { .. } => "delete_reservation",
        Command::SelectReservations { .. } => "select_reservations",
        Command::SelectConflicts { .. } => "select_conflicts",
    }
}
