use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total commands executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "cefrs_queries_total";

/// Histogram: command latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "cefrs_query_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "cefrs_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "cefrs_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "cefrs_connections_rejected_total";

/// Gauge: number of active campuses (loaded engines).
pub const TENANTS_ACTIVE: &str = "cefrs_campuses_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "cefrs_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (operations per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "cefrs_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertUser { .. } => "insert_user",
        Command::DeleteUser { .. } => "delete_user",
        Command::InsertFacility { .. } => "insert_facility",
        Command::UpdateFacility { .. } => "update_facility",
        Command::DeleteFacility { .. } => "delete_facility",
        Command::InsertEquipment { .. } => "insert_equipment",
        Command::UpdateEquipment { .. } => "update_equipment",
        Command::DeleteEquipment { .. } => "delete_equipment",
        Command::InsertReservation { .. } => "insert_reservation",
        Command::InsertBorrowing { .. } => "insert_borrowing",
        Command::SetReservationStatus { .. } => "set_reservation_status",
        Command::SetBorrowingStatus { .. } => "set_borrowing_status",
        Command::MarkNotificationRead { .. } => "mark_notification_read",
        Command::MarkAllNotificationsRead { .. } => "mark_all_notifications_read",
        Command::SelectFacilities => "select_facilities",
        Command::SelectEquipment => "select_equipment",
        Command::SelectAvailability { .. } => "select_availability",
        Command::SelectSchedule { .. } => "select_schedule",
        Command::SelectFreeWindows { .. } => "select_free_windows",
        Command::SelectReservations { .. } => "select_reservations",
        Command::SelectBorrowings { .. } => "select_borrowings",
        Command::SelectNotifications { .. } => "select_notifications",
        Command::SelectFacilityUsage => "select_facility_usage",
        Command::SelectEquipmentUsage => "select_equipment_usage",
        Command::SelectDashboard { .. } => "select_dashboard",
        Command::Listen { .. } => "listen",
    }
}
