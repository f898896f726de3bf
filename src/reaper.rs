use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::engine::Engine;
use crate::model::Day;

fn current_day() -> Day {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
        / 86_400_000
}

/// One pass of the time-based transitions: BORROWED past its expected
/// return day becomes OVERDUE, APPROVED reservations past their date
/// become COMPLETED.
pub async fn sweep_once(engine: &Engine, today: Day) {
    for id in engine.collect_overdue(today) {
        match engine.mark_overdue(id).await {
            Ok(()) => info!("marked borrowing {id} overdue"),
            // may have been returned between collect and transition
            Err(e) => debug!("sweeper skip {id}: {e}"),
        }
    }
    for id in engine.collect_elapsed(today) {
        match engine.complete_reservation(id).await {
            Ok(()) => info!("completed reservation {id}"),
            Err(e) => debug!("sweeper skip {id}: {e}"),
        }
    }
}

/// Background task that periodically applies the time-based transitions.
pub async fn run_sweeper(engine: Arc<Engine>) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        sweep_once(&engine, current_day()).await;
    }
}

/// Background task that compacts the WAL once enough appends accumulate.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends >= threshold {
            match engine.compact_wal().await {
                Ok(()) => info!("compacted WAL after {appends} appends"),
                Err(e) => tracing::warn!("WAL compaction failed: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use crate::notify::NotifyHub;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("cefrs_test_reaper");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn sweep_marks_overdue_and_completed() {
        let path = test_wal_path("sweep_once.wal");
        let notify = Arc::new(NotifyHub::new());
        let engine = Arc::new(Engine::new(path, notify).unwrap());

        let student = Ulid::new();
        let admin = Ulid::new();
        let hall = Ulid::new();
        let camera = Ulid::new();
        engine
            .register_user(student, "Dana Reyes".into(), Role::Student)
            .await
            .unwrap();
        engine
            .register_user(admin, "Facilities Office".into(), Role::Admin)
            .await
            .unwrap();
        engine
            .add_facility(hall, "Hall A".into(), FacilityKind::Auditorium, "Main".into(), 1, 200)
            .await
            .unwrap();
        engine
            .add_equipment(camera, "Camera".into(), EquipmentCategory::Video, 2)
            .await
            .unwrap();

        let rid = Ulid::new();
        engine
            .request_reservation(rid, hall, student, TimeSlot::new(100, 540, 600), "talk".into())
            .await
            .unwrap();
        engine
            .set_reservation_status(rid, admin, ReservationStatus::Approved, None)
            .await
            .unwrap();

        let bid = Ulid::new();
        engine
            .request_borrowing(bid, camera, student, 1, DayRange::new(100, 105), "shoot".into())
            .await
            .unwrap();
        engine
            .set_borrowing_status(bid, admin, BorrowingStatus::Approved, None, None)
            .await
            .unwrap();
        engine
            .set_borrowing_status(bid, admin, BorrowingStatus::Borrowed, None, None)
            .await
            .unwrap();

        // nothing due on the deadline day itself
        sweep_once(&engine, 105).await;
        assert!(engine.collect_overdue(105).is_empty());

        sweep_once(&engine, 106).await;

        let es = engine.get_equipment(&camera).unwrap();
        let guard = es.read().await;
        assert_eq!(guard.borrowing(bid).unwrap().status, BorrowingStatus::Overdue);
        drop(guard);

        let fs = engine.get_facility(&hall).unwrap();
        let guard = fs.read().await;
        assert_eq!(
            guard.reservation(rid).unwrap().status,
            ReservationStatus::Completed
        );
        drop(guard);

        // a second sweep finds nothing new to do
        sweep_once(&engine, 106).await;
        assert!(engine.collect_overdue(106).is_empty());
        assert!(engine.collect_elapsed(106).is_empty());
    }
}
