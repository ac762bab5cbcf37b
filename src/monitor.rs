use {
    crate::{
        notice::Notices,
        retention::{RetentionSweeper, SweepReport},
        rotating::{RotatingSink, RotationOutcome},
    },
    crossbeam_channel::{select, tick, Receiver},
    std::{
        sync::{
            atomic::{AtomicU64, Ordering},
            Arc,
        },
        time::Duration,
    },
};

/// Drives the two periodic file-lifecycle tasks.
///
/// The rotation tick and the retention tick are independent. They need no
/// mutual exclusion: the sweep only ever touches files the rotating sink has
/// already closed and renamed away.
pub struct Monitor {
    rotating: Arc<RotatingSink>,
    sweeper: RetentionSweeper,
    notices: Notices,
    rotation_interval: Duration,
    retention_interval: Duration,
    swept: Arc<AtomicU64>,
}

impl Monitor {
    pub fn new(
        rotating: Arc<RotatingSink>,
        sweeper: RetentionSweeper,
        notices: Notices,
        rotation_interval: Duration,
        retention_interval: Duration,
    ) -> Self {
        Monitor {
            rotating,
            sweeper,
            notices,
            rotation_interval,
            retention_interval,
            swept: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Counter of files deleted by sweeps, shared with the sink's stats.
    pub fn swept_counter(&self) -> Arc<AtomicU64> {
        self.swept.clone()
    }

    /// Probe the active file and rotate or reopen it if needed.
    pub fn rotation_tick(&self) -> Option<RotationOutcome> {
        match self.rotating.rotate_if_needed() {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                self.notices.warn(format!("rotation check failed: {err}"));
                None
            }
        }
    }

    /// Delete expired rotated files.
    pub fn retention_tick(&self) -> Option<SweepReport> {
        match self.sweeper.sweep() {
            Ok(report) => {
                self.swept.fetch_add(report.deleted.len() as u64, Ordering::Relaxed);
                Some(report)
            }
            Err(err) => {
                self.notices.warn(format!(
                    "retention sweep of {} failed: {err}",
                    self.sweeper.directory().display()
                ));
                None
            }
        }
    }

    /// Run both schedules until `shutdown` fires or disconnects.
    pub fn run(self, shutdown: Receiver<()>) {
        let rotation = tick(self.rotation_interval);
        let retention = tick(self.retention_interval);
        loop {
            select! {
                recv(rotation) -> _ => {
                    self.rotation_tick();
                }
                recv(retention) -> _ => {
                    self.retention_tick();
                }
                recv(shutdown) -> _ => break,
            }
        }
        tracing::debug!("monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::config::{RotationSize, SinkBuilder, TimeZone},
        chrono::Utc,
        std::{fs, thread},
        tempfile::TempDir,
    };

    fn monitor_in(dir: &TempDir, rotation: Duration) -> (Monitor, Arc<RotatingSink>, Notices) {
        let config = SinkBuilder::new(dir.path(), "app.log")
            .max_size(RotationSize::Bytes(16))
            .retention_days(1)
            .time_zone(TimeZone::UTC)
            .into_config()
            .unwrap();
        let notices = Notices::new();
        let rotating = Arc::new(RotatingSink::open(config.clone(), notices.clone()).unwrap());
        let sweeper = RetentionSweeper::new(&config, notices.clone()).unwrap();
        let monitor = Monitor::new(rotating.clone(), sweeper, notices.clone(), rotation, Duration::from_secs(3600));
        (monitor, rotating, notices)
    }

    #[test]
    fn rotation_tick_rotates_grown_file() {
        let dir = TempDir::new().unwrap();
        let (monitor, rotating, _) = monitor_in(&dir, Duration::from_secs(3600));
        rotating.write_batch(&[b"0123456789abcdefXYZ"]).unwrap();

        assert!(matches!(monitor.rotation_tick(), Some(RotationOutcome::Rotated(_))));
        assert_eq!(monitor.rotation_tick(), Some(RotationOutcome::Skipped));
    }

    #[test]
    fn failed_rotation_becomes_notice() {
        let dir = TempDir::new().unwrap();
        let config = SinkBuilder::new(dir.path(), "app.log")
            .max_size(RotationSize::Bytes(1))
            .timestamp_format("x".repeat(300))
            .into_config()
            .unwrap();
        let notices = Notices::new();
        let rotating = Arc::new(RotatingSink::open(config.clone(), notices.clone()).unwrap());
        let sweeper = RetentionSweeper::new(&config, notices.clone()).unwrap();
        let monitor = Monitor::new(rotating.clone(), sweeper, notices.clone(), Duration::from_secs(3600), Duration::from_secs(3600));
        rotating.write_batch(&[b"grown\n"]).unwrap();

        assert!(monitor.rotation_tick().is_none());
        let reported = notices.take();
        assert_eq!(reported.len(), 1);
        assert!(String::from_utf8_lossy(&reported[0]).contains("rotation check failed"));
        // Retried on the next tick.
        assert!(monitor.rotation_tick().is_none());
    }

    #[test]
    fn retention_tick_counts_deletions() {
        let dir = TempDir::new().unwrap();
        let (monitor, _, _) = monitor_in(&dir, Duration::from_secs(3600));
        let old = Utc::now() - chrono::Duration::days(3);
        fs::write(dir.path().join(format!("app.log.{}", old.format("%Y-%m-%d %H:%M:%S"))), b"x").unwrap();

        let report = monitor.retention_tick().unwrap();
        assert_eq!(report.deleted.len(), 1);
        assert_eq!(monitor.swept_counter().load(Ordering::Relaxed), 1);
    }

    #[test]
    fn failed_sweep_becomes_notice() {
        let dir = TempDir::new().unwrap();
        let (monitor, _, notices) = monitor_in(&dir, Duration::from_secs(3600));
        fs::remove_dir_all(dir.path()).unwrap();

        assert!(monitor.retention_tick().is_none());
        assert!(notices.take().iter().any(|n| String::from_utf8_lossy(n).contains("retention sweep")));
    }

    #[test]
    fn run_polls_until_shutdown() {
        let dir = TempDir::new().unwrap();
        let (monitor, rotating, _) = monitor_in(&dir, Duration::from_millis(5));
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let handle = thread::spawn(move || monitor.run(stop_rx));

        rotating.write_batch(&[b"more than sixteen bytes"]).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while rotating.rotations() == 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(rotating.rotations(), 1);

        drop(stop_tx);
        handle.join().unwrap();
    }
}
