use {
    crate::{compress::Compression, config::RotationConfig, error::SinkError, notice::Notices},
    chrono::{
        format::{self, Parsed, StrftimeItems},
        DateTime, FixedOffset, TimeZone as _, Utc,
    },
    regex::Regex,
    std::{
        fs, io,
        path::{Path, PathBuf},
        time::Duration,
    },
};

/// Result of one sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Rotated files removed because they were older than the window.
    pub deleted: Vec<PathBuf>,
    /// Rotated files still inside the window.
    pub retained: usize,
    /// Names that looked rotated but whose stamp did not parse. Never deleted.
    pub unparseable: Vec<PathBuf>,
    /// Expired files that could not be removed; retried next sweep.
    pub failed: usize,
}

/// Deletes rotated files whose embedded stamp is older than the retention
/// window.
///
/// Only names of the form `<file_name>.<stamp>` (optionally followed by a
/// compression extension) are considered. A stamp that does not parse under
/// the configured format is reported and left alone.
#[derive(Clone)]
pub struct RetentionSweeper {
    directory: PathBuf,
    file_name: String,
    timestamp_format: String,
    time_zone: FixedOffset,
    retention: Duration,
    pattern: Regex,
    notices: Notices,
    remove: fn(&Path) -> io::Result<()>,
}

impl RetentionSweeper {
    pub fn new(config: &RotationConfig, notices: Notices) -> Result<Self, SinkError> {
        let extensions = Compression::known_extensions().join("|");
        let pattern = Regex::new(&format!(
            r"^{}\.(?P<stamp>.+?)(?:\.(?P<ext>{extensions}))?$",
            regex::escape(&config.file_name)
        ))
        .map_err(|err| SinkError::InvalidConfig(err.to_string()))?;
        Ok(RetentionSweeper {
            directory: config.directory.clone(),
            file_name: config.file_name.clone(),
            timestamp_format: config.timestamp_format.clone(),
            time_zone: config.time_zone,
            retention: config.retention,
            pattern,
            notices,
            remove: |path| fs::remove_file(path),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Sweep relative to the current time.
    pub fn sweep(&self) -> Result<SweepReport, SinkError> {
        self.sweep_at(Utc::now().with_timezone(&self.time_zone))
    }

    /// Sweep as if the current time were `now`.
    pub fn sweep_at(&self, now: DateTime<FixedOffset>) -> Result<SweepReport, SinkError> {
        let mut report = SweepReport::default();
        let max_age = chrono::Duration::from_std(self.retention).ok();

        for entry in fs::read_dir(&self.directory)?.flatten() {
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name == self.file_name {
                continue;
            }
            let Some(captures) = self.pattern.captures(name) else {
                continue;
            };
            let path = entry.path();

            let stamp = &captures["stamp"];
            let rotated_at = self.parse_stamp(stamp).or_else(|| {
                // The "extension" may belong to the stamp itself.
                captures
                    .name("ext")
                    .and_then(|ext| self.parse_stamp(&format!("{stamp}.{}", ext.as_str())))
            });
            let Some(rotated_at) = rotated_at else {
                self.notices.warn(format!(
                    "log file time format err: cannot parse '{}' in {} with '{}', skipping",
                    stamp,
                    path.display(),
                    self.timestamp_format
                ));
                report.unparseable.push(path);
                continue;
            };

            let expired = max_age.is_some_and(|max_age| now.signed_duration_since(rotated_at) > max_age);
            if !expired {
                report.retained += 1;
                continue;
            }
            match (self.remove)(&path) {
                Ok(()) => {
                    tracing::info!(path = %path.display(), "removed expired log file");
                    report.deleted.push(path);
                }
                Err(err) => {
                    let err = SinkError::RemoveFailed {
                        path: path.clone(),
                        error: err.to_string(),
                    };
                    self.notices.warn(err.to_string());
                    report.failed += 1;
                }
            }
        }

        tracing::debug!(
            directory = %self.directory.display(),
            deleted = report.deleted.len(),
            retained = report.retained,
            unparseable = report.unparseable.len(),
            failed = report.failed,
            "retention sweep finished"
        );
        Ok(report)
    }

    /// Read a rotation stamp back. Formats carrying an offset are honored;
    /// otherwise the stamp is taken in the configured zone. Time fields the
    /// format leaves out count as zero, so `%Y-%m-%d %H` keeps its hour and a
    /// date-only format resolves to midnight.
    fn parse_stamp(&self, stamp: &str) -> Option<DateTime<FixedOffset>> {
        let mut parsed = Parsed::new();
        format::parse(&mut parsed, stamp, StrftimeItems::new(&self.timestamp_format)).ok()?;
        if let Some(at) = self.resolve(&parsed) {
            return Some(at);
        }
        // Each setter fails only when the field was already parsed.
        let _ = parsed.set_hour(0);
        let _ = parsed.set_minute(0);
        let _ = parsed.set_second(0);
        self.resolve(&parsed)
    }

    fn resolve(&self, parsed: &Parsed) -> Option<DateTime<FixedOffset>> {
        if let Ok(at) = parsed.to_datetime() {
            return Some(at);
        }
        let naive = parsed.to_naive_datetime_with_offset(0).ok()?;
        self.time_zone.from_local_datetime(&naive).single()
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::config::{reference_layout_to_strftime, SinkBuilder, TimeZone},
        chrono::TimeZone as _,
        tempfile::TempDir,
    };

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    fn sweeper(dir: &TempDir, days: u64) -> (RetentionSweeper, Notices) {
        let config = SinkBuilder::new(dir.path(), "app.log")
            .retention_days(days)
            .time_zone(TimeZone::UTC)
            .into_config()
            .unwrap();
        let notices = Notices::new();
        (RetentionSweeper::new(&config, notices.clone()).unwrap(), notices)
    }

    fn now() -> DateTime<FixedOffset> {
        Utc::now().fixed_offset()
    }

    fn touch_rotated(dir: &TempDir, at: DateTime<FixedOffset>) -> PathBuf {
        let path = dir.path().join(format!("app.log.{}", at.format(FORMAT)));
        fs::write(&path, b"old").unwrap();
        path
    }

    #[test]
    fn deletes_only_expired_files() {
        let dir = TempDir::new().unwrap();
        let (sweeper, _) = sweeper(&dir, 30);
        let now = now();
        let expired = touch_rotated(&dir, now - chrono::Duration::days(31));
        let fresh = touch_rotated(&dir, now - chrono::Duration::days(29));
        fs::write(dir.path().join("app.log"), b"active").unwrap();

        let report = sweeper.sweep_at(now).unwrap();

        assert_eq!(report.deleted, vec![expired.clone()]);
        assert_eq!(report.retained, 1);
        assert!(!expired.exists());
        assert!(fresh.exists());
        assert!(dir.path().join("app.log").exists());
    }

    #[test]
    fn unparseable_names_are_kept_and_reported() {
        let dir = TempDir::new().unwrap();
        let (sweeper, notices) = sweeper(&dir, 1);
        let odd = dir.path().join("app.log.backup");
        fs::write(&odd, b"keep me").unwrap();

        let report = sweeper.sweep_at(now()).unwrap();

        assert_eq!(report.unparseable, vec![odd.clone()]);
        assert!(report.deleted.is_empty());
        assert!(odd.exists());
        assert_eq!(notices.take().len(), 1);
    }

    #[test]
    fn ignores_unrelated_names_and_directories() {
        let dir = TempDir::new().unwrap();
        let (sweeper, notices) = sweeper(&dir, 1);
        let long_ago = now() - chrono::Duration::days(400);
        let other = dir.path().join(format!("other.log.{}", long_ago.format(FORMAT)));
        fs::write(&other, b"x").unwrap();
        let prefixed = dir.path().join(format!("myapp.log.{}", long_ago.format(FORMAT)));
        fs::write(&prefixed, b"x").unwrap();
        fs::create_dir(dir.path().join(format!("app.log.{}", long_ago.format(FORMAT)))).unwrap();

        let report = sweeper.sweep_at(now()).unwrap();

        assert_eq!(report, SweepReport::default());
        assert!(other.exists());
        assert!(prefixed.exists());
        assert!(notices.is_empty());
    }

    #[test]
    fn compressed_archives_are_recognized() {
        let dir = TempDir::new().unwrap();
        let (sweeper, _) = sweeper(&dir, 7);
        let at = now() - chrono::Duration::days(8);
        let gz = dir.path().join(format!("app.log.{}.gz", at.format(FORMAT)));
        let xz = dir.path().join(format!("app.log.{}.xz", at.format(FORMAT)));
        fs::write(&gz, b"x").unwrap();
        fs::write(&xz, b"x").unwrap();

        let report = sweeper.sweep_at(now()).unwrap();

        assert_eq!(report.deleted.len(), 2);
        assert!(!gz.exists() && !xz.exists());
    }

    #[test]
    fn date_only_formats_resolve_to_midnight() {
        let dir = TempDir::new().unwrap();
        let config = SinkBuilder::new(dir.path(), "app.log")
            .timestamp_format("%Y%m%d")
            .retention_days(2)
            .time_zone(TimeZone::UTC)
            .into_config()
            .unwrap();
        let sweeper = RetentionSweeper::new(&config, Notices::new()).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap().fixed_offset();
        fs::write(dir.path().join("app.log.20260307"), b"x").unwrap();
        fs::write(dir.path().join("app.log.20260309"), b"x").unwrap();

        let report = sweeper.sweep_at(now).unwrap();

        assert_eq!(report.deleted, vec![dir.path().join("app.log.20260307")]);
        assert_eq!(report.retained, 1);
    }

    #[test]
    fn hourly_formats_keep_the_hour() {
        let dir = TempDir::new().unwrap();
        let config = SinkBuilder::new(dir.path(), "app.log")
            .timestamp_format(reference_layout_to_strftime("2006-01-02 15"))
            .retention_days(1)
            .time_zone(TimeZone::UTC)
            .into_config()
            .unwrap();
        let sweeper = RetentionSweeper::new(&config, Notices::new()).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 11, 12, 0, 0).unwrap().fixed_offset();
        let recent = dir.path().join("app.log.2026-03-10 23");
        let expired = dir.path().join("app.log.2026-03-10 11");
        fs::write(&recent, b"x").unwrap();
        fs::write(&expired, b"x").unwrap();

        let report = sweeper.sweep_at(now).unwrap();

        assert_eq!(report.deleted, vec![expired]);
        assert_eq!(report.retained, 1);
        assert!(recent.exists());
    }

    #[test]
    fn offset_in_stamp_is_honored() {
        let dir = TempDir::new().unwrap();
        let config = SinkBuilder::new(dir.path(), "app.log")
            .timestamp_format("%Y-%m-%dT%H%z")
            .retention_days(1)
            .time_zone(TimeZone::UTC)
            .into_config()
            .unwrap();
        let sweeper = RetentionSweeper::new(&config, Notices::new()).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 11, 12, 0, 0).unwrap().fixed_offset();
        // 2026-03-11 08:00 at +0800 is 2026-03-11 00:00 UTC, 12h old.
        let stamped = dir.path().join("app.log.2026-03-11T08+0800");
        fs::write(&stamped, b"x").unwrap();

        let report = sweeper.sweep_at(now).unwrap();

        assert!(report.deleted.is_empty());
        assert_eq!(report.retained, 1);
    }

    #[test]
    fn failed_removal_is_counted_and_reported() {
        let dir = TempDir::new().unwrap();
        let (mut sweeper, notices) = sweeper(&dir, 1);
        sweeper.remove = |_| Err(io::Error::from(io::ErrorKind::PermissionDenied));
        let stuck = touch_rotated(&dir, now() - chrono::Duration::days(5));

        let report = sweeper.sweep_at(now()).unwrap();

        assert_eq!(report.failed, 1);
        assert!(report.deleted.is_empty());
        assert!(stuck.exists());
        let reported = notices.take();
        assert_eq!(reported.len(), 1);
        assert!(String::from_utf8_lossy(&reported[0]).contains("Failed to remove file"));
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let config = SinkBuilder::new(dir.path().join("gone"), "app.log").into_config().unwrap();
        let sweeper = RetentionSweeper::new(&config, Notices::new()).unwrap();
        assert!(matches!(sweeper.sweep(), Err(SinkError::FileIOError(_))));
    }
}
