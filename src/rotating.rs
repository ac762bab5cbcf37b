use {
    crate::{
        compress::{compress_file, Compression},
        config::RotationConfig,
        error::SinkError,
        notice::Notices,
        probe,
    },
    chrono::{DateTime, FixedOffset, Utc},
    parking_lot::Mutex,
    std::{
        fs::{self, Permissions},
        io::{self, Write as _},
        path::{Path, PathBuf},
        sync::atomic::{AtomicU64, Ordering},
        thread::{self, JoinHandle},
    },
};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// One open descriptor plus the path it was opened against.
///
/// Owned exclusively by [`RotatingSink`] and only ever reached through its
/// slot lock.
#[derive(Debug)]
pub struct ActiveFile {
    file: fs::File,
    path: PathBuf,
}

impl ActiveFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }

    /// Flush and close. Errors are returned for reporting only; the
    /// descriptor is gone either way.
    fn close(mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.sync_all()
    }
}

/// What a rotation check did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationOutcome {
    /// The file exists and is below the threshold.
    Skipped,
    /// The file had been removed externally and was recreated.
    Reopened,
    /// The file was renamed to the contained path and a fresh one opened.
    Rotated(PathBuf),
    /// The rotated name for this instant already exists; try again later.
    Deferred(PathBuf),
}

/// Owner of the active log file.
///
/// The drain and the rotation check both go through the same slot lock: a
/// batch is written entirely to one descriptor, and close, rename, reopen
/// happen with no write in between.
pub struct RotatingSink {
    config: RotationConfig,
    path: PathBuf,
    slot: Mutex<Option<ActiveFile>>,
    notices: Notices,
    rotations: AtomicU64,
    compressions: Mutex<Vec<JoinHandle<()>>>,
}

impl RotatingSink {
    /// Open the active file, retrying with backoff.
    ///
    /// Failing here is fatal for the caller: nothing would ever be logged.
    pub fn open(config: RotationConfig, notices: Notices) -> Result<RotatingSink, SinkError> {
        let path = config.path();
        let sink = RotatingSink {
            config,
            path,
            slot: Mutex::new(None),
            notices,
            rotations: AtomicU64::new(0),
            compressions: Mutex::new(Vec::new()),
        };
        {
            let mut slot = sink.slot.lock();
            sink.ensure_open(&mut slot)?;
        }
        Ok(sink)
    }

    /// Path of the active file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of renames performed so far.
    pub fn rotations(&self) -> u64 {
        self.rotations.load(Ordering::Relaxed)
    }

    /// Make sure the slot holds an open descriptor, opening one if needed.
    fn ensure_open<'a>(&self, slot: &'a mut Option<ActiveFile>) -> Result<&'a mut ActiveFile, SinkError> {
        let active = match slot.take() {
            Some(active) => active,
            None => self.open_with_retries()?,
        };
        Ok(slot.insert(active))
    }

    fn open_with_retries(&self) -> Result<ActiveFile, SinkError> {
        let attempts = self.config.open_retries.max(1);
        let mut backoff = self.config.open_backoff;
        let mut attempt = 1;
        loop {
            match create_log_file(&self.path, self.config.file_mode) {
                Ok(file) => {
                    tracing::debug!(path = %self.path.display(), attempt, "opened log file");
                    return Ok(ActiveFile {
                        file,
                        path: self.path.clone(),
                    });
                }
                Err(err) if attempt < attempts => {
                    tracing::warn!(
                        path = %self.path.display(),
                        attempt,
                        max_attempts = attempts,
                        error = %err,
                        "failed to open log file, retrying"
                    );
                    thread::sleep(backoff);
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                Err(err) => {
                    return Err(SinkError::OpenFailed {
                        path: self.path.clone(),
                        attempts,
                        source: io::Error::other(err.to_string()),
                    });
                }
            }
        }
    }

    /// Write one batch under the slot lock.
    ///
    /// If no descriptor can be opened the batch is lost and the error is
    /// returned so the caller can report it.
    pub fn write_batch<B: AsRef<[u8]>>(&self, records: &[B]) -> Result<(), SinkError> {
        let mut slot = self.slot.lock();
        let active = self.ensure_open(&mut slot)?;
        for record in records {
            active.write_all(record.as_ref())?;
        }
        active.flush()?;
        Ok(())
    }

    /// Rotate if the active file reached the size threshold, or reopen it if
    /// it has been removed. Calling this again without new growth is a no-op.
    pub fn rotate_if_needed(&self) -> Result<RotationOutcome, SinkError> {
        let mut slot = self.slot.lock();
        if !probe::exists(&self.path) {
            return self.reopen_missing(&mut slot);
        }
        if probe::size(&self.path) < self.config.max_size {
            return Ok(RotationOutcome::Skipped);
        }
        self.rotate_locked(&mut slot, self.now())
    }

    /// Rotate regardless of size. A missing file is simply recreated.
    pub fn rotate(&self) -> Result<RotationOutcome, SinkError> {
        let mut slot = self.slot.lock();
        if !probe::exists(&self.path) {
            return self.reopen_missing(&mut slot);
        }
        self.rotate_locked(&mut slot, self.now())
    }

    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.config.time_zone)
    }

    /// Name the active file is renamed to when rotated at `at`.
    pub fn rotated_path(&self, at: DateTime<FixedOffset>) -> PathBuf {
        PathBuf::from(format!(
            "{}.{}",
            self.path.to_string_lossy(),
            at.format(&self.config.timestamp_format)
        ))
    }

    fn reopen_missing(&self, slot: &mut Option<ActiveFile>) -> Result<RotationOutcome, SinkError> {
        if let Some(stale) = slot.take() {
            // The directory entry is gone; whatever was buffered in the stale
            // descriptor is unreachable anyway.
            let _ = stale.close();
        }
        self.notices
            .warn(format!("log file {} disappeared, reopening", self.path.display()));
        self.ensure_open(slot)?;
        Ok(RotationOutcome::Reopened)
    }

    fn rotate_locked(
        &self,
        slot: &mut Option<ActiveFile>,
        at: DateTime<FixedOffset>,
    ) -> Result<RotationOutcome, SinkError> {
        let rotated_path = self.rotated_path(at);
        if rotated_path.exists() || self.compressed_exists(&rotated_path) {
            tracing::debug!(target_path = %rotated_path.display(), "rotated name taken, deferring rotation");
            return Ok(RotationOutcome::Deferred(rotated_path));
        }

        // 1. Close the active descriptor.
        if let Some(active) = slot.take() {
            if let Err(err) = active.close() {
                self.notices
                    .warn(format!("closing {} before rotation failed: {}", self.path.display(), err));
            }
        }

        // 2. Rename the current file away.
        let renamed = fs::rename(&self.path, &rotated_path).map_err(|err| SinkError::RenameFailed {
            from: self.path.clone(),
            to: rotated_path.clone(),
            error: err.to_string(),
        });

        // 3. Reopen at the original path. On a failed rename this appends to
        //    the same file again so the drain keeps a descriptor.
        self.ensure_open(slot)?;
        renamed?;

        self.rotations.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            from = %self.path.display(),
            to = %rotated_path.display(),
            "rotated log file"
        );

        // 4. Compress the rotated file off the lock.
        if let Some(compression) = self.config.compression {
            self.spawn_compression(compression, rotated_path.clone());
        }
        Ok(RotationOutcome::Rotated(rotated_path))
    }

    fn compressed_exists(&self, rotated_path: &Path) -> bool {
        self.config.compression.is_some_and(|compression| {
            PathBuf::from(format!("{}.{}", rotated_path.to_string_lossy(), compression.extension())).exists()
        })
    }

    fn spawn_compression(&self, compression: Compression, rotated_path: PathBuf) {
        let file_mode = self.config.file_mode;
        let notices = self.notices.clone();
        let spawned = thread::Builder::new()
            .name("logsink-compress".into())
            .spawn(move || match compress_file(compression, &rotated_path, file_mode) {
                Ok(out) => tracing::debug!(path = %out.display(), "compressed rotated log file"),
                Err(err) => notices.warn(format!("{err}")),
            });
        match spawned {
            Ok(handle) => {
                let mut compressions = self.compressions.lock();
                compressions.retain(|handle| !handle.is_finished());
                compressions.push(handle);
            }
            Err(err) => self.notices.warn(format!("failed to spawn compression thread: {err}")),
        }
    }

    /// Flush and close the active descriptor, then wait for compressions
    /// still in flight. The next write reopens the file.
    pub fn close(&self) {
        if let Some(active) = self.slot.lock().take() {
            let path = active.path().to_path_buf();
            match active.close() {
                Ok(()) => tracing::debug!(path = %path.display(), "closed log file"),
                Err(err) => tracing::error!(path = %path.display(), error = %err, "failed to close log file"),
            }
        }
        let pending = std::mem::take(&mut *self.compressions.lock());
        for handle in pending {
            if handle.join().is_err() {
                tracing::error!("compression thread panicked");
            }
        }
    }
}

/// Create or append to the log file at `log_path`, creating the parent
/// directory when it does not exist yet.
pub(crate) fn create_log_file(log_path: &Path, file_mode: Option<u32>) -> Result<fs::File, SinkError> {
    let mut open_options = fs::OpenOptions::new();
    open_options.append(true).create(true);

    let mut create_log_file_res = open_options.open(log_path);
    if create_log_file_res.is_err() {
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| SinkError::CreateDirectoryFailed(parent.to_path_buf(), err.to_string()))?;
            create_log_file_res = open_options.open(log_path);
        }
    }

    let log_file = create_log_file_res?;
    set_permissions(log_path, file_mode)?;
    Ok(log_file)
}

/// Apply `file_mode` to `path` on Unix; a no-op elsewhere.
pub(crate) fn set_permissions(path: &Path, file_mode: Option<u32>) -> Result<(), SinkError> {
    if let Some(mode) = file_mode {
        #[cfg(unix)]
        {
            let perms = Permissions::from_mode(mode);
            fs::set_permissions(path, perms).map_err(|err| SinkError::SetFilePermissionsError {
                path: path.to_path_buf(),
                error: err.to_string(),
            })?
        }
        #[cfg(not(unix))]
        {
            let _ = (path, mode);
            tracing::warn!("setting file permissions is not supported on non-unix platforms");
        }
    }
    Ok(())
}
