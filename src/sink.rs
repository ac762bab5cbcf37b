use {
    crate::{
        channel::{BatchWriter, DrainControl, PendingRecord, WriteChannel},
        config::{RotationConfig, SinkBuilder},
        console::ConsoleWriter,
        error::SinkError,
        level::Level,
        monitor::Monitor,
        notice::Notices,
        retention::{RetentionSweeper, SweepReport},
        rotating::{RotatingSink, RotationOutcome},
    },
    crossbeam_channel::Sender,
    parking_lot::Mutex,
    std::{
        io,
        path::Path,
        sync::{
            atomic::{AtomicU64, Ordering},
            Arc,
        },
        thread::{self, JoinHandle},
    },
    tracing_subscriber::fmt::MakeWriter,
};

/// Point-in-time counters of a sink.
///
/// `written` includes the sink's own warning records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub enqueued: u64,
    pub written: u64,
    pub dropped: u64,
    pub failed: u64,
    pub rotations: u64,
    pub swept: u64,
}

/// Where a drained batch goes.
struct Outputs {
    file: Option<Arc<RotatingSink>>,
    console: Option<ConsoleWriter>,
}

impl BatchWriter for Outputs {
    fn write_batch(&self, batch: &[PendingRecord]) -> Result<(), SinkError> {
        let console = match &self.console {
            Some(console) => console.write_batch(batch).map_err(SinkError::from),
            None => Ok(()),
        };
        let file = match &self.file {
            Some(file) => file.write_batch(batch),
            None => Ok(()),
        };
        file.and(console)
    }
}

struct Workers {
    drain_control: Sender<DrainControl>,
    monitor_stop: Option<Sender<()>>,
    drain: JoinHandle<()>,
    monitor: Option<JoinHandle<()>>,
}

struct Inner {
    config: RotationConfig,
    channel: WriteChannel,
    notices: Notices,
    rotating: Option<Arc<RotatingSink>>,
    sweeper: Option<RetentionSweeper>,
    swept: Arc<AtomicU64>,
    workers: Mutex<Option<Workers>>,
}

impl Inner {
    fn shutdown(&self) {
        let Some(workers) = self.workers.lock().take() else {
            return;
        };
        self.channel.close();

        drop(workers.monitor_stop);
        if let Some(monitor) = workers.monitor {
            if monitor.join().is_err() {
                tracing::error!("monitor thread panicked");
            }
        }
        drop(workers.drain_control);
        if workers.drain.join().is_err() {
            tracing::error!("drain thread panicked");
        }
        if let Some(rotating) = &self.rotating {
            rotating.close();
        }
        tracing::debug!("sink shut down");
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Handle to a running log sink.
///
/// Cloning is cheap and every clone feeds the same channel. Producers only
/// ever enqueue; all file I/O happens on the sink's drain and monitor
/// threads. The sink shuts down when [`Sink::shutdown`] is called or the last
/// clone is dropped.
#[derive(Clone)]
pub struct Sink {
    inner: Arc<Inner>,
}

impl Sink {
    /// Start configuring a sink writing `directory/file_name`.
    pub fn builder<P: AsRef<Path>, S: AsRef<str>>(directory: P, file_name: S) -> SinkBuilder {
        SinkBuilder::new(directory, file_name)
    }

    pub(crate) fn start(config: RotationConfig) -> Result<Sink, SinkError> {
        let notices = Notices::new();
        let rotating = if config.file_output {
            Some(Arc::new(RotatingSink::open(config.clone(), notices.clone())?))
        } else {
            None
        };
        let sweeper = match &rotating {
            Some(_) => Some(RetentionSweeper::new(&config, notices.clone())?),
            None => None,
        };

        let (channel, drain) = WriteChannel::bounded(config.channel_capacity, notices.clone());
        let outputs: Arc<dyn BatchWriter> = Arc::new(Outputs {
            file: rotating.clone(),
            console: config.console.then(|| ConsoleWriter::new(config.color)),
        });

        let (drain_control, control_rx) = crossbeam_channel::bounded::<DrainControl>(0);
        let flush_interval = config.flush_interval;
        let drain = thread::Builder::new()
            .name("logsink-drain".into())
            .spawn(move || drain.run(outputs, flush_interval, control_rx))?;

        let mut swept = Arc::new(AtomicU64::new(0));
        let mut monitor_stop = None;
        let mut monitor_handle = None;
        if let (Some(rotating), Some(sweeper)) = (&rotating, sweeper.clone()) {
            let monitor = Monitor::new(
                rotating.clone(),
                sweeper,
                notices.clone(),
                config.rotation_check_interval,
                config.retention_interval,
            );
            swept = monitor.swept_counter();
            let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
            monitor_handle = Some(
                thread::Builder::new()
                    .name("logsink-monitor".into())
                    .spawn(move || monitor.run(stop_rx))?,
            );
            monitor_stop = Some(stop_tx);
        }

        tracing::info!(
            path = %config.path().display(),
            file = config.file_output,
            console = config.console,
            max_size = config.max_size,
            "log sink started"
        );
        Ok(Sink {
            inner: Arc::new(Inner {
                config,
                channel,
                notices,
                rotating,
                sweeper,
                swept,
                workers: Mutex::new(Some(Workers {
                    drain_control,
                    monitor_stop,
                    drain,
                    monitor: monitor_handle,
                })),
            }),
        })
    }

    /// The configuration this sink runs with.
    pub fn config(&self) -> &RotationConfig {
        &self.inner.config
    }

    /// Path of the active file, if file output is enabled.
    pub fn path(&self) -> Option<&Path> {
        self.inner.rotating.as_ref().map(|r| r.path())
    }

    /// Whether records at `level` pass the minimum-level filter.
    pub fn enabled(&self, level: Level) -> bool {
        level != Level::Disabled && level >= self.inner.config.min_level
    }

    /// Queue an encoded record. Never blocks and never fails: returns `false`
    /// when the record was suppressed by level or dropped for backpressure.
    pub fn write(&self, level: Level, record: impl Into<Vec<u8>>) -> bool {
        if !self.enabled(level) {
            return false;
        }
        self.inner.channel.enqueue(PendingRecord::new(level, record))
    }

    pub fn trace(&self, record: impl Into<Vec<u8>>) -> bool {
        self.write(Level::Trace, record)
    }

    pub fn debug(&self, record: impl Into<Vec<u8>>) -> bool {
        self.write(Level::Debug, record)
    }

    pub fn info(&self, record: impl Into<Vec<u8>>) -> bool {
        self.write(Level::Info, record)
    }

    pub fn warn(&self, record: impl Into<Vec<u8>>) -> bool {
        self.write(Level::Warn, record)
    }

    pub fn error(&self, record: impl Into<Vec<u8>>) -> bool {
        self.write(Level::Error, record)
    }

    pub fn fatal(&self, record: impl Into<Vec<u8>>) -> bool {
        self.write(Level::Fatal, record)
    }

    /// Block until everything queued so far has been written.
    ///
    /// Returns immediately once the sink has been shut down.
    pub fn flush(&self) {
        let control = match self.inner.workers.lock().as_ref() {
            Some(workers) => workers.drain_control.clone(),
            None => return,
        };
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        if control.send(DrainControl::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    /// Run a rotation check now instead of waiting for the next tick.
    pub fn rotate_if_needed(&self) -> Result<RotationOutcome, SinkError> {
        match &self.inner.rotating {
            Some(rotating) => rotating.rotate_if_needed(),
            None => Ok(RotationOutcome::Skipped),
        }
    }

    /// Rotate now regardless of size.
    pub fn rotate(&self) -> Result<RotationOutcome, SinkError> {
        match &self.inner.rotating {
            Some(rotating) => rotating.rotate(),
            None => Ok(RotationOutcome::Skipped),
        }
    }

    /// Run a retention sweep now instead of waiting for the next tick.
    pub fn sweep(&self) -> Result<SweepReport, SinkError> {
        match &self.inner.sweeper {
            Some(sweeper) => {
                let report = sweeper.sweep()?;
                self.inner
                    .swept
                    .fetch_add(report.deleted.len() as u64, Ordering::Relaxed);
                Ok(report)
            }
            None => Ok(SweepReport::default()),
        }
    }

    pub fn stats(&self) -> Stats {
        let counters = self.inner.channel.counters();
        Stats {
            enqueued: counters.enqueued.load(Ordering::Relaxed),
            written: counters.written.load(Ordering::Relaxed),
            dropped: counters.drops.total(),
            failed: counters.failed.load(Ordering::Relaxed),
            rotations: self.inner.rotating.as_ref().map_or(0, |r| r.rotations()),
            swept: self.inner.swept.load(Ordering::Relaxed),
        }
    }

    /// Stop both tickers, write out everything queued, close the file and
    /// join the background threads. Further writes are counted as dropped.
    /// Calling this more than once is harmless.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    /// Queue a warning record through the sink's own reporting path.
    pub fn report(&self, msg: impl Into<String>) {
        self.inner.notices.warn(msg);
    }
}

/// Explicit construct-once guard for a process-wide sink.
///
/// ```no_run
/// use logsink::{SinkBuilder, SinkCell};
///
/// static SINK: SinkCell = SinkCell::new();
///
/// let sink = SINK
///     .get_or_try_init(|| SinkBuilder::new("./logs", "app.log").build())
///     .unwrap();
/// sink.info(b"ready\n".to_vec());
/// if let Some(sink) = SINK.take() {
///     sink.shutdown();
/// }
/// ```
pub struct SinkCell {
    slot: Mutex<Option<Sink>>,
}

impl SinkCell {
    pub const fn new() -> Self {
        SinkCell {
            slot: parking_lot::const_mutex(None),
        }
    }

    /// Return the sink, building it with `init` on first use. A failed `init`
    /// leaves the cell empty so a later call can try again.
    pub fn get_or_try_init<F>(&self, init: F) -> Result<Sink, SinkError>
    where
        F: FnOnce() -> Result<Sink, SinkError>,
    {
        let mut slot = self.slot.lock();
        if let Some(sink) = slot.as_ref() {
            return Ok(sink.clone());
        }
        let sink = init()?;
        *slot = Some(sink.clone());
        Ok(sink)
    }

    pub fn get(&self) -> Option<Sink> {
        self.slot.lock().clone()
    }

    /// Empty the cell, handing back the sink for shutdown.
    pub fn take(&self) -> Option<Sink> {
        self.slot.lock().take()
    }
}

impl Default for SinkCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Buffers one formatted event and enqueues it as a single record on drop.
pub struct RecordWriter<'a> {
    sink: &'a Sink,
    level: Level,
    buf: Vec<u8>,
}

impl io::Write for RecordWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for RecordWriter<'_> {
    fn drop(&mut self) {
        if !self.buf.is_empty() {
            self.sink.write(self.level, std::mem::take(&mut self.buf));
        }
    }
}

impl<'a> MakeWriter<'a> for Sink {
    type Writer = RecordWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        RecordWriter {
            sink: self,
            level: Level::Info,
            buf: Vec::new(),
        }
    }

    fn make_writer_for(&'a self, meta: &tracing::Metadata<'_>) -> Self::Writer {
        RecordWriter {
            sink: self,
            level: Level::from(meta.level()),
            buf: Vec::new(),
        }
    }
}
