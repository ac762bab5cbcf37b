//! Bounded hand-off between producers and the drain thread.
//!
//! ```text
//! [Sink::write()] -> [try_send] -> bounded channel -> [drain tick] -> BatchWriter
//!                       | full
//!                       v
//!                 DropCounter -> one warning record on the next tick
//! ```
//!
//! Producers never wait: a full channel drops the incoming record and bumps
//! the counter. The drain wakes on a fixed cadence and writes at most one
//! channel's worth of records per tick.

use {
    crate::{error::SinkError, level::Level, notice::{self, Notices}},
    crossbeam_channel::{bounded, select, tick, Receiver, Sender, TrySendError},
    parking_lot::RwLock,
    std::{
        sync::{
            atomic::{AtomicU64, Ordering},
            Arc,
        },
        time::Duration,
    },
};

/// An already-encoded record waiting to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRecord {
    pub level: Level,
    pub bytes: Vec<u8>,
}

impl PendingRecord {
    pub fn new(level: Level, bytes: impl Into<Vec<u8>>) -> Self {
        PendingRecord {
            level,
            bytes: bytes.into(),
        }
    }
}

impl AsRef<[u8]> for PendingRecord {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Records dropped because the channel was full.
///
/// `pending` is what the next drain cycle reports and resets; `total` only
/// ever grows.
#[derive(Debug, Default)]
pub struct DropCounter {
    pending: AtomicU64,
    total: AtomicU64,
}

impl DropCounter {
    fn record(&self) {
        self.pending.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Drops not yet reported.
    pub fn pending(&self) -> u64 {
        self.pending.load(Ordering::Relaxed)
    }

    /// Drops since the channel was created.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    fn take(&self) -> u64 {
        self.pending.swap(0, Ordering::Relaxed)
    }
}

/// Counters shared by the producer side and the drain.
#[derive(Debug, Default)]
pub struct ChannelCounters {
    pub enqueued: AtomicU64,
    pub written: AtomicU64,
    pub failed: AtomicU64,
    pub drops: DropCounter,
}

/// Something a drain cycle can hand a batch to.
pub trait BatchWriter: Send + Sync {
    fn write_batch(&self, batch: &[PendingRecord]) -> Result<(), SinkError>;
}

/// Producer side of the channel. Cheap to clone.
#[derive(Clone)]
pub struct WriteChannel {
    tx: Sender<PendingRecord>,
    counters: Arc<ChannelCounters>,
    /// Held for reading across check and send, so `close` returning means
    /// no send is still in flight.
    closed: Arc<RwLock<bool>>,
}

impl WriteChannel {
    /// Create a channel holding at most `capacity` pending records, together
    /// with the drain that consumes it.
    pub fn bounded(capacity: usize, notices: Notices) -> (WriteChannel, Drain) {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        let counters = Arc::new(ChannelCounters::default());
        let channel = WriteChannel {
            tx,
            counters: counters.clone(),
            closed: Arc::new(RwLock::new(false)),
        };
        let drain = Drain {
            rx,
            capacity,
            counters,
            notices,
        };
        (channel, drain)
    }

    /// Queue a record without blocking. Returns `false` if it was dropped.
    pub fn enqueue(&self, record: PendingRecord) -> bool {
        let closed = self.closed.read();
        if *closed {
            self.counters.drops.record();
            return false;
        }
        match self.tx.try_send(record) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.counters.drops.record();
                false
            }
        }
    }

    /// Refuse further records. Anything already queued is still drained.
    pub fn close(&self) {
        *self.closed.write() = true;
    }

    pub fn counters(&self) -> &ChannelCounters {
        &self.counters
    }
}

/// Consumer side of the channel, owned by the drain thread.
pub struct Drain {
    rx: Receiver<PendingRecord>,
    capacity: usize,
    counters: Arc<ChannelCounters>,
    notices: Notices,
}

impl Drain {
    /// Collect one cycle's worth of output.
    ///
    /// Queued self-reports come first, then at most `capacity` records in
    /// enqueue order, then a single drop warning if anything was dropped
    /// since the previous cycle.
    pub fn next_batch(&self) -> Vec<PendingRecord> {
        let mut batch: Vec<PendingRecord> = self
            .notices
            .take()
            .into_iter()
            .map(|bytes| PendingRecord::new(Level::Warn, bytes))
            .collect();
        batch.extend(self.rx.try_iter().take(self.capacity));

        let dropped = self.counters.drops.take();
        if dropped > 0 {
            let msg = format!("Logger dropped {dropped} messages");
            batch.push(PendingRecord::new(Level::Warn, notice::render(Level::Warn, &msg)));
        }
        batch
    }

    /// Run one drain cycle against `writer`. Returns the number of records
    /// handed over, self-reports included.
    pub fn flush_once(&self, writer: &dyn BatchWriter) -> usize {
        let batch = self.next_batch();
        if batch.is_empty() {
            return 0;
        }
        let n = batch.len();
        match writer.write_batch(&batch) {
            Ok(()) => {
                self.counters.written.fetch_add(n as u64, Ordering::Relaxed);
            }
            Err(err) => {
                self.counters.failed.fetch_add(n as u64, Ordering::Relaxed);
                self.notices.warn(format!("failed to write {n} records: {err}"));
            }
        }
        n
    }

    /// Write out everything queued at the time of the call.
    pub fn flush_all(&self, writer: &dyn BatchWriter) {
        let rounds = self.rx.len().div_ceil(self.capacity).max(1);
        for _ in 0..rounds {
            self.flush_once(writer);
        }
    }

    /// Drain on a fixed cadence, serving flush requests, until `control`
    /// disconnects. Everything still queued is written out before returning.
    pub fn run(self, writer: Arc<dyn BatchWriter>, flush_interval: Duration, control: Receiver<DrainControl>) {
        let ticker = tick(flush_interval);
        loop {
            select! {
                recv(ticker) -> _ => {
                    self.flush_once(writer.as_ref());
                }
                recv(control) -> msg => match msg {
                    Ok(DrainControl::Flush(ack)) => {
                        self.flush_all(writer.as_ref());
                        let _ = ack.send(());
                    }
                    Err(_) => break,
                },
            }
        }

        while !self.rx.is_empty() {
            self.flush_once(writer.as_ref());
        }
        // Pending drop and failure reports.
        self.flush_once(writer.as_ref());
        for leftover in self.notices.take() {
            tracing::error!(
                notice = %String::from_utf8_lossy(&leftover).trim_end(),
                "self-report could not be written before shutdown"
            );
        }
        tracing::debug!("drain stopped");
    }
}

/// Requests served by a running drain.
pub enum DrainControl {
    /// Write out everything queued, then acknowledge.
    Flush(Sender<()>),
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        parking_lot::Mutex,
        std::thread,
    };

    #[derive(Default)]
    struct Collect(Mutex<Vec<PendingRecord>>);

    impl BatchWriter for Collect {
        fn write_batch(&self, batch: &[PendingRecord]) -> Result<(), SinkError> {
            self.0.lock().extend_from_slice(batch);
            Ok(())
        }
    }

    struct Broken;

    impl BatchWriter for Broken {
        fn write_batch(&self, _: &[PendingRecord]) -> Result<(), SinkError> {
            Err(SinkError::FileIOError(std::io::Error::other("disk full")))
        }
    }

    fn record(i: usize) -> PendingRecord {
        PendingRecord::new(Level::Info, format!("record {i}\n"))
    }

    fn messages(batch: &[PendingRecord]) -> Vec<String> {
        batch
            .iter()
            .map(|r| String::from_utf8_lossy(&r.bytes).into_owned())
            .collect()
    }

    #[test]
    fn overflow_drops_newest_and_reports_once() {
        let (channel, drain) = WriteChannel::bounded(3, Notices::new());
        let accepted: Vec<bool> = (0..5).map(|i| channel.enqueue(record(i))).collect();
        assert_eq!(accepted, vec![true, true, true, false, false]);
        assert_eq!(channel.counters().drops.pending(), 2);

        let batch = drain.next_batch();
        let lines = messages(&batch);
        assert_eq!(&lines[..3], &["record 0\n", "record 1\n", "record 2\n"]);
        assert_eq!(lines.len(), 4);
        assert!(lines[3].contains("Logger dropped 2 messages"));
        assert_eq!(batch[3].level, Level::Warn);

        // Reported once, then reset.
        assert!(drain.next_batch().is_empty());
        assert_eq!(channel.counters().drops.pending(), 0);
        assert_eq!(channel.counters().drops.total(), 2);
    }

    #[test]
    fn notices_precede_records() {
        let notices = Notices::new();
        let (channel, drain) = WriteChannel::bounded(4, notices.clone());
        channel.enqueue(record(0));
        notices.warn("rename failed");

        let lines = messages(&drain.next_batch());
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("rename failed"));
        assert_eq!(lines[1], "record 0\n");
    }

    #[test]
    fn failed_writes_are_counted_and_reported() {
        let notices = Notices::new();
        let (channel, drain) = WriteChannel::bounded(4, notices.clone());
        channel.enqueue(record(0));
        channel.enqueue(record(1));

        assert_eq!(drain.flush_once(&Broken), 2);
        assert_eq!(channel.counters().failed.load(Ordering::Relaxed), 2);

        let collect = Collect::default();
        drain.flush_once(&collect);
        let lines = messages(&collect.0.lock());
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("failed to write 2 records: File IO error: disk full"));
    }

    #[test]
    fn closed_channel_rejects() {
        let (channel, drain) = WriteChannel::bounded(4, Notices::new());
        channel.close();
        assert!(!channel.enqueue(record(0)));
        let lines = messages(&drain.next_batch());
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("Logger dropped 1 messages"));
    }

    #[test]
    fn close_racing_producers_loses_nothing() {
        let (channel, drain) = WriteChannel::bounded(100_000, Notices::new());
        let collect = Arc::new(Collect::default());
        let (control_tx, control_rx) = crossbeam_channel::bounded::<DrainControl>(0);
        let writer: Arc<dyn BatchWriter> = collect.clone();
        let drainer = thread::spawn(move || drain.run(writer, Duration::from_millis(1), control_rx));

        let producers: Vec<_> = (0..4)
            .map(|_| {
                let channel = channel.clone();
                thread::spawn(move || {
                    for i in 0..2000 {
                        channel.enqueue(record(i));
                    }
                })
            })
            .collect();
        thread::sleep(Duration::from_millis(1));
        channel.close();
        drop(control_tx);
        drainer.join().unwrap();
        for producer in producers {
            producer.join().unwrap();
        }

        let written = messages(&collect.0.lock())
            .iter()
            .filter(|line| line.starts_with("record "))
            .count() as u64;
        let counters = channel.counters();
        assert_eq!(written, counters.enqueued.load(Ordering::Relaxed));
        assert_eq!(written + counters.drops.total(), 8000);
    }

    #[test]
    fn run_drains_everything_on_shutdown() {
        let (channel, drain) = WriteChannel::bounded(64, Notices::new());
        let collect = Arc::new(Collect::default());
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<DrainControl>(0);
        let writer: Arc<dyn BatchWriter> = collect.clone();
        let handle = thread::spawn(move || drain.run(writer, Duration::from_secs(3600), stop_rx));

        for i in 0..10 {
            assert!(channel.enqueue(record(i)));
        }
        drop(stop_tx);
        handle.join().unwrap();

        let lines = messages(&collect.0.lock());
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[9], "record 9\n");
        assert_eq!(channel.counters().written.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn flush_request_is_acknowledged_after_writing() {
        let (channel, drain) = WriteChannel::bounded(4, Notices::new());
        let collect = Arc::new(Collect::default());
        let (control_tx, control_rx) = crossbeam_channel::bounded::<DrainControl>(0);
        let writer: Arc<dyn BatchWriter> = collect.clone();
        let handle = thread::spawn(move || drain.run(writer, Duration::from_secs(3600), control_rx));

        for i in 0..4 {
            channel.enqueue(record(i));
        }
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        control_tx.send(DrainControl::Flush(ack_tx)).unwrap();
        ack_rx.recv().unwrap();
        assert_eq!(collect.0.lock().len(), 4);

        drop(control_tx);
        handle.join().unwrap();
    }

    #[test]
    fn run_flushes_on_cadence() {
        let (channel, drain) = WriteChannel::bounded(64, Notices::new());
        let collect = Arc::new(Collect::default());
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<DrainControl>(0);
        let writer: Arc<dyn BatchWriter> = collect.clone();
        let handle = thread::spawn(move || drain.run(writer, Duration::from_millis(5), stop_rx));

        channel.enqueue(record(0));
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while collect.0.lock().is_empty() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(collect.0.lock().len(), 1);

        drop(stop_tx);
        handle.join().unwrap();
    }
}
