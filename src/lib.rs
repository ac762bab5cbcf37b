//! # logsink
//!
//! A non-blocking log sink for already-encoded records. Producers hand
//! records to a bounded channel and return immediately; a background drain
//! writes them to stdout and/or a single active file. The active file is
//! renamed to `<name>.<timestamp>` once it grows past a size threshold, and
//! rotated files older than a retention window are deleted.
//!
//! When producers outrun the drain, new records are dropped rather than
//! blocking the caller, and the sink writes a `Logger dropped N messages`
//! warning into the stream on its next cycle.
//!
//! ## Example
//!
//! ```no_run
//! use {
//!     logsink::{Compression, RotationSize, SinkBuilder, TimeZone},
//!     tracing_subscriber::util::SubscriberInitExt,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sink = SinkBuilder::new("./logs", "app.log")
//!         .max_size(RotationSize::MB(100))
//!         .retention_days(7)
//!         .time_zone(TimeZone::UTC)
//!         .compression(Compression::Gzip)
//!         .build()?;
//!     tracing_subscriber::fmt()
//!         .json()
//!         .with_writer(sink.clone())
//!         .with_ansi(false)
//!         .finish()
//!         .try_init()?;
//!
//!     tracing::info!("This is an info message");
//!     tracing::warn!("This is a warning message");
//!
//!     sink.shutdown();
//!     Ok(())
//! }
//! ```

mod channel;
mod compress;
mod config;
mod console;
mod error;
mod level;
mod monitor;
mod notice;
pub mod probe;
mod retention;
mod rotating;
mod sink;

pub use {
    channel::{BatchWriter, ChannelCounters, Drain, DrainControl, DropCounter, PendingRecord, WriteChannel},
    compress::Compression,
    config::{
        reference_layout_to_strftime, FileSize, LogParams, RotationConfig, RotationSize, SinkBuilder, TimeZone,
        DEFAULT_CHANNEL_CAPACITY, DEFAULT_DIRECTORY, DEFAULT_FILE_NAME, DEFAULT_FLUSH_INTERVAL, DEFAULT_MAX_SIZE,
        DEFAULT_OPEN_BACKOFF, DEFAULT_OPEN_RETRIES, DEFAULT_RETENTION_DAYS, DEFAULT_RETENTION_INTERVAL,
        DEFAULT_ROTATION_CHECK_INTERVAL, DEFAULT_TIMESTAMP_FORMAT,
    },
    console::ConsoleWriter,
    error::SinkError,
    level::Level,
    monitor::Monitor,
    notice::{render as render_notice, Notices},
    retention::{RetentionSweeper, SweepReport},
    rotating::{ActiveFile, RotatingSink, RotationOutcome},
    sink::{RecordWriter, Sink, SinkCell, Stats},
};
