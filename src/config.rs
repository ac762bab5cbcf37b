use {
    crate::{compress::Compression, error::SinkError, level::Level, sink::Sink},
    chrono::{format::StrftimeItems, FixedOffset, Local, Utc},
    serde::Deserialize,
    std::{
        path::{Path, PathBuf},
        time::Duration,
    },
};

/// Rotation threshold used when none is configured or the configured value
/// cannot be parsed (1 GiB).
pub const DEFAULT_MAX_SIZE: u64 = 1024 * 1024 * 1024;
/// Days a rotated file is kept when the configured window is zero.
pub const DEFAULT_RETENTION_DAYS: u64 = 30;
/// Pending records the write channel holds before it starts dropping.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
/// strftime spelling of the `2006-01-02 15:04:05` reference layout.
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(10);
pub const DEFAULT_ROTATION_CHECK_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_RETENTION_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_OPEN_RETRIES: u32 = 3;
pub const DEFAULT_OPEN_BACKOFF: Duration = Duration::from_millis(50);
pub const DEFAULT_DIRECTORY: &str = "/opt/log";
pub const DEFAULT_FILE_NAME: &str = "log.log";

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Size at which the active file is rotated. Units are binary.
///
/// Once the file holds at least this many bytes, the next rotation check
/// renames it away and opens a fresh one.
///
/// # Examples
/// ```
/// use logsink::RotationSize;
///
/// assert_eq!(RotationSize::parse("512MB"), Some(RotationSize::MB(512)));
/// assert_eq!(RotationSize::parse("2G").unwrap().bytes(), 2 * 1024 * 1024 * 1024);
/// assert_eq!(RotationSize::parse("lots"), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationSize {
    Bytes(u64),
    /// Multiples of 1024 bytes.
    KB(u64),
    /// Multiples of 1024 * 1024 bytes.
    MB(u64),
    /// Multiples of 1024^3 bytes.
    GB(u64),
}

impl RotationSize {
    /// Get the threshold in bytes.
    pub fn bytes(&self) -> u64 {
        match self {
            RotationSize::Bytes(b) => *b,
            RotationSize::KB(kb) => kb.saturating_mul(1024),
            RotationSize::MB(mb) => mb.saturating_mul(1024 * 1024),
            RotationSize::GB(gb) => gb.saturating_mul(1024 * 1024 * 1024),
        }
    }

    /// Parse strings such as `"1G"`, `"512MB"`, `"64k"` or `"1048576"`.
    ///
    /// Units are binary and case-insensitive; `G`/`GB`, `M`/`MB` and `K`/`KB`
    /// are accepted. Returns `None` for anything else.
    pub fn parse(s: &str) -> Option<RotationSize> {
        let s = s.trim();
        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (digits, unit) = s.split_at(split);
        let n = digits.parse::<u64>().ok()?;
        match unit.trim().to_ascii_uppercase().as_str() {
            "" | "B" => Some(RotationSize::Bytes(n)),
            "K" | "KB" => Some(RotationSize::KB(n)),
            "M" | "MB" => Some(RotationSize::MB(n)),
            "G" | "GB" => Some(RotationSize::GB(n)),
            _ => None,
        }
    }

    /// Parse a configured size, substituting [`DEFAULT_MAX_SIZE`] when the
    /// value is empty, unparseable or zero.
    pub fn parse_or_default(s: &str) -> u64 {
        Self::parse(s)
            .map(|size| size.bytes())
            .filter(|bytes| *bytes > 0)
            .unwrap_or(DEFAULT_MAX_SIZE)
    }
}

impl Default for RotationSize {
    fn default() -> Self {
        RotationSize::GB(1)
    }
}

/// Specifies the time zone used to stamp rotated file names and to read the
/// stamps back during the retention sweep.
///
/// # Examples
/// ```
/// use logsink::TimeZone;
/// use chrono::FixedOffset;
///
/// let utc = TimeZone::UTC;
/// let local = TimeZone::Local;
/// let china = TimeZone::Fix(FixedOffset::east_opt(8 * 3600).unwrap());
/// ```
#[derive(Debug, Clone)]
pub enum TimeZone {
    /// Use UTC. Best for consistent naming across hosts.
    UTC,
    /// Use the system's local offset, captured when the sink is built.
    Local,
    /// Use a fixed offset regardless of where the application runs.
    Fix(FixedOffset),
}

impl TimeZone {
    fn to_offset(&self) -> FixedOffset {
        match self {
            TimeZone::UTC => Utc::now().fixed_offset().offset().to_owned(),
            TimeZone::Local => Local::now().offset().to_owned(),
            TimeZone::Fix(fixed_offset) => *fixed_offset,
        }
    }
}

/// Immutable engine configuration.
///
/// Produced by [`SinkBuilder`] (directly or through [`LogParams`]); every
/// default has already been substituted by the time a sink sees it.
#[derive(Debug, Clone)]
pub struct RotationConfig {
    /// The directory where the active and rotated files live.
    pub directory: PathBuf,
    /// The name of the active file inside `directory`.
    pub file_name: String,
    /// Whether records are written to the rotating file at all.
    pub file_output: bool,
    /// Size in bytes at which the active file is rotated.
    pub max_size: u64,
    /// strftime format embedded in rotated file names.
    pub timestamp_format: String,
    /// Offset used to format and parse rotation stamps.
    pub time_zone: FixedOffset,
    /// Rotated files older than this are deleted by the sweep.
    pub retention: Duration,
    /// Write records to stdout as well.
    pub console: bool,
    /// Style console lines by level. Has no effect on the file.
    pub color: bool,
    /// Bound of the pending-record channel.
    pub channel_capacity: usize,
    /// Cadence at which the drain writes queued records.
    pub flush_interval: Duration,
    /// Cadence of the size/existence check.
    pub rotation_check_interval: Duration,
    /// Cadence of the retention sweep.
    pub retention_interval: Duration,
    /// Attempts made to open the active file before giving up.
    pub open_retries: u32,
    /// Delay between open attempts; doubles after each failure.
    pub open_backoff: Duration,
    /// Records below this level are suppressed at the handle.
    pub min_level: Level,
    /// Optional compression of rotated files.
    pub compression: Option<Compression>,
    /// Unix file mode applied to created files.
    pub file_mode: Option<u32>,
}

impl Default for RotationConfig {
    fn default() -> Self {
        RotationConfig {
            directory: PathBuf::from(DEFAULT_DIRECTORY),
            file_name: DEFAULT_FILE_NAME.to_string(),
            file_output: true,
            max_size: DEFAULT_MAX_SIZE,
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
            time_zone: Local::now().offset().to_owned(),
            retention: Duration::from_secs(DEFAULT_RETENTION_DAYS * SECONDS_PER_DAY),
            console: false,
            color: false,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            rotation_check_interval: DEFAULT_ROTATION_CHECK_INTERVAL,
            retention_interval: DEFAULT_RETENTION_INTERVAL,
            open_retries: DEFAULT_OPEN_RETRIES,
            open_backoff: DEFAULT_OPEN_BACKOFF,
            min_level: Level::Trace,
            compression: None,
            file_mode: None,
        }
    }
}

impl RotationConfig {
    /// Full path of the active file.
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }

    /// Substitute defaults for zero values and reject configurations the
    /// engine cannot run with.
    pub fn normalized(mut self) -> Result<Self, SinkError> {
        if self.max_size == 0 {
            self.max_size = DEFAULT_MAX_SIZE;
        }
        if self.retention.is_zero() {
            self.retention = Duration::from_secs(DEFAULT_RETENTION_DAYS * SECONDS_PER_DAY);
        }
        if self.channel_capacity == 0 {
            self.channel_capacity = DEFAULT_CHANNEL_CAPACITY;
        }
        if self.timestamp_format.trim().is_empty() {
            self.timestamp_format = DEFAULT_TIMESTAMP_FORMAT.to_string();
        }
        if self.flush_interval.is_zero() {
            self.flush_interval = DEFAULT_FLUSH_INTERVAL;
        }
        if self.rotation_check_interval.is_zero() {
            self.rotation_check_interval = DEFAULT_ROTATION_CHECK_INTERVAL;
        }
        if self.retention_interval.is_zero() {
            self.retention_interval = DEFAULT_RETENTION_INTERVAL;
        }
        self.open_retries = self.open_retries.max(1);

        if !self.file_output && !self.console {
            return Err(SinkError::InvalidConfig("neither file nor console output is enabled".into()));
        }
        if self.file_output {
            if self.file_name.trim().is_empty() {
                return Err(SinkError::InvalidConfig("file output enabled with an empty file name".into()));
            }
            if Path::new(&self.file_name).components().count() != 1 {
                return Err(SinkError::InvalidConfig(format!(
                    "file name '{}' must not contain path separators",
                    self.file_name
                )));
            }
        }
        validate_timestamp_format(&self.timestamp_format)?;
        Ok(self)
    }
}

fn validate_timestamp_format(format: &str) -> Result<(), SinkError> {
    if StrftimeItems::new(format).any(|item| matches!(item, chrono::format::Item::Error)) {
        return Err(SinkError::InvalidConfig(format!("invalid timestamp format '{format}'")));
    }
    let sample = Utc::now().format(format).to_string();
    if sample.contains('/') || sample.contains('\\') {
        return Err(SinkError::InvalidConfig(format!(
            "timestamp format '{format}' produces path separators"
        )));
    }
    Ok(())
}

/// Translate a Go reference layout (`2006-01-02 15:04:05`) into strftime.
///
/// Strings that already contain `%` are treated as strftime and returned
/// unchanged.
pub fn reference_layout_to_strftime(layout: &str) -> String {
    if layout.contains('%') {
        return layout.to_string();
    }
    const TOKENS: [(&str, &str); 13] = [
        ("2006", "%Y"),
        ("-0700", "%z"),
        (".000", "%.3f"),
        ("Jan", "%b"),
        ("Mon", "%a"),
        ("MST", "%Z"),
        ("01", "%m"),
        ("02", "%d"),
        ("03", "%I"),
        ("04", "%M"),
        ("05", "%S"),
        ("15", "%H"),
        ("PM", "%p"),
    ];
    let mut out = String::with_capacity(layout.len() * 2);
    let mut rest = layout;
    'scan: while !rest.is_empty() {
        for (token, spec) in TOKENS {
            if let Some(tail) = rest.strip_prefix(token) {
                out.push_str(spec);
                rest = tail;
                continue 'scan;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }
    out
}

/// Provides a fluent interface for configuring a [`Sink`].
///
/// # Default Configuration
///
/// * Rotate at 1 GiB, checked every 3 seconds
/// * Rotated names stamped `%Y-%m-%d %H:%M:%S` in the local time zone
/// * Keep rotated files for 30 days, swept once a day
/// * 1000 pending records, drained every 10 ms
/// * File output only, no compression
///
/// # Examples
///
/// ```no_run
/// use logsink::{RotationSize, SinkBuilder};
///
/// let sink = SinkBuilder::new("./logs", "app.log")
///     .max_size(RotationSize::MB(100))
///     .retention_days(7)
///     .console(true)
///     .build()
///     .unwrap();
/// sink.info(b"{\"msg\":\"started\"}\n");
/// sink.shutdown();
/// ```
#[derive(Debug, Clone)]
pub struct SinkBuilder {
    config: RotationConfig,
}

impl SinkBuilder {
    /// Create a builder writing `directory/file_name`.
    pub fn new<P: AsRef<Path>, S: AsRef<str>>(directory: P, file_name: S) -> Self {
        SinkBuilder {
            config: RotationConfig {
                directory: directory.as_ref().to_path_buf(),
                file_name: file_name.as_ref().to_string(),
                ..RotationConfig::default()
            },
        }
    }

    /// Create a builder that only writes to stdout.
    pub fn console_only() -> Self {
        SinkBuilder {
            config: RotationConfig {
                file_output: false,
                console: true,
                ..RotationConfig::default()
            },
        }
    }

    /// Enable or disable the rotating file output.
    pub fn file_output(self, enabled: bool) -> Self {
        Self {
            config: RotationConfig {
                file_output: enabled,
                ..self.config
            },
        }
    }

    /// Set the size at which the active file is rotated.
    pub fn max_size(self, size: RotationSize) -> Self {
        Self {
            config: RotationConfig {
                max_size: size.bytes(),
                ..self.config
            },
        }
    }

    /// Set the strftime format embedded in rotated file names.
    pub fn timestamp_format<S: Into<String>>(self, format: S) -> Self {
        Self {
            config: RotationConfig {
                timestamp_format: format.into(),
                ..self.config
            },
        }
    }

    /// Set the time zone for rotation stamps.
    pub fn time_zone(self, time_zone: TimeZone) -> Self {
        Self {
            config: RotationConfig {
                time_zone: time_zone.to_offset(),
                ..self.config
            },
        }
    }

    /// Keep rotated files for `days` days. Zero selects the default.
    pub fn retention_days(self, days: u64) -> Self {
        self.retention(Duration::from_secs(days.saturating_mul(SECONDS_PER_DAY)))
    }

    /// Keep rotated files for an arbitrary window.
    pub fn retention(self, retention: Duration) -> Self {
        Self {
            config: RotationConfig {
                retention,
                ..self.config
            },
        }
    }

    /// Also write records to stdout.
    pub fn console(self, enabled: bool) -> Self {
        Self {
            config: RotationConfig {
                console: enabled,
                ..self.config
            },
        }
    }

    /// Color console lines by level.
    pub fn color(self, enabled: bool) -> Self {
        Self {
            config: RotationConfig {
                color: enabled,
                ..self.config
            },
        }
    }

    /// Set the bound of the pending-record channel.
    pub fn channel_capacity(self, capacity: usize) -> Self {
        Self {
            config: RotationConfig {
                channel_capacity: capacity,
                ..self.config
            },
        }
    }

    /// Set how often queued records are written out.
    pub fn flush_interval(self, interval: Duration) -> Self {
        Self {
            config: RotationConfig {
                flush_interval: interval,
                ..self.config
            },
        }
    }

    /// Set how often the size/existence check runs.
    pub fn rotation_check_interval(self, interval: Duration) -> Self {
        Self {
            config: RotationConfig {
                rotation_check_interval: interval,
                ..self.config
            },
        }
    }

    /// Set how often the retention sweep runs.
    pub fn retention_interval(self, interval: Duration) -> Self {
        Self {
            config: RotationConfig {
                retention_interval: interval,
                ..self.config
            },
        }
    }

    /// Set the number of open attempts and the initial backoff between them.
    pub fn open_retries(self, attempts: u32, backoff: Duration) -> Self {
        Self {
            config: RotationConfig {
                open_retries: attempts,
                open_backoff: backoff,
                ..self.config
            },
        }
    }

    /// Suppress records below `level`.
    pub fn min_level(self, level: Level) -> Self {
        Self {
            config: RotationConfig {
                min_level: level,
                ..self.config
            },
        }
    }

    /// Compress rotated files.
    pub fn compression(self, compression: Compression) -> Self {
        Self {
            config: RotationConfig {
                compression: Some(compression),
                ..self.config
            },
        }
    }

    /// Unix mode for the active file and compressed archives, e.g. `0o640`.
    /// Ignored on other platforms.
    pub fn file_mode(self, mode: u32) -> Self {
        Self {
            config: RotationConfig {
                file_mode: Some(mode),
                ..self.config
            },
        }
    }

    /// Validate and return the configuration without starting anything.
    pub fn into_config(self) -> Result<RotationConfig, SinkError> {
        self.config.normalized()
    }

    /// Open the active file and start the background threads.
    ///
    /// An error here is fatal: the destination could not be opened after the
    /// configured number of attempts, or the configuration is unusable.
    pub fn build(self) -> Result<Sink, SinkError> {
        Sink::start(self.into_config()?)
    }
}

/// Either a size string (`"512MB"`) or a plain byte count.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum FileSize {
    Bytes(u64),
    Text(String),
}

/// Parameters as they appear in a `log` section of an application config.
///
/// Zero and empty values select the defaults. When `is_file` is absent the
/// file output is enabled exactly when the console is not.
///
/// ```
/// use logsink::LogParams;
///
/// let params: LogParams = serde_json::from_str(
///     r#"{ "log_path_dir": "/var/log/app", "log_file_size": "512MB", "is_console": false }"#,
/// ).unwrap();
/// let config = params.into_builder().into_config().unwrap();
/// assert_eq!(config.max_size, 512 * 1024 * 1024);
/// assert_eq!(config.file_name, "log.log");
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogParams {
    /// Minimum level, `-1` (trace) through `4` (fatal); `6` or `7` disables output.
    pub level: i8,
    pub log_color: bool,
    pub log_path_dir: String,
    pub log_file_name: String,
    /// Rotated-name stamp, either strftime or a Go-style reference layout.
    pub log_file_name_time_format: String,
    pub log_file_size: Option<FileSize>,
    pub log_exp_days: u64,
    pub log_chan_size: usize,
    pub is_console: bool,
    pub is_file: Option<bool>,
    pub compression: Option<Compression>,
}

impl Default for LogParams {
    fn default() -> Self {
        LogParams {
            level: -1,
            log_color: false,
            log_path_dir: String::new(),
            log_file_name: String::new(),
            log_file_name_time_format: String::new(),
            log_file_size: None,
            log_exp_days: 0,
            log_chan_size: 0,
            is_console: true,
            is_file: None,
            compression: None,
        }
    }
}

impl LogParams {
    /// Resolve the parameters into a builder, substituting defaults.
    pub fn into_builder(self) -> SinkBuilder {
        let directory = non_empty_or(&self.log_path_dir, DEFAULT_DIRECTORY);
        let file_name = non_empty_or(&self.log_file_name, DEFAULT_FILE_NAME);
        let max_size = match &self.log_file_size {
            Some(FileSize::Bytes(0)) | None => DEFAULT_MAX_SIZE,
            Some(FileSize::Bytes(n)) => *n,
            Some(FileSize::Text(s)) => RotationSize::parse_or_default(s),
        };
        let format = if self.log_file_name_time_format.trim().is_empty() {
            DEFAULT_TIMESTAMP_FORMAT.to_string()
        } else {
            reference_layout_to_strftime(&self.log_file_name_time_format)
        };
        let retention_days = if self.log_exp_days == 0 {
            DEFAULT_RETENTION_DAYS
        } else {
            self.log_exp_days
        };

        let mut builder = SinkBuilder::new(directory, file_name)
            .file_output(self.is_file.unwrap_or(!self.is_console))
            .console(self.is_console)
            .color(self.log_color)
            .max_size(RotationSize::Bytes(max_size))
            .timestamp_format(format)
            .retention_days(retention_days)
            .channel_capacity(self.log_chan_size)
            .min_level(Level::from_number(self.level));
        if let Some(compression) = self.compression {
            builder = builder.compression(compression);
        }
        builder
    }
}

fn non_empty_or(value: &str, default: &str) -> String {
    if value.trim().is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}
