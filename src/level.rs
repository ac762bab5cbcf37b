use {
    serde::{Deserialize, Serialize},
    std::{fmt, str::FromStr},
};

/// Severity tag carried next to each record.
///
/// The sink never inspects record bytes; the level is used only to suppress
/// records below the configured minimum and to pick a console color.
///
/// `Disabled` only makes sense as a minimum: it suppresses every record, and
/// a record tagged `Disabled` is never written.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[default]
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    Disabled,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
            Level::Disabled => "disabled",
        }
    }

    /// Map the numeric levels used by config files: `-1` trace through `4`
    /// fatal, `5` (panic) folds into fatal, and `6` (no level) or `7`
    /// (disabled) and above turn output off. Anything below trace enables
    /// everything.
    pub fn from_number(n: i8) -> Level {
        match n {
            i8::MIN..=-1 => Level::Trace,
            0 => Level::Debug,
            1 => Level::Info,
            2 => Level::Warn,
            3 => Level::Error,
            4 | 5 => Level::Fatal,
            _ => Level::Disabled,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Level::Trace),
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            "fatal" | "panic" => Ok(Level::Fatal),
            "disabled" | "off" => Ok(Level::Disabled),
            other => Err(format!("unknown level '{other}'")),
        }
    }
}

impl From<&tracing::Level> for Level {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            _ => Level::Error,
        }
    }
}
