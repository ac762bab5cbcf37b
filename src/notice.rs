//! The sink's own warning path.
//!
//! Conditions the engine reports about itself (dropped records, failed
//! renames or deletes, unparseable rotated names) are rendered as one JSON
//! line each and queued here. The drain writes them ahead of the next batch,
//! outside the bound of the record channel.

use {
    crate::level::Level,
    chrono::{SecondsFormat, Utc},
    crossbeam_channel::{unbounded, Receiver, Sender},
    serde::Serialize,
};

#[derive(Serialize)]
struct NoticeRecord<'a> {
    t: String,
    l: &'a str,
    msg: &'a str,
}

/// Render a synthetic record in the same shape the structured encoder uses:
/// `{"t":"<rfc3339>","l":"warn","msg":"..."}` followed by a newline.
pub fn render(level: Level, msg: &str) -> Vec<u8> {
    let record = NoticeRecord {
        t: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        l: level.as_str(),
        msg,
    };
    let mut line = serde_json::to_vec(&record).unwrap_or_else(|_| format!("{} {}", level, msg).into_bytes());
    line.push(b'\n');
    line
}

/// Cloneable handle to the self-report queue.
#[derive(Clone)]
pub struct Notices {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

impl Notices {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Notices { tx, rx }
    }

    /// Queue a warning record.
    pub fn warn(&self, msg: impl Into<String>) {
        let msg = msg.into();
        tracing::debug!(notice = %msg, "queued self-report");
        // Both ends live in `self`, the queue cannot be disconnected here.
        let _ = self.tx.send(render(Level::Warn, &msg));
    }

    /// Take every queued record.
    pub fn take(&self) -> Vec<Vec<u8>> {
        self.rx.try_iter().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for Notices {
    fn default() -> Self {
        Self::new()
    }
}
