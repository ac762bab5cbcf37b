use {
    crate::{channel::PendingRecord, level::Level},
    owo_colors::{OwoColorize, Style},
    std::io::{self, Write},
};

/// Style for a level, or the plain style when color is off.
fn level_style(level: Level, enabled: bool) -> Style {
    if !enabled {
        return Style::new();
    }
    match level {
        Level::Fatal | Level::Error => Style::new().red(),
        Level::Warn => Style::new().yellow(),
        Level::Info => Style::new().green(),
        Level::Debug | Level::Disabled => Style::new(),
        Level::Trace => Style::new().dimmed(),
    }
}

/// Writes batches to stdout, optionally colored by level.
pub struct ConsoleWriter {
    color: bool,
}

impl ConsoleWriter {
    pub fn new(color: bool) -> Self {
        ConsoleWriter { color }
    }

    pub fn write_batch(&self, batch: &[PendingRecord]) -> io::Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.write_to(&mut out, batch)?;
        out.flush()
    }

    fn write_to<W: Write>(&self, out: &mut W, batch: &[PendingRecord]) -> io::Result<()> {
        for record in batch {
            if !self.color {
                out.write_all(&record.bytes)?;
                continue;
            }
            // Style the line body and keep the terminator outside the escape
            // codes so the terminal reset lands on the same line.
            let text = String::from_utf8_lossy(&record.bytes);
            let body = text.trim_end_matches('\n');
            let style = level_style(record.level, true);
            write!(out, "{}", body.style(style))?;
            if body.len() != text.len() {
                out.write_all(b"\n")?;
            }
        }
        Ok(())
    }
}
