use logsink::{Level, SinkBuilder, TimeZone};
use tracing_subscriber::util::SubscriberInitExt;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sink = SinkBuilder::new("./logs", "tracing.log")
        .time_zone(TimeZone::Local)
        .min_level(Level::Info)
        .console(true)
        .color(true)
        .build()?;
    tracing_subscriber::fmt()
        .json()
        .with_writer(sink.clone())
        .with_ansi(false)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .finish()
        .try_init()?;

    tracing::debug!("This is filtered out by the sink");
    tracing::info!("This is an info message");
    tracing::warn!("This is a warning message");
    tracing::error!("This is an error message");

    sink.shutdown();
    Ok(())
}
