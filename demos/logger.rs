use logsink::{RotationSize, SinkBuilder};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sink = SinkBuilder::new("./logs", "logger.log")
        .max_size(RotationSize::KB(256))
        .retention_days(3)
        .build()?;

    sink.info(b"{\"l\":\"info\",\"msg\":\"This is an info message\"}\n");
    sink.warn(b"{\"l\":\"warn\",\"msg\":\"This is a warning message\"}\n");
    sink.error(b"{\"l\":\"error\",\"msg\":\"This is an error message\"}\n");

    sink.flush();
    println!("{:?}", sink.stats());
    sink.shutdown();
    Ok(())
}
