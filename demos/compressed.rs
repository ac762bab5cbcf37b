use logsink::{Compression, RotationSize, SinkBuilder};
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sink = SinkBuilder::new("./logs", "compressed.log")
        .max_size(RotationSize::KB(4))
        .timestamp_format("%Y%m%d-%H%M%S%.3f")
        .rotation_check_interval(Duration::from_millis(100))
        .compression(Compression::Gzip)
        .file_mode(0o640)
        .build()?;

    for i in 0..2000 {
        sink.info(format!("{{\"l\":\"info\",\"msg\":\"line {i}\"}}\n"));
        if i % 200 == 0 {
            std::thread::sleep(Duration::from_millis(150));
        }
    }

    sink.flush();
    println!("{:?}", sink.stats());
    sink.shutdown();
    Ok(())
}
