use logsink::LogParams;

const CONFIG: &str = r#"{
    "level": 0,
    "log_color": true,
    "log_path_dir": "./logs",
    "log_file_name": "params.log",
    "log_file_name_time_format": "2006-01-02.150405",
    "log_file_size": "1MB",
    "log_exp_days": 14,
    "log_chan_size": 256,
    "is_console": true,
    "is_file": true
}"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let params: LogParams = serde_json::from_str(CONFIG)?;
    let sink = params.into_builder().build()?;

    sink.trace(b"suppressed: below the configured level\n");
    sink.debug(b"{\"l\":\"debug\",\"msg\":\"configured from json\"}\n");
    sink.info(b"{\"l\":\"info\",\"msg\":\"written to file and console\"}\n");

    sink.shutdown();
    Ok(())
}
