use {
    logsink::{Level, Notices, PendingRecord, SinkBuilder, WriteChannel},
    proptest::prelude::*,
    std::{fs, time::Duration},
    tempfile::TempDir,
};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn burst_past_capacity_drops_exactly_the_excess(capacity in 1usize..64, extra in 0usize..64) {
        let (channel, drain) = WriteChannel::bounded(capacity, Notices::new());
        let burst = capacity + extra;
        let accepted = (0..burst)
            .filter(|i| channel.enqueue(PendingRecord::new(Level::Info, format!("{i}\n"))))
            .count();

        prop_assert_eq!(accepted, capacity);
        prop_assert_eq!(channel.counters().drops.total(), extra as u64);

        let batch = drain.next_batch();
        let warnings = batch
            .iter()
            .filter(|r| String::from_utf8_lossy(&r.bytes).contains("Logger dropped"))
            .count();
        prop_assert_eq!(batch.len(), capacity + warnings);
        prop_assert_eq!(warnings, usize::from(extra > 0));
        for (i, record) in batch.iter().take(capacity).enumerate() {
            prop_assert_eq!(&record.bytes, &format!("{i}\n").into_bytes());
        }
    }
}

#[test]
fn drop_warning_reaches_the_file() {
    let dir = TempDir::new().unwrap();
    let sink = SinkBuilder::new(dir.path(), "app.log")
        .channel_capacity(4)
        .flush_interval(Duration::from_secs(3600))
        .build()
        .unwrap();

    let accepted = (0..10).filter(|i| sink.info(format!("record {i}\n"))).count();
    assert_eq!(accepted, 4);
    sink.flush();

    let content = fs::read_to_string(dir.path().join("app.log")).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(&lines[..4], &["record 0", "record 1", "record 2", "record 3"]);
    let warning: serde_json::Value = serde_json::from_str(lines[4]).unwrap();
    assert_eq!(warning["l"], "warn");
    assert_eq!(warning["msg"], "Logger dropped 6 messages");

    let stats = sink.stats();
    assert_eq!(stats.enqueued, 4);
    assert_eq!(stats.dropped, 6);
    sink.shutdown();
}
