use tempfile::tempdir;

use headcount::logger::{CsvLog, LoggerSession};
use headcount::remote::{
    ImageRecord, ImageStatus, InMemoryStatusDb, PeopleField, StampedTime, StatusStore,
};

fn stamp(time: &str) -> StampedTime {
    StampedTime {
        date: "2024-03-01".to_string(),
        time: time.to_string(),
    }
}

fn push_count(store: &InMemoryStatusDb, device: &str, people: i64, time: &str) {
    store
        .update_count(device, &stamp(time), &PeopleField::Count(people))
        .expect("push count");
}

fn push_image(store: &InMemoryStatusDb, device: &str, file_name: &str, time: &str) {
    store
        .update_image_record(
            device,
            &ImageRecord {
                date: "2024-03-01".to_string(),
                time: time.to_string(),
                image_status: ImageStatus::Available,
                image_file_name: file_name.to_string(),
            },
        )
        .expect("push image");
}

#[test]
fn full_logging_run_writes_header_and_rows() {
    let dir = tempdir().expect("tempdir");
    let csv_path = dir.path().join("log.csv");

    let store = InMemoryStatusDb::new();
    push_count(&store, "lobby", 3, "12:00:00");
    push_image(&store, "lobby", "2024-03-01_12:00:00-count:3-0.jpg", "12:00:00");
    push_count(&store, "yard", 1, "12:00:30");

    let mut csv = CsvLog::open(&csv_path).expect("open csv");
    let mut session = LoggerSession::new();

    // Startup cycle: collected and reset, but not written.
    let first = session
        .run_cycle(&store, &stamp("12:05:00"))
        .expect("first cycle");
    assert!(first.is_none());

    // Devices push fresh data before the next cycle.
    push_count(&store, "lobby", 5, "12:09:00");
    push_count(&store, "yard", 0, "12:09:30");
    push_image(&store, "yard", "2024-03-01_12:09:30-count:0-1.jpg", "12:09:30");

    let row = session
        .run_cycle(&store, &stamp("12:10:00"))
        .expect("second cycle")
        .expect("row written");
    csv.append_row(&row).expect("append row");

    assert_eq!(
        row,
        vec![
            "2024-03-01".to_string(),
            "12:10:00".to_string(),
            "lobby".to_string(),
            "5".to_string(),
            // Still consumed in the first cycle, nothing fresh since.
            String::new(),
            "yard".to_string(),
            "0".to_string(),
            "2024-03-01_12:09:30-count:0-1.jpg".to_string(),
        ]
    );

    let contents = std::fs::read_to_string(&csv_path).expect("read csv");
    let mut lines = contents.lines();
    assert_eq!(
        lines.next().unwrap(),
        "date,time,location/device,people,image,location/device,people,image"
    );
    assert!(lines.next().unwrap().starts_with("2024-03-01,12:10:00,lobby,5"));
    assert!(lines.next().is_none());
}

#[test]
fn consumed_fields_reset_to_sentinels() {
    let store = InMemoryStatusDb::new();
    push_count(&store, "lobby", 2, "12:00:00");
    push_image(&store, "lobby", "still.jpg", "12:00:00");

    let mut session = LoggerSession::new();
    session
        .run_cycle(&store, &stamp("12:05:00"))
        .expect("cycle");

    let snapshot = store.fetch_snapshot().expect("snapshot");
    let device = &snapshot.devices["lobby"];
    assert_eq!(device.people, Some(PeopleField::waiting()));
    let image = device.last_image_captured.as_ref().expect("image record");
    assert_eq!(image.image_status, ImageStatus::Pulled);
    assert_eq!(image.image_file_name, "");
    assert_eq!(snapshot.logger_time, Some(stamp("12:05:00")));
}

#[test]
fn stalled_device_escalates_waiting_to_failed() {
    let store = InMemoryStatusDb::new();
    push_count(&store, "lobby", 2, "12:00:00");

    let mut session = LoggerSession::new();
    session
        .run_cycle(&store, &stamp("12:05:00"))
        .expect("first cycle");
    // No fresh push: the sentinel is logged and escalated.
    let row = session
        .run_cycle(&store, &stamp("12:10:00"))
        .expect("second cycle")
        .expect("row");
    assert_eq!(row[3], "WAITING");

    let snapshot = store.fetch_snapshot().expect("snapshot");
    assert_eq!(
        snapshot.devices["lobby"].people,
        Some(PeopleField::failed())
    );
}

#[test]
fn reopening_log_does_not_duplicate_header() {
    let dir = tempdir().expect("tempdir");
    let csv_path = dir.path().join("log.csv");

    let row = vec![
        "2024-03-01".to_string(),
        "12:10:00".to_string(),
        "lobby".to_string(),
        "5".to_string(),
        String::new(),
    ];
    {
        let mut csv = CsvLog::open(&csv_path).expect("open csv");
        csv.append_row(&row).expect("append");
    }
    {
        let mut csv = CsvLog::open(&csv_path).expect("reopen csv");
        csv.append_row(&row).expect("append again");
    }

    let contents = std::fs::read_to_string(&csv_path).expect("read csv");
    let headers = contents.lines().filter(|line| line.starts_with("date,")).count();
    assert_eq!(headers, 1);
    assert_eq!(contents.lines().count(), 3);
}
