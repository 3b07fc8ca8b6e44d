use std::fs;
use std::path::Path;

use mw_runtime::{RunEvent, RunStatus, Worker, WorkerConfig};

const REQUEST: &str = include_str!("../fixtures/run_request.json");
const DATASET_MANIFEST: &str = include_str!("../fixtures/dataset_manifest.json");
const GDP_CSV: &str = include_str!("../fixtures/projections/ds1/gdp.csv");
const POP_CSV: &str = include_str!("../fixtures/projections/ds1/pop.csv");

fn write(path: &Path, body: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("mkdir");
    }
    fs::write(path, body).expect("write");
}

#[test]
fn directory_queue_and_local_store_drain_end_to_end() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("storage");
    let queue_dir = dir.path().join("queue");
    let events_path = dir.path().join("events").join("events.jsonl");

    write(&root.join("catalog/ds1/manifest.json"), DATASET_MANIFEST);
    write(&root.join("projections/ds1/GDP/part-0.csv"), GDP_CSV);
    write(&root.join("projections/ds1/POP/part-0.csv"), POP_CSV);
    write(&queue_dir.join("0001-request.json"), REQUEST);
    write(&queue_dir.join("0000-garbage.json"), "{ not a request");
    write(&queue_dir.join("notes.txt"), "ignored");

    let config = WorkerConfig::default()
        .with_storage_root(&root)
        .with_queue_dir(&queue_dir)
        .with_events_path(&events_path);
    let worker = Worker::from_config(&config).expect("worker");

    assert_eq!(worker.run_until_idle().expect("drain"), 1);

    assert!(!queue_dir.join("0001-request.json").exists());
    assert!(!queue_dir.join("0000-garbage.json").exists());
    assert!(queue_dir.join("notes.txt").exists());

    let events = fs::read_to_string(&events_path)
        .expect("events")
        .lines()
        .map(|line| serde_json::from_str::<RunEvent>(line).expect("event"))
        .collect::<Vec<_>>();
    assert_eq!(events.len(), 3);
    let RunEvent::Completed(done) = &events[2] else {
        panic!("last event should be completion: {:?}", events[2]);
    };
    assert_eq!(done.status, RunStatus::Success);
    assert_eq!(done.row_count, Some(3));

    let version_ts = done.version_ts.clone().expect("version");
    let data = root
        .join("metrics/gdp_per_capita")
        .join(&version_ts)
        .join("data/metrics.jsonl");
    assert_eq!(fs::read_to_string(data).expect("jsonl").lines().count(), 3);
    assert!(root.join("metrics/gdp_per_capita/current/manifest.json").is_file());
    assert!(root
        .join("metrics/gdp_per_capita/runs/run-2024-03-05-001.ok")
        .is_file());
}

#[test]
fn invalid_config_is_rejected_before_opening_anything() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = WorkerConfig::default()
        .with_queue_dir(dir.path().join("queue"))
        .with_poll_interval_ms(0);
    assert!(Worker::from_config(&config).is_err());
    assert!(!dir.path().join("queue").exists());
}
