//! Integration tests for the on-disk journal: writer, day logs and replay
//! against a real directory.

use std::sync::Arc;
use tokio::sync::mpsc;
use weather_station::clock::{LocalZone, ManualClock, Timestamp};
use weather_station::data::{DayLogStore, FsMedium, ReplayEngine, StorageWriter};
use weather_station::status::StatusBoard;
use weather_station::SensorReading;

fn zone() -> LocalZone {
    LocalZone::from_offset_minutes(-240).unwrap()
}

fn ts(stamp: &str) -> Timestamp {
    zone().parse(stamp).unwrap()
}

fn reading_at(stamp: &str, temperature: f32) -> SensorReading {
    SensorReading {
        timestamp: ts(stamp),
        rain_fall: 1.2,
        wind_speed: 8.5,
        wind_direction: 90.0,
        temperature,
        humidity: 62.0,
        pressure: 100_800.0,
        valid: true,
    }
}

struct Journal {
    dir: tempfile::TempDir,
    store: DayLogStore,
    clock: Arc<ManualClock>,
}

impl Journal {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = DayLogStore::new(Arc::new(FsMedium::new(dir.path().join("sd"))));
        Self {
            dir,
            store,
            clock: Arc::new(ManualClock::new(0, zone())),
        }
    }

    fn writer(&self) -> StorageWriter {
        StorageWriter::new(self.store.clone(), self.clock.clone(), StatusBoard::new())
    }

    fn replay(&self, capacity: usize) -> (ReplayEngine, mpsc::Receiver<SensorReading>) {
        let (tx, rx) = mpsc::channel(capacity);
        let engine = ReplayEngine::new(self.store.clone(), self.clock.clone(), tx, StatusBoard::new());
        (engine, rx)
    }

    fn file(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join("sd").join(name)
    }
}

#[tokio::test]
async fn test_writer_creates_one_file_per_local_day() {
    let journal = Journal::new();
    let mut writer = journal.writer();

    writer.append(&reading_at("2024/03/01 23:59:00", 1.0)).await.unwrap();
    writer.append(&reading_at("2024/03/02 00:00:00", 2.0)).await.unwrap();
    writer.append(&reading_at("2024/03/02 00:01:00", 3.0)).await.unwrap();

    let day1 = std::fs::read_to_string(journal.file("weather-data_2024-03-01.csv")).unwrap();
    let day2 = std::fs::read_to_string(journal.file("weather-data_2024-03-02.csv")).unwrap();

    assert_eq!(
        day1,
        "2024/03/01 23:59:00,1.200000,8.500000,90.000000,1.000000,62.000000,100800.000000\n"
    );
    assert_eq!(day2.lines().count(), 2);
    assert!(day2.starts_with("2024/03/02 00:00:00,"));
}

#[tokio::test]
async fn test_replay_reads_back_across_days() {
    let journal = Journal::new();
    let mut writer = journal.writer();
    let stamps = [
        "2024/03/01 22:00:00",
        "2024/03/02 06:00:00",
        "2024/03/03 12:00:00",
        "2024/03/03 18:00:00",
    ];
    for (i, stamp) in stamps.iter().enumerate() {
        writer.append(&reading_at(stamp, i as f32)).await.unwrap();
    }

    let (engine, mut rx) = journal.replay(16);
    let report = engine
        .replay_with_report(ts("2024/03/01 00:00:00"), ts("2024/03/03 12:00:00"))
        .await
        .unwrap();

    assert_eq!(report.queued, 3);
    assert_eq!(report.days_visited, 3);
    let mut replayed = Vec::new();
    while let Ok(reading) = rx.try_recv() {
        replayed.push(reading);
    }
    assert_eq!(replayed[0], reading_at(stamps[0], 0.0));
    assert_eq!(replayed[2].timestamp, ts(stamps[2]));
}

#[tokio::test]
async fn test_replay_skips_corrupted_lines_on_disk() {
    let journal = Journal::new();
    let mut writer = journal.writer();
    writer.append(&reading_at("2024/03/01 10:00:00", 1.0)).await.unwrap();

    // a torn write followed by a good record
    {
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(journal.file("weather-data_2024-03-01.csv"))
            .unwrap();
        file.write_all(b"2024/03/01 10:05:00,1.2,8.5\r\n").unwrap();
    }
    writer.append(&reading_at("2024/03/01 10:10:00", 2.0)).await.unwrap();

    let (engine, mut rx) = journal.replay(16);
    let report = engine
        .replay_with_report(ts("2024/03/01 00:00:00"), ts("2024/03/01 23:59:59"))
        .await
        .unwrap();

    assert_eq!(report.queued, 2);
    assert_eq!(report.malformed, 1);
    assert_eq!(rx.recv().await.unwrap().temperature, 1.0);
    assert_eq!(rx.recv().await.unwrap().temperature, 2.0);
}

#[tokio::test]
async fn test_replay_of_a_missing_directory_is_empty() {
    let journal = Journal::new();
    let (engine, _rx) = journal.replay(4);

    let queued = engine
        .replay(ts("2024/03/01 00:00:00"), ts("2024/03/05 00:00:00"))
        .await
        .unwrap();
    assert_eq!(queued, 0);
}

#[tokio::test]
async fn test_writer_keeps_appending_during_a_replay() {
    let journal = Journal::new();
    let mut writer = journal.writer();
    for minute in 0..20 {
        writer
            .append(&reading_at(&format!("2024/03/01 10:{minute:02}:00"), minute as f32))
            .await
            .unwrap();
    }

    // capacity 1 keeps the replay parked on a full channel between lines
    let (engine, mut rx) = journal.replay(1);
    let replay = tokio::spawn(async move {
        engine
            .replay(ts("2024/03/01 10:00:00"), ts("2024/03/01 10:59:59"))
            .await
    });

    let first = rx.recv().await.unwrap();
    assert_eq!(first.timestamp, ts("2024/03/01 10:00:00"));

    // the writer must not be starved by the open reader
    tokio::time::timeout(
        std::time::Duration::from_secs(1),
        writer.append(&reading_at("2024/03/01 10:30:00", 99.0)),
    )
    .await
    .unwrap()
    .unwrap();

    let mut count = 1;
    while rx.recv().await.is_some() {
        count += 1;
    }
    let queued = replay.await.unwrap().unwrap();
    assert_eq!(queued, count);
    assert!(count >= 20);
}
