use super::*;
use board::{Shape, UserLevel};
use uuid::Uuid;

fn record(n: u128, ts: i64) -> BoardShape {
    let mut shape = BoardShape::new(Shape::rectangle(0.0, 0.0, 10.0, 10.0), "alice", UserLevel::Low);
    shape.id = Uuid::from_u128(n);
    shape.created_at = ts;
    shape.last_modified = ts;
    shape
}

fn temp_dir() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("whiteboard-checkpoints-{}", Uuid::new_v4()))
}

#[test]
fn memory_store_numbers_start_at_one() {
    let store = MemoryStore::new();
    assert_eq!(store.count(), INITIAL_CHECKPOINT_COUNT);
    assert_eq!(store.save(&[record(1, 10)]).expect("save"), 1);
    assert_eq!(store.save(&[record(2, 20)]).expect("save"), 2);
    assert_eq!(store.count(), 2);
}

#[test]
fn memory_store_fetch_round_trips() {
    let store = MemoryStore::new();
    let shapes = vec![record(1, 10), record(2, 20)];
    let number = store.save(&shapes).expect("save");
    assert_eq!(store.fetch(number).expect("fetch"), shapes);
}

#[test]
fn memory_store_unknown_number_is_not_found() {
    let store = MemoryStore::new();
    assert!(matches!(store.fetch(1), Err(CheckpointError::NotFound(1))));
    assert!(matches!(store.fetch(0), Err(CheckpointError::NotFound(0))));
}

#[test]
fn blob_store_saves_one_file_per_number() {
    let dir = temp_dir();
    let store = BlobStore::open(&dir).expect("open");
    assert_eq!(store.save(&[record(1, 10)]).expect("save"), 1);
    assert_eq!(store.save(&[record(2, 20)]).expect("save"), 2);

    assert!(dir.join("checkpoint-1.json").exists());
    assert!(dir.join("checkpoint-2.json").exists());
    assert_eq!(store.fetch(1).expect("fetch")[0].last_modified, 10);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn blob_store_recovers_count_on_reopen() {
    let dir = temp_dir();
    {
        let store = BlobStore::open(&dir).expect("open");
        store.save(&[record(1, 10)]).expect("save");
        store.save(&[record(2, 20)]).expect("save");
    }

    let reopened = BlobStore::open(&dir).expect("reopen");
    assert_eq!(reopened.count(), 2);
    // Numbering continues where the previous process stopped.
    assert_eq!(reopened.save(&[record(3, 30)]).expect("save"), 3);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn blob_store_unknown_number_is_not_found() {
    let dir = temp_dir();
    let store = BlobStore::open(&dir).expect("open");
    assert!(matches!(store.fetch(5), Err(CheckpointError::NotFound(5))));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn blob_store_ignores_foreign_files_on_scan() {
    let dir = temp_dir();
    std::fs::create_dir_all(&dir).expect("mkdir");
    std::fs::write(dir.join("notes.txt"), "not a checkpoint").expect("write");
    std::fs::write(dir.join("checkpoint-abc.json"), "[]").expect("write");

    let store = BlobStore::open(&dir).expect("open");
    assert_eq!(store.count(), 0);

    let _ = std::fs::remove_dir_all(&dir);
}
