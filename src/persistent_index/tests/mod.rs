use super::*;
use crate::tagindex::TagIndex;
use tempfile::TempDir;

fn id(byte: u8) -> EntityId {
    EntityId::new([byte; 36])
}

#[test]
fn save_then_load_round_trips_entries() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dataset.idx");

    let index = TagIndex::new(8).unwrap();
    index.add("type:user", id(1));
    index.add("type:user", id(2));
    index.add("dataset:worca", id(1));

    save(&path, &index, 42).unwrap();
    let loaded = load(&path).unwrap();

    assert_eq!(loaded.high_watermark_lsn, 42);
    let mut entries = loaded.entries;
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(entries[0].0, "dataset:worca");
    assert_eq!(entries[1].0, "type:user");
    assert_eq!(entries[1].1, vec![id(1), id(2)]);
}

#[test]
fn load_rejects_bad_magic() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.idx");
    std::fs::write(&path, b"NOPE garbage bytes here").unwrap();
    assert!(matches!(load(&path), Err(PersistentIndexError::BadMagic)));
}

#[test]
fn load_detects_checksum_corruption() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dataset.idx");
    let index = TagIndex::new(8).unwrap();
    index.add("type:user", id(1));
    save(&path, &index, 0).unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 10;
    bytes[last] ^= 0xFF;
    std::fs::write(&path, &bytes).unwrap();

    assert!(matches!(load(&path), Err(PersistentIndexError::ChecksumMismatch)));
}

#[test]
fn load_missing_file_is_an_io_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing.idx");
    assert!(matches!(load(&path), Err(PersistentIndexError::Io(_))));
}

#[test]
fn save_is_atomic_via_rename_and_leaves_no_temp_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dataset.idx");
    let index = TagIndex::new(8).unwrap();
    save(&path, &index, 0).unwrap();
    assert!(path.exists());
    assert!(!path.with_extension("idx.tmp").exists());
}

#[test]
fn default_snapshot_path_swaps_extension() {
    let data_path = Path::new("data/worca.ebf");
    assert_eq!(default_snapshot_path(data_path), Path::new("data/worca.idx"));
}
