use super::*;
use crate::entity::TemporalTag;
use crate::format::{DataFileHeader, HEADER_SIZE, encode_entity_record};
use crate::wal::Op;
use std::io::Write as _;
use tempfile::TempDir;

fn sample_entity(byte: u8) -> Entity {
    Entity {
        id: EntityId::new([byte; 36]),
        flags: 0,
        tags: vec![TemporalTag::new(1, "type:user")],
        content: vec![byte; 8],
        created_ns: 1,
        updated_ns: 1,
    }
}

#[test]
fn recover_corrupted_entity_finds_later_copy_in_wal() {
    let dir = TempDir::new().unwrap();
    let wal = Wal::open(dir.path().join("data.wal"), 0).unwrap();
    let entity = sample_entity(5);
    wal.append(Op::Create, 1, &entity).unwrap();

    let recovered = recover_corrupted_entity(&wal, dir.path(), entity.id).unwrap();
    assert_eq!(recovered, entity);
}

#[test]
fn recover_corrupted_entity_falls_back_to_backup_file() {
    let dir = TempDir::new().unwrap();
    let wal = Wal::open(dir.path().join("data.wal"), 0).unwrap();
    let entity = sample_entity(6);

    let backup_path = dir.path().join(format!("{}.bak", entity.id));
    std::fs::write(&backup_path, encode_entity_record(&entity).unwrap()).unwrap();

    let recovered = recover_corrupted_entity(&wal, dir.path(), entity.id).unwrap();
    assert_eq!(recovered, entity);
}

#[test]
fn recover_corrupted_entity_is_unrecoverable_with_no_sources() {
    let dir = TempDir::new().unwrap();
    let wal = Wal::open(dir.path().join("data.wal"), 0).unwrap();
    let id = EntityId::new([9u8; 36]);
    let err = recover_corrupted_entity(&wal, dir.path(), id).unwrap_err();
    assert!(matches!(err, RecoveryError::Unrecoverable(found) if found == id));
}

#[test]
fn repair_index_rebuilds_tag_and_temporal_indexes_from_scan() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data.ebf");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(&DataFileHeader::empty().encode()).unwrap();
    for byte in [1u8, 2, 3] {
        file.write_all(&encode_entity_record(&sample_entity(byte)).unwrap()).unwrap();
    }

    let rebuilt = repair_index(&path, 8, HEADER_SIZE as u64).unwrap();
    assert_eq!(rebuilt.entity_count, 3);
    assert_eq!(rebuilt.tag_index.lookup("type:user").len(), 3);
}

#[test]
fn repair_wal_replays_every_good_record_and_returns_last_lsn() {
    let dir = TempDir::new().unwrap();
    let wal = Wal::open(dir.path().join("data.wal"), 0).unwrap();
    wal.append(Op::Create, 1, &sample_entity(1)).unwrap();
    wal.append(Op::Create, 2, &sample_entity(2)).unwrap();

    let mut seen = Vec::new();
    let last_lsn = repair_wal(&wal, |record| seen.push(record.lsn)).unwrap();
    assert_eq!(seen, vec![0, 1]);
    assert_eq!(last_lsn, 1);
}
