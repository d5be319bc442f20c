use super::*;
use crate::entity::TemporalTag;
use crate::format::{DataFileHeader, HEADER_SIZE, encode_entity_record};
use std::io::Write as _;
use tempfile::TempDir;

fn sample_entity(byte: u8) -> Entity {
    Entity {
        id: EntityId::new([byte; 36]),
        flags: 0,
        tags: vec![TemporalTag::new(1, "type:user")],
        content: b"hello".to_vec(),
        created_ns: 1,
        updated_ns: 1,
    }
}

/// Write a minimal data file: header, then each entity's record in order.
/// Returns each entity's starting offset.
fn write_data_file(path: &std::path::Path, entities: &[Entity]) -> Vec<u64> {
    let mut file = std::fs::File::create(path).unwrap();
    file.write_all(&DataFileHeader::empty().encode()).unwrap();
    let mut offsets = Vec::new();
    let mut cursor = HEADER_SIZE as u64;
    for entity in entities {
        offsets.push(cursor);
        let record = encode_entity_record(entity).unwrap();
        file.write_all(&record).unwrap();
        cursor += record.len() as u64;
    }
    offsets
}

#[test]
fn pool_acquire_reads_entity_at_offset() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data.ebf");
    let entities = vec![sample_entity(1), sample_entity(2)];
    let offsets = write_data_file(&path, &entities);

    let pool = ReaderPool::new(&path, 4);
    let reader = pool.acquire().unwrap();
    let found = reader.get_at_offset(offsets[1]).unwrap();
    assert_eq!(found, entities[1]);
}

#[test]
fn out_of_bounds_offset_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data.ebf");
    write_data_file(&path, &[sample_entity(1)]);

    let pool = ReaderPool::new(&path, 4);
    let reader = pool.acquire().unwrap();
    let err = reader.get_at_offset(10_000).unwrap_err();
    assert!(matches!(err, ReaderError::OutOfBounds { .. }));
}

#[test]
fn pool_reuses_released_readers_and_invalidate_drops_them() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data.ebf");
    write_data_file(&path, &[sample_entity(1)]);

    let pool = ReaderPool::new(&path, 4);
    {
        let _reader = pool.acquire().unwrap();
    }
    assert_eq!(pool.idle.lock().unwrap().len(), 1);

    pool.invalidate();
    assert_eq!(pool.idle.lock().unwrap().len(), 0);
}

#[test]
fn scan_records_visits_every_entity_in_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data.ebf");
    let entities = vec![sample_entity(1), sample_entity(2), sample_entity(3)];
    write_data_file(&path, &entities);

    let mut seen = Vec::new();
    scan_records(&path, HEADER_SIZE as u64, |id, _offset, entity| {
        seen.push((id, entity.content.clone()));
    })
    .unwrap();

    assert_eq!(seen.len(), 3);
    for (i, entity) in entities.iter().enumerate() {
        assert_eq!(seen[i].0, entity.id);
    }
}
