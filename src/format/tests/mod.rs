use super::*;
use crate::entity::TemporalTag;

fn sample_entity() -> Entity {
    Entity {
        id: EntityId::new([9u8; 36]),
        flags: 0,
        tags: vec![
            TemporalTag::new(10, "type:user"),
            TemporalTag::new(11, "identity:username:admin"),
        ],
        content: b"hello".to_vec(),
        created_ns: 10,
        updated_ns: 11,
    }
}

#[test]
fn header_round_trips() {
    let header = DataFileHeader {
        version: FORMAT_VERSION,
        flags: 0,
        index_offset: 4096,
        entity_count: 7,
    };
    let encoded = header.encode();
    assert_eq!(encoded.len(), HEADER_SIZE);
    let decoded = DataFileHeader::decode(&encoded).unwrap();
    assert_eq!(decoded, header);
}

#[test]
fn header_rejects_bad_magic() {
    let mut buf = DataFileHeader::empty().encode();
    buf[0] = b'X';
    let err = DataFileHeader::decode(&buf).unwrap_err();
    assert!(matches!(err, FormatError::BadMagic { .. }));
}

#[test]
fn header_rejects_unsupported_version() {
    let mut header = DataFileHeader::empty();
    header.version = 999;
    let buf = header.encode();
    let err = DataFileHeader::decode(&buf).unwrap_err();
    assert!(matches!(err, FormatError::UnsupportedVersion(999)));
}

#[test]
fn entity_record_round_trips() {
    let entity = sample_entity();
    let encoded = encode_entity_record(&entity).unwrap();
    let (decoded, consumed) = decode_entity_record(&encoded).unwrap();
    assert_eq!(consumed, encoded.len());
    assert_eq!(decoded, entity);
}

#[test]
fn entity_record_with_empty_tags_and_content_round_trips() {
    let entity = Entity {
        id: EntityId::new([0u8; 36]),
        flags: 0,
        tags: vec![],
        content: vec![],
        created_ns: 0,
        updated_ns: 0,
    };
    let encoded = encode_entity_record(&entity).unwrap();
    let (decoded, _) = decode_entity_record(&encoded).unwrap();
    assert_eq!(decoded, entity);
}

#[test]
fn entity_record_detects_content_corruption() {
    let entity = sample_entity();
    let mut encoded = encode_entity_record(&entity).unwrap();
    // Flip a byte inside the content region (after the header fields,
    // before the trailing checksum).
    let flip_at = encoded.len() - 40;
    encoded[flip_at] ^= 0xFF;
    let err = decode_entity_record(&encoded).unwrap_err();
    assert!(matches!(err, FormatError::ChecksumMismatch(_)));
}

#[test]
fn offset_index_round_trips_and_binary_searches() {
    let entries = vec![
        OffsetIndexEntry {
            id: EntityId::new([1u8; 36]),
            offset: 100,
        },
        OffsetIndexEntry {
            id: EntityId::new([2u8; 36]),
            offset: 200,
        },
        OffsetIndexEntry {
            id: EntityId::new([3u8; 36]),
            offset: 300,
        },
    ];
    let encoded = encode_offset_index(&entries).unwrap();
    let decoded = decode_offset_index(&encoded).unwrap();
    assert_eq!(decoded, entries);

    let found = find_in_offset_index(&decoded, &EntityId::new([2u8; 36]));
    assert_eq!(found, Some(200));

    let missing = find_in_offset_index(&decoded, &EntityId::new([9u8; 36]));
    assert_eq!(missing, None);
}

#[test]
fn content_checksum_is_deterministic() {
    let a = content_checksum(b"hello");
    let b = content_checksum(b"hello");
    assert_eq!(a, b);
    let c = content_checksum(b"hellx");
    assert_ne!(a, c);
}
