use super::*;

#[test]
fn stored_string_round_trips() {
    let tag = TemporalTag::new(1_700_000_000_000_000_000, "type:user");
    let stored = tag.to_stored_string();
    let parsed = TemporalTag::from_stored_string(&stored);
    assert_eq!(parsed, tag);
}

#[test]
fn split_effective_tag_handles_timestamped_form() {
    let (ts, tag) = split_effective_tag("12345|type:user");
    assert_eq!(ts, Some(12345));
    assert_eq!(tag, "type:user");
}

#[test]
fn split_effective_tag_tolerates_bare_tag() {
    let (ts, tag) = split_effective_tag("type:user");
    assert_eq!(ts, None);
    assert_eq!(tag, "type:user");
}

#[test]
fn split_effective_tag_tolerates_tag_containing_pipe() {
    // Non-numeric prefix before the separator: the whole string is the
    // effective tag, not just the part after the pipe.
    let (ts, tag) = split_effective_tag("weird|looking|tag");
    assert_eq!(ts, None);
    assert_eq!(tag, "weird|looking|tag");
}

#[test]
fn is_relationship_detects_reserved_prefix() {
    let tag = TemporalTag::new(0, "_source:abc");
    assert!(tag.is_relationship());
    let tag = TemporalTag::new(0, "type:user");
    assert!(!tag.is_relationship());
}

#[test]
fn entity_is_deleted_detects_tombstone_tag() {
    let id = EntityId::new([7u8; 36]);
    let mut entity = Entity::new(id, vec!["type:user".into()], vec![]);
    assert!(!entity.is_deleted());
    entity.tags.push(TemporalTag::new(1, DELETED_TAG));
    assert!(entity.is_deleted());
}

#[test]
fn entity_dataset_reads_dataset_tag() {
    let id = EntityId::new([1u8; 36]);
    let entity = Entity::new(id, vec!["dataset:worca".into(), "type:task".into()], vec![]);
    assert_eq!(entity.dataset(), Some("worca"));
}

#[test]
fn entity_id_display_is_lowercase_hex() {
    let id = EntityId::new([0xABu8; 36]);
    let text = id.to_string();
    assert_eq!(text.len(), 72);
    assert!(text.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
}
