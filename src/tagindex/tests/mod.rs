use super::*;

fn id(byte: u8) -> EntityId {
    EntityId::new([byte; 36])
}

#[test]
fn add_then_lookup_returns_the_entity() {
    let index = TagIndex::new(8).unwrap();
    index.add("type:user", id(1));
    assert_eq!(index.lookup("type:user"), vec![id(1)]);
}

#[test]
fn add_is_idempotent() {
    let index = TagIndex::new(8).unwrap();
    index.add("type:user", id(1));
    index.add("type:user", id(1));
    assert_eq!(index.lookup("type:user"), vec![id(1)]);
}

#[test]
fn lookup_returns_ascending_sorted_ids() {
    let index = TagIndex::new(8).unwrap();
    index.add("type:user", id(9));
    index.add("type:user", id(1));
    index.add("type:user", id(5));
    assert_eq!(index.lookup("type:user"), vec![id(1), id(5), id(9)]);
}

#[test]
fn remove_is_noop_if_absent() {
    let index = TagIndex::new(8).unwrap();
    index.remove("type:user", id(1));
    assert!(index.lookup("type:user").is_empty());
}

#[test]
fn remove_drops_the_entry_when_last_id_removed() {
    let index = TagIndex::new(8).unwrap();
    index.add("type:user", id(1));
    index.remove("type:user", id(1));
    assert!(index.lookup("type:user").is_empty());
    assert!(index.snapshot_tags().is_empty());
}

#[test]
fn lookup_unknown_tag_is_empty() {
    let index = TagIndex::new(8).unwrap();
    assert!(index.lookup("nope").is_empty());
}

#[test]
fn lookup_prefix_fans_out_across_shards() {
    let index = TagIndex::new(16).unwrap();
    index.add("rbac:perm:entity:view", id(1));
    index.add("rbac:perm:entity:edit", id(2));
    index.add("type:user", id(3));

    let mut found = index.lookup_prefix("rbac:perm:");
    found.sort();
    assert_eq!(found, vec![id(1), id(2)]);
}

#[test]
fn result_is_independent_of_shard_count() {
    let tags = ["type:user", "type:task", "dataset:worca", "rbac:perm:entity:view"];
    let small = TagIndex::new(1).unwrap();
    let large = TagIndex::new(256).unwrap();
    for (i, tag) in tags.iter().enumerate() {
        small.add(tag, id(i as u8));
        large.add(tag, id(i as u8));
    }
    for tag in tags {
        assert_eq!(small.lookup(tag), large.lookup(tag));
    }
}

#[test]
fn snapshot_tags_is_sorted_by_tag_name() {
    let index = TagIndex::new(8).unwrap();
    index.add("zeta", id(1));
    index.add("alpha", id(2));
    let snapshot = index.snapshot_tags();
    let names: Vec<_> = snapshot.iter().map(|(t, _)| t.as_str()).collect();
    assert_eq!(names, vec!["alpha", "zeta"]);
}
