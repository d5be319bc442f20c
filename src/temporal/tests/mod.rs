use super::*;

fn id() -> EntityId {
    EntityId::new([1u8; 36])
}

#[test]
fn as_of_before_any_event_is_empty() {
    let index = TemporalIndex::new();
    assert!(index.as_of(id(), 0).is_empty());
}

#[test]
fn as_of_reflects_additions_up_to_t() {
    let index = TemporalIndex::new();
    index.append(id(), 10, "status:open", EventOp::Add);
    index.append(id(), 20, "status:closed", EventOp::Add);

    assert_eq!(index.as_of(id(), 10), vec!["status:open".to_string()]);
    let at_20 = index.as_of(id(), 20);
    assert!(at_20.contains(&"status:open".to_string()));
    assert!(at_20.contains(&"status:closed".to_string()));
}

#[test]
fn implicit_removal_drops_the_tag_from_as_of() {
    let index = TemporalIndex::new();
    index.append(id(), 10, "status:open", EventOp::Add);
    index.append(id(), 20, "status:open", EventOp::RemoveImplicit);
    assert!(index.as_of(id(), 20).is_empty());
    assert_eq!(index.as_of(id(), 10), vec!["status:open".to_string()]);
}

#[test]
fn history_returns_events_within_window_ascending() {
    let index = TemporalIndex::new();
    index.append(id(), 10, "a", EventOp::Add);
    index.append(id(), 20, "b", EventOp::Add);
    index.append(id(), 30, "c", EventOp::Add);

    let events = index.history(id(), 15, 25);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].tag, "b");
}

#[test]
fn diff_reports_added_and_removed() {
    let index = TemporalIndex::new();
    index.append(id(), 10, "status:open", EventOp::Add);
    index.append(id(), 20, "status:open", EventOp::RemoveImplicit);
    index.append(id(), 20, "status:closed", EventOp::Add);

    let (added, removed) = index.diff(id(), 10, 20);
    assert_eq!(added, vec!["status:closed".to_string()]);
    assert_eq!(removed, vec!["status:open".to_string()]);
}

#[test]
fn equal_timestamps_tie_break_by_insertion_order() {
    let index = TemporalIndex::new();
    index.append(id(), 10, "a", EventOp::Add);
    index.append(id(), 10, "b", EventOp::Add);
    let events = index.history(id(), 10, 10);
    assert_eq!(events.iter().map(|e| e.tag.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
}

#[test]
fn clear_removes_all_timelines() {
    let index = TemporalIndex::new();
    index.append(id(), 10, "a", EventOp::Add);
    index.clear();
    assert!(index.as_of(id(), 10).is_empty());
}

#[test]
fn unknown_entity_history_is_empty() {
    let index = TemporalIndex::new();
    assert!(index.history(id(), 0, u64::MAX).is_empty());
}
