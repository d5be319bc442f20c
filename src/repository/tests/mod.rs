use super::*;
use tempfile::TempDir;

fn test_config(dir: &TempDir) -> RepositoryConfig {
    RepositoryConfig {
        data_path: dir.path().to_path_buf(),
        shard_count: 8,
        entity_stripe_count: MIN_STRIPES,
        reader_pool_size: 4,
        metrics_worker_pool_size: 2,
        metrics_queue_size: 16,
        ..RepositoryConfig::default()
    }
}

fn sample_entity(byte: u8, tags: Vec<&str>) -> Entity {
    Entity::new(
        EntityId::new([byte; 36]),
        tags.into_iter().map(String::from).collect(),
        vec![byte; 16],
    )
}

#[test]
fn create_then_get_by_id_round_trips() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::open(test_config(&dir)).unwrap();

    let entity = sample_entity(1, vec!["type:user", "dataset:prod"]);
    let created = repo.create(entity).unwrap();
    assert!(created.created_ns > 0);

    let found = repo.get_by_id(&created.id).unwrap();
    assert_eq!(found.content, created.content);
    assert_eq!(found.tags.len(), 2);
}

#[test]
fn get_by_id_unknown_is_not_found() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::open(test_config(&dir)).unwrap();
    let err = repo.get_by_id(&EntityId::new([99u8; 36])).unwrap_err();
    assert!(matches!(err, RepositoryError::NotFound));
}

#[test]
fn list_by_tag_finds_created_entities() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::open(test_config(&dir)).unwrap();

    repo.create(sample_entity(1, vec!["type:user"])).unwrap();
    repo.create(sample_entity(2, vec!["type:user"])).unwrap();
    repo.create(sample_entity(3, vec!["type:admin"])).unwrap();

    let users = repo.list_by_tag("type:user").unwrap();
    assert_eq!(users.len(), 2);
}

#[test]
fn list_by_tags_match_all_intersects() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::open(test_config(&dir)).unwrap();

    repo.create(sample_entity(1, vec!["type:user", "dataset:prod"])).unwrap();
    repo.create(sample_entity(2, vec!["type:user", "dataset:dev"])).unwrap();

    let both = repo
        .list_by_tags(&["type:user".to_string(), "dataset:prod".to_string()], true)
        .unwrap();
    assert_eq!(both.len(), 1);
    assert_eq!(both[0].id, EntityId::new([1u8; 36]));
}

#[test]
fn list_by_tags_match_any_unions() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::open(test_config(&dir)).unwrap();

    repo.create(sample_entity(1, vec!["dataset:prod"])).unwrap();
    repo.create(sample_entity(2, vec!["dataset:dev"])).unwrap();

    let any = repo
        .list_by_tags(&["dataset:prod".to_string(), "dataset:dev".to_string()], false)
        .unwrap();
    assert_eq!(any.len(), 2);
}

#[test]
fn update_requires_prior_existence() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::open(test_config(&dir)).unwrap();

    let entity = sample_entity(1, vec!["type:user"]);
    let err = repo.update(entity).unwrap_err();
    assert!(matches!(err, RepositoryError::NotFound));
}

#[test]
fn update_preserves_history_and_indexes_new_tags() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::open(test_config(&dir)).unwrap();

    let created = repo.create(sample_entity(1, vec!["type:user"])).unwrap();

    let mut updated = created.clone();
    updated.tags.push(TemporalTag::new(0, "status:active"));
    let updated = repo.update(updated).unwrap();

    assert_eq!(updated.tags.len(), 2);
    assert_eq!(updated.created_ns, created.created_ns);
    assert!(updated.updated_ns >= created.created_ns);

    let by_status = repo.list_by_tag("status:active").unwrap();
    assert_eq!(by_status.len(), 1);
    let by_type = repo.list_by_tag("type:user").unwrap();
    assert_eq!(by_type.len(), 1);
}

#[test]
fn delete_is_logical_and_excludes_from_list_by_tag() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::open(test_config(&dir)).unwrap();

    let created = repo.create(sample_entity(1, vec!["type:user"])).unwrap();
    repo.delete(&created.id).unwrap();

    assert_eq!(repo.list_by_tag("type:user").unwrap().len(), 0);
    let fetched = repo.get_by_id(&created.id).unwrap();
    assert!(fetched.is_deleted());
}

#[test]
fn delete_unknown_entity_is_not_found() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::open(test_config(&dir)).unwrap();
    let err = repo.delete(&EntityId::new([5u8; 36])).unwrap_err();
    assert!(matches!(err, RepositoryError::NotFound));
}

#[test]
fn delete_twice_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::open(test_config(&dir)).unwrap();

    let created = repo.create(sample_entity(1, vec!["type:user"])).unwrap();
    repo.delete(&created.id).unwrap();
    repo.delete(&created.id).unwrap();
}

#[test]
fn query_as_of_reconstructs_a_past_tag_set() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::open(test_config(&dir)).unwrap();

    let created = repo.create(sample_entity(1, vec!["type:user"])).unwrap();
    let t0 = created.updated_ns;

    let mut updated = created.clone();
    updated.tags.push(TemporalTag::new(0, "status:active"));
    repo.update(updated).unwrap();

    let past = repo.query_as_of(&created.id, t0).unwrap();
    assert_eq!(past.tags.len(), 1);
    assert_eq!(past.tags[0].effective(), "type:user");
}

#[test]
fn history_and_diff_reflect_appended_tags() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::open(test_config(&dir)).unwrap();

    let created = repo.create(sample_entity(1, vec!["type:user"])).unwrap();
    let t1 = created.updated_ns;

    let mut updated = created.clone();
    updated.tags.push(TemporalTag::new(0, "status:active"));
    let updated = repo.update(updated).unwrap();
    let t2 = updated.updated_ns;

    let events = repo.history(&created.id, t1, t2).unwrap();
    assert!(events.iter().any(|e| e.tag == "status:active"));

    let (added, removed) = repo.diff(&created.id, t1, t2).unwrap();
    assert_eq!(added, vec!["status:active".to_string()]);
    assert!(removed.is_empty());
}

#[test]
fn checkpoint_persists_offset_index_and_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::open(test_config(&dir)).unwrap();

    let created = repo.create(sample_entity(1, vec!["type:user"])).unwrap();
    repo.checkpoint().unwrap();
    drop(repo);

    let repo = Repository::open(test_config(&dir)).unwrap();
    assert!(repo.persistent_index_loaded());
    assert_eq!(repo.entity_count(), 1);
    let found = repo.get_by_id(&created.id).unwrap();
    assert_eq!(found.content, created.content);
    let users = repo.list_by_tag("type:user").unwrap();
    assert_eq!(users.len(), 1);
}

#[test]
fn checkpointed_then_reopened_entity_keeps_its_temporal_history() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::open(test_config(&dir)).unwrap();

    let created = repo.create(sample_entity(1, vec!["type:user"])).unwrap();
    let t0 = created.updated_ns;
    repo.checkpoint().unwrap();
    drop(repo);

    let repo = Repository::open(test_config(&dir)).unwrap();
    let past = repo.query_as_of(&created.id, t0).unwrap();
    assert_eq!(past.tags.len(), 1);
    assert_eq!(past.tags[0].effective(), "type:user");
}

#[test]
fn reopen_without_checkpoint_replays_wal() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::open(test_config(&dir)).unwrap();
    let created = repo.create(sample_entity(1, vec!["type:user"])).unwrap();
    drop(repo);

    let repo = Repository::open(test_config(&dir)).unwrap();
    assert!(!repo.persistent_index_loaded());
    assert_eq!(repo.entity_count(), 1);
    let found = repo.get_by_id(&created.id).unwrap();
    assert_eq!(found.content, created.content);
    assert_eq!(repo.list_by_tag("type:user").unwrap().len(), 1);
}

#[test]
fn call_with_deadline_rejects_an_already_elapsed_deadline() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::open(test_config(&dir)).unwrap();
    let past = Instant::now() - std::time::Duration::from_secs(1);
    let err = repo.call_with_deadline(past, || Ok::<(), RepositoryError>(())).unwrap_err();
    assert!(matches!(err, RepositoryError::Timeout));
}

#[test]
fn dataset_strict_mode_rejects_entities_without_a_dataset_tag() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.dataset_strict_mode = true;
    let repo = Repository::open(config).unwrap();

    let err = repo.create(sample_entity(1, vec!["type:user"])).unwrap_err();
    assert!(matches!(err, RepositoryError::Internal(_)));

    repo.create(sample_entity(2, vec!["type:user", "dataset:prod"])).unwrap();
}

#[test]
fn operation_tracking_records_successes() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::open(test_config(&dir)).unwrap();
    repo.create(sample_entity(1, vec!["type:user"])).unwrap();
    let stats = repo.operations().stats(OperationType::Write);
    assert_eq!(stats.successes, 1);
}

#[test]
fn metrics_pool_is_none_until_started() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::open(test_config(&dir)).unwrap();
    assert!(repo.metrics_pool().is_none());
    let repo = repo.with_metrics_pool();
    assert!(repo.metrics_pool().is_some());
}
