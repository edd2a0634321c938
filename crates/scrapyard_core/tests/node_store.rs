use scrapyard_core::{
    NewNode, NodePatch, NodeRef, NodeType, NodeValidationError, Storage, StoreError, TodoState,
    DEFAULT_SHELF_ID,
};
use std::collections::BTreeSet;

fn setup() -> Storage {
    Storage::open_in_memory().unwrap()
}

#[test]
fn create_assigns_identity_timestamps_and_reset_order() {
    let storage = setup();
    let mut datum = NewNode::bookmark(DEFAULT_SHELF_ID, "x", "http://x");
    datum.pos = Some(9);
    datum.todo_pos = Some(4);

    let node = storage.create(&datum, true).unwrap();

    assert!(node.id > DEFAULT_SHELF_ID);
    assert_eq!(node.uuid.len(), 36);
    assert_eq!(node.parent_id, Some(DEFAULT_SHELF_ID));
    assert_eq!(node.pos, 1);
    assert_eq!(node.todo_pos, 1);
    assert_eq!(node.date_added, node.date_modified);
    assert_eq!(storage.get(node.id).unwrap(), Some(node));
}

#[test]
fn create_without_reset_keeps_caller_order() {
    let storage = setup();
    let mut datum = NewNode::group(DEFAULT_SHELF_ID, "ordered");
    datum.pos = Some(7);

    let node = storage.create(&datum, false).unwrap();
    assert_eq!(node.pos, 7);
    assert_eq!(node.todo_pos, 1);
}

#[test]
fn uuids_and_ids_are_unique_and_never_reused() {
    let storage = setup();
    let mut uuids = BTreeSet::new();
    let mut last_id = DEFAULT_SHELF_ID;
    for index in 0..50 {
        let node = storage
            .create(
                &NewNode::bookmark(DEFAULT_SHELF_ID, format!("b{index}"), "http://b"),
                true,
            )
            .unwrap();
        assert!(uuids.insert(node.uuid));
        assert!(node.id > last_id);
        last_id = node.id;
    }

    storage.delete_nodes(&[last_id]).unwrap();
    let next = storage
        .create(&NewNode::bookmark(DEFAULT_SHELF_ID, "after", "http://a"), true)
        .unwrap();
    assert!(next.id > last_id);
}

#[test]
fn get_by_uuid_and_get_many_skip_missing() {
    let storage = setup();
    let a = storage
        .create(&NewNode::group(DEFAULT_SHELF_ID, "a"), true)
        .unwrap();

    assert_eq!(storage.get_by_uuid(&a.uuid).unwrap().unwrap().id, a.id);
    assert!(storage.get_by_uuid("no-such-uuid").unwrap().is_none());
    assert!(storage.get(999).unwrap().is_none());

    let many = storage.get_many(&[a.id, 999, DEFAULT_SHELF_ID]).unwrap();
    let ids: BTreeSet<_> = many.iter().map(|node| node.id).collect();
    assert_eq!(ids, BTreeSet::from([DEFAULT_SHELF_ID, a.id]));
}

#[test]
fn get_children_returns_direct_children_only() {
    let storage = setup();
    let group = storage
        .create(&NewNode::group(DEFAULT_SHELF_ID, "g"), true)
        .unwrap();
    let inner = storage
        .create(&NewNode::bookmark(group.id, "inner", "http://i"), true)
        .unwrap();

    let children: Vec<_> = storage
        .get_children(DEFAULT_SHELF_ID)
        .unwrap()
        .into_iter()
        .map(|node| node.id)
        .collect();
    assert_eq!(children, vec![group.id]);
    assert_eq!(storage.get_children(group.id).unwrap()[0].id, inner.id);
}

#[test]
fn update_merges_fields_and_bumps_date_modified() {
    let storage = setup();
    let node = storage
        .create(
            &NewNode::bookmark(DEFAULT_SHELF_ID, "old", "http://old").with_tags(["Rust", "db"]),
            true,
        )
        .unwrap();

    let mut patch = NodePatch::new(node.id);
    patch.name = Some("new".to_string());
    patch.todo_state = Some(Some(TodoState::Todo));
    let updated = storage.update(&patch).unwrap();

    assert_eq!(updated.name, "new");
    assert_eq!(updated.uri.as_deref(), Some("http://old"));
    assert_eq!(updated.tags, BTreeSet::from(["db".to_string(), "rust".to_string()]));
    assert_eq!(updated.todo_state, Some(TodoState::Todo));
    assert_eq!(updated.uuid, node.uuid);
    assert_eq!(updated.date_added, node.date_added);
    assert!(updated.date_modified > node.date_modified);
    assert_eq!(storage.get(node.id).unwrap(), Some(updated));
}

#[test]
fn back_to_back_updates_strictly_advance_date_modified() {
    let storage = setup();
    let node = storage
        .create(&NewNode::bookmark(DEFAULT_SHELF_ID, "x", "http://x"), true)
        .unwrap();

    let mut stamps = vec![node.date_modified];
    for round in 0..5 {
        let mut patch = NodePatch::new(node.id);
        patch.name = Some(format!("x{round}"));
        stamps.push(storage.update(&patch).unwrap().date_modified);
    }
    assert!(stamps.windows(2).all(|pair| pair[1] > pair[0]));

    let mut first = NodePatch::new(node.id);
    first.name = Some("first".to_string());
    let mut second = NodePatch::new(node.id);
    second.name = Some("second".to_string());
    let batch = storage.update_many(&[first, second]).unwrap();
    assert!(batch[1].date_modified > batch[0].date_modified);
    assert!(batch[0].date_modified > *stamps.last().unwrap());
}

#[test]
fn update_replaces_tags_and_clears_uri() {
    let storage = setup();
    let node = storage
        .create(
            &NewNode::bookmark(DEFAULT_SHELF_ID, "t", "http://t").with_tags(["a", "b"]),
            true,
        )
        .unwrap();

    let mut patch = NodePatch::new(node.id);
    patch.tags = Some(vec![" C ".to_string(), String::new()]);
    patch.uri = Some(None);
    let updated = storage.update(&patch).unwrap();

    assert_eq!(updated.tags, BTreeSet::from(["c".to_string()]));
    assert_eq!(updated.uri, None);
}

#[test]
fn update_missing_id_is_not_found() {
    let storage = setup();
    let err = storage.update(&NodePatch::new(404)).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(NodeRef::Id(404))));
}

#[test]
fn shape_violations_are_validation_errors() {
    let storage = setup();

    let orphan_group = NewNode::new(NodeType::Group, None, "floating");
    assert!(matches!(
        storage.create(&orphan_group, true).unwrap_err(),
        StoreError::Validation(NodeValidationError::MissingParent(NodeType::Group))
    ));

    let nested_shelf = NewNode::new(NodeType::Shelf, Some(DEFAULT_SHELF_ID), "nested");
    assert!(matches!(
        storage.create(&nested_shelf, true).unwrap_err(),
        StoreError::Validation(NodeValidationError::ShelfWithParent)
    ));

    let leaf = storage
        .create(&NewNode::bookmark(DEFAULT_SHELF_ID, "leaf", "http://l"), true)
        .unwrap();
    assert!(matches!(
        storage
            .create(&NewNode::bookmark(leaf.id, "child", "http://c"), true)
            .unwrap_err(),
        StoreError::Validation(NodeValidationError::ParentNotContainer { .. })
    ));
    assert!(matches!(
        storage
            .create(&NewNode::bookmark(777, "lost", "http://c"), true)
            .unwrap_err(),
        StoreError::Validation(NodeValidationError::ParentNotFound(777))
    ));
}

#[test]
fn container_with_children_cannot_become_leaf() {
    let storage = setup();
    let group = storage
        .create(&NewNode::group(DEFAULT_SHELF_ID, "g"), true)
        .unwrap();
    storage
        .create(&NewNode::bookmark(group.id, "b", "http://b"), true)
        .unwrap();

    let mut patch = NodePatch::new(group.id);
    patch.kind = Some(NodeType::Bookmark);
    assert!(matches!(
        storage.update(&patch).unwrap_err(),
        StoreError::Validation(NodeValidationError::LeafWithChildren(id)) if id == group.id
    ));
}

#[test]
fn duplicate_shelf_names_conflict_case_insensitively() {
    let storage = setup();
    storage.create(&NewNode::shelf("Reading"), true).unwrap();

    let err = storage.create(&NewNode::shelf("  reading"), true).unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}
