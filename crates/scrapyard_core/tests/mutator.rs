use scrapyard_core::{
    index_words, NewBlob, NewNode, NodePatch, NodeRef, NodeValidationError, Storage, StoreError,
    DEFAULT_SHELF_ID,
};

fn count(storage: &Storage, sql: &str, id: i64) -> i64 {
    storage
        .conn()
        .query_row(sql, [id], |row| row.get(0))
        .unwrap()
}

#[test]
fn delete_removes_blob_index_and_node_but_keeps_children() {
    let storage = Storage::open_in_memory().unwrap();
    let group = storage
        .create(&NewNode::group(DEFAULT_SHELF_ID, "g"), true)
        .unwrap();
    let child = storage
        .create(&NewNode::bookmark(group.id, "child", "http://c"), true)
        .unwrap();
    storage.store_blob(group.id, &NewBlob::text("<html/>")).unwrap();
    storage
        .store_index(group.id, &index_words("grouped words"))
        .unwrap();
    storage.store_blob(child.id, &NewBlob::text("kept")).unwrap();

    storage.delete_nodes(&[group.id]).unwrap();

    assert!(storage.get(group.id).unwrap().is_none());
    assert_eq!(count(&storage, "SELECT COUNT(*) FROM blobs WHERE node_id = ?1;", group.id), 0);
    assert_eq!(
        count(&storage, "SELECT COUNT(*) FROM node_index WHERE node_id = ?1;", group.id),
        0
    );
    assert!(storage.search_index("grouped").unwrap().is_empty());

    let orphan = storage.get(child.id).unwrap().unwrap();
    assert_eq!(orphan.parent_id, Some(group.id));
    assert!(storage.fetch_blob(&NodeRef::Id(child.id)).unwrap().is_some());
}

#[test]
fn delete_with_missing_id_rolls_back_whole_batch() {
    let storage = Storage::open_in_memory().unwrap();
    let node = storage
        .create(&NewNode::bookmark(DEFAULT_SHELF_ID, "x", "http://x"), true)
        .unwrap();

    let err = storage.delete_nodes(&[node.id, 31337]).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(NodeRef::Id(31337))));
    assert!(storage.get(node.id).unwrap().is_some());
}

#[test]
fn update_many_is_atomic() {
    let storage = Storage::open_in_memory().unwrap();
    let node = storage
        .create(&NewNode::bookmark(DEFAULT_SHELF_ID, "before", "http://x"), true)
        .unwrap();

    let mut rename = NodePatch::new(node.id);
    rename.name = Some("after".to_string());
    let err = storage
        .update_many(&[rename, NodePatch::new(555)])
        .unwrap_err();

    assert!(matches!(err, StoreError::NotFound(NodeRef::Id(555))));
    assert_eq!(storage.get(node.id).unwrap().unwrap().name, "before");
}

#[test]
fn update_many_applies_in_order_so_later_entries_win() {
    let storage = Storage::open_in_memory().unwrap();
    let node = storage
        .create(&NewNode::bookmark(DEFAULT_SHELF_ID, "n", "http://x"), true)
        .unwrap();

    let mut first = NodePatch::new(node.id);
    first.name = Some("first".to_string());
    first.pos = Some(3);
    let mut second = NodePatch::new(node.id);
    second.name = Some("second".to_string());

    let results = storage.update_many(&[first, second]).unwrap();
    assert_eq!(results.len(), 2);

    let stored = storage.get(node.id).unwrap().unwrap();
    assert_eq!(stored.name, "second");
    assert_eq!(stored.pos, 3);
}

#[test]
fn moving_into_own_subtree_is_rejected() {
    let storage = Storage::open_in_memory().unwrap();
    let outer = storage
        .create(&NewNode::group(DEFAULT_SHELF_ID, "outer"), true)
        .unwrap();
    let inner = storage
        .create(&NewNode::group(outer.id, "inner"), true)
        .unwrap();

    let mut patch = NodePatch::new(outer.id);
    patch.parent_id = Some(inner.id);
    assert!(matches!(
        storage.update(&patch).unwrap_err(),
        StoreError::Validation(NodeValidationError::CycleDetected { node_id, parent_id })
            if node_id == outer.id && parent_id == inner.id
    ));

    assert!(matches!(
        storage.move_nodes(&[outer.id], outer.id).unwrap_err(),
        StoreError::Validation(NodeValidationError::CycleDetected { .. })
    ));
    assert_eq!(
        storage.get(outer.id).unwrap().unwrap().parent_id,
        Some(DEFAULT_SHELF_ID)
    );
}
