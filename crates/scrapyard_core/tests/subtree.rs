use scrapyard_core::{NewNode, NodeId, NodeRef, Storage, StoreError, DEFAULT_SHELF_ID};
use std::collections::BTreeSet;

/// Builds a tree of `depth` levels with `fanout` groups per level under
/// `root`, returning every created id.
fn build_tree(storage: &Storage, root: NodeId, depth: usize, fanout: usize) -> BTreeSet<NodeId> {
    let mut created = BTreeSet::new();
    let mut frontier = vec![root];
    for level in 0..depth {
        let mut next = Vec::new();
        for parent in frontier {
            for index in 0..fanout {
                let group = storage
                    .create(&NewNode::group(parent, format!("l{level}-{index}")), true)
                    .unwrap();
                created.insert(group.id);
                next.push(group.id);
            }
        }
        frontier = next;
    }
    created
}

#[test]
fn resolves_root_plus_all_transitive_descendants() {
    let storage = Storage::open_in_memory().unwrap();
    let root = storage
        .create(&NewNode::group(DEFAULT_SHELF_ID, "root"), true)
        .unwrap();
    let mut expected = build_tree(&storage, root.id, 4, 3);
    expected.insert(root.id);

    let sibling = storage
        .create(&NewNode::group(DEFAULT_SHELF_ID, "sibling"), true)
        .unwrap();

    let resolved = storage.resolve_subtree(&[root.id]).unwrap();
    assert_eq!(resolved, expected);
    assert!(!resolved.contains(&sibling.id));
    assert!(!resolved.contains(&DEFAULT_SHELF_ID));
}

#[test]
fn resolution_is_idempotent() {
    let storage = Storage::open_in_memory().unwrap();
    build_tree(&storage, DEFAULT_SHELF_ID, 3, 2);

    let first = storage.resolve_subtree(&[DEFAULT_SHELF_ID]).unwrap();
    let second = storage.resolve_subtree(&[DEFAULT_SHELF_ID]).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 1 + 2 + 4 + 8);
}

#[test]
fn leaf_resolves_to_itself() {
    let storage = Storage::open_in_memory().unwrap();
    let leaf = storage
        .create(&NewNode::separator(DEFAULT_SHELF_ID), true)
        .unwrap();

    assert_eq!(
        storage.resolve_subtree(&[leaf.id]).unwrap(),
        BTreeSet::from([leaf.id])
    );
}

#[test]
fn missing_root_is_not_found() {
    let storage = Storage::open_in_memory().unwrap();
    let err = storage
        .resolve_subtree(&[DEFAULT_SHELF_ID, 4242])
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(NodeRef::Id(4242))));
}

#[test]
fn full_subtree_loads_nodes_in_id_order() {
    let storage = Storage::open_in_memory().unwrap();
    let group = storage
        .create(&NewNode::group(DEFAULT_SHELF_ID, "g"), true)
        .unwrap();
    let bookmark = storage
        .create(
            &NewNode::bookmark(group.id, "b", "http://b").with_tags(["kept"]),
            true,
        )
        .unwrap();

    let nodes = storage.query_full_subtree(&[group.id]).unwrap();
    let ids: Vec<_> = nodes.iter().map(|node| node.id).collect();
    assert_eq!(ids, vec![group.id, bookmark.id]);
    assert!(nodes[1].tags.contains("kept"));
}
