//! Property-based tests for the structural invariants a correct tree
//! must maintain after every completed insert/delete: sorted keys,
//! minimum fill, equal leaf depth, and full bitmap accounting.

use btreekv::btree::BTree;
use btreekv::page::node::{k_max_for, Node, NodeCodec};
use btreekv::storage::{bitmap_pages_needed, Bitmap, DiskManager, DiskManagerImpl};
use btreekv::PageId;
use proptest::prelude::*;
use std::collections::BTreeMap;
use tempfile::tempdir;

const KEY_LEN: usize = 4;
const N_PAGES: u32 = 4096;

fn fresh_tree() -> (BTree, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("invariants.db");
    let page_size = 4096;
    let k_max = k_max_for(KEY_LEN, page_size).unwrap();

    let dm = DiskManagerImpl::create(&path, N_PAGES, page_size, false).unwrap();
    let bitmap_pages = bitmap_pages_needed(N_PAGES, page_size);
    let mut bitmap = Bitmap::populate(&dm, N_PAGES, page_size).unwrap();

    let root_page = PageId::new(bitmap_pages + 1);
    let codec = NodeCodec::new(KEY_LEN, k_max);
    let root = Node::new_leaf(root_page, PageId::new(0));
    dm.write_page(root_page, &codec.encode(&root)).unwrap();

    let allocated = bitmap.allocate(&dm).unwrap();
    assert_eq!(allocated, root_page);

    let tree = BTree::new(dm, bitmap, KEY_LEN, k_max, root_page).unwrap();
    (tree, dir)
}

/// Keys are drawn from a small alphabet and fixed width so that
/// `pad_key` never truncates or fails, and so collisions (which
/// exercise the update-in-place path) happen often enough to matter.
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-d]{4}"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    /// After any sequence of inserts and deletes, the tree must still
    /// satisfy its structural invariants (bounds, min-fill, equal leaf
    /// depth, bitmap consistency), and a plain in-order walk must
    /// agree exactly with a reference `BTreeMap` built the same way.
    #[test]
    fn random_insert_delete_preserves_invariants(
        ops in prop::collection::vec(
            (prop::bool::ANY, key_strategy()),
            1..200,
        )
    ) {
        let (mut tree, _dir) = fresh_tree();
        let mut model: BTreeMap<String, String> = BTreeMap::new();

        for (i, (is_insert, key)) in ops.iter().enumerate() {
            if *is_insert {
                let value = format!("v{i}");
                tree.insert(key.as_bytes(), value.as_bytes()).unwrap();
                model.insert(key.clone(), value);
            } else {
                let found = tree.delete(key.as_bytes()).unwrap();
                let expected = model.remove(key).is_some();
                prop_assert_eq!(found, expected);
            }
            tree.check_invariants().unwrap();
        }

        let mut observed = Vec::new();
        tree.for_each(&mut |k, v| {
            let trimmed_end = k.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
            observed.push((
                String::from_utf8(k[..trimmed_end].to_vec()).unwrap(),
                String::from_utf8(v.to_vec()).unwrap(),
            ));
            Ok(())
        })
        .unwrap();

        let expected: Vec<(String, String)> =
            model.into_iter().map(|(k, v)| (k, v)).collect();
        prop_assert_eq!(observed, expected);
    }
}

#[test]
fn empty_tree_satisfies_invariants() {
    let (tree, _dir) = fresh_tree();
    tree.check_invariants().unwrap();
}

#[test]
fn deep_tree_satisfies_invariants() {
    let (mut tree, _dir) = fresh_tree();
    for i in 0..2000u32 {
        let key = format!("{:04}", i % 10000);
        tree.insert(key.as_bytes(), b"x").unwrap();
        if i % 3 == 0 {
            let doomed = format!("{:04}", (i / 2) % 10000);
            tree.delete(doomed.as_bytes()).unwrap();
        }
    }
    tree.check_invariants().unwrap();
    assert!(tree.height().unwrap() >= 1);
}
