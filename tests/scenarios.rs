//! Scenario-style integration tests exercising the public `Db` façade
//! end to end against a real file on disk.

use btreekv::{Db, DbConfig};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

fn open_fresh(key_len: usize) -> (Db, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("scenario.db");
    let db = Db::create(DbConfig::new(&path).key_len(key_len)).unwrap();
    (db, dir)
}

/// Like `open_fresh`, but for scenarios that insert enough distinct
/// keys that the default 1 MiB file (each key claims its own value
/// page) would run out of space.
fn open_fresh_sized(key_len: usize, target_size: u64) -> (Db, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("scenario.db");
    let db = Db::create(
        DbConfig::new(&path)
            .key_len(key_len)
            .target_size(target_size),
    )
    .unwrap();
    (db, dir)
}

#[test]
fn scenario_basic_insert_and_miss() {
    // S1
    let (mut db, _dir) = open_fresh(3);
    db.insert(b"568", b"456789A").unwrap();
    db.insert(b"567", b"456789B").unwrap();
    db.insert(b"456", b"456789C").unwrap();

    assert_eq!(db.search(b"567").unwrap(), Some(b"456789B".to_vec()));
    assert_eq!(db.search(b"999").unwrap(), None);
}

#[test]
fn scenario_sorted_inserts_grow_height() {
    // S2: inserting a long run of sorted numeric keys should force at
    // least one split, growing the tree past a single leaf. 877 keys
    // each claim a value page, so the file needs to be sized well past
    // the default 1 MiB.
    let (mut db, _dir) = open_fresh_sized(3, 8 * 1024 * 1024);
    for n in 123..=999u32 {
        let key = n.to_string();
        db.insert(key.as_bytes(), key.as_bytes()).unwrap();
    }

    assert!(db.height().unwrap() >= 2);

    for n in 123..=999u32 {
        let key = n.to_string();
        assert_eq!(db.search(key.as_bytes()).unwrap(), Some(key.as_bytes().to_vec()));
    }
}

#[test]
fn scenario_delete_middle_key() {
    // S3
    let (mut db, _dir) = open_fresh(1);
    for (k, v) in [("a", "1"), ("b", "2"), ("c", "3"), ("d", "4"), ("e", "5")] {
        db.insert(k.as_bytes(), v.as_bytes()).unwrap();
    }

    assert!(db.delete(b"c").unwrap());
    assert_eq!(db.search(b"c").unwrap(), None);
    assert_eq!(db.search(b"b").unwrap(), Some(b"2".to_vec()));
    assert_eq!(db.search(b"d").unwrap(), Some(b"4".to_vec()));

    let stats = db.stats().unwrap();
    // a,b,d,e remain as keys plus the root/value pages; nothing leaked
    // beyond what four live entries need.
    assert!(stats.live_pages >= 4);
}

fn random_distinct_keys(rng: &mut StdRng, count: usize, key_len: usize) -> Vec<Vec<u8>> {
    let mut seen = std::collections::HashSet::new();
    let mut keys = Vec::with_capacity(count);
    while keys.len() < count {
        let key: Vec<u8> = (0..key_len).map(|_| rng.gen_range(b'a'..=b'z')).collect();
        if seen.insert(key.clone()) {
            keys.push(key);
        }
    }
    keys
}

#[test]
fn scenario_bulk_random_insert_and_half_delete() {
    // S4
    let mut rng = StdRng::seed_from_u64(42);
    let (mut db, _dir) = open_fresh_sized(12, 8 * 1024 * 1024);

    let keys = random_distinct_keys(&mut rng, 1024, 12);
    for (i, key) in keys.iter().enumerate() {
        let value = format!("v{i}");
        db.insert(key, value.as_bytes()).unwrap();
    }

    let mut shuffled = keys.clone();
    shuffled.shuffle(&mut rng);
    let (to_delete, to_keep) = shuffled.split_at(keys.len() / 2);

    for key in to_delete {
        assert!(db.delete(key).unwrap());
    }

    for key in to_delete {
        assert_eq!(db.search(key).unwrap(), None);
    }
    for key in to_keep {
        assert!(db.search(key).unwrap().is_some());
    }
}

#[test]
fn scenario_value_replacement_frees_old_page() {
    // S5
    let (mut db, _dir) = open_fresh(4);
    db.insert(b"k", b"first").unwrap();
    let before = db.stats().unwrap().live_pages;

    db.insert(b"k", b"second-value").unwrap();
    let after = db.stats().unwrap().live_pages;

    assert_eq!(db.search(b"k").unwrap(), Some(b"second-value".to_vec()));
    // one value page freed, one allocated: net page count unchanged.
    assert_eq!(before, after);
}

#[test]
fn scenario_reopen_after_bulk_workload() {
    // S6: repeat S4's workload, close, reopen, and verify identical results.
    let mut rng = StdRng::seed_from_u64(7);
    let dir = tempdir().unwrap();
    let path = dir.path().join("reopen.db");

    let keys = random_distinct_keys(&mut rng, 256, 10);
    let mut shuffled = keys.clone();
    shuffled.shuffle(&mut rng);
    let (to_delete, to_keep) = shuffled.split_at(keys.len() / 2);
    let to_delete = to_delete.to_vec();
    let to_keep = to_keep.to_vec();

    {
        let mut db = Db::create(
            DbConfig::new(&path).key_len(10).target_size(4 * 1024 * 1024),
        )
        .unwrap();
        for (i, key) in keys.iter().enumerate() {
            db.insert(key, format!("v{i}").as_bytes()).unwrap();
        }
        for key in &to_delete {
            assert!(db.delete(key).unwrap());
        }
    }

    {
        let db = Db::open(DbConfig::new(&path)).unwrap();
        for key in &to_delete {
            assert_eq!(db.search(key).unwrap(), None);
        }
        for key in &to_keep {
            assert!(db.search(key).unwrap().is_some());
        }
    }
}

#[test]
fn scenario_delete_absent_key_is_noop() {
    let (mut db, _dir) = open_fresh(4);
    db.insert(b"present", b"v").unwrap();
    assert!(!db.delete(b"absent").unwrap());
    assert_eq!(db.search(b"present").unwrap(), Some(b"v".to_vec()));
}
