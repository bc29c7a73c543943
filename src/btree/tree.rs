//! B-tree core implementation.
//!
//! Every node — leaf or interior — stores real `(key, value-page)`
//! pairs; an interior node's entry at position `i` is both a
//! descendable separator and a live key the caller can look up
//! directly, and `chld[i]` is the subtree holding strictly smaller
//! keys. Search never re-descends into the node it is already in: it
//! always reads a freshly-addressed child page. Insertion splits a
//! full child before descending into it (so the current node is never
//! over `K_MAX` keys even transiently) and deletion fills an underfull
//! child — by rotation or merge — before descending into it, mirroring
//! the split discipline on the way down instead of fixing up on the
//! way back up.
//!
//! Only the root node is kept in memory between calls; every other
//! node is read fresh from disk each time it is visited and written
//! back before the call that touched it returns.

use crate::error::{Result, StorageError};
use crate::page::node::{pad_key, Node, NodeCodec};
use crate::page::value::{decode_value, encode_value};
use crate::storage::{Bitmap, DiskManager, DiskManagerImpl};
use crate::types::{min_fill, PageId};

pub struct BTree {
    dm: DiskManagerImpl,
    bitmap: Bitmap,
    codec: NodeCodec,
    key_len: usize,
    k_max: usize,
    page_size: usize,
    min_fill: usize,
    root: Node,
}

impl BTree {
    pub fn new(
        dm: DiskManagerImpl,
        bitmap: Bitmap,
        key_len: usize,
        k_max: usize,
        root_page: PageId,
    ) -> Result<Self> {
        let page_size = dm.page_size();
        let codec = NodeCodec::new(key_len, k_max);
        let root_buf = dm.read_page(root_page)?;
        let root = codec.decode(root_page, &root_buf)?;

        Ok(Self {
            dm,
            bitmap,
            codec,
            key_len,
            k_max,
            page_size,
            min_fill: min_fill(k_max),
            root,
        })
    }

    pub fn root_page(&self) -> PageId {
        self.root.page
    }

    pub fn k_max(&self) -> usize {
        self.k_max
    }

    pub fn key_len(&self) -> usize {
        self.key_len
    }

    pub fn live_pages(&self) -> usize {
        self.bitmap.live_count()
    }

    /// Access to the underlying page store, for callers (the `Db`
    /// facade) that need to persist data outside the tree itself, such
    /// as the metadata page's root pointer.
    pub fn disk_manager(&self) -> &DiskManagerImpl {
        &self.dm
    }

    /// Depth of the tree, root counted as level 1.
    pub fn height(&self) -> Result<usize> {
        let mut node = self.root.clone();
        let mut h = 1;
        while !node.is_leaf {
            node = self.read_node(node.chld[0])?;
            h += 1;
        }
        Ok(h)
    }

    fn read_node(&self, id: PageId) -> Result<Node> {
        let buf = self.dm.read_page(id)?;
        self.codec.decode(id, &buf)
    }

    fn write_node(&self, node: &Node) -> Result<()> {
        let buf = self.codec.encode(node);
        self.dm.write_page(node.page, &buf)
    }

    fn read_value(&self, id: PageId) -> Result<Vec<u8>> {
        let buf = self.dm.read_page(id)?;
        decode_value(id, &buf)
    }

    fn alloc_page(&mut self) -> Result<PageId> {
        self.bitmap.allocate(&self.dm)
    }

    fn free_page(&mut self, id: PageId) -> Result<()> {
        self.bitmap.free(&self.dm, id)
    }

    /// Rewrite `child_id`'s `parent_page` field to `new_parent`. Called
    /// whenever a child changes which node owns it — across a split,
    /// merge, rotate, root growth, or root contraction — so invariant 5
    /// (`parent_page` always names the real parent) survives the move.
    fn set_parent(&self, child_id: PageId, new_parent: PageId) -> Result<()> {
        let mut child = self.read_node(child_id)?;
        if child.parent_page != new_parent {
            child.parent_page = new_parent;
            self.write_node(&child)?;
        }
        Ok(())
    }

    fn reparent_all(&self, children: &[PageId], new_parent: PageId) -> Result<()> {
        for &id in children {
            self.set_parent(id, new_parent)?;
        }
        Ok(())
    }

    // ---- search -----------------------------------------------------

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let padded = pad_key(key, self.key_len)?;
        self.search(&self.root, &padded)
    }

    fn search(&self, node: &Node, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match node.find(key) {
            Ok(i) => Ok(Some(self.read_value(node.vals[i])?)),
            Err(i) => {
                if node.is_leaf {
                    Ok(None)
                } else {
                    let child = self.read_node(node.chld[i])?;
                    self.search(&child, key)
                }
            }
        }
    }

    // ---- insert -------------------------------------------------------

    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let padded = pad_key(key, self.key_len)?;
        // Validate the value fits in one page before touching the tree,
        // so a too-large value never leaves a partial mutation behind.
        encode_value(value, self.page_size)?;

        if self.root.is_full(self.k_max) {
            self.grow_root()?;
        }
        self.insert_non_full(self.root.page, &padded, value)?;
        self.root = self.read_node(self.root.page)?;
        Ok(())
    }

    /// Split a full node in two, promoting its median entry to the
    /// caller. `child` is mutated in place to become the left half;
    /// the right half is allocated, written, and returned by id.
    fn split_child(&mut self, child: &mut Node) -> Result<(Vec<u8>, PageId, PageId)> {
        let mid = (self.k_max - 1) / 2;
        let sep_key = child.keys[mid].clone();
        let sep_val = child.vals[mid];

        let right_page = self.alloc_page()?;
        let mut right = if child.is_leaf {
            Node::new_leaf(right_page, child.parent_page)
        } else {
            Node::new_interior(right_page, child.parent_page)
        };

        right.keys = child.keys.split_off(mid + 1);
        right.vals = child.vals.split_off(mid + 1);
        if !child.is_leaf {
            right.chld = child.chld.split_off(mid + 1);
            self.reparent_all(&right.chld, right_page)?;
        }
        child.keys.truncate(mid);
        child.vals.truncate(mid);

        self.write_node(&right)?;
        Ok((sep_key, sep_val, right_page))
    }

    /// Grow the tree by one level. The root's page id never changes:
    /// its current (full) contents move to a brand new left sibling,
    /// which is then split, and the root page is rewritten as the new
    /// two-child interior node.
    fn grow_root(&mut self) -> Result<()> {
        let old_root_page = self.root.page;
        let new_left_page = self.alloc_page()?;

        let mut new_left = self.root.clone();
        new_left.page = new_left_page;
        new_left.parent_page = old_root_page;
        if !new_left.is_leaf {
            // These children still think their parent is `old_root_page`
            // on disk; `new_left` just took over that subtree under a
            // new page id, so every child record needs to follow.
            self.reparent_all(&new_left.chld, new_left_page)?;
        }

        let (sep_key, sep_val, right_page) = self.split_child(&mut new_left)?;
        self.write_node(&new_left)?;

        let mut new_root = Node::new_interior(old_root_page, PageId(0));
        new_root.chld[0] = new_left_page;
        new_root.insert_interior_entry(0, sep_key, sep_val, right_page);
        self.write_node(&new_root)?;

        self.root = new_root;
        Ok(())
    }

    fn insert_non_full(&mut self, node_id: PageId, key: &[u8], value: &[u8]) -> Result<()> {
        let mut node = self.read_node(node_id)?;

        match node.find(key) {
            Ok(i) => {
                let old_val = node.vals[i];
                let new_val = self.alloc_page()?;
                let buf = encode_value(value, self.page_size)?;
                self.dm.write_page(new_val, &buf)?;
                self.free_page(old_val)?;
                node.vals[i] = new_val;
                self.write_node(&node)
            }
            Err(i) => {
                if node.is_leaf {
                    let val_page = self.alloc_page()?;
                    let buf = encode_value(value, self.page_size)?;
                    self.dm.write_page(val_page, &buf)?;
                    node.insert_leaf_entry(i, key.to_vec(), val_page);
                    self.write_node(&node)
                } else {
                    let child_id = node.chld[i];
                    let mut child = self.read_node(child_id)?;

                    if child.is_full(self.k_max) {
                        let (sep_key, sep_val, right_id) = self.split_child(&mut child)?;
                        self.write_node(&child)?;
                        node.insert_interior_entry(i, sep_key.clone(), sep_val, right_id);

                        match key.cmp(sep_key.as_slice()) {
                            std::cmp::Ordering::Less => {
                                self.write_node(&node)?;
                                self.insert_non_full(child_id, key, value)
                            }
                            std::cmp::Ordering::Equal => {
                                let new_val = self.alloc_page()?;
                                let buf = encode_value(value, self.page_size)?;
                                self.dm.write_page(new_val, &buf)?;
                                self.free_page(sep_val)?;
                                node.vals[i] = new_val;
                                self.write_node(&node)
                            }
                            std::cmp::Ordering::Greater => {
                                self.write_node(&node)?;
                                self.insert_non_full(right_id, key, value)
                            }
                        }
                    } else {
                        self.insert_non_full(child_id, key, value)
                    }
                }
            }
        }
    }

    // ---- delete ---------------------------------------------------------

    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        let padded = pad_key(key, self.key_len)?;
        let root_id = self.root.page;
        let found = self.delete_rec(root_id, &padded)?;
        self.root = self.read_node(root_id)?;
        if !self.root.is_leaf && self.root.n_keys() == 0 {
            self.contract_root()?;
        }
        Ok(found)
    }

    /// Root became an interior node with no keys (its one remaining
    /// child absorbed everything via merges). Collapse it down to that
    /// child's contents, keeping the root's own page id stable.
    fn contract_root(&mut self) -> Result<()> {
        let root_id = self.root.page;
        let only_child_id = self.root.chld[0];
        let mut child = self.read_node(only_child_id)?;
        child.page = root_id;
        child.parent_page = PageId(0);
        if !child.is_leaf {
            // `child`'s own children still point at `only_child_id`;
            // it now lives at `root_id`.
            self.reparent_all(&child.chld, root_id)?;
        }
        self.write_node(&child)?;
        self.free_page(only_child_id)?;
        self.root = child;
        Ok(())
    }

    fn delete_rec(&mut self, node_id: PageId, key: &[u8]) -> Result<bool> {
        let mut node = self.read_node(node_id)?;

        match node.find(key) {
            Ok(i) => {
                if node.is_leaf {
                    let (_, val) = node.remove_leaf_entry(i);
                    self.free_page(val)?;
                    self.write_node(&node)?;
                } else {
                    self.delete_from_interior(&mut node, i)?;
                    self.write_node(&node)?;
                }
                Ok(true)
            }
            Err(i) => {
                if node.is_leaf {
                    Ok(false)
                } else {
                    let child_id = node.chld[i];
                    let child = self.read_node(child_id)?;
                    if child.n_keys() <= self.min_fill {
                        let new_i = self.fill_child(&mut node, i)?;
                        self.write_node(&node)?;
                        self.delete_rec(node.chld[new_i], key)
                    } else {
                        self.delete_rec(child_id, key)
                    }
                }
            }
        }
    }

    /// `node.keys[i]`/`node.vals[i]` is the key being deleted, found as
    /// a separator in an interior node. Replace it with its predecessor
    /// or successor (whichever side has spare keys), or merge the two
    /// children together and recurse, per the standard B-tree deletion
    /// cases.
    fn delete_from_interior(&mut self, node: &mut Node, i: usize) -> Result<()> {
        let left_id = node.chld[i];
        let right_id = node.chld[i + 1];
        let left = self.read_node(left_id)?;
        let right = self.read_node(right_id)?;

        if left.n_keys() > self.min_fill {
            let old_val = node.vals[i];
            let (pred_key, pred_val) = self.delete_max(left_id)?;
            self.free_page(old_val)?;
            node.keys[i] = pred_key;
            node.vals[i] = pred_val;
            Ok(())
        } else if right.n_keys() > self.min_fill {
            let old_val = node.vals[i];
            let (succ_key, succ_val) = self.delete_min(right_id)?;
            self.free_page(old_val)?;
            node.keys[i] = succ_key;
            node.vals[i] = succ_val;
            Ok(())
        } else {
            let key = node.keys[i].clone();
            self.merge_children(node, i)?;
            let merged_id = node.chld[i];
            self.delete_rec(merged_id, &key)?;
            Ok(())
        }
    }

    /// Remove and return the largest key in the subtree rooted at
    /// `node_id`, filling underfull children along the way down.
    fn delete_max(&mut self, node_id: PageId) -> Result<(Vec<u8>, PageId)> {
        let mut node = self.read_node(node_id)?;
        if node.is_leaf {
            let i = node.n_keys() - 1;
            let entry = node.remove_leaf_entry(i);
            self.write_node(&node)?;
            Ok(entry)
        } else {
            let last = node.n_keys();
            let child_id = node.chld[last];
            let child = self.read_node(child_id)?;
            if child.n_keys() <= self.min_fill {
                let new_last = self.fill_child(&mut node, last)?;
                self.write_node(&node)?;
                self.delete_max(node.chld[new_last])
            } else {
                self.delete_max(child_id)
            }
        }
    }

    /// Remove and return the smallest key in the subtree rooted at
    /// `node_id`, filling underfull children along the way down.
    fn delete_min(&mut self, node_id: PageId) -> Result<(Vec<u8>, PageId)> {
        let mut node = self.read_node(node_id)?;
        if node.is_leaf {
            let entry = node.remove_leaf_entry(0);
            self.write_node(&node)?;
            Ok(entry)
        } else {
            let child_id = node.chld[0];
            let child = self.read_node(child_id)?;
            if child.n_keys() <= self.min_fill {
                let new_first = self.fill_child(&mut node, 0)?;
                self.write_node(&node)?;
                self.delete_min(node.chld[new_first])
            } else {
                self.delete_min(child_id)
            }
        }
    }

    /// Ensure `parent.chld[i]` has more than `min_fill` keys, by
    /// borrowing a key from a sibling through `parent` or merging with
    /// one. Returns the (possibly shifted, if a left-merge occurred)
    /// index of the child to continue descending into.
    fn fill_child(&mut self, parent: &mut Node, i: usize) -> Result<usize> {
        let has_left = i > 0;
        let has_right = i + 1 < parent.chld.len();

        if has_left {
            let left = self.read_node(parent.chld[i - 1])?;
            if left.n_keys() > self.min_fill {
                self.borrow_from_left(parent, i)?;
                return Ok(i);
            }
        }
        if has_right {
            let right = self.read_node(parent.chld[i + 1])?;
            if right.n_keys() > self.min_fill {
                self.borrow_from_right(parent, i)?;
                return Ok(i);
            }
        }
        if has_left {
            self.merge_children(parent, i - 1)?;
            Ok(i - 1)
        } else {
            self.merge_children(parent, i)?;
            Ok(i)
        }
    }

    /// Rotate one entry from the left sibling of `parent.chld[i]`
    /// through `parent` into `parent.chld[i]`.
    fn borrow_from_left(&mut self, parent: &mut Node, i: usize) -> Result<()> {
        let mut left = self.read_node(parent.chld[i - 1])?;
        let mut child = self.read_node(parent.chld[i])?;

        let sep_key = parent.keys[i - 1].clone();
        let sep_val = parent.vals[i - 1];

        let last = left.n_keys() - 1;
        let (lk, lv) = (left.keys.remove(last), left.vals.remove(last));

        child.keys.insert(0, sep_key);
        child.vals.insert(0, sep_val);
        if !child.is_leaf {
            let moved_child = left.chld.pop().expect("interior node has at least one child");
            self.set_parent(moved_child, child.page)?;
            child.chld.insert(0, moved_child);
        }

        parent.keys[i - 1] = lk;
        parent.vals[i - 1] = lv;

        self.write_node(&left)?;
        self.write_node(&child)?;
        Ok(())
    }

    /// Rotate one entry from the right sibling of `parent.chld[i]`
    /// through `parent` into `parent.chld[i]`.
    fn borrow_from_right(&mut self, parent: &mut Node, i: usize) -> Result<()> {
        let mut child = self.read_node(parent.chld[i])?;
        let mut right = self.read_node(parent.chld[i + 1])?;

        let sep_key = parent.keys[i].clone();
        let sep_val = parent.vals[i];

        let (rk, rv) = (right.keys.remove(0), right.vals.remove(0));

        child.keys.push(sep_key);
        child.vals.push(sep_val);
        if !child.is_leaf {
            let moved_child = right.chld.remove(0);
            self.set_parent(moved_child, child.page)?;
            child.chld.push(moved_child);
        }

        parent.keys[i] = rk;
        parent.vals[i] = rv;

        self.write_node(&child)?;
        self.write_node(&right)?;
        Ok(())
    }

    /// Merge `parent.chld[i]` and `parent.chld[i + 1]`, pulling
    /// `parent`'s separator entry at `i` down between them. The right
    /// sibling's page is freed; everything now lives in `chld[i]`.
    fn merge_children(&mut self, parent: &mut Node, i: usize) -> Result<()> {
        let mut left = self.read_node(parent.chld[i])?;
        let right = self.read_node(parent.chld[i + 1])?;

        let (sep_key, sep_val, right_id) = parent.remove_interior_entry(i);
        debug_assert_eq!(right_id, right.page);

        left.keys.push(sep_key);
        left.vals.push(sep_val);
        left.keys.extend(right.keys);
        left.vals.extend(right.vals);
        if !left.is_leaf {
            // `right.chld` still point at `right.page` on disk; they now
            // belong to `left`.
            self.reparent_all(&right.chld, left.page)?;
            left.chld.extend(right.chld);
        }

        self.write_node(&left)?;
        self.free_page(right.page)?;
        Ok(())
    }

    // ---- diagnostics --------------------------------------------------

    /// Visit every `(key, value)` pair in ascending order. Used for the
    /// `print`/debug dump surface, not exposed as a general cursor.
    pub fn for_each(&self, f: &mut dyn FnMut(&[u8], &[u8]) -> Result<()>) -> Result<()> {
        self.for_each_rec(&self.root, f)
    }

    /// Walk the whole tree checking the structural invariants that must
    /// hold after every completed top-level operation: per-node key
    /// bounds against the parent separator, minimum fill, equal leaf
    /// depth, and that every referenced page is actually allocated.
    /// Used by tests, not a hot-path operation.
    pub fn check_invariants(&self) -> Result<()> {
        let mut leaf_depths = Vec::new();
        self.check_node(&self.root, true, PageId(0), None, None, 0, &mut leaf_depths)?;
        if let (Some(first), Some(rest)) = (leaf_depths.first(), leaf_depths.get(1..)) {
            for d in rest.unwrap_or(&[]) {
                if d != first {
                    return Err(StorageError::invalid_operation("leaves are not all at equal depth"));
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::only_used_in_recursion)]
    fn check_node(
        &self,
        node: &Node,
        is_root: bool,
        expected_parent: PageId,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
        depth: usize,
        leaf_depths: &mut Vec<usize>,
    ) -> Result<()> {
        if node.parent_page != expected_parent {
            return Err(StorageError::invalid_operation(format!(
                "node {} has parent_page {} but its actual parent is {}",
                node.page, node.parent_page, expected_parent
            )));
        }
        if !is_root && node.n_keys() < self.min_fill {
            return Err(StorageError::invalid_operation(format!(
                "node {} underfull: {} keys < min_fill {}",
                node.page,
                node.n_keys(),
                self.min_fill
            )));
        }
        if node.n_keys() > self.k_max {
            return Err(StorageError::invalid_operation("node exceeds K_MAX"));
        }
        if let Some(lo) = lower {
            if let Some(first) = node.keys.first() {
                if first.as_slice() < lo {
                    return Err(StorageError::invalid_operation("node key below parent lower bound"));
                }
            }
        }
        if let Some(hi) = upper {
            if let Some(last) = node.keys.last() {
                if last.as_slice() > hi {
                    return Err(StorageError::invalid_operation("node key above parent upper bound"));
                }
            }
        }
        if !self.bitmap.is_allocated(node.page) {
            return Err(StorageError::invalid_operation("node page not marked allocated"));
        }
        for &v in &node.vals {
            if !self.bitmap.is_allocated(v) {
                return Err(StorageError::invalid_operation("value page not marked allocated"));
            }
        }

        if node.is_leaf {
            leaf_depths.push(depth);
        } else {
            for i in 0..=node.n_keys() {
                let child = self.read_node(node.chld[i])?;
                let lo = if i == 0 { lower } else { Some(node.keys[i - 1].as_slice()) };
                let hi = if i == node.n_keys() { upper } else { Some(node.keys[i].as_slice()) };
                self.check_node(&child, false, node.page, lo, hi, depth + 1, leaf_depths)?;
            }
        }
        Ok(())
    }

    fn for_each_rec(&self, node: &Node, f: &mut dyn FnMut(&[u8], &[u8]) -> Result<()>) -> Result<()> {
        if node.is_leaf {
            for i in 0..node.n_keys() {
                let value = self.read_value(node.vals[i])?;
                f(&node.keys[i], &value)?;
            }
        } else {
            for i in 0..node.n_keys() {
                let child = self.read_node(node.chld[i])?;
                self.for_each_rec(&child, f)?;
                let value = self.read_value(node.vals[i])?;
                f(&node.keys[i], &value)?;
            }
            let last_child = self.read_node(node.chld[node.n_keys()])?;
            self.for_each_rec(&last_child, f)?;
        }
        Ok(())
    }
}
