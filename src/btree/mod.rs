//! B-tree engine: point lookups, insertions, and deletions over a
//! fixed-width-key, one-value-page-per-key tree.

mod tree;

pub use tree::BTree;
