//! Lazy in-order traversal.
//!
//! The iterator keeps an explicit stack of (node, cursor) frames instead of
//! materializing results up front; each `next()` does O(depth) work at
//! worst and nothing is shared between iterators, so a traversal can be
//! restarted at any time by asking the tree for a fresh one.

use super::node::NodeHandle;
use super::NodeArena;

/// Ascending iterator over `(key, value)` pairs of a subtree.
///
/// Yielded keys and values borrow from the arena. Created by
/// [`ArtTree::iter`](super::ArtTree::iter) and
/// [`ArtTree::iter_prefix`](super::ArtTree::iter_prefix).
pub struct Iter<'a, V> {
    arena: &'a NodeArena<V>,
    /// Traversal frames. Cursor 0 is the terminator slot; child cursors
    /// start at 1 and are class-specific (see `NodeArena::next_entry`).
    stack: Vec<(NodeHandle, u16)>,
}

impl<'a, V> Iter<'a, V> {
    pub(crate) fn empty(arena: &'a NodeArena<V>) -> Self {
        Self {
            arena,
            stack: Vec::new(),
        }
    }

    pub(crate) fn new(arena: &'a NodeArena<V>, root: NodeHandle) -> Self {
        Self {
            arena,
            stack: vec![(root, 0)],
        }
    }
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (&'a [u8], &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let arena = self.arena;
        loop {
            let &mut (h, ref mut cursor) = self.stack.last_mut()?;

            if h.is_leaf() {
                self.stack.pop();
                let leaf = arena.leaf(h);
                return Some((arena.bytes(leaf.key), &leaf.value));
            }

            if *cursor == 0 {
                *cursor = 1;
                // The terminator's key is a strict prefix of every key
                // below the children, so it comes first.
                let term = arena.term_of(h);
                if !term.is_null() {
                    let leaf = arena.leaf(term);
                    return Some((arena.bytes(leaf.key), &leaf.value));
                }
                continue;
            }

            match arena.next_entry(h, *cursor - 1) {
                Some((next, _, child)) => {
                    *cursor = next + 1;
                    self.stack.push((child, 0));
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}
