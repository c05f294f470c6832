//! Adaptive node representations.
//!
//! Four fixed-shape classes cover the fan-out range:
//!
//! - Node4: up to 4 children, sorted (key, child) arrays
//! - Node16: 5-16 children, sorted arrays searched width-parallel
//! - Node48: 17-48 children, 256-entry byte table into 48 dense slots
//! - Node256: 49-256 children, direct array plus an occupancy bitmap
//!
//! Every class carries a compressed prefix and an optional terminator leaf
//! (a stored key that ends exactly at this node). A class only marks its own
//! slots: growing or shrinking to an adjacent class is the tree's job, done
//! as an explicit allocate-copy-release across pools.

use crate::arena::ByteRef;

use super::search;

/// Sentinel in the Node48 byte table for "no child".
pub(crate) const NO_SLOT: u8 = 0xFF;

/// The class of the record a [`NodeHandle`] points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum NodeKind {
    Leaf = 0,
    Node4 = 1,
    Node16 = 2,
    Node48 = 3,
    Node256 = 4,
}

/// Tagged handle to a pool slot: top 3 bits select the pool, low 29 bits are
/// the slot index. All-ones is null. Handles resolve only through the
/// `NodeArena` that issued them.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct NodeHandle(u32);

impl NodeHandle {
    pub(crate) const NULL: NodeHandle = NodeHandle(u32::MAX);

    const TAG_SHIFT: u32 = 29;
    const IDX_MASK: u32 = (1 << Self::TAG_SHIFT) - 1;

    #[inline]
    pub(crate) fn new(kind: NodeKind, idx: u32) -> Self {
        debug_assert!(idx < Self::IDX_MASK, "pool index overflows handle");
        Self(((kind as u32) << Self::TAG_SHIFT) | idx)
    }

    #[inline]
    pub(crate) fn is_null(self) -> bool {
        self.0 == u32::MAX
    }

    #[inline]
    pub(crate) fn kind(self) -> NodeKind {
        debug_assert!(!self.is_null(), "kind of null handle");
        match self.0 >> Self::TAG_SHIFT {
            0 => NodeKind::Leaf,
            1 => NodeKind::Node4,
            2 => NodeKind::Node16,
            3 => NodeKind::Node48,
            4 => NodeKind::Node256,
            _ => unreachable!("corrupt node handle"),
        }
    }

    #[inline]
    pub(crate) fn is_leaf(self) -> bool {
        !self.is_null() && self.kind() == NodeKind::Leaf
    }

    #[inline]
    pub(crate) fn idx(self) -> u32 {
        self.0 & Self::IDX_MASK
    }
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            write!(f, "NodeHandle(NULL)")
        } else {
            write!(f, "NodeHandle({:?}#{})", self.kind(), self.idx())
        }
    }
}

/// A stored key and its value. The full key is kept so lookups verify
/// against it and traversal can yield it without reconstruction.
pub(crate) struct Leaf<V> {
    pub key: ByteRef,
    pub value: V,
}

impl<V> Leaf<V> {
    pub(crate) fn new(key: ByteRef, value: V) -> Self {
        Self { key, value }
    }
}

/// Up to 4 children in sorted (key, child) arrays.
pub(crate) struct Node4 {
    pub prefix: ByteRef,
    pub count: u8,
    pub keys: [u8; 4],
    pub children: [NodeHandle; 4],
    pub term: NodeHandle,
}

impl Node4 {
    pub(crate) fn new(prefix: ByteRef) -> Self {
        Self {
            prefix,
            count: 0,
            keys: [0; 4],
            children: [NodeHandle::NULL; 4],
            term: NodeHandle::NULL,
        }
    }

    #[inline]
    pub(crate) fn find_child(&self, byte: u8) -> Option<NodeHandle> {
        let n = self.count as usize;
        for i in 0..n {
            if self.keys[i] == byte {
                return Some(self.children[i]);
            }
        }
        None
    }

    pub(crate) fn add_child(&mut self, byte: u8, child: NodeHandle) {
        let n = self.count as usize;
        debug_assert!(n < 4, "Node4 is full, tree must grow it first");
        let mut pos = n;
        for i in 0..n {
            debug_assert_ne!(self.keys[i], byte, "duplicate key byte");
            if byte < self.keys[i] {
                pos = i;
                break;
            }
        }
        for i in (pos..n).rev() {
            self.keys[i + 1] = self.keys[i];
            self.children[i + 1] = self.children[i];
        }
        self.keys[pos] = byte;
        self.children[pos] = child;
        self.count += 1;
    }

    pub(crate) fn remove_child(&mut self, byte: u8) -> NodeHandle {
        let n = self.count as usize;
        let pos = self.keys[..n]
            .iter()
            .position(|&k| k == byte)
            .expect("no child for key byte");
        let removed = self.children[pos];
        for i in pos..n - 1 {
            self.keys[i] = self.keys[i + 1];
            self.children[i] = self.children[i + 1];
        }
        self.children[n - 1] = NodeHandle::NULL;
        self.count -= 1;
        removed
    }

    pub(crate) fn replace_child(&mut self, byte: u8, child: NodeHandle) {
        let n = self.count as usize;
        let pos = self.keys[..n]
            .iter()
            .position(|&k| k == byte)
            .expect("no child for key byte");
        self.children[pos] = child;
    }

    #[inline]
    pub(crate) fn is_full(&self) -> bool {
        self.count == 4
    }
}

/// 5-16 children in sorted arrays; lookups and insertion positions use the
/// width-parallel search strategy.
pub(crate) struct Node16 {
    pub prefix: ByteRef,
    pub count: u8,
    pub keys: [u8; 16],
    pub children: [NodeHandle; 16],
    pub term: NodeHandle,
}

impl Node16 {
    pub(crate) fn new(prefix: ByteRef) -> Self {
        Self {
            prefix,
            count: 0,
            keys: [0; 16],
            children: [NodeHandle::NULL; 16],
            term: NodeHandle::NULL,
        }
    }

    #[inline]
    pub(crate) fn find_child(&self, byte: u8) -> Option<NodeHandle> {
        search::find_byte16(&self.keys, self.count as usize, byte).map(|i| self.children[i])
    }

    pub(crate) fn add_child(&mut self, byte: u8, child: NodeHandle) {
        let n = self.count as usize;
        debug_assert!(n < 16, "Node16 is full, tree must grow it first");
        debug_assert!(search::find_byte16(&self.keys, n, byte).is_none());
        let pos = search::insert_pos16(&self.keys, n, byte);
        for i in (pos..n).rev() {
            self.keys[i + 1] = self.keys[i];
            self.children[i + 1] = self.children[i];
        }
        self.keys[pos] = byte;
        self.children[pos] = child;
        self.count += 1;
    }

    pub(crate) fn remove_child(&mut self, byte: u8) -> NodeHandle {
        let n = self.count as usize;
        let pos =
            search::find_byte16(&self.keys, n, byte).expect("no child for key byte");
        let removed = self.children[pos];
        for i in pos..n - 1 {
            self.keys[i] = self.keys[i + 1];
            self.children[i] = self.children[i + 1];
        }
        self.children[n - 1] = NodeHandle::NULL;
        self.count -= 1;
        removed
    }

    pub(crate) fn replace_child(&mut self, byte: u8, child: NodeHandle) {
        let pos = search::find_byte16(&self.keys, self.count as usize, byte)
            .expect("no child for key byte");
        self.children[pos] = child;
    }

    #[inline]
    pub(crate) fn is_full(&self) -> bool {
        self.count == 16
    }
}

/// 17-48 children: a 256-entry byte table maps to 48 dense child slots.
/// Slots vacated by removals are found again by a null scan on insert.
pub(crate) struct Node48 {
    pub prefix: ByteRef,
    pub count: u8,
    pub child_index: [u8; 256],
    pub children: [NodeHandle; 48],
    pub term: NodeHandle,
}

impl Node48 {
    pub(crate) fn new(prefix: ByteRef) -> Self {
        Self {
            prefix,
            count: 0,
            child_index: [NO_SLOT; 256],
            children: [NodeHandle::NULL; 48],
            term: NodeHandle::NULL,
        }
    }

    #[inline]
    pub(crate) fn find_child(&self, byte: u8) -> Option<NodeHandle> {
        let slot = self.child_index[byte as usize];
        if slot == NO_SLOT {
            None
        } else {
            Some(self.children[slot as usize])
        }
    }

    pub(crate) fn add_child(&mut self, byte: u8, child: NodeHandle) {
        debug_assert!((self.count as usize) < 48, "Node48 is full, tree must grow it first");
        debug_assert_eq!(self.child_index[byte as usize], NO_SLOT, "duplicate key byte");
        let slot = self
            .children
            .iter()
            .position(|c| c.is_null())
            .expect("full Node48 must have been grown");
        self.children[slot] = child;
        self.child_index[byte as usize] = slot as u8;
        self.count += 1;
    }

    pub(crate) fn remove_child(&mut self, byte: u8) -> NodeHandle {
        let slot = self.child_index[byte as usize];
        assert_ne!(slot, NO_SLOT, "no child for key byte");
        self.child_index[byte as usize] = NO_SLOT;
        let removed = self.children[slot as usize];
        self.children[slot as usize] = NodeHandle::NULL;
        self.count -= 1;
        removed
    }

    pub(crate) fn replace_child(&mut self, byte: u8, child: NodeHandle) {
        let slot = self.child_index[byte as usize];
        assert_ne!(slot, NO_SLOT, "no child for key byte");
        self.children[slot as usize] = child;
    }

    #[inline]
    pub(crate) fn is_full(&self) -> bool {
        self.count == 48
    }
}

/// 49-256 children: direct array indexed by key byte, plus a 4-word
/// occupancy bitmap for O(1) first/last-occupied queries and ordered scans.
pub(crate) struct Node256 {
    pub prefix: ByteRef,
    pub count: u16,
    pub bitmap: [u64; 4],
    pub children: [NodeHandle; 256],
    pub term: NodeHandle,
}

impl Node256 {
    pub(crate) fn new(prefix: ByteRef) -> Self {
        Self {
            prefix,
            count: 0,
            bitmap: [0; 4],
            children: [NodeHandle::NULL; 256],
            term: NodeHandle::NULL,
        }
    }

    #[inline]
    pub(crate) fn find_child(&self, byte: u8) -> Option<NodeHandle> {
        let child = self.children[byte as usize];
        if child.is_null() {
            None
        } else {
            Some(child)
        }
    }

    pub(crate) fn add_child(&mut self, byte: u8, child: NodeHandle) {
        debug_assert!(self.children[byte as usize].is_null(), "duplicate key byte");
        self.children[byte as usize] = child;
        self.bitmap[byte as usize >> 6] |= 1u64 << (byte & 63);
        self.count += 1;
    }

    pub(crate) fn remove_child(&mut self, byte: u8) -> NodeHandle {
        let removed = self.children[byte as usize];
        assert!(!removed.is_null(), "no child for key byte");
        self.children[byte as usize] = NodeHandle::NULL;
        self.bitmap[byte as usize >> 6] &= !(1u64 << (byte & 63));
        self.count -= 1;
        removed
    }

    pub(crate) fn replace_child(&mut self, byte: u8, child: NodeHandle) {
        assert!(!self.children[byte as usize].is_null(), "no child for key byte");
        self.children[byte as usize] = child;
    }

    /// Lowest occupied key byte, if any.
    #[inline]
    pub(crate) fn first_key(&self) -> Option<u8> {
        search::first_set(&self.bitmap).map(|b| b as u8)
    }

    /// Highest occupied key byte, if any.
    #[inline]
    pub(crate) fn last_key(&self) -> Option<u8> {
        search::last_set(&self.bitmap).map(|b| b as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_handle(i: u32) -> NodeHandle {
        NodeHandle::new(NodeKind::Leaf, i)
    }

    #[test]
    fn handle_roundtrip() {
        for kind in [
            NodeKind::Leaf,
            NodeKind::Node4,
            NodeKind::Node16,
            NodeKind::Node48,
            NodeKind::Node256,
        ] {
            let h = NodeHandle::new(kind, 12345);
            assert_eq!(h.kind(), kind);
            assert_eq!(h.idx(), 12345);
            assert!(!h.is_null());
        }
        assert!(NodeHandle::NULL.is_null());
    }

    #[test]
    fn node4_keeps_keys_sorted() {
        let mut node = Node4::new(ByteRef::empty());
        node.add_child(b'c', leaf_handle(0));
        node.add_child(b'a', leaf_handle(1));
        node.add_child(b'd', leaf_handle(2));
        node.add_child(b'b', leaf_handle(3));
        assert!(node.is_full());
        assert_eq!(&node.keys, b"abcd");
        assert_eq!(node.find_child(b'b'), Some(leaf_handle(3)));
        assert_eq!(node.find_child(b'z'), None);
    }

    #[test]
    fn node4_remove_compacts() {
        let mut node = Node4::new(ByteRef::empty());
        node.add_child(1, leaf_handle(1));
        node.add_child(2, leaf_handle(2));
        node.add_child(3, leaf_handle(3));
        assert_eq!(node.remove_child(2), leaf_handle(2));
        assert_eq!(node.count, 2);
        assert_eq!(&node.keys[..2], &[1, 3]);
        assert_eq!(node.find_child(2), None);
        assert_eq!(node.find_child(3), Some(leaf_handle(3)));
    }

    #[test]
    fn node16_sorted_insert_and_lookup() {
        let mut node = Node16::new(ByteRef::empty());
        for (i, byte) in [9u8, 3, 200, 0, 255, 17, 4].iter().enumerate() {
            node.add_child(*byte, leaf_handle(i as u32));
        }
        let mut sorted = node.keys[..node.count as usize].to_vec();
        let before = sorted.clone();
        sorted.sort_unstable();
        assert_eq!(before, sorted);
        assert_eq!(node.find_child(200), Some(leaf_handle(2)));
        assert_eq!(node.find_child(5), None);
        node.remove_child(0);
        assert_eq!(node.find_child(0), None);
        assert_eq!(node.count, 6);
    }

    #[test]
    fn node48_reuses_vacated_slot() {
        let mut node = Node48::new(ByteRef::empty());
        for byte in 0..20u8 {
            node.add_child(byte, leaf_handle(byte as u32));
        }
        let slot = node.child_index[5];
        node.remove_child(5);
        assert_eq!(node.find_child(5), None);
        node.add_child(99, leaf_handle(99));
        // The vacated dense slot is the first null scan hit.
        assert_eq!(node.child_index[99], slot);
        assert_eq!(node.find_child(99), Some(leaf_handle(99)));
        assert_eq!(node.count, 20);
    }

    #[test]
    fn node256_bitmap_tracks_occupancy() {
        let mut node = Node256::new(ByteRef::empty());
        assert_eq!(node.first_key(), None);
        for byte in [200u8, 7, 63, 64, 128] {
            node.add_child(byte, leaf_handle(byte as u32));
        }
        assert_eq!(node.first_key(), Some(7));
        assert_eq!(node.last_key(), Some(200));
        node.remove_child(7);
        node.remove_child(200);
        assert_eq!(node.first_key(), Some(63));
        assert_eq!(node.last_key(), Some(128));
        assert_eq!(node.count, 3);
    }
}
