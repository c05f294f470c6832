//! Adaptive Radix Tree (ART) over arena storage.
//!
//! Based on "The Adaptive Radix Tree: ARTful Indexing for Main-Memory
//! Databases" by Leis et al., 2013.
//!
//! Key features:
//! - Adaptive node classes (4, 16, 48, 256 children)
//! - Prefix compression and lazy expansion
//! - Path compression on delete
//! - All storage arena-relative: 4-byte handles instead of pointers
//!
//! The tree itself ([`ArtTree`]) holds only a root handle; every node, leaf
//! and key byte lives in a [`NodeArena`] passed to each operation. Several
//! trees may share one arena. Resetting the arena invalidates every tree
//! built from it at once — that is a documented precondition, checked only
//! in debug builds (via the arena epoch), never at runtime cost.

mod iter;
mod node;
mod search;

pub use iter::Iter;

use std::marker::PhantomData;

use smallvec::SmallVec;

use crate::arena::{ByteRef, Pool, RecycledArena};

use node::{Leaf, Node16, Node256, Node4, Node48, NodeHandle, NodeKind, NO_SLOT};

/// Shrink Node16 down to Node4 at this occupancy.
const NODE16_SHRINK: usize = 3;
/// Shrink Node48 down to Node16 at this occupancy.
const NODE48_SHRINK: usize = 12;
/// Shrink Node256 down to Node48 at this occupancy.
const NODE256_SHRINK: usize = 37;

/// Scratch buffer for prefix bytes; spills to the heap past 32 bytes.
type PrefixBuf = SmallVec<[u8; 32]>;

/// Live-object statistics for a [`NodeArena`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtStats {
    /// Live leaves.
    pub leaf_count: usize,
    /// Live Node4 records.
    pub node4_count: usize,
    /// Live Node16 records.
    pub node16_count: usize,
    /// Live Node48 records.
    pub node48_count: usize,
    /// Live Node256 records.
    pub node256_count: usize,
    /// Bytes owned by the key/prefix arena (including recycled blocks).
    pub key_arena_bytes: usize,
}

/// Owns every node, leaf and key byte of the trees built from it.
///
/// Node classes live in one typed pool each, which gives every size class
/// its own free list: a class transition releases the old record and the
/// next allocation of that class reuses it. Key and prefix bytes live in a
/// [`RecycledArena`]; prefix blocks are released and reused as splits and
/// collapses rewrite them, while stored key bytes stay put until
/// [`reset`](NodeArena::reset).
pub struct NodeArena<V> {
    keys: RecycledArena,
    node4: Pool<Node4>,
    node16: Pool<Node16>,
    node48: Pool<Node48>,
    node256: Pool<Node256>,
    leaves: Pool<Leaf<V>>,
}

impl<V> NodeArena<V> {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self {
            keys: RecycledArena::new(),
            node4: Pool::new(),
            node16: Pool::new(),
            node48: Pool::new(),
            node256: Pool::new(),
            leaves: Pool::new(),
        }
    }

    /// Drop every node, leaf and key byte and rewind the byte arena.
    ///
    /// Every tree built from this arena is invalid afterwards; using one is
    /// caught by a `debug_assert` in debug builds and is unspecified (but
    /// memory-safe) in release builds.
    pub fn reset(&mut self) {
        self.keys.reset();
        self.node4.reset();
        self.node16.reset();
        self.node48.reset();
        self.node256.reset();
        self.leaves.reset();
    }

    /// Live-object counts and byte-arena footprint.
    pub fn stats(&self) -> ArtStats {
        ArtStats {
            leaf_count: self.leaves.len(),
            node4_count: self.node4.len(),
            node16_count: self.node16.len(),
            node48_count: self.node48.len(),
            node256_count: self.node256.len(),
            key_arena_bytes: self.keys.allocated_bytes(),
        }
    }

    #[inline]
    pub(crate) fn epoch(&self) -> u64 {
        self.keys.epoch()
    }

    #[inline]
    pub(crate) fn bytes(&self, r: ByteRef) -> &[u8] {
        self.keys.get(r)
    }

    fn store_prefix(&mut self, bytes: &[u8]) -> ByteRef {
        self.keys.alloc_bytes(bytes)
    }

    fn drop_prefix(&mut self, r: ByteRef) {
        self.keys.release_bytes(r);
    }

    // ---- leaves ----

    fn alloc_leaf(&mut self, key: &[u8], value: V) -> NodeHandle {
        let key_ref = self.keys.alloc_bytes(key);
        NodeHandle::new(NodeKind::Leaf, self.leaves.alloc(Leaf::new(key_ref, value)))
    }

    #[inline]
    pub(crate) fn leaf(&self, h: NodeHandle) -> &Leaf<V> {
        debug_assert!(h.is_leaf());
        self.leaves.get(h.idx())
    }

    fn leaf_mut(&mut self, h: NodeHandle) -> &mut Leaf<V> {
        debug_assert!(h.is_leaf());
        self.leaves.get_mut(h.idx())
    }

    /// Free a leaf record and return it. The key bytes it referenced are
    /// not reclaimed; they stay in the byte arena until `reset`.
    fn release_leaf(&mut self, h: NodeHandle) -> Leaf<V> {
        debug_assert!(h.is_leaf());
        self.leaves.release(h.idx())
    }

    // ---- node allocation and release ----

    fn alloc_node4(&mut self, n: Node4) -> NodeHandle {
        NodeHandle::new(NodeKind::Node4, self.node4.alloc(n))
    }

    /// Free a node record and return the prefix ref it held, so the caller
    /// can transfer or drop it.
    fn release_node(&mut self, h: NodeHandle) -> ByteRef {
        match h.kind() {
            NodeKind::Node4 => self.node4.release(h.idx()).prefix,
            NodeKind::Node16 => self.node16.release(h.idx()).prefix,
            NodeKind::Node48 => self.node48.release(h.idx()).prefix,
            NodeKind::Node256 => self.node256.release(h.idx()).prefix,
            NodeKind::Leaf => unreachable!("leaves are released via release_leaf"),
        }
    }

    // ---- uniform node accessors ----

    fn prefix_of(&self, h: NodeHandle) -> ByteRef {
        match h.kind() {
            NodeKind::Node4 => self.node4.get(h.idx()).prefix,
            NodeKind::Node16 => self.node16.get(h.idx()).prefix,
            NodeKind::Node48 => self.node48.get(h.idx()).prefix,
            NodeKind::Node256 => self.node256.get(h.idx()).prefix,
            NodeKind::Leaf => unreachable!("leaves carry no prefix"),
        }
    }

    fn set_prefix(&mut self, h: NodeHandle, r: ByteRef) {
        match h.kind() {
            NodeKind::Node4 => self.node4.get_mut(h.idx()).prefix = r,
            NodeKind::Node16 => self.node16.get_mut(h.idx()).prefix = r,
            NodeKind::Node48 => self.node48.get_mut(h.idx()).prefix = r,
            NodeKind::Node256 => self.node256.get_mut(h.idx()).prefix = r,
            NodeKind::Leaf => unreachable!("leaves carry no prefix"),
        }
    }

    pub(crate) fn term_of(&self, h: NodeHandle) -> NodeHandle {
        match h.kind() {
            NodeKind::Node4 => self.node4.get(h.idx()).term,
            NodeKind::Node16 => self.node16.get(h.idx()).term,
            NodeKind::Node48 => self.node48.get(h.idx()).term,
            NodeKind::Node256 => self.node256.get(h.idx()).term,
            NodeKind::Leaf => unreachable!("leaves carry no terminator"),
        }
    }

    fn set_term(&mut self, h: NodeHandle, term: NodeHandle) {
        match h.kind() {
            NodeKind::Node4 => self.node4.get_mut(h.idx()).term = term,
            NodeKind::Node16 => self.node16.get_mut(h.idx()).term = term,
            NodeKind::Node48 => self.node48.get_mut(h.idx()).term = term,
            NodeKind::Node256 => self.node256.get_mut(h.idx()).term = term,
            NodeKind::Leaf => unreachable!("leaves carry no terminator"),
        }
    }

    fn child_count(&self, h: NodeHandle) -> usize {
        match h.kind() {
            NodeKind::Node4 => self.node4.get(h.idx()).count as usize,
            NodeKind::Node16 => self.node16.get(h.idx()).count as usize,
            NodeKind::Node48 => self.node48.get(h.idx()).count as usize,
            NodeKind::Node256 => self.node256.get(h.idx()).count as usize,
            NodeKind::Leaf => 0,
        }
    }

    fn find_child(&self, h: NodeHandle, byte: u8) -> Option<NodeHandle> {
        match h.kind() {
            NodeKind::Node4 => self.node4.get(h.idx()).find_child(byte),
            NodeKind::Node16 => self.node16.get(h.idx()).find_child(byte),
            NodeKind::Node48 => self.node48.get(h.idx()).find_child(byte),
            NodeKind::Node256 => self.node256.get(h.idx()).find_child(byte),
            NodeKind::Leaf => None,
        }
    }

    /// Mark a child slot. The caller must have grown a full node first.
    fn add_child(&mut self, h: NodeHandle, byte: u8, child: NodeHandle) {
        match h.kind() {
            NodeKind::Node4 => self.node4.get_mut(h.idx()).add_child(byte, child),
            NodeKind::Node16 => self.node16.get_mut(h.idx()).add_child(byte, child),
            NodeKind::Node48 => self.node48.get_mut(h.idx()).add_child(byte, child),
            NodeKind::Node256 => self.node256.get_mut(h.idx()).add_child(byte, child),
            NodeKind::Leaf => unreachable!("leaves have no children"),
        }
    }

    fn remove_child(&mut self, h: NodeHandle, byte: u8) -> NodeHandle {
        match h.kind() {
            NodeKind::Node4 => self.node4.get_mut(h.idx()).remove_child(byte),
            NodeKind::Node16 => self.node16.get_mut(h.idx()).remove_child(byte),
            NodeKind::Node48 => self.node48.get_mut(h.idx()).remove_child(byte),
            NodeKind::Node256 => self.node256.get_mut(h.idx()).remove_child(byte),
            NodeKind::Leaf => unreachable!("leaves have no children"),
        }
    }

    fn replace_child(&mut self, h: NodeHandle, byte: u8, child: NodeHandle) {
        match h.kind() {
            NodeKind::Node4 => self.node4.get_mut(h.idx()).replace_child(byte, child),
            NodeKind::Node16 => self.node16.get_mut(h.idx()).replace_child(byte, child),
            NodeKind::Node48 => self.node48.get_mut(h.idx()).replace_child(byte, child),
            NodeKind::Node256 => self.node256.get_mut(h.idx()).replace_child(byte, child),
            NodeKind::Leaf => unreachable!("leaves have no children"),
        }
    }

    fn is_full(&self, h: NodeHandle) -> bool {
        match h.kind() {
            NodeKind::Node4 => self.node4.get(h.idx()).is_full(),
            NodeKind::Node16 => self.node16.get(h.idx()).is_full(),
            NodeKind::Node48 => self.node48.get(h.idx()).is_full(),
            // A Node256 addresses every possible key byte directly.
            NodeKind::Node256 => false,
            NodeKind::Leaf => unreachable!("leaves have no children"),
        }
    }

    /// Smallest key byte with a child, and that child.
    pub(crate) fn first_entry(&self, h: NodeHandle) -> Option<(u8, NodeHandle)> {
        match h.kind() {
            NodeKind::Node4 => {
                let n = self.node4.get(h.idx());
                (n.count > 0).then(|| (n.keys[0], n.children[0]))
            }
            NodeKind::Node16 => {
                let n = self.node16.get(h.idx());
                (n.count > 0).then(|| (n.keys[0], n.children[0]))
            }
            NodeKind::Node48 => {
                let n = self.node48.get(h.idx());
                (0..256).find_map(|b| {
                    let slot = n.child_index[b];
                    (slot != NO_SLOT).then(|| (b as u8, n.children[slot as usize]))
                })
            }
            NodeKind::Node256 => {
                let n = self.node256.get(h.idx());
                n.first_key().map(|b| (b, n.children[b as usize]))
            }
            NodeKind::Leaf => None,
        }
    }

    /// Largest key byte with a child, and that child.
    pub(crate) fn last_entry(&self, h: NodeHandle) -> Option<(u8, NodeHandle)> {
        match h.kind() {
            NodeKind::Node4 => {
                let n = self.node4.get(h.idx());
                (n.count > 0).then(|| {
                    let i = n.count as usize - 1;
                    (n.keys[i], n.children[i])
                })
            }
            NodeKind::Node16 => {
                let n = self.node16.get(h.idx());
                (n.count > 0).then(|| {
                    let i = n.count as usize - 1;
                    (n.keys[i], n.children[i])
                })
            }
            NodeKind::Node48 => {
                let n = self.node48.get(h.idx());
                (0..256).rev().find_map(|b| {
                    let slot = n.child_index[b];
                    (slot != NO_SLOT).then(|| (b as u8, n.children[slot as usize]))
                })
            }
            NodeKind::Node256 => {
                let n = self.node256.get(h.idx());
                n.last_key().map(|b| (b, n.children[b as usize]))
            }
            NodeKind::Leaf => None,
        }
    }

    /// Next occupied child slot at or after the class-specific `cursor`
    /// (array index for Node4/16, key byte for Node48/256). Returns the
    /// cursor to resume from, the key byte, and the child.
    pub(crate) fn next_entry(&self, h: NodeHandle, cursor: u16) -> Option<(u16, u8, NodeHandle)> {
        match h.kind() {
            NodeKind::Node4 => {
                let n = self.node4.get(h.idx());
                let i = cursor as usize;
                (i < n.count as usize).then(|| (cursor + 1, n.keys[i], n.children[i]))
            }
            NodeKind::Node16 => {
                let n = self.node16.get(h.idx());
                let i = cursor as usize;
                (i < n.count as usize).then(|| (cursor + 1, n.keys[i], n.children[i]))
            }
            NodeKind::Node48 => {
                let n = self.node48.get(h.idx());
                (cursor as usize..256).find_map(|b| {
                    let slot = n.child_index[b];
                    (slot != NO_SLOT).then(|| (b as u16 + 1, b as u8, n.children[slot as usize]))
                })
            }
            NodeKind::Node256 => {
                let n = self.node256.get(h.idx());
                search::next_set(&n.bitmap, cursor as usize)
                    .map(|b| (b as u16 + 1, b as u8, n.children[b]))
            }
            NodeKind::Leaf => None,
        }
    }

    // ---- class transitions (invoked by the tree, never by a node) ----

    /// Reallocate a full node as the next larger class, copying entries and
    /// releasing the old record to its pool.
    fn grow(&mut self, h: NodeHandle) -> NodeHandle {
        match h.kind() {
            NodeKind::Node4 => {
                let old = self.node4.release(h.idx());
                let mut new = Node16::new(old.prefix);
                new.term = old.term;
                let n = old.count as usize;
                new.keys[..n].copy_from_slice(&old.keys[..n]);
                new.children[..n].copy_from_slice(&old.children[..n]);
                new.count = old.count;
                NodeHandle::new(NodeKind::Node16, self.node16.alloc(new))
            }
            NodeKind::Node16 => {
                let old = self.node16.release(h.idx());
                let mut new = Node48::new(old.prefix);
                new.term = old.term;
                for i in 0..old.count as usize {
                    new.children[i] = old.children[i];
                    new.child_index[old.keys[i] as usize] = i as u8;
                }
                new.count = old.count;
                NodeHandle::new(NodeKind::Node48, self.node48.alloc(new))
            }
            NodeKind::Node48 => {
                let old = self.node48.release(h.idx());
                let mut new = Node256::new(old.prefix);
                new.term = old.term;
                for byte in 0..256 {
                    let slot = old.child_index[byte];
                    if slot != NO_SLOT {
                        new.add_child(byte as u8, old.children[slot as usize]);
                    }
                }
                NodeHandle::new(NodeKind::Node256, self.node256.alloc(new))
            }
            NodeKind::Node256 | NodeKind::Leaf => unreachable!("nothing to grow into"),
        }
    }

    /// Reallocate an underfull node as the next smaller class.
    fn shrink(&mut self, h: NodeHandle) -> NodeHandle {
        match h.kind() {
            NodeKind::Node256 => {
                let old = self.node256.release(h.idx());
                let mut new = Node48::new(old.prefix);
                new.term = old.term;
                for byte in 0..256 {
                    let child = old.children[byte];
                    if !child.is_null() {
                        new.add_child(byte as u8, child);
                    }
                }
                NodeHandle::new(NodeKind::Node48, self.node48.alloc(new))
            }
            NodeKind::Node48 => {
                let old = self.node48.release(h.idx());
                let mut new = Node16::new(old.prefix);
                new.term = old.term;
                let mut n = 0;
                for byte in 0..256 {
                    let slot = old.child_index[byte];
                    if slot != NO_SLOT {
                        new.keys[n] = byte as u8;
                        new.children[n] = old.children[slot as usize];
                        n += 1;
                    }
                }
                new.count = n as u8;
                NodeHandle::new(NodeKind::Node16, self.node16.alloc(new))
            }
            NodeKind::Node16 => {
                let old = self.node16.release(h.idx());
                let mut new = Node4::new(old.prefix);
                new.term = old.term;
                let n = old.count as usize;
                new.keys[..n].copy_from_slice(&old.keys[..n]);
                new.children[..n].copy_from_slice(&old.children[..n]);
                new.count = old.count;
                self.alloc_node4(new)
            }
            NodeKind::Node4 | NodeKind::Leaf => unreachable!("nothing to shrink into"),
        }
    }
}

impl<V> Default for NodeArena<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// An Adaptive Radix Tree mapping byte-string keys to values of type `V`.
///
/// The tree holds no storage of its own; every operation takes the
/// [`NodeArena`] the tree was built in. Keys are arbitrary byte strings
/// (up to 65535 bytes): the empty key and keys that are prefixes of one
/// another are all fine.
pub struct ArtTree<V> {
    root: NodeHandle,
    len: usize,
    /// Arena epoch adopted when the root was created; debug-checked on
    /// every later operation to catch use after `reset`.
    epoch: u64,
    _marker: PhantomData<fn() -> V>,
}

impl<V> ArtTree<V> {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self {
            root: NodeHandle::NULL,
            len: 0,
            epoch: 0,
            _marker: PhantomData,
        }
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the tree stores no keys.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn check_epoch(&self, arena: &NodeArena<V>) {
        debug_assert_eq!(
            self.epoch,
            arena.epoch(),
            "tree used after its arena was reset"
        );
    }

    /// Insert a key-value pair; returns the previous value if the key was
    /// already present (last write wins).
    pub fn insert(&mut self, arena: &mut NodeArena<V>, key: &[u8], value: V) -> Option<V> {
        if self.root.is_null() {
            self.epoch = arena.epoch();
            self.root = arena.alloc_leaf(key, value);
            self.len = 1;
            return None;
        }
        self.check_epoch(arena);
        let (root, replaced) = Self::insert_at(arena, self.root, key, 0, value);
        self.root = root;
        if replaced.is_none() {
            self.len += 1;
        }
        replaced
    }

    fn insert_at(
        arena: &mut NodeArena<V>,
        h: NodeHandle,
        key: &[u8],
        depth: usize,
        value: V,
    ) -> (NodeHandle, Option<V>) {
        if h.is_leaf() {
            return Self::insert_at_leaf(arena, h, key, depth, value);
        }

        let prefix_ref = arena.prefix_of(h);
        let matched = common_prefix_len(arena.bytes(prefix_ref), &key[depth..]);
        if matched < prefix_ref.len() {
            return (Self::split_prefix(arena, h, key, depth, matched, value), None);
        }

        let depth = depth + prefix_ref.len();
        if depth == key.len() {
            // The key ends at this node.
            let term = arena.term_of(h);
            if !term.is_null() {
                debug_assert_eq!(arena.bytes(arena.leaf(term).key), key);
                let leaf = arena.leaf_mut(term);
                return (h, Some(std::mem::replace(&mut leaf.value, value)));
            }
            let leaf = arena.alloc_leaf(key, value);
            arena.set_term(h, leaf);
            return (h, None);
        }

        let next_byte = key[depth];
        match arena.find_child(h, next_byte) {
            Some(child) => {
                let (new_child, replaced) = Self::insert_at(arena, child, key, depth + 1, value);
                if new_child != child {
                    arena.replace_child(h, next_byte, new_child);
                }
                (h, replaced)
            }
            None => {
                let leaf = arena.alloc_leaf(key, value);
                let h = if arena.is_full(h) { arena.grow(h) } else { h };
                arena.add_child(h, next_byte, leaf);
                (h, None)
            }
        }
    }

    /// Two keys share the path to `h`: branch where they diverge.
    fn insert_at_leaf(
        arena: &mut NodeArena<V>,
        h: NodeHandle,
        key: &[u8],
        depth: usize,
        value: V,
    ) -> (NodeHandle, Option<V>) {
        let (equal, common, existing_byte) = {
            let leaf_key = arena.bytes(arena.leaf(h).key);
            if leaf_key == key {
                (true, 0, None)
            } else {
                let common = common_prefix_len(&leaf_key[depth..], &key[depth..]);
                (false, common, leaf_key.get(depth + common).copied())
            }
        };
        if equal {
            let leaf = arena.leaf_mut(h);
            return (h, Some(std::mem::replace(&mut leaf.value, value)));
        }

        let split = depth + common;
        let prefix = arena.store_prefix(&key[depth..split]);
        let mut branch = Node4::new(prefix);
        match (existing_byte, key.get(split).copied()) {
            (Some(eb), Some(nb)) => {
                let new_leaf = arena.alloc_leaf(key, value);
                branch.add_child(eb, h);
                branch.add_child(nb, new_leaf);
            }
            (Some(eb), None) => {
                // The new key ends at the branch point.
                branch.term = arena.alloc_leaf(key, value);
                branch.add_child(eb, h);
            }
            (None, Some(nb)) => {
                // The existing key ends at the branch point.
                let new_leaf = arena.alloc_leaf(key, value);
                branch.term = h;
                branch.add_child(nb, new_leaf);
            }
            (None, None) => unreachable!("equal keys are handled above"),
        }
        (arena.alloc_node4(branch), None)
    }

    /// The key diverges inside `h`'s compressed prefix: split the prefix at
    /// the divergence point and put a new Node4 there.
    fn split_prefix(
        arena: &mut NodeArena<V>,
        h: NodeHandle,
        key: &[u8],
        depth: usize,
        matched: usize,
        value: V,
    ) -> NodeHandle {
        let old_ref = arena.prefix_of(h);
        let old_prefix: PrefixBuf = PrefixBuf::from_slice(arena.bytes(old_ref));

        let branch_prefix = arena.store_prefix(&old_prefix[..matched]);
        let mut branch = Node4::new(branch_prefix);

        // The existing node keeps what follows the divergence byte.
        let rest = arena.store_prefix(&old_prefix[matched + 1..]);
        arena.drop_prefix(old_ref);
        arena.set_prefix(h, rest);
        branch.add_child(old_prefix[matched], h);

        if depth + matched == key.len() {
            branch.term = arena.alloc_leaf(key, value);
        } else {
            let new_leaf = arena.alloc_leaf(key, value);
            branch.add_child(key[depth + matched], new_leaf);
        }
        arena.alloc_node4(branch)
    }

    /// Look up a key.
    pub fn get<'a>(&self, arena: &'a NodeArena<V>, key: &[u8]) -> Option<&'a V> {
        if self.root.is_null() {
            return None;
        }
        self.check_epoch(arena);
        let mut h = self.root;
        let mut depth = 0;
        loop {
            if h.is_leaf() {
                let leaf = arena.leaf(h);
                return (arena.bytes(leaf.key) == key).then(|| &leaf.value);
            }
            let prefix = arena.bytes(arena.prefix_of(h));
            if key.len() < depth + prefix.len() || &key[depth..depth + prefix.len()] != prefix {
                return None;
            }
            depth += prefix.len();
            if depth == key.len() {
                let term = arena.term_of(h);
                if term.is_null() {
                    return None;
                }
                let leaf = arena.leaf(term);
                return (arena.bytes(leaf.key) == key).then(|| &leaf.value);
            }
            match arena.find_child(h, key[depth]) {
                Some(child) => {
                    h = child;
                    depth += 1;
                }
                None => return None,
            }
        }
    }

    /// Whether a key is stored.
    pub fn contains_key(&self, arena: &NodeArena<V>, key: &[u8]) -> bool {
        self.get(arena, key).is_some()
    }

    /// Remove a key; returns its value, or `None` if it was absent (in
    /// which case the tree is unchanged).
    pub fn remove(&mut self, arena: &mut NodeArena<V>, key: &[u8]) -> Option<V> {
        if self.root.is_null() {
            return None;
        }
        self.check_epoch(arena);
        let (root, removed) = Self::remove_at(arena, self.root, key, 0);
        self.root = root;
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    fn remove_at(
        arena: &mut NodeArena<V>,
        h: NodeHandle,
        key: &[u8],
        depth: usize,
    ) -> (NodeHandle, Option<V>) {
        if h.is_leaf() {
            if arena.bytes(arena.leaf(h).key) != key {
                return (h, None);
            }
            let leaf = arena.release_leaf(h);
            return (NodeHandle::NULL, Some(leaf.value));
        }

        let prefix_ref = arena.prefix_of(h);
        {
            let prefix = arena.bytes(prefix_ref);
            if key.len() < depth + prefix.len() || &key[depth..depth + prefix.len()] != prefix {
                return (h, None);
            }
        }
        let depth = depth + prefix_ref.len();

        if depth == key.len() {
            let term = arena.term_of(h);
            if term.is_null() {
                return (h, None);
            }
            debug_assert_eq!(arena.bytes(arena.leaf(term).key), key);
            let leaf = arena.release_leaf(term);
            arena.set_term(h, NodeHandle::NULL);
            return (Self::compress(arena, h), Some(leaf.value));
        }

        let next_byte = key[depth];
        let Some(child) = arena.find_child(h, next_byte) else {
            return (h, None);
        };
        let (new_child, removed) = Self::remove_at(arena, child, key, depth + 1);
        if removed.is_none() {
            debug_assert_eq!(new_child, child);
            return (h, None);
        }
        if new_child.is_null() {
            arena.remove_child(h, next_byte);
            return (Self::compress(arena, h), removed);
        }
        if new_child != child {
            arena.replace_child(h, next_byte, new_child);
        }
        (h, removed)
    }

    /// Apply the post-removal policy to `h`: shrink an underfull class,
    /// collapse a single-child chain, or dissolve the node entirely.
    fn compress(arena: &mut NodeArena<V>, h: NodeHandle) -> NodeHandle {
        let count = arena.child_count(h);
        match h.kind() {
            NodeKind::Node4 => {
                let term = arena.term_of(h);
                if count == 0 {
                    // Only the terminator (or nothing) is left; the node
                    // dissolves into it.
                    let prefix = arena.release_node(h);
                    arena.drop_prefix(prefix);
                    return term;
                }
                if count == 1 && term.is_null() {
                    return Self::collapse(arena, h);
                }
                h
            }
            NodeKind::Node16 if count <= NODE16_SHRINK => arena.shrink(h),
            NodeKind::Node48 if count <= NODE48_SHRINK => arena.shrink(h),
            NodeKind::Node256 if count <= NODE256_SHRINK => arena.shrink(h),
            _ => h,
        }
    }

    /// Splice out a Node4 with exactly one child and no terminator,
    /// concatenating its prefix, the edge byte and the child's prefix.
    fn collapse(arena: &mut NodeArena<V>, h: NodeHandle) -> NodeHandle {
        let (byte, child) = arena.first_entry(h).expect("collapsing a childless node");
        let node_prefix = arena.release_node(h);
        if child.is_leaf() {
            // Leaves hold their full key; nothing to merge.
            arena.drop_prefix(node_prefix);
            return child;
        }
        let child_prefix = arena.prefix_of(child);
        let mut merged: PrefixBuf = PrefixBuf::from_slice(arena.bytes(node_prefix));
        merged.push(byte);
        merged.extend_from_slice(arena.bytes(child_prefix));
        let merged_ref = arena.store_prefix(&merged);
        arena.drop_prefix(node_prefix);
        arena.drop_prefix(child_prefix);
        arena.set_prefix(child, merged_ref);
        child
    }

    /// Call `f` for every key-value pair in ascending byte order; `f`
    /// returning `false` stops the traversal. Returns whether the
    /// traversal ran to completion.
    pub fn visit<F>(&self, arena: &NodeArena<V>, mut f: F) -> bool
    where
        F: FnMut(&[u8], &V) -> bool,
    {
        if self.root.is_null() {
            return true;
        }
        self.check_epoch(arena);
        Self::visit_at(arena, self.root, &mut f)
    }

    /// Like [`visit`](ArtTree::visit), restricted to keys with the given
    /// byte prefix.
    pub fn visit_prefix<F>(&self, arena: &NodeArena<V>, prefix: &[u8], mut f: F) -> bool
    where
        F: FnMut(&[u8], &V) -> bool,
    {
        if self.root.is_null() {
            return true;
        }
        self.check_epoch(arena);
        match Self::seek_prefix(arena, self.root, prefix) {
            Some(h) => Self::visit_at(arena, h, &mut f),
            None => true,
        }
    }

    fn visit_at<F>(arena: &NodeArena<V>, h: NodeHandle, f: &mut F) -> bool
    where
        F: FnMut(&[u8], &V) -> bool,
    {
        if h.is_leaf() {
            let leaf = arena.leaf(h);
            return f(arena.bytes(leaf.key), &leaf.value);
        }
        // The terminator's key is a strict prefix of every key below the
        // children, so it sorts first.
        let term = arena.term_of(h);
        if !term.is_null() && !Self::visit_at(arena, term, f) {
            return false;
        }
        let mut cursor = 0u16;
        while let Some((next, _, child)) = arena.next_entry(h, cursor) {
            if !Self::visit_at(arena, child, f) {
                return false;
            }
            cursor = next;
        }
        true
    }

    /// Find the subtree whose stored keys are exactly those carrying
    /// `prefix`, if any.
    pub(crate) fn seek_prefix(
        arena: &NodeArena<V>,
        mut h: NodeHandle,
        prefix: &[u8],
    ) -> Option<NodeHandle> {
        let mut depth = 0;
        loop {
            if h.is_leaf() {
                let key = arena.bytes(arena.leaf(h).key);
                return key.starts_with(prefix).then_some(h);
            }
            let node_prefix = arena.bytes(arena.prefix_of(h));
            let remaining = prefix.len() - depth;
            let check = remaining.min(node_prefix.len());
            if node_prefix[..check] != prefix[depth..depth + check] {
                return None;
            }
            if remaining <= node_prefix.len() {
                // The query ends inside this node's prefix: the whole
                // subtree carries it.
                return Some(h);
            }
            depth += node_prefix.len();
            h = arena.find_child(h, prefix[depth])?;
            depth += 1;
        }
    }

    /// Lazy ascending iteration over all key-value pairs. Each call starts
    /// a fresh traversal.
    pub fn iter<'a>(&self, arena: &'a NodeArena<V>) -> Iter<'a, V> {
        if self.root.is_null() {
            return Iter::empty(arena);
        }
        self.check_epoch(arena);
        Iter::new(arena, self.root)
    }

    /// Lazy ascending iteration over the keys carrying the given byte
    /// prefix.
    pub fn iter_prefix<'a>(&self, arena: &'a NodeArena<V>, prefix: &[u8]) -> Iter<'a, V> {
        if self.root.is_null() {
            return Iter::empty(arena);
        }
        self.check_epoch(arena);
        match Self::seek_prefix(arena, self.root, prefix) {
            Some(h) => Iter::new(arena, h),
            None => Iter::empty(arena),
        }
    }

    /// The smallest stored key and its value.
    pub fn min<'a>(&self, arena: &'a NodeArena<V>) -> Option<(&'a [u8], &'a V)> {
        if self.root.is_null() {
            return None;
        }
        self.check_epoch(arena);
        let mut h = self.root;
        loop {
            if h.is_leaf() {
                let leaf = arena.leaf(h);
                return Some((arena.bytes(leaf.key), &leaf.value));
            }
            let term = arena.term_of(h);
            if !term.is_null() {
                // The terminator's key is a prefix of everything below.
                h = term;
                continue;
            }
            let (_, child) = arena.first_entry(h).expect("interior node with no children");
            h = child;
        }
    }

    /// The largest stored key and its value.
    pub fn max<'a>(&self, arena: &'a NodeArena<V>) -> Option<(&'a [u8], &'a V)> {
        if self.root.is_null() {
            return None;
        }
        self.check_epoch(arena);
        let mut h = self.root;
        loop {
            if h.is_leaf() {
                let leaf = arena.leaf(h);
                return Some((arena.bytes(leaf.key), &leaf.value));
            }
            let (_, child) = arena.last_entry(h).expect("interior node with no children");
            h = child;
        }
    }
}

impl<V> ArtTree<V> {
    /// Walk the whole tree checking structural invariants. Test-only.
    #[cfg(test)]
    pub(crate) fn validate(&self, arena: &NodeArena<V>) {
        if self.root.is_null() {
            assert_eq!(self.len, 0, "empty tree must report len 0");
            return;
        }
        let mut leaf_count = 0usize;
        let mut path: Vec<u8> = Vec::new();
        Self::validate_at(arena, self.root, &mut path, &mut leaf_count);
        assert_eq!(leaf_count, self.len, "reachable leaves must match len");
    }

    #[cfg(test)]
    fn validate_at(
        arena: &NodeArena<V>,
        h: NodeHandle,
        path: &mut Vec<u8>,
        leaf_count: &mut usize,
    ) {
        if h.is_leaf() {
            *leaf_count += 1;
            let key = arena.bytes(arena.leaf(h).key);
            assert!(
                key.starts_with(path),
                "leaf key {key:?} does not extend its path {path:?}"
            );
            return;
        }

        let count = arena.child_count(h);
        match h.kind() {
            NodeKind::Node4 => {
                assert!((1..=4).contains(&count), "Node4 occupancy {count}");
                if count == 1 {
                    assert!(
                        !arena.term_of(h).is_null(),
                        "single-child Node4 without terminator must have collapsed"
                    );
                }
            }
            NodeKind::Node16 => {
                assert!((4..=16).contains(&count), "Node16 occupancy {count}");
            }
            NodeKind::Node48 => {
                assert!((13..=48).contains(&count), "Node48 occupancy {count}");
                let n = arena.node48.get(h.idx());
                let mut used = [false; 48];
                let mut occupied = 0;
                for b in 0..256 {
                    let slot = n.child_index[b];
                    if slot != NO_SLOT {
                        let s = slot as usize;
                        assert!(s < 48, "slot out of range");
                        assert!(!used[s], "two key bytes share slot {s}");
                        used[s] = true;
                        assert!(!n.children[s].is_null(), "table points at null slot");
                        occupied += 1;
                    }
                }
                assert_eq!(occupied, count, "table occupancy disagrees with count");
                for (s, in_use) in used.iter().enumerate() {
                    if !in_use {
                        assert!(n.children[s].is_null(), "orphaned child in slot {s}");
                    }
                }
            }
            NodeKind::Node256 => {
                assert!((38..=256).contains(&count), "Node256 occupancy {count}");
                let n = arena.node256.get(h.idx());
                let mut occupied = 0;
                for b in 0..256usize {
                    let bit = n.bitmap[b >> 6] & (1u64 << (b & 63)) != 0;
                    assert_eq!(bit, !n.children[b].is_null(), "bitmap out of sync at {b}");
                    if bit {
                        occupied += 1;
                    }
                }
                assert_eq!(occupied, count, "bitmap occupancy disagrees with count");
            }
            NodeKind::Leaf => unreachable!(),
        }

        let prefix_len = arena.prefix_of(h).len();
        {
            let prefix = arena.bytes(arena.prefix_of(h));
            path.extend_from_slice(prefix);
        }

        let term = arena.term_of(h);
        if !term.is_null() {
            assert!(term.is_leaf(), "terminator must be a leaf");
            assert_eq!(
                arena.bytes(arena.leaf(term).key),
                path.as_slice(),
                "terminator key must equal its path"
            );
            *leaf_count += 1;
        }

        let mut cursor = 0u16;
        let mut prev: Option<u8> = None;
        let mut seen = 0;
        while let Some((next, byte, child)) = arena.next_entry(h, cursor) {
            if let Some(p) = prev {
                assert!(byte > p, "child bytes must be strictly ascending");
            }
            prev = Some(byte);
            seen += 1;
            path.push(byte);
            Self::validate_at(arena, child, path, leaf_count);
            path.pop();
            cursor = next;
        }
        assert_eq!(seen, count, "cursor scan must see every child");

        path.truncate(path.len() - prefix_len);
    }
}

impl<V> Default for ArtTree<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}
