//! # artkv
//!
//! An arena-backed Adaptive Radix Tree for ordered byte-key lookup.
//!
//! Keys are arbitrary byte strings; values are any `V`. Nodes adapt their
//! fan-out representation (4/16/48/256 children) as keys come and go, share
//! common key bytes through prefix compression, and live entirely inside an
//! arena: the tree addresses them through 4-byte handles, and the arena is
//! freed in bulk with a single [`NodeArena::reset`].
//!
//! ## Example
//!
//! ```rust
//! use artkv::{ArtTree, NodeArena};
//!
//! let mut arena: NodeArena<u64> = NodeArena::new();
//! let mut tree = ArtTree::new();
//! tree.insert(&mut arena, b"car", 1);
//! tree.insert(&mut arena, b"cat", 2);
//! tree.insert(&mut arena, b"dog", 3);
//!
//! assert_eq!(tree.get(&arena, b"cat"), Some(&2));
//!
//! // Ascending traversal, optionally restricted to a prefix.
//! let ca: Vec<&[u8]> = tree.iter_prefix(&arena, b"ca").map(|(k, _)| k).collect();
//! assert_eq!(ca, vec![b"car".as_slice(), b"cat".as_slice()]);
//! ```
//!
//! ## Lifetime contract
//!
//! A tree is only as alive as its arena: [`NodeArena::reset`] invalidates
//! every tree built from the arena at once (debug builds assert on later
//! use). Trees needing independent lifetimes need independent arenas.
//! Everything here is single-threaded; nothing locks, blocks or suspends.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod arena;
pub mod art;

pub use arena::{Arena, ArenaOffset, ByteRef, Pool, RecycledArena};
pub use art::{ArtStats, ArtTree, Iter, NodeArena};

#[cfg(test)]
mod proptests;
