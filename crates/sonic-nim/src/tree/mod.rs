//! Bounded ordered index.
//!
//! [`OrderedIndex`] is the storage engine behind every keyed lookup in NIM:
//! the USP, ConfigID and ifIndex maps of the interface registry and the
//! priority-ordered startup table. It is a height-balanced (AVL) tree whose
//! nodes live in a fixed arena sized at creation time.
//!
//! # Contract
//!
//! - Capacity is fixed. [`OrderedIndex::create`] reserves the whole arena up
//!   front and fails with [`TreeError::OutOfMemory`] if it cannot; inserts
//!   beyond capacity fail with [`TreeError::Full`].
//! - Keys are unique under the index's comparator.
//! - [`OrderedIndex::find_next`] returns the least entry strictly greater
//!   than the probe, so ascending iteration is `first()` followed by
//!   repeated `find_next()`.
//! - No internal locking. Owners serialize access with their own lock.

mod index;

pub use index::{Comparator, OrderedIndex, TreeError};
