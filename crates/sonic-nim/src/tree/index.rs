//! Arena-backed AVL tree.

use std::cmp::Ordering;
use std::fmt;

use thiserror::Error;

/// Key ordering function used by an [`OrderedIndex`].
pub type Comparator<K> = fn(&K, &K) -> Ordering;

/// Errors returned by [`OrderedIndex`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TreeError {
    /// The arena could not be allocated.
    #[error("Unable to allocate tree arena for {capacity} entries")]
    OutOfMemory { capacity: usize },

    /// Every arena slot is in use.
    #[error("Tree is full ({capacity} entries)")]
    Full { capacity: usize },

    /// An entry with an equal key is already present.
    #[error("Entry already exists")]
    AlreadyExists,

    /// No entry with the given key.
    #[error("Entry not found")]
    NotFound,
}

type Link = Option<u32>;

#[derive(Debug, Clone)]
struct Node<K, V> {
    key: K,
    value: V,
    left: Link,
    right: Link,
    height: u8,
}

/// A bounded, ordered map with exact and "next greater" lookups.
///
/// Nodes are stored densely in a `Vec` whose capacity is reserved once.
/// Deleting a node moves the last arena node into the vacated slot and
/// re-points its parent, so the arena never grows past its reservation and
/// never holds holes.
pub struct OrderedIndex<K, V> {
    nodes: Vec<Node<K, V>>,
    root: Link,
    capacity: usize,
    compare: Comparator<K>,
}

impl<K: Ord, V> OrderedIndex<K, V> {
    /// Creates an index ordered by the key's natural ordering.
    pub fn create(capacity: usize) -> Result<Self, TreeError> {
        Self::with_comparator(capacity, K::cmp)
    }
}

impl<K, V> OrderedIndex<K, V> {
    /// Creates an index ordered by a custom comparator.
    pub fn with_comparator(capacity: usize, compare: Comparator<K>) -> Result<Self, TreeError> {
        if u32::try_from(capacity).is_err() {
            return Err(TreeError::OutOfMemory { capacity });
        }

        let mut nodes = Vec::new();
        nodes
            .try_reserve_exact(capacity)
            .map_err(|_| TreeError::OutOfMemory { capacity })?;

        Ok(Self {
            nodes,
            root: None,
            capacity,
            compare,
        })
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the fixed capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns true if no further entry can be inserted.
    pub fn is_full(&self) -> bool {
        self.nodes.len() >= self.capacity
    }

    /// Inserts an entry.
    ///
    /// Fails with [`TreeError::AlreadyExists`] if an equal key is present and
    /// with [`TreeError::Full`] if the arena is exhausted. On failure the
    /// index is unchanged.
    pub fn insert(&mut self, key: K, value: V) -> Result<(), TreeError> {
        if self.find_id(&key).is_some() {
            return Err(TreeError::AlreadyExists);
        }
        if self.is_full() {
            return Err(TreeError::Full {
                capacity: self.capacity,
            });
        }

        let id = self.nodes.len() as u32;
        self.nodes.push(Node {
            key,
            value,
            left: None,
            right: None,
            height: 1,
        });
        let root = self.root;
        self.root = Some(self.insert_node(root, id));
        Ok(())
    }

    /// Removes the entry with the given key and returns it.
    pub fn delete(&mut self, key: &K) -> Result<(K, V), TreeError> {
        let root = self.root;
        let (new_root, removed) = self.remove_node(root, key);
        let id = removed.ok_or(TreeError::NotFound)?;
        self.root = new_root;

        // Keep the arena dense: the last node moves into the freed slot.
        let last = (self.nodes.len() - 1) as u32;
        if id != last {
            self.relink(last, id);
        }
        let node = self.nodes.swap_remove(id as usize);
        Ok((node.key, node.value))
    }

    /// Returns the value stored under exactly `key`.
    pub fn find_exact(&self, key: &K) -> Option<&V> {
        self.find_id(key).map(|id| &self.node(id).value)
    }

    /// Returns a mutable reference to the value stored under exactly `key`.
    pub fn find_exact_mut(&mut self, key: &K) -> Option<&mut V> {
        let id = self.find_id(key)?;
        Some(&mut self.nodes[id as usize].value)
    }

    /// Returns true if an entry with `key` is present.
    pub fn contains(&self, key: &K) -> bool {
        self.find_id(key).is_some()
    }

    /// Returns the least entry whose key compares greater than `key`.
    pub fn find_next(&self, key: &K) -> Option<(&K, &V)> {
        let mut candidate = None;
        let mut cursor = self.root;
        while let Some(id) = cursor {
            let node = self.node(id);
            if (self.compare)(key, &node.key) == Ordering::Less {
                candidate = Some(id);
                cursor = node.left;
            } else {
                cursor = node.right;
            }
        }
        candidate.map(|id| {
            let node = self.node(id);
            (&node.key, &node.value)
        })
    }

    /// Returns the minimum entry.
    pub fn first(&self) -> Option<(&K, &V)> {
        let mut id = self.root?;
        while let Some(left) = self.node(id).left {
            id = left;
        }
        let node = self.node(id);
        Some((&node.key, &node.value))
    }

    /// Visits every entry in ascending key order.
    pub fn for_each_ascending<F>(&self, mut visitor: F)
    where
        F: FnMut(&K, &V),
    {
        let mut cursor = self.first();
        while let Some((key, value)) = cursor {
            visitor(key, value);
            cursor = self.find_next(key);
        }
    }

    /// Returns an ascending iterator over all entries.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        std::iter::successors(self.first(), move |(key, _)| self.find_next(key))
    }

    /// Removes every entry. Capacity is retained.
    pub fn purge_all(&mut self) {
        self.nodes.clear();
        self.root = None;
    }

    /// Releases the arena.
    pub fn destroy(self) {}

    /// Height of the tree (0 when empty).
    pub fn height(&self) -> u8 {
        self.height_of(self.root)
    }

    // ============ Internals ============

    fn node(&self, id: u32) -> &Node<K, V> {
        &self.nodes[id as usize]
    }

    fn node_mut(&mut self, id: u32) -> &mut Node<K, V> {
        &mut self.nodes[id as usize]
    }

    fn find_id(&self, key: &K) -> Option<u32> {
        let mut cursor = self.root;
        while let Some(id) = cursor {
            let node = self.node(id);
            cursor = match (self.compare)(key, &node.key) {
                Ordering::Less => node.left,
                Ordering::Greater => node.right,
                Ordering::Equal => return Some(id),
            };
        }
        None
    }

    fn height_of(&self, link: Link) -> u8 {
        link.map_or(0, |id| self.node(id).height)
    }

    fn update_height(&mut self, id: u32) {
        let node = self.node(id);
        let height = 1 + self.height_of(node.left).max(self.height_of(node.right));
        self.node_mut(id).height = height;
    }

    fn balance_factor(&self, id: u32) -> i16 {
        let node = self.node(id);
        i16::from(self.height_of(node.left)) - i16::from(self.height_of(node.right))
    }

    fn rotate_right(&mut self, id: u32) -> u32 {
        let Some(pivot) = self.node(id).left else {
            return id;
        };
        self.node_mut(id).left = self.node(pivot).right;
        self.node_mut(pivot).right = Some(id);
        self.update_height(id);
        self.update_height(pivot);
        pivot
    }

    fn rotate_left(&mut self, id: u32) -> u32 {
        let Some(pivot) = self.node(id).right else {
            return id;
        };
        self.node_mut(id).right = self.node(pivot).left;
        self.node_mut(pivot).left = Some(id);
        self.update_height(id);
        self.update_height(pivot);
        pivot
    }

    fn rebalance(&mut self, id: u32) -> u32 {
        self.update_height(id);
        let balance = self.balance_factor(id);

        if balance > 1 {
            if let Some(left) = self.node(id).left {
                if self.balance_factor(left) < 0 {
                    let rotated = self.rotate_left(left);
                    self.node_mut(id).left = Some(rotated);
                }
            }
            return self.rotate_right(id);
        }

        if balance < -1 {
            if let Some(right) = self.node(id).right {
                if self.balance_factor(right) > 0 {
                    let rotated = self.rotate_right(right);
                    self.node_mut(id).right = Some(rotated);
                }
            }
            return self.rotate_left(id);
        }

        id
    }

    fn insert_node(&mut self, root: Link, id: u32) -> u32 {
        let Some(current) = root else {
            return id;
        };

        if (self.compare)(&self.node(id).key, &self.node(current).key) == Ordering::Less {
            let left = self.node(current).left;
            let new_left = self.insert_node(left, id);
            self.node_mut(current).left = Some(new_left);
        } else {
            let right = self.node(current).right;
            let new_right = self.insert_node(right, id);
            self.node_mut(current).right = Some(new_right);
        }

        self.rebalance(current)
    }

    /// Unlinks the node matching `key` from the subtree at `root`.
    ///
    /// Returns the new subtree root and the arena id of the unlinked node.
    fn remove_node(&mut self, root: Link, key: &K) -> (Link, Option<u32>) {
        let Some(current) = root else {
            return (None, None);
        };

        match (self.compare)(key, &self.node(current).key) {
            Ordering::Less => {
                let left = self.node(current).left;
                let (new_left, removed) = self.remove_node(left, key);
                self.node_mut(current).left = new_left;
                (Some(self.rebalance(current)), removed)
            }
            Ordering::Greater => {
                let right = self.node(current).right;
                let (new_right, removed) = self.remove_node(right, key);
                self.node_mut(current).right = new_right;
                (Some(self.rebalance(current)), removed)
            }
            Ordering::Equal => {
                let node = self.node(current);
                match (node.left, node.right) {
                    (None, child) | (child, None) => (child, Some(current)),
                    (Some(left), Some(right)) => {
                        let (new_right, successor) = self.detach_min(right);
                        self.node_mut(successor).left = Some(left);
                        self.node_mut(successor).right = new_right;
                        (Some(self.rebalance(successor)), Some(current))
                    }
                }
            }
        }
    }

    /// Unlinks the minimum node of the subtree at `id`.
    fn detach_min(&mut self, id: u32) -> (Link, u32) {
        match self.node(id).left {
            None => (self.node(id).right, id),
            Some(left) => {
                let (new_left, min) = self.detach_min(left);
                self.node_mut(id).left = new_left;
                (Some(self.rebalance(id)), min)
            }
        }
    }

    /// Re-points whichever link references arena slot `from` to `to`.
    ///
    /// `from` must still be linked into the tree; its key locates the parent.
    fn relink(&mut self, from: u32, to: u32) {
        if self.root == Some(from) {
            self.root = Some(to);
            return;
        }

        let mut cursor = self.root;
        while let Some(id) = cursor {
            let ordering = (self.compare)(&self.node(from).key, &self.node(id).key);
            let node = self.node_mut(id);
            let link = match ordering {
                Ordering::Less => &mut node.left,
                Ordering::Greater => &mut node.right,
                Ordering::Equal => return,
            };
            if *link == Some(from) {
                *link = Some(to);
                return;
            }
            cursor = *link;
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for OrderedIndex<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderedIndex")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("entries", &self.iter().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn keys<V>(index: &OrderedIndex<u32, V>) -> Vec<u32> {
        index.iter().map(|(k, _)| *k).collect()
    }

    /// Walks the tree checking ordering, heights and AVL balance.
    fn check_invariants<K: Ord, V>(index: &OrderedIndex<K, V>) {
        fn walk<K: Ord, V>(index: &OrderedIndex<K, V>, link: Link) -> (u8, usize) {
            let Some(id) = link else {
                return (0, 0);
            };
            let node = index.node(id);
            if let Some(left) = node.left {
                assert!(index.node(left).key < node.key);
            }
            if let Some(right) = node.right {
                assert!(index.node(right).key > node.key);
            }
            let (lh, lc) = walk(index, node.left);
            let (rh, rc) = walk(index, node.right);
            assert!((i16::from(lh) - i16::from(rh)).abs() <= 1, "unbalanced node");
            assert_eq!(node.height, 1 + lh.max(rh));
            (node.height, lc + rc + 1)
        }
        let (_, count) = walk(index, index.root);
        assert_eq!(count, index.len());
    }

    #[test]
    fn test_create_empty() {
        let index: OrderedIndex<u32, u32> = OrderedIndex::create(8).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.capacity(), 8);
        assert!(index.first().is_none());
        assert!(index.find_next(&0).is_none());
    }

    #[test]
    fn test_insert_and_find() {
        let mut index = OrderedIndex::create(16).unwrap();
        index.insert(5u32, "five").unwrap();
        index.insert(1, "one").unwrap();
        index.insert(9, "nine").unwrap();

        assert_eq!(index.find_exact(&5), Some(&"five"));
        assert_eq!(index.find_exact(&1), Some(&"one"));
        assert!(index.find_exact(&2).is_none());
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut index = OrderedIndex::create(4).unwrap();
        index.insert(7u32, 'a').unwrap();
        assert_eq!(index.insert(7, 'b'), Err(TreeError::AlreadyExists));
        assert_eq!(index.find_exact(&7), Some(&'a'));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_full_index_rejects_insert() {
        let mut index = OrderedIndex::create(3).unwrap();
        for k in 0u32..3 {
            index.insert(k, ()).unwrap();
        }
        assert!(index.is_full());
        assert_eq!(index.insert(10, ()), Err(TreeError::Full { capacity: 3 }));
        assert_eq!(keys(&index), vec![0, 1, 2]);
    }

    #[test]
    fn test_find_next_walks_in_order() {
        let mut index = OrderedIndex::create(64).unwrap();
        let input = [42u32, 7, 19, 3, 88, 61, 25, 14, 70, 1];
        for k in input {
            index.insert(k, k * 10).unwrap();
        }

        let mut walked = Vec::new();
        let mut cursor = index.find_next(&0);
        while let Some((k, v)) = cursor {
            assert_eq!(*v, *k * 10);
            walked.push(*k);
            cursor = index.find_next(k);
        }

        let mut expected = input.to_vec();
        expected.sort_unstable();
        assert_eq!(walked, expected);
    }

    #[test]
    fn test_find_next_between_keys() {
        let mut index = OrderedIndex::create(8).unwrap();
        for k in [10u32, 20, 30] {
            index.insert(k, ()).unwrap();
        }
        assert_eq!(index.find_next(&15).map(|(k, _)| *k), Some(20));
        assert_eq!(index.find_next(&20).map(|(k, _)| *k), Some(30));
        assert!(index.find_next(&30).is_none());
    }

    #[test]
    fn test_delete() {
        let mut index = OrderedIndex::create(8).unwrap();
        for k in [4u32, 2, 6, 1, 3, 5, 7] {
            index.insert(k, k).unwrap();
        }

        assert_eq!(index.delete(&4), Ok((4, 4)));
        assert_eq!(index.delete(&4), Err(TreeError::NotFound));
        assert_eq!(keys(&index), vec![1, 2, 3, 5, 6, 7]);
        check_invariants(&index);

        // Slot freed by the delete is reusable.
        index.insert(100, 100).unwrap();
        index.insert(0, 0).unwrap();
        assert_eq!(index.len(), 8);
        check_invariants(&index);
    }

    #[test]
    fn test_balance_under_sequential_inserts() {
        let mut index = OrderedIndex::create(1024).unwrap();
        for k in 0u32..1024 {
            index.insert(k, ()).unwrap();
        }
        check_invariants(&index);
        // AVL bound: h < 1.44 * log2(n + 2)
        assert!(index.height() <= 14, "height {}", index.height());
    }

    #[test]
    fn test_interleaved_insert_delete_keeps_invariants() {
        let mut index = OrderedIndex::create(256).unwrap();
        let mut present = std::collections::BTreeSet::new();

        // Deterministic pseudo-random sequence.
        let mut x: u32 = 12345;
        for _ in 0..2000 {
            x = x.wrapping_mul(1_103_515_245).wrapping_add(12345);
            let key = (x >> 8) % 300;
            if present.contains(&key) {
                index.delete(&key).unwrap();
                present.remove(&key);
            } else if !index.is_full() {
                index.insert(key, key).unwrap();
                present.insert(key);
            }
        }

        check_invariants(&index);
        assert_eq!(keys(&index), present.iter().copied().collect::<Vec<_>>());
        for k in &present {
            assert_eq!(index.find_exact(k), Some(k));
        }
    }

    #[test]
    fn test_custom_comparator_descending() {
        fn descending(a: &u32, b: &u32) -> Ordering {
            b.cmp(a)
        }

        let mut index = OrderedIndex::with_comparator(8, descending).unwrap();
        for k in [1u32, 5, 3] {
            index.insert(k, ()).unwrap();
        }
        assert_eq!(keys(&index), vec![5, 3, 1]);
        assert_eq!(index.find_next(&5).map(|(k, _)| *k), Some(3));
    }

    #[test]
    fn test_for_each_ascending() {
        let mut index = OrderedIndex::create(8).unwrap();
        for k in [3u32, 1, 2] {
            index.insert(k, k * 2).unwrap();
        }
        let mut seen = Vec::new();
        index.for_each_ascending(|k, v| seen.push((*k, *v)));
        assert_eq!(seen, vec![(1, 2), (2, 4), (3, 6)]);
    }

    #[test]
    fn test_purge_all() {
        let mut index = OrderedIndex::create(4).unwrap();
        index.insert(1u32, ()).unwrap();
        index.insert(2, ()).unwrap();
        index.purge_all();
        assert!(index.is_empty());
        assert!(index.first().is_none());
        assert_eq!(index.capacity(), 4);
        index.insert(3, ()).unwrap();
        assert_eq!(keys(&index), vec![3]);
    }

    #[test]
    fn test_find_exact_mut() {
        let mut index = OrderedIndex::create(4).unwrap();
        index.insert(1u32, 10u32).unwrap();
        if let Some(v) = index.find_exact_mut(&1) {
            *v = 11;
        }
        assert_eq!(index.find_exact(&1), Some(&11));
    }

    #[test]
    fn test_zero_capacity() {
        let mut index: OrderedIndex<u32, ()> = OrderedIndex::create(0).unwrap();
        assert_eq!(index.insert(1, ()), Err(TreeError::Full { capacity: 0 }));
    }

    #[test]
    fn test_oversized_capacity_is_out_of_memory() {
        let result: Result<OrderedIndex<u64, u64>, _> = OrderedIndex::create(usize::MAX);
        assert!(matches!(result, Err(TreeError::OutOfMemory { .. })));
    }
}
