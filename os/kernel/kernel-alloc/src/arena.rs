//! # Node Arena
//!
//! Fixed-capacity storage for list nodes. Nodes are addressed by [`NodeId`]
//! and linked through integer `prev`/`next` fields, so several doubly-linked
//! [`List`]s can share one arena without any heap.
//!
//! A node belongs to at most one list at a time. Moving a node between lists
//! is `unlink` followed by `push_back`/`insert_before`; its id stays stable.

use core::ops::{Index, IndexMut};

/// Stable handle to a node in an [`Arena`].
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    #[inline]
    const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Head/tail of one doubly-linked list living in an [`Arena`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct List {
    head: Option<NodeId>,
    tail: Option<NodeId>,
    len: usize,
}

impl List {
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    #[must_use]
    pub const fn first(&self) -> Option<NodeId> {
        self.head
    }

    #[inline]
    #[must_use]
    pub const fn last(&self) -> Option<NodeId> {
        self.tail
    }
}

struct Slot<T> {
    value: Option<T>,
    prev: Option<NodeId>,
    next: Option<NodeId>,
}

impl<T> Slot<T> {
    const EMPTY: Self = Self {
        value: None,
        prev: None,
        next: None,
    };
}

/// Slab of `N` list nodes.
pub struct Arena<T, const N: usize> {
    slots: [Slot<T>; N],
    /// Released slots, chained through `next`.
    spare: Option<NodeId>,
    /// Slots `[0, fresh)` have been handed out at least once.
    fresh: usize,
    live: usize,
}

impl<T, const N: usize> Arena<T, N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: [const { Slot::EMPTY }; N],
            spare: None,
            fresh: 0,
            live: 0,
        }
    }

    /// Number of nodes that can still be inserted.
    #[inline]
    #[must_use]
    pub const fn available(&self) -> usize {
        N - self.live
    }

    /// Store `value` in an unlinked node; `None` if the arena is full.
    pub fn insert(&mut self, value: T) -> Option<NodeId> {
        let id = if let Some(id) = self.spare {
            self.spare = self.slots[id.index()].next;
            id
        } else if self.fresh < N {
            self.fresh += 1;
            NodeId::new(self.fresh - 1)
        } else {
            return None;
        };

        let slot = &mut self.slots[id.index()];
        slot.value = Some(value);
        slot.prev = None;
        slot.next = None;
        self.live += 1;
        Some(id)
    }

    /// Drop an unlinked node and return its slot to the spare chain.
    pub fn remove(&mut self, id: NodeId) -> Option<T> {
        let slot = &mut self.slots[id.index()];
        let value = slot.value.take()?;
        slot.prev = None;
        slot.next = self.spare;
        self.spare = Some(id);
        self.live -= 1;
        Some(value)
    }

    #[inline]
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&T> {
        self.slots.get(id.index())?.value.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        self.slots.get_mut(id.index())?.value.as_mut()
    }

    #[inline]
    #[must_use]
    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        self.slots[id.index()].next
    }

    #[inline]
    #[must_use]
    pub fn prev(&self, id: NodeId) -> Option<NodeId> {
        self.slots[id.index()].prev
    }

    /// Append an unlinked node to `list`.
    pub fn push_back(&mut self, list: &mut List, id: NodeId) {
        self.slots[id.index()].prev = list.tail;
        self.slots[id.index()].next = None;
        match list.tail {
            Some(tail) => self.slots[tail.index()].next = Some(id),
            None => list.head = Some(id),
        }
        list.tail = Some(id);
        list.len += 1;
    }

    /// Link an unlinked node into `list` right before `before`.
    pub fn insert_before(&mut self, list: &mut List, before: NodeId, id: NodeId) {
        let prev = self.slots[before.index()].prev;
        self.slots[id.index()].prev = prev;
        self.slots[id.index()].next = Some(before);
        self.slots[before.index()].prev = Some(id);
        match prev {
            Some(prev) => self.slots[prev.index()].next = Some(id),
            None => list.head = Some(id),
        }
        list.len += 1;
    }

    /// Detach `id` from `list`; the node keeps its value.
    pub fn unlink(&mut self, list: &mut List, id: NodeId) {
        let prev = self.slots[id.index()].prev.take();
        let next = self.slots[id.index()].next.take();
        match prev {
            Some(prev) => self.slots[prev.index()].next = next,
            None => list.head = next,
        }
        match next {
            Some(next) => self.slots[next.index()].prev = prev,
            None => list.tail = prev,
        }
        list.len -= 1;
    }

    /// Walk `list` front to back.
    #[must_use]
    pub fn iter<'a>(&'a self, list: &List) -> Iter<'a, T, N> {
        Iter {
            arena: self,
            cursor: list.head,
        }
    }

    /// First node of `list` whose value satisfies `predicate`.
    pub fn find(&self, list: &List, mut predicate: impl FnMut(&T) -> bool) -> Option<NodeId> {
        self.iter(list).find(|(_, v)| predicate(v)).map(|(id, _)| id)
    }
}

impl<T, const N: usize> Default for Arena<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Index<NodeId> for Arena<T, N> {
    type Output = T;

    fn index(&self, id: NodeId) -> &T {
        match self.get(id) {
            Some(v) => v,
            None => panic!("stale arena node {id:?}"),
        }
    }
}

impl<T, const N: usize> IndexMut<NodeId> for Arena<T, N> {
    fn index_mut(&mut self, id: NodeId) -> &mut T {
        match self.get_mut(id) {
            Some(v) => v,
            None => panic!("stale arena node {id:?}"),
        }
    }
}

pub struct Iter<'a, T, const N: usize> {
    arena: &'a Arena<T, N>,
    cursor: Option<NodeId>,
}

impl<'a, T, const N: usize> Iterator for Iter<'a, T, N> {
    type Item = (NodeId, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let arena = self.arena;
        let slot = &arena.slots[id.index()];
        self.cursor = slot.next;
        slot.value.as_ref().map(|v| (id, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values<const N: usize>(arena: &Arena<u32, N>, list: &List) -> Vec<u32> {
        arena.iter(list).map(|(_, v)| *v).collect()
    }

    #[test]
    fn push_and_unlink() {
        let mut arena = Arena::<u32, 4>::new();
        let mut list = List::new();
        let a = arena.insert(1).unwrap();
        let b = arena.insert(2).unwrap();
        let c = arena.insert(3).unwrap();
        arena.push_back(&mut list, a);
        arena.push_back(&mut list, b);
        arena.push_back(&mut list, c);
        assert_eq!(values(&arena, &list), [1, 2, 3]);

        arena.unlink(&mut list, b);
        assert_eq!(values(&arena, &list), [1, 3]);
        assert_eq!(arena.next(a), Some(c));
        assert_eq!(arena.prev(c), Some(a));

        arena.unlink(&mut list, a);
        arena.unlink(&mut list, c);
        assert!(list.is_empty());
        assert_eq!(list.first(), None);
        assert_eq!(list.last(), None);
    }

    #[test]
    fn insert_before_head_and_middle() {
        let mut arena = Arena::<u32, 4>::new();
        let mut list = List::new();
        let b = arena.insert(20).unwrap();
        arena.push_back(&mut list, b);
        let a = arena.insert(10).unwrap();
        arena.insert_before(&mut list, b, a);
        let m = arena.insert(15).unwrap();
        arena.insert_before(&mut list, b, m);
        assert_eq!(values(&arena, &list), [10, 15, 20]);
        assert_eq!(list.first(), Some(a));
        assert_eq!(list.last(), Some(b));
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn nodes_move_between_lists() {
        let mut arena = Arena::<u32, 2>::new();
        let mut free = List::new();
        let mut used = List::new();
        let a = arena.insert(7).unwrap();
        arena.push_back(&mut free, a);
        arena.unlink(&mut free, a);
        arena.push_back(&mut used, a);
        assert!(free.is_empty());
        assert_eq!(values(&arena, &used), [7]);
        assert_eq!(arena.available(), 1);
    }

    #[test]
    fn capacity_and_reuse() {
        let mut arena = Arena::<u32, 2>::new();
        let a = arena.insert(1).unwrap();
        let _b = arena.insert(2).unwrap();
        assert_eq!(arena.insert(3), None);
        assert_eq!(arena.available(), 0);

        assert_eq!(arena.remove(a), Some(1));
        assert_eq!(arena.remove(a), None);
        assert_eq!(arena.get(a), None);
        let c = arena.insert(3).unwrap();
        assert_eq!(c, a);
        assert_eq!(arena[c], 3);
    }

    #[test]
    fn find_by_value() {
        let mut arena = Arena::<u32, 4>::new();
        let mut list = List::new();
        for v in [5, 8, 13] {
            let id = arena.insert(v).unwrap();
            arena.push_back(&mut list, id);
        }
        let id = arena.find(&list, |v| *v > 6).unwrap();
        assert_eq!(arena[id], 8);
        arena[id] = 9;
        assert_eq!(values(&arena, &list), [5, 9, 13]);
        assert_eq!(arena.find(&list, |v| *v > 100), None);
    }
}
