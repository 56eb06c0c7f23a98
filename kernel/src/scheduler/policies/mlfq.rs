/*
 * Multi-Level Feedback Queue
 *
 * This module implements the run queues of the MLFQ scheduler: three
 * levels, each a FIFO of process slots, stored together in one arena.
 *
 * Layout:
 * The arena has one entry per process slot followed by two sentinel
 * entries (head, tail) per level:
 *
 *     [ slot 0 | slot 1 | ... | slot n-1 | H0 T0 | H1 T1 | H2 T2 ]
 *
 * Each level is a circular doubly-linked list threaded through the arena
 * by index, closed by its own head and tail sentinels. Entries are pushed
 * right after the head and popped right before the tail, so every level
 * is FIFO. Since each slot has exactly one entry, a slot can be linked
 * into at most one level at a time, and all operations are O(1) with no
 * allocation after construction.
 *
 * Every entry also records the level it was inserted at. The re-leveler
 * compares that recorded level with the level the process's current nice
 * value calls for, and relocates entries that no longer match.
 *
 * The table is not synchronized; the scheduler keeps it behind its own
 * spin lock.
 */

use alloc::vec;
use alloc::vec::Vec;

use super::super::types::{Level, SlotId};

/// One arena entry
#[derive(Debug, Clone, Copy)]
struct QueueEntry {
    /// Level this entry is linked into, `None` when unlinked
    level: Option<Level>,
    prev: usize,
    next: usize,
}

impl QueueEntry {
    const UNLINKED: QueueEntry = QueueEntry { level: None, prev: 0, next: 0 };
}

/// Run queues of all three levels
#[derive(Debug)]
pub struct QueueTable {
    /// Number of process slots (sentinels start at this index)
    nslots: usize,
    entries: Vec<QueueEntry>,
}

impl QueueTable {
    /// Create empty queues for `nslots` process slots
    pub fn new(nslots: usize) -> Self {
        let mut entries = vec![QueueEntry::UNLINKED; nslots + 2 * Level::ALL.len()];

        for level in Level::ALL {
            let head = nslots + 2 * level.index();
            let tail = head + 1;
            entries[head] = QueueEntry { level: Some(level), prev: tail, next: tail };
            entries[tail] = QueueEntry { level: Some(level), prev: head, next: head };
        }

        Self { nslots, entries }
    }

    fn head(&self, level: Level) -> usize {
        self.nslots + 2 * level.index()
    }

    fn tail(&self, level: Level) -> usize {
        self.head(level) + 1
    }

    /// Number of process slots the table was built for
    pub fn capacity(&self) -> usize {
        self.nslots
    }

    /// Is the level empty (head and tail adjacent)?
    pub fn is_empty(&self, level: Level) -> bool {
        self.entries[self.head(level)].next == self.tail(level)
    }

    /// Insert `slot` at the front of `level`
    ///
    /// # Returns
    ///
    /// `false`, leaving the table unchanged, if the slot is out of range,
    /// is already the first entry of the level, or is linked anywhere.
    pub fn push_front(&mut self, level: Level, slot: SlotId) -> bool {
        if slot >= self.nslots {
            return false;
        }

        let head = self.head(level);
        let first = self.entries[head].next;
        if first == slot || self.entries[slot].level.is_some() {
            return false;
        }

        self.entries[slot] = QueueEntry { level: Some(level), prev: head, next: first };
        self.entries[first].prev = slot;
        self.entries[head].next = slot;
        true
    }

    /// Remove and return the entry at the back of `level`
    pub fn pop_back(&mut self, level: Level) -> Option<SlotId> {
        if self.is_empty(level) {
            return None;
        }

        let last = self.entries[self.tail(level)].prev;
        self.unlink(last);
        Some(last)
    }

    /// Unlink `slot` from whichever level holds it
    ///
    /// # Returns
    ///
    /// The level it was removed from, or `None` if it was not linked.
    pub fn remove(&mut self, slot: SlotId) -> Option<Level> {
        if slot >= self.nslots {
            return None;
        }

        let level = self.entries[slot].level?;
        self.unlink(slot);
        Some(level)
    }

    /// Level `slot` is currently linked into
    pub fn level_of(&self, slot: SlotId) -> Option<Level> {
        if slot >= self.nslots {
            return None;
        }
        self.entries[slot].level
    }

    /// Number of entries in `level`
    pub fn len(&self, level: Level) -> usize {
        self.iter(level).count()
    }

    /// Slots of `level` in head-to-tail order (most recently pushed first)
    pub fn iter(&self, level: Level) -> impl Iterator<Item = SlotId> + '_ {
        let tail = self.tail(level);
        let mut cursor = self.entries[self.head(level)].next;

        core::iter::from_fn(move || {
            if cursor == tail {
                return None;
            }
            let slot = cursor;
            cursor = self.entries[slot].next;
            Some(slot)
        })
    }

    /// Move every entry whose recorded level disagrees with `level_for`
    ///
    /// Levels are walked lowest first, head to tail. A mismatched entry is
    /// pushed at the front of its correct level; entries that already match
    /// keep their place and relative order.
    ///
    /// # Returns
    ///
    /// Number of relocated entries.
    pub fn relevel(&mut self, mut level_for: impl FnMut(SlotId) -> Level) -> usize {
        let mut moved = 0;

        for level in Level::ALL {
            let tail = self.tail(level);
            let mut cursor = self.entries[self.head(level)].next;

            while cursor != tail {
                // Relocation rewrites the entry's links; step first.
                let next = self.entries[cursor].next;

                let target = level_for(cursor);
                if target != level {
                    self.unlink(cursor);
                    if !self.push_front(target, cursor) {
                        panic!("relevel: slot {} refused by {}", cursor, target);
                    }
                    moved += 1;
                }

                cursor = next;
            }
        }

        moved
    }

    fn unlink(&mut self, index: usize) {
        let QueueEntry { prev, next, .. } = self.entries[index];
        self.entries[prev].next = next;
        self.entries[next].prev = prev;
        self.entries[index] = QueueEntry::UNLINKED;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[test]
    fn test_levels_start_empty() {
        let table = QueueTable::new(4);
        for level in Level::ALL {
            assert!(table.is_empty(level));
            assert_eq!(table.len(level), 0);
        }
        assert_eq!(table.capacity(), 4);
    }

    #[test]
    fn test_fifo_order() {
        let mut table = QueueTable::new(8);
        for slot in [3, 1, 5] {
            assert!(table.push_front(Level::Normal, slot));
        }

        assert_eq!(table.iter(Level::Normal).collect::<Vec<_>>(), [5, 1, 3]);
        assert_eq!(table.pop_back(Level::Normal), Some(3));
        assert_eq!(table.pop_back(Level::Normal), Some(1));
        assert_eq!(table.pop_back(Level::Normal), Some(5));
        assert_eq!(table.pop_back(Level::Normal), None);
        assert!(table.is_empty(Level::Normal));
    }

    #[test]
    fn test_rejects_bad_insertions() {
        let mut table = QueueTable::new(4);

        assert!(!table.push_front(Level::Low, 4), "out of range");
        assert!(table.push_front(Level::Low, 2));
        assert!(!table.push_front(Level::Low, 2), "already first in level");

        assert!(table.push_front(Level::Low, 1));
        assert!(!table.push_front(Level::Low, 2), "linked further back");
        assert!(!table.push_front(Level::High, 2), "linked in another level");

        assert_eq!(table.iter(Level::Low).collect::<Vec<_>>(), [1, 2]);
        assert!(table.is_empty(Level::High));
    }

    #[test]
    fn test_remove_arbitrary() {
        let mut table = QueueTable::new(4);
        for slot in 0..4 {
            table.push_front(Level::High, slot);
        }

        assert_eq!(table.remove(2), Some(Level::High));
        assert_eq!(table.remove(2), None);
        assert_eq!(table.level_of(2), None);
        assert_eq!(table.iter(Level::High).collect::<Vec<_>>(), [3, 1, 0]);

        // A removed slot can be linked again.
        assert!(table.push_front(Level::Low, 2));
        assert_eq!(table.level_of(2), Some(Level::Low));
    }

    #[test]
    fn test_levels_are_independent() {
        let mut table = QueueTable::new(6);
        table.push_front(Level::Low, 0);
        table.push_front(Level::High, 1);
        table.push_front(Level::Normal, 2);

        assert_eq!(table.pop_back(Level::High), Some(1));
        assert_eq!(table.pop_back(Level::High), None);
        assert_eq!(table.pop_back(Level::Normal), Some(2));
        assert_eq!(table.pop_back(Level::Low), Some(0));
    }

    #[test]
    fn test_relevel_moves_only_mismatched() {
        let mut table = QueueTable::new(8);
        for slot in [0, 1, 2, 3] {
            table.push_front(Level::Normal, slot);
        }
        table.push_front(Level::Low, 4);

        // Slot 1 now belongs in High, slot 4 in Normal; the rest stay.
        let moved = table.relevel(|slot| match slot {
            1 => Level::High,
            4 | 0 | 2 | 3 => Level::Normal,
            _ => Level::Low,
        });

        assert_eq!(moved, 2);
        assert_eq!(table.iter(Level::High).collect::<Vec<_>>(), [1]);
        assert_eq!(table.iter(Level::Normal).collect::<Vec<_>>(), [4, 3, 2, 0]);
        assert!(table.is_empty(Level::Low));
        assert_eq!(table.level_of(1), Some(Level::High));
    }

    #[test]
    fn test_relevel_noop_when_consistent() {
        let mut table = QueueTable::new(4);
        table.push_front(Level::Normal, 0);
        table.push_front(Level::Normal, 1);

        assert_eq!(table.relevel(|_| Level::Normal), 0);
        assert_eq!(table.iter(Level::Normal).collect::<Vec<_>>(), [1, 0]);
    }
}
