//! Row Cache
//!
//! Bounded LRU of hydrated records keyed by ordinal position. Slots live in
//! a vector with a position map; each slot carries the tick of its last use,
//! and a tick-ordered index hands out the oldest slot when a full cache
//! needs room.

use std::collections::{BTreeMap, HashMap};

use crate::schema::Record;

struct Slot {
    index: usize,
    record: Record,
    last_used: u64,
}

/// Per-table row cache; a capacity of 0 disables caching
pub struct RowCache {
    capacity: usize,
    /// Record index -> slot position
    positions: HashMap<usize, usize>,
    /// Last-use tick -> slot position; ticks are unique
    by_tick: BTreeMap<u64, usize>,
    slots: Vec<Slot>,
    tick: u64,
}

impl RowCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            positions: HashMap::with_capacity(capacity),
            by_tick: BTreeMap::new(),
            slots: Vec::with_capacity(capacity),
            tick: 0,
        }
    }

    pub fn get(&mut self, index: usize) -> Option<Record> {
        let pos = *self.positions.get(&index)?;
        self.touch(pos);
        Some(self.slots[pos].record.clone())
    }

    pub fn put(&mut self, index: usize, record: Record) {
        if self.capacity == 0 {
            return;
        }

        if let Some(&pos) = self.positions.get(&index) {
            self.slots[pos].record = record;
            self.touch(pos);
            return;
        }

        let last_used = self.next_tick();
        let slot = Slot {
            index,
            record,
            last_used,
        };
        if self.slots.len() < self.capacity {
            let pos = self.slots.len();
            self.positions.insert(index, pos);
            self.by_tick.insert(last_used, pos);
            self.slots.push(slot);
            return;
        }

        let Some((_, victim)) = self.by_tick.pop_first() else {
            return;
        };
        let evicted = std::mem::replace(&mut self.slots[victim], slot);
        self.positions.remove(&evicted.index);
        self.positions.insert(index, victim);
        self.by_tick.insert(last_used, victim);
    }

    /// Drop every cached row; positions shift on any mutation
    pub fn clear(&mut self) {
        self.positions.clear();
        self.by_tick.clear();
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Move the slot at `pos` to the most recent end of the tick index
    fn touch(&mut self, pos: usize) {
        let tick = self.next_tick();
        let slot = &mut self.slots[pos];
        self.by_tick.remove(&slot.last_used);
        slot.last_used = tick;
        self.by_tick.insert(tick, pos);
    }
}

impl std::fmt::Debug for RowCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowCache")
            .field("capacity", &self.capacity)
            .field("len", &self.slots.len())
            .finish()
    }
}
