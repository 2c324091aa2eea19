use std::collections::VecDeque;

use super::protocol::Sequence;

/// Fixed-capacity set that evicts its oldest entry when full.
#[derive(Debug, Clone)]
pub struct RingSet<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T: PartialEq> RingSet<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns false if `value` was already present.
    pub fn insert(&mut self, value: T) -> bool {
        if self.contains(&value) {
            return false;
        }
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(value);
        true
    }

    pub fn contains(&self, value: &T) -> bool {
        self.entries.contains(value)
    }

    pub fn remove(&mut self, value: &T) -> bool {
        match self.entries.iter().position(|entry| entry == value) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Slots indexed by `sequence % capacity`; a newer sequence overwrites the
/// slot of the one `capacity` steps older.
#[derive(Debug, Clone)]
pub struct SequenceBuffer<T> {
    slots: Vec<Option<(Sequence, T)>>,
}

impl<T> SequenceBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn insert(&mut self, sequence: Sequence, value: T) {
        let index = self.index(sequence);
        self.slots[index] = Some((sequence, value));
    }

    pub fn contains(&self, sequence: Sequence) -> bool {
        self.get(sequence).is_some()
    }

    pub fn get(&self, sequence: Sequence) -> Option<&T> {
        match &self.slots[self.index(sequence)] {
            Some((stored, value)) if *stored == sequence => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, sequence: Sequence) -> Option<&mut T> {
        let index = self.index(sequence);
        match &mut self.slots[index] {
            Some((stored, value)) if *stored == sequence => Some(value),
            _ => None,
        }
    }

    pub fn remove(&mut self, sequence: Sequence) -> Option<T> {
        let index = self.index(sequence);
        match self.slots[index] {
            Some((stored, _)) if stored == sequence => self.slots[index].take().map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }

    fn index(&self, sequence: Sequence) -> usize {
        sequence as usize % self.slots.len()
    }
}
