use std::collections::VecDeque;

/// Bounded FIFO evicting its oldest item on overflow and counting evictions.
#[derive(Debug)]
pub struct FifoBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
    lost: u64,
}

impl<T> FifoBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            lost: 0,
        }
    }

    /// Appends `item`, evicting the oldest one when full.
    pub fn push(
        &mut self,
        item: T,
    ) {
        if self.items.len() >= self.capacity {
            self.items.pop_front();
            self.lost += 1;
        }
        self.items.push_back(item);
    }

    pub fn front(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn pop_front(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Changes the capacity; shrinking evicts the oldest items.
    pub fn set_capacity(
        &mut self,
        capacity: usize,
    ) {
        self.capacity = capacity.max(1);
        while self.items.len() > self.capacity {
            self.items.pop_front();
            self.lost += 1;
        }
    }

    /// Evictions not yet taken.
    pub fn lost(&self) -> u64 {
        self.lost
    }

    pub fn take_lost(&mut self) -> u64 {
        std::mem::take(&mut self.lost)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}
