// src/canvas/history.rs
use std::collections::VecDeque;

/// LIFO of prior states, bounded to the most recent `limit` entries.
///
/// Eviction hands the dropped entry back to the caller, which owns whatever
/// resources the entry references.
#[derive(Debug, Clone)]
pub struct HistoryStack<T> {
    entries: VecDeque<T>,
    limit: usize,
}

impl<T> HistoryStack<T> {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    pub fn push(&mut self, entry: T) -> Option<T> {
        self.entries.push_back(entry);
        if self.entries.len() > self.limit {
            self.entries.pop_front()
        } else {
            None
        }
    }

    pub fn pop(&mut self) -> Option<T> {
        self.entries.pop_back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn drain(&mut self) -> Vec<T> {
        self.entries.drain(..).collect()
    }
}
