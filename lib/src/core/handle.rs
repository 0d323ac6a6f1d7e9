// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

use std::sync::atomic::{AtomicU32, Ordering};

/// Issues request handles, request ids and sequence numbers. Values increase from `first` and
/// wrap back to `first` after `u32::MAX`, so `0` is never issued when `first` is 1.
#[derive(Debug)]
pub struct AtomicHandle {
    next: AtomicU32,
    first: u32,
}

impl AtomicHandle {
    pub fn new(first: u32) -> Self {
        Self {
            next: AtomicU32::new(first),
            first,
        }
    }

    pub fn next(&self) -> u32 {
        let first = self.first;
        match self
            .next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                Some(if v == u32::MAX { first } else { v + 1 })
            }) {
            Ok(v) | Err(v) => v,
        }
    }

    /// The value the next call to `next()` returns.
    pub fn peek(&self) -> u32 {
        self.next.load(Ordering::Acquire)
    }

    pub fn set_next(&self, next: u32) {
        self.next.store(next.max(self.first), Ordering::Release);
    }

    pub fn reset(&self) {
        self.set_next(self.first);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments() {
        let h = AtomicHandle::new(1);
        assert_eq!(h.next(), 1);
        assert_eq!(h.next(), 2);
        assert_eq!(h.peek(), 3);
        h.reset();
        assert_eq!(h.next(), 1);
    }

    #[test]
    fn wraps_to_first() {
        let h = AtomicHandle::new(1);
        h.set_next(u32::MAX - 1);
        assert_eq!(h.next(), u32::MAX - 1);
        assert_eq!(h.next(), u32::MAX);
        assert_eq!(h.next(), 1);
    }
}
