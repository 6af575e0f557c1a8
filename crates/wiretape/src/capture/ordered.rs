// ============================================
// File: crates/wiretape/src/capture/ordered.rs
// ============================================
//! # Time-ordered Op Merge
//!
//! ## Creation Reason
//! Ops complete per connection; an op finalized by an idle sweep can be
//! older than ops already produced by busier connections. This bounded
//! min-heap restores capture-time order before ops reach the log.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Ordering key is `(seen, arrival)`, so equal timestamps keep the
//!   order in which the reassembler produced them
//! - `order` is assigned when an op leaves the heap
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use wiretape_common::CaptureTime;
use wiretape_core::OpWithTime;

struct Pending {
    seen: CaptureTime,
    arrival: u64,
    record: OpWithTime,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.seen, self.arrival).cmp(&(other.seen, other.arrival))
    }
}

/// Bounded merge buffer releasing ops in capture-time order.
pub struct OrderedOps {
    heap: BinaryHeap<Reverse<Pending>>,
    capacity: usize,
    arrivals: u64,
    next_order: u64,
}

impl OrderedOps {
    /// Creates a buffer holding at most `capacity` ops.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity.min(4096) + 1),
            capacity: capacity.max(1),
            arrivals: 0,
            next_order: 0,
        }
    }

    /// Adds an op; returns the earliest op once the buffer is over capacity.
    pub fn push(&mut self, record: OpWithTime) -> Option<OpWithTime> {
        let arrival = self.arrivals;
        self.arrivals += 1;
        self.heap.push(Reverse(Pending {
            seen: record.seen,
            arrival,
            record,
        }));
        if self.heap.len() > self.capacity {
            self.pop()
        } else {
            None
        }
    }

    /// Removes the earliest op.
    pub fn pop(&mut self) -> Option<OpWithTime> {
        let Reverse(pending) = self.heap.pop()?;
        let mut record = pending.record;
        record.order = self.next_order;
        self.next_order += 1;
        Some(record)
    }

    /// Number of ops held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Returns `true` if nothing is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl std::fmt::Debug for OrderedOps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderedOps")
            .field("held", &self.heap.len())
            .field("capacity", &self.capacity)
            .field("next_order", &self.next_order)
            .finish()
    }
}
