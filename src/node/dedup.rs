// Copyright (c) 2026 kadnet
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! A process-wide bounded LRU of recently seen broadcast ids.
//!
//! The lineage this spec distills from leaves this either per-neighbor or
//! process-wide; a single bounded LRU is used here, since per-neighbor
//! tables would grow unboundedly as peers churn through the routing table.

use std::collections::{HashSet, VecDeque};

use uuid::Uuid;

/// Tracks the most recently observed broadcast ids, bounded to a fixed
/// capacity.
pub struct BroadcastDedup {
    capacity: usize,
    order: VecDeque<Uuid>,
    seen: HashSet<Uuid>,
}

impl BroadcastDedup {
    /// Create a tracker holding at most `capacity` ids.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    /// Record `id`, returning `true` if it had not been seen before.
    pub fn observe(&mut self, id: Uuid) -> bool {
        if !self.seen.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_is_novel() {
        let mut dedup = BroadcastDedup::new(4);
        assert!(dedup.observe(Uuid::new_v4()));
    }

    #[test]
    fn repeat_observation_is_suppressed() {
        let mut dedup = BroadcastDedup::new(4);
        let id = Uuid::new_v4();
        assert!(dedup.observe(id));
        assert!(!dedup.observe(id));
    }

    #[test]
    fn capacity_evicts_oldest_entry() {
        let mut dedup = BroadcastDedup::new(2);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        dedup.observe(a);
        dedup.observe(b);
        dedup.observe(c);
        // `a` was evicted to make room for `c`; it is treated as novel again.
        assert!(dedup.observe(a));
    }
}
