//! Sorted Trove Index
//!
//! Doubly linked list of active troves ordered by risk score (AICR at last
//! touch). The head is the safest trove, the tail the riskiest; `next` moves
//! toward the tail and `prev` toward the head, so redemptions and batch
//! liquidations start at [`SortedTroveIndex::tail`] and follow `prev`.
//!
//! Ordering is authoritative in a `BTreeMap<(score, seq), TroveId>`; `seq` is
//! an insertion counter, so equal scores keep earlier insertions nearer the
//! tail. Caller hints are verified against the map and used only when they
//! name the exact neighbours; otherwise the position comes from the map.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use core::ops::Bound::{Excluded, Unbounded};

use mcusd_common::{
    errors::{McUsdError, McUsdResult},
    types::TroveId,
    BTreeMap, Vec,
};

type Key = (u128, u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
struct Node {
    key: Key,
    /// Neighbour toward the head (higher score)
    prev: Option<TroveId>,
    /// Neighbour toward the tail (lower score)
    next: Option<TroveId>,
}

/// Ordered index of active troves
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct SortedTroveIndex {
    order: BTreeMap<Key, TroveId>,
    nodes: BTreeMap<TroveId, Node>,
    head: Option<TroveId>,
    tail: Option<TroveId>,
    next_seq: u64,
}

impl SortedTroveIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a trove. Returns whether the hint was used as given.
    pub fn insert(
        &mut self,
        trove: TroveId,
        score: u128,
        hint_prev: Option<TroveId>,
        hint_next: Option<TroveId>,
    ) -> McUsdResult<bool> {
        check_score(score)?;
        if self.nodes.contains_key(&trove) {
            return Err(McUsdError::TroveAlreadyInIndex { trove_id: trove });
        }

        let key = (score, self.next_seq);
        self.next_seq += 1;

        let hinted = self.valid_position(key, hint_prev, hint_next);
        let (prev, next) = if hinted {
            (hint_prev, hint_next)
        } else {
            if hint_prev.is_some() || hint_next.is_some() {
                log::debug!("stale sorted-index hint, falling back to ordered lookup");
            }
            self.neighbours(key)
        };

        self.link(trove, key, prev, next);
        Ok(hinted)
    }

    /// Remove a trove
    pub fn remove(&mut self, trove: &TroveId) -> McUsdResult<()> {
        let node = self
            .nodes
            .remove(trove)
            .ok_or(McUsdError::TroveNotInIndex { trove_id: *trove })?;
        self.order.remove(&node.key);

        match node.prev {
            Some(prev) => {
                if let Some(p) = self.nodes.get_mut(&prev) {
                    p.next = node.next;
                }
            }
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => {
                if let Some(n) = self.nodes.get_mut(&next) {
                    n.prev = node.prev;
                }
            }
            None => self.tail = node.prev,
        }
        Ok(())
    }

    /// Move a trove to a new score. The trove takes a fresh insertion order.
    pub fn reinsert(
        &mut self,
        trove: TroveId,
        score: u128,
        hint_prev: Option<TroveId>,
        hint_next: Option<TroveId>,
    ) -> McUsdResult<bool> {
        check_score(score)?;
        self.remove(&trove)?;
        self.insert(trove, score, hint_prev, hint_next)
    }

    /// Safest trove
    pub fn head(&self) -> Option<TroveId> {
        self.head
    }

    /// Riskiest trove
    pub fn tail(&self) -> Option<TroveId> {
        self.tail
    }

    /// Neighbour toward the head
    pub fn prev(&self, trove: &TroveId) -> Option<TroveId> {
        self.nodes.get(trove).and_then(|n| n.prev)
    }

    /// Neighbour toward the tail
    pub fn next(&self, trove: &TroveId) -> Option<TroveId> {
        self.nodes.get(trove).and_then(|n| n.next)
    }

    pub fn contains(&self, trove: &TroveId) -> bool {
        self.nodes.contains_key(trove)
    }

    /// Score recorded at the trove's last (re)insertion
    pub fn score(&self, trove: &TroveId) -> Option<u128> {
        self.nodes.get(trove).map(|n| n.key.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Troves from riskiest to safest
    pub fn iter_from_tail(&self) -> impl Iterator<Item = &TroveId> {
        self.order.values()
    }

    /// Exact `(prev, next)` hint for inserting a new trove at `score`
    pub fn find_insert_position(&self, score: u128) -> (Option<TroveId>, Option<TroveId>) {
        self.neighbours((score, self.next_seq))
    }

    // ============ Internals ============

    fn neighbours(&self, key: Key) -> (Option<TroveId>, Option<TroveId>) {
        let next = self.order.range(..key).next_back().map(|(_, id)| *id);
        let prev = self
            .order
            .range((Excluded(key), Unbounded))
            .next()
            .map(|(_, id)| *id);
        (prev, next)
    }

    fn valid_position(&self, key: Key, prev: Option<TroveId>, next: Option<TroveId>) -> bool {
        let prev_node = match prev {
            Some(id) => match self.nodes.get(&id) {
                Some(node) if node.key > key => Some(node),
                _ => return false,
            },
            None => None,
        };
        let next_node = match next {
            Some(id) => match self.nodes.get(&id) {
                Some(node) if node.key < key => Some(node),
                _ => return false,
            },
            None => None,
        };

        match (prev_node, next_node) {
            (None, None) => self.nodes.is_empty(),
            (None, Some(_)) => self.head == next,
            (Some(_), None) => self.tail == prev,
            (Some(p), Some(_)) => p.next == next,
        }
    }

    fn link(&mut self, trove: TroveId, key: Key, prev: Option<TroveId>, next: Option<TroveId>) {
        match prev {
            Some(id) => {
                if let Some(p) = self.nodes.get_mut(&id) {
                    p.next = Some(trove);
                }
            }
            None => self.head = Some(trove),
        }
        match next {
            Some(id) => {
                if let Some(n) = self.nodes.get_mut(&id) {
                    n.prev = Some(trove);
                }
            }
            None => self.tail = Some(trove),
        }
        self.nodes.insert(trove, Node { key, prev, next });
        self.order.insert(key, trove);
    }

    /// Linked order from tail to head, for consistency checks
    pub fn walk_from_tail(&self) -> Vec<TroveId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut current = self.tail;
        while let Some(id) = current {
            out.push(id);
            current = self.prev(&id);
        }
        out
    }
}

fn check_score(score: u128) -> McUsdResult<()> {
    if score == 0 || score == u128::MAX {
        return Err(McUsdError::InvalidRiskScore { score });
    }
    Ok(())
}
