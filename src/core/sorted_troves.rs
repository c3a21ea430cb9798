//! Risk-ordered index of positions.
//!
//! An intrusive doubly-linked list keyed by position id, ordered by nominal
//! collateral ratio (NICR) descending: the head is the safest position, the
//! tail the riskiest. Removal is O(1). Insertion takes a `(prev, next)` hint
//! pair; a hint that no longer brackets the new NICR is not an error, the list
//! falls back to walking from whichever hint is still usable, or from the head.
//!
//! The list does not store ratios. Callers pass a lookup so the order always
//! reflects current values including pending redistribution.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::utils::crypto::TroveId;

/// Neighbour links of one list entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Node {
    prev: Option<TroveId>,
    next: Option<TroveId>,
}

/// Caller-supplied insertion hint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertHint {
    /// Expected neighbour with NICR >= the new value
    pub prev: Option<TroveId>,
    /// Expected neighbour with NICR <= the new value
    pub next: Option<TroveId>,
}

impl InsertHint {
    /// No hint; the list walks from the head
    pub fn none() -> Self {
        Self::default()
    }

    /// Hint from both neighbours
    pub fn new(prev: Option<TroveId>, next: Option<TroveId>) -> Self {
        Self { prev, next }
    }
}

/// NICR-descending doubly-linked list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortedTroves {
    head: Option<TroveId>,
    tail: Option<TroveId>,
    nodes: HashMap<TroveId, Node>,
}

impl SortedTroves {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the list is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Check membership
    pub fn contains(&self, id: &TroveId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Highest NICR entry
    pub fn first(&self) -> Option<TroveId> {
        self.head
    }

    /// Lowest NICR entry
    pub fn last(&self) -> Option<TroveId> {
        self.tail
    }

    /// Neighbour with lower or equal NICR (towards the tail)
    pub fn next(&self, id: &TroveId) -> Option<TroveId> {
        self.nodes.get(id).and_then(|n| n.next)
    }

    /// Neighbour with higher or equal NICR (towards the head)
    pub fn prev(&self, id: &TroveId) -> Option<TroveId> {
        self.nodes.get(id).and_then(|n| n.prev)
    }

    /// Ids from head to tail
    pub fn to_vec(&self) -> Vec<TroveId> {
        let mut out = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        while let Some(id) = cursor {
            out.push(id);
            cursor = self.next(&id);
        }
        out
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // MUTATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Insert `id` with ratio `nicr`, using `hint` when it is still valid
    pub fn insert<F>(&mut self, id: TroveId, nicr: u128, hint: InsertHint, nicr_of: F) -> Result<()>
    where
        F: Fn(&TroveId) -> u128,
    {
        if self.contains(&id) {
            return Err(Error::InvalidPosition(format!(
                "{} already in sorted list",
                id.short()
            )));
        }

        let (prev, next) = if self.valid_insert_position(nicr, hint.prev, hint.next, &nicr_of) {
            (hint.prev, hint.next)
        } else {
            self.find_insert_position(nicr, hint.prev, hint.next, &nicr_of)
        };

        let node = Node { prev, next };
        match prev {
            Some(p) => self.link_next(&p, Some(id)),
            None => self.head = Some(id),
        }
        match next {
            Some(n) => self.link_prev(&n, Some(id)),
            None => self.tail = Some(id),
        }
        self.nodes.insert(id, node);
        Ok(())
    }

    /// Remove `id`
    pub fn remove(&mut self, id: &TroveId) -> Result<()> {
        let node = self.nodes.remove(id).ok_or_else(|| {
            Error::InvalidPosition(format!("{} not in sorted list", id.short()))
        })?;

        match node.prev {
            Some(p) => self.link_next(&p, node.next),
            None => self.head = node.next,
        }
        match node.next {
            Some(n) => self.link_prev(&n, node.prev),
            None => self.tail = node.prev,
        }
        Ok(())
    }

    /// Move `id` to the position for its new ratio
    pub fn reinsert<F>(&mut self, id: TroveId, nicr: u128, hint: InsertHint, nicr_of: F) -> Result<()>
    where
        F: Fn(&TroveId) -> u128,
    {
        self.remove(&id)?;
        // Hints pointing at the moved entry itself are meaningless now
        let hint = InsertHint {
            prev: hint.prev.filter(|p| *p != id),
            next: hint.next.filter(|n| *n != id),
        };
        self.insert(id, nicr, hint, nicr_of)
    }

    fn link_next(&mut self, id: &TroveId, next: Option<TroveId>) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.next = next;
        }
    }

    fn link_prev(&mut self, id: &TroveId, prev: Option<TroveId>) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.prev = prev;
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // HINT VALIDATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Check that `(prev, next)` brackets `nicr` in the current order
    pub fn valid_insert_position<F>(
        &self,
        nicr: u128,
        prev: Option<TroveId>,
        next: Option<TroveId>,
        nicr_of: F,
    ) -> bool
    where
        F: Fn(&TroveId) -> u128,
    {
        match (prev, next) {
            (None, None) => self.is_empty(),
            (None, Some(n)) => self.head == Some(n) && nicr >= nicr_of(&n),
            (Some(p), None) => self.tail == Some(p) && nicr <= nicr_of(&p),
            (Some(p), Some(n)) => {
                self.next(&p) == Some(n) && nicr_of(&p) >= nicr && nicr >= nicr_of(&n)
            }
        }
    }

    /// Find a valid position, starting from whichever hint survives
    pub fn find_insert_position<F>(
        &self,
        nicr: u128,
        prev_hint: Option<TroveId>,
        next_hint: Option<TroveId>,
        nicr_of: F,
    ) -> (Option<TroveId>, Option<TroveId>)
    where
        F: Fn(&TroveId) -> u128,
    {
        let prev = prev_hint.filter(|p| self.contains(p) && nicr <= nicr_of(p));
        let next = next_hint.filter(|n| self.contains(n) && nicr >= nicr_of(n));

        match (prev, next) {
            (None, None) => match self.head {
                Some(head) => self.descend(nicr, head, &nicr_of),
                None => (None, None),
            },
            (None, Some(n)) => self.ascend(nicr, n, &nicr_of),
            (Some(p), _) => self.descend(nicr, p, &nicr_of),
        }
    }

    /// Walk towards the tail from `start`
    fn descend<F>(&self, nicr: u128, start: TroveId, nicr_of: &F) -> (Option<TroveId>, Option<TroveId>)
    where
        F: Fn(&TroveId) -> u128,
    {
        if self.head == Some(start) && nicr >= nicr_of(&start) {
            return (None, Some(start));
        }

        let mut prev = Some(start);
        let mut next = self.next(&start);
        while let Some(p) = prev {
            if self.valid_insert_position(nicr, prev, next, nicr_of) {
                break;
            }
            prev = self.next(&p);
            next = prev.and_then(|q| self.next(&q));
        }
        (prev, next)
    }

    /// Walk towards the head from `start`
    fn ascend<F>(&self, nicr: u128, start: TroveId, nicr_of: &F) -> (Option<TroveId>, Option<TroveId>)
    where
        F: Fn(&TroveId) -> u128,
    {
        if self.tail == Some(start) && nicr <= nicr_of(&start) {
            return (Some(start), None);
        }

        let mut next = Some(start);
        let mut prev = self.prev(&start);
        while let Some(n) = next {
            if self.valid_insert_position(nicr, prev, next, nicr_of) {
                break;
            }
            next = self.prev(&n);
            prev = next.and_then(|q| self.prev(&q));
        }
        (prev, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::crypto::AccountId;

    fn ids(n: u64) -> Vec<TroveId> {
        let owner = AccountId::from_label("sorted");
        (0..n).map(|i| TroveId::generate(&owner, i)).collect()
    }

    fn build(ratios: &[u128]) -> (SortedTroves, Vec<TroveId>, HashMap<TroveId, u128>) {
        let ids = ids(ratios.len() as u64);
        let map: HashMap<TroveId, u128> = ids.iter().copied().zip(ratios.iter().copied()).collect();
        let mut list = SortedTroves::new();
        for id in &ids {
            let nicr = map[id];
            list.insert(*id, nicr, InsertHint::none(), |k| map[k]).unwrap();
        }
        (list, ids, map)
    }

    #[test]
    fn test_insert_orders_descending() {
        let (list, ids, _) = build(&[300, 100, 200, 400]);
        assert_eq!(list.to_vec(), vec![ids[3], ids[0], ids[2], ids[1]]);
        assert_eq!(list.first(), Some(ids[3]));
        assert_eq!(list.last(), Some(ids[1]));
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn test_remove_relinks() {
        let (mut list, ids, _) = build(&[300, 200, 100]);
        list.remove(&ids[1]).unwrap();
        assert_eq!(list.to_vec(), vec![ids[0], ids[2]]);
        assert_eq!(list.prev(&ids[2]), Some(ids[0]));

        list.remove(&ids[0]).unwrap();
        list.remove(&ids[2]).unwrap();
        assert!(list.is_empty());
        assert_eq!(list.first(), None);
        assert_eq!(list.last(), None);
        assert!(list.remove(&ids[2]).is_err());
    }

    #[test]
    fn test_valid_hint_is_used() {
        let (mut list, ids, mut map) = build(&[300, 100]);
        let new_id = TroveId::generate(&AccountId::from_label("new"), 9);
        map.insert(new_id, 200);

        assert!(list.valid_insert_position(200, Some(ids[0]), Some(ids[1]), |k| map[k]));
        list.insert(new_id, 200, InsertHint::new(Some(ids[0]), Some(ids[1])), |k| map[k])
            .unwrap();
        assert_eq!(list.to_vec(), vec![ids[0], new_id, ids[1]]);
    }

    #[test]
    fn test_stale_hint_falls_back() {
        let (mut list, ids, mut map) = build(&[500, 400, 300, 200, 100]);
        let new_id = TroveId::generate(&AccountId::from_label("new"), 9);
        map.insert(new_id, 250);

        // Hint brackets the wrong spot
        let hint = InsertHint::new(Some(ids[0]), Some(ids[1]));
        assert!(!list.valid_insert_position(250, hint.prev, hint.next, |k| map[k]));
        list.insert(new_id, 250, hint, |k| map[k]).unwrap();
        assert_eq!(list.prev(&new_id), Some(ids[2]));
        assert_eq!(list.next(&new_id), Some(ids[3]));
    }

    #[test]
    fn test_ascend_from_next_hint() {
        let (mut list, ids, mut map) = build(&[500, 400, 300, 200, 100]);
        let new_id = TroveId::generate(&AccountId::from_label("new"), 9);
        map.insert(new_id, 450);

        list.insert(new_id, 450, InsertHint::new(None, Some(ids[3])), |k| map[k])
            .unwrap();
        assert_eq!(list.prev(&new_id), Some(ids[0]));
        assert_eq!(list.next(&new_id), Some(ids[1]));
    }

    #[test]
    fn test_insert_extremes() {
        let (mut list, ids, mut map) = build(&[300, 200]);
        let top = TroveId::generate(&AccountId::from_label("top"), 0);
        let bottom = TroveId::generate(&AccountId::from_label("bottom"), 0);
        map.insert(top, 1_000);
        map.insert(bottom, 1);

        list.insert(top, 1_000, InsertHint::none(), |k| map[k]).unwrap();
        list.insert(bottom, 1, InsertHint::new(Some(ids[0]), None), |k| map[k])
            .unwrap();
        assert_eq!(list.first(), Some(top));
        assert_eq!(list.last(), Some(bottom));
    }

    #[test]
    fn test_reinsert_moves_entry() {
        let (mut list, ids, mut map) = build(&[300, 200, 100]);
        map.insert(ids[2], 350);
        list.reinsert(ids[2], 350, InsertHint::none(), |k| map[k]).unwrap();
        assert_eq!(list.to_vec(), vec![ids[2], ids[0], ids[1]]);
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let (mut list, ids, map) = build(&[300]);
        assert!(list.insert(ids[0], 300, InsertHint::none(), |k| map[k]).is_err());
    }
}
