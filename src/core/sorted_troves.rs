//! Sorted trove index.
//!
//! A doubly-linked list of trove owners ordered by nominal ICR, highest at the
//! head and lowest at the tail. Links are owner addresses, never references;
//! the ratio of each node is looked up through `NominalIcrSource`, so the list
//! itself stores no collateral or debt.
//!
//! Insertions take a `(prev, next)` hint pair. A valid hint costs O(1); a stale
//! hint falls back to walking the list from whichever hint is still usable.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::utils::crypto::Address;

/// Supplies the current nominal ICR of a listed trove
pub trait NominalIcrSource {
    /// Nominal ICR of `id`, including pending redistribution rewards
    fn nominal_icr(&self, id: &Address) -> u128;
}

// ═══════════════════════════════════════════════════════════════════════════════
// NODE
// ═══════════════════════════════════════════════════════════════════════════════

/// Links of one listed trove
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Neighbor with the next lower (or equal) NICR
    pub next: Option<Address>,
    /// Neighbor with the next higher (or equal) NICR
    pub prev: Option<Address>,
}

/// Caller-supplied neighbors for an insertion. Either side may be stale or absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertHint {
    /// Expected neighbor with higher NICR
    pub prev: Option<Address>,
    /// Expected neighbor with lower NICR
    pub next: Option<Address>,
}

impl InsertHint {
    /// Hint pair from explicit neighbors
    pub fn new(prev: Option<Address>, next: Option<Address>) -> Self {
        Self { prev, next }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SORTED TROVES
// ═══════════════════════════════════════════════════════════════════════════════

/// Troves sorted by descending nominal ICR
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortedTroves {
    /// Highest NICR
    head: Option<Address>,
    /// Lowest NICR
    tail: Option<Address>,
    /// Capacity
    max_size: usize,
    /// Links by owner
    nodes: BTreeMap<Address, Node>,
}

impl SortedTroves {
    /// Create an empty list holding at most `max_size` troves
    pub fn new(max_size: usize) -> Self {
        Self {
            head: None,
            tail: None,
            max_size,
            nodes: BTreeMap::new(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // MUTATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Insert `id` with nominal ICR `nicr` near the `(prev_hint, next_hint)` position
    pub fn insert<S: NominalIcrSource>(
        &mut self,
        source: &S,
        id: Address,
        nicr: u128,
        prev_hint: Option<Address>,
        next_hint: Option<Address>,
    ) -> Result<()> {
        if self.is_full() {
            return Err(Error::SortedListFull);
        }
        if self.contains(&id) {
            return Err(Error::NodeAlreadyExists(id.to_hex()));
        }
        if nicr == 0 {
            return Err(Error::ZeroNominalIcr);
        }

        let (prev, next) = if self.valid_insert_position(source, nicr, prev_hint, next_hint) {
            (prev_hint, next_hint)
        } else {
            self.find_insert_position(source, nicr, prev_hint, next_hint)
        };

        match (prev, next) {
            (None, None) => {
                self.head = Some(id);
                self.tail = Some(id);
            }
            (None, Some(next_id)) => {
                self.node_mut(&next_id)?.prev = Some(id);
                self.head = Some(id);
            }
            (Some(prev_id), None) => {
                self.node_mut(&prev_id)?.next = Some(id);
                self.tail = Some(id);
            }
            (Some(prev_id), Some(next_id)) => {
                self.node_mut(&prev_id)?.next = Some(id);
                self.node_mut(&next_id)?.prev = Some(id);
            }
        }
        self.nodes.insert(id, Node { next, prev });
        Ok(())
    }

    /// Remove `id` from the list
    pub fn remove(&mut self, id: &Address) -> Result<()> {
        let node = self
            .nodes
            .remove(id)
            .ok_or_else(|| Error::NodeNotFound(id.to_hex()))?;

        match node.prev {
            Some(prev_id) => self.node_mut(&prev_id)?.next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(next_id) => self.node_mut(&next_id)?.prev = node.prev,
            None => self.tail = node.prev,
        }
        Ok(())
    }

    /// Move `id` to the position matching its new nominal ICR
    pub fn re_insert<S: NominalIcrSource>(
        &mut self,
        source: &S,
        id: Address,
        new_nicr: u128,
        prev_hint: Option<Address>,
        next_hint: Option<Address>,
    ) -> Result<()> {
        if !self.contains(&id) {
            return Err(Error::NodeNotFound(id.to_hex()));
        }
        if new_nicr == 0 {
            return Err(Error::ZeroNominalIcr);
        }
        self.remove(&id)?;
        self.insert(source, id, new_nicr, prev_hint, next_hint)
    }

    fn node_mut(&mut self, id: &Address) -> Result<&mut Node> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| Error::InvariantViolation(format!("dangling sorted-list link {}", id)))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Whether `id` is listed
    pub fn contains(&self, id: &Address) -> bool {
        self.nodes.contains_key(id)
    }

    /// Whether the list is at capacity
    pub fn is_full(&self) -> bool {
        self.nodes.len() >= self.max_size
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of listed troves
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    /// Capacity
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Trove with the highest NICR
    pub fn first(&self) -> Option<Address> {
        self.head
    }

    /// Trove with the lowest NICR
    pub fn last(&self) -> Option<Address> {
        self.tail
    }

    /// Next trove towards the tail (lower NICR)
    pub fn next(&self, id: &Address) -> Option<Address> {
        self.nodes.get(id).and_then(|n| n.next)
    }

    /// Previous trove towards the head (higher NICR)
    pub fn prev(&self, id: &Address) -> Option<Address> {
        self.nodes.get(id).and_then(|n| n.prev)
    }

    /// Iterate from highest to lowest NICR
    pub fn iter(&self) -> SortedIter<'_> {
        SortedIter {
            list: self,
            cursor: self.head,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // HINTS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Whether `(prev, next)` is a correct insert position for `nicr`
    pub fn valid_insert_position<S: NominalIcrSource>(
        &self,
        source: &S,
        nicr: u128,
        prev: Option<Address>,
        next: Option<Address>,
    ) -> bool {
        match (prev, next) {
            (None, None) => self.is_empty(),
            (None, Some(next_id)) => self.head == Some(next_id) && nicr >= source.nominal_icr(&next_id),
            (Some(prev_id), None) => self.tail == Some(prev_id) && nicr <= source.nominal_icr(&prev_id),
            (Some(prev_id), Some(next_id)) => {
                self.next(&prev_id) == Some(next_id)
                    && self.contains(&prev_id)
                    && source.nominal_icr(&prev_id) >= nicr
                    && nicr >= source.nominal_icr(&next_id)
            }
        }
    }

    /// Correct insert position for `nicr`, starting from whichever hint is usable
    pub fn find_insert_position<S: NominalIcrSource>(
        &self,
        source: &S,
        nicr: u128,
        prev_hint: Option<Address>,
        next_hint: Option<Address>,
    ) -> (Option<Address>, Option<Address>) {
        let prev = prev_hint.filter(|id| self.contains(id) && nicr <= source.nominal_icr(id));
        let next = next_hint.filter(|id| self.contains(id) && nicr >= source.nominal_icr(id));

        match (prev, next) {
            (None, None) => match self.head {
                Some(head) => self.descend_list(source, nicr, head),
                None => (None, None),
            },
            (None, Some(next_id)) => self.ascend_list(source, nicr, next_id),
            (Some(prev_id), _) => self.descend_list(source, nicr, prev_id),
        }
    }

    /// Walk towards the tail from `start` until a valid position is found
    fn descend_list<S: NominalIcrSource>(
        &self,
        source: &S,
        nicr: u128,
        start: Address,
    ) -> (Option<Address>, Option<Address>) {
        if self.head == Some(start) && nicr >= source.nominal_icr(&start) {
            return (None, Some(start));
        }

        let mut prev = Some(start);
        let mut next = self.next(&start);
        while let Some(prev_id) = prev {
            if self.valid_insert_position(source, nicr, prev, next) {
                break;
            }
            prev = self.next(&prev_id);
            next = prev.and_then(|id| self.next(&id));
        }
        (prev, next)
    }

    /// Walk towards the head from `start` until a valid position is found
    fn ascend_list<S: NominalIcrSource>(
        &self,
        source: &S,
        nicr: u128,
        start: Address,
    ) -> (Option<Address>, Option<Address>) {
        if self.tail == Some(start) && nicr <= source.nominal_icr(&start) {
            return (Some(start), None);
        }

        let mut next = Some(start);
        let mut prev = self.prev(&start);
        while let Some(next_id) = next {
            if self.valid_insert_position(source, nicr, prev, next) {
                break;
            }
            next = self.prev(&next_id);
            prev = next.and_then(|id| self.prev(&id));
        }
        (prev, next)
    }
}

/// Iterator over listed troves from highest to lowest NICR
pub struct SortedIter<'a> {
    list: &'a SortedTroves,
    cursor: Option<Address>,
}

impl Iterator for SortedIter<'_> {
    type Item = Address;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.cursor?;
        self.cursor = self.list.next(&current);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Default)]
    struct Ratios(BTreeMap<Address, u128>);

    impl NominalIcrSource for Ratios {
        fn nominal_icr(&self, id: &Address) -> u128 {
            self.0.get(id).copied().unwrap_or(0)
        }
    }

    fn addr(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    fn insert(list: &mut SortedTroves, ratios: &mut Ratios, n: u64, nicr: u128) {
        ratios.0.insert(addr(n), nicr);
        list.insert(ratios, addr(n), nicr, None, None).unwrap();
    }

    fn assert_sorted(list: &SortedTroves, ratios: &Ratios) {
        let values: Vec<u128> = list.iter().map(|id| ratios.nominal_icr(&id)).collect();
        assert!(values.windows(2).all(|w| w[0] >= w[1]), "not sorted: {:?}", values);
        assert_eq!(values.len(), list.size());
    }

    #[test]
    fn test_insert_orders_descending() {
        let mut list = SortedTroves::new(10);
        let mut ratios = Ratios::default();

        insert(&mut list, &mut ratios, 1, 300);
        insert(&mut list, &mut ratios, 2, 500);
        insert(&mut list, &mut ratios, 3, 100);
        insert(&mut list, &mut ratios, 4, 400);

        let order: Vec<Address> = list.iter().collect();
        assert_eq!(order, vec![addr(2), addr(4), addr(1), addr(3)]);
        assert_eq!(list.first(), Some(addr(2)));
        assert_eq!(list.last(), Some(addr(3)));
        assert_eq!(list.prev(&addr(3)), Some(addr(1)));
        assert_eq!(list.next(&addr(3)), None);
    }

    #[test]
    fn test_insert_with_valid_hint() {
        let mut list = SortedTroves::new(10);
        let mut ratios = Ratios::default();
        insert(&mut list, &mut ratios, 1, 500);
        insert(&mut list, &mut ratios, 2, 100);

        ratios.0.insert(addr(3), 300);
        assert!(list.valid_insert_position(&ratios, 300, Some(addr(1)), Some(addr(2))));
        list.insert(&ratios, addr(3), 300, Some(addr(1)), Some(addr(2))).unwrap();
        assert_eq!(list.next(&addr(1)), Some(addr(3)));
        assert_eq!(list.prev(&addr(2)), Some(addr(3)));
    }

    #[test]
    fn test_insert_with_stale_hint_falls_back() {
        let mut list = SortedTroves::new(10);
        let mut ratios = Ratios::default();
        for (n, nicr) in [(1, 900), (2, 700), (3, 500), (4, 300), (5, 100)] {
            insert(&mut list, &mut ratios, n, nicr);
        }

        // Hint points at the wrong neighbourhood and at a removed node
        ratios.0.insert(addr(6), 200);
        list.remove(&addr(2)).unwrap();
        list.insert(&ratios, addr(6), 200, Some(addr(2)), Some(addr(1))).unwrap();
        assert_eq!(list.prev(&addr(6)), Some(addr(4)));
        assert_eq!(list.next(&addr(6)), Some(addr(5)));
        assert_sorted(&list, &ratios);
    }

    #[test]
    fn test_remove_head_tail_middle() {
        let mut list = SortedTroves::new(10);
        let mut ratios = Ratios::default();
        for (n, nicr) in [(1, 300), (2, 200), (3, 100)] {
            insert(&mut list, &mut ratios, n, nicr);
        }

        list.remove(&addr(2)).unwrap();
        assert_eq!(list.next(&addr(1)), Some(addr(3)));
        list.remove(&addr(1)).unwrap();
        assert_eq!(list.first(), Some(addr(3)));
        list.remove(&addr(3)).unwrap();
        assert!(list.is_empty());
        assert_eq!(list.first(), None);
        assert_eq!(list.last(), None);
        assert!(matches!(list.remove(&addr(3)), Err(Error::NodeNotFound(_))));
    }

    #[test]
    fn test_re_insert() {
        let mut list = SortedTroves::new(10);
        let mut ratios = Ratios::default();
        for (n, nicr) in [(1, 300), (2, 200), (3, 100)] {
            insert(&mut list, &mut ratios, n, nicr);
        }

        ratios.0.insert(addr(3), 400);
        list.re_insert(&ratios, addr(3), 400, None, None).unwrap();
        assert_eq!(list.first(), Some(addr(3)));
        assert_eq!(list.last(), Some(addr(2)));
        assert!(matches!(
            list.re_insert(&ratios, addr(9), 1, None, None),
            Err(Error::NodeNotFound(_))
        ));
    }

    #[test]
    fn test_insert_rejections() {
        let mut list = SortedTroves::new(1);
        let mut ratios = Ratios::default();
        insert(&mut list, &mut ratios, 1, 100);

        assert!(list.is_full());
        assert_eq!(list.insert(&ratios, addr(2), 50, None, None), Err(Error::SortedListFull));

        let mut list = SortedTroves::new(5);
        assert_eq!(list.insert(&ratios, addr(2), 0, None, None), Err(Error::ZeroNominalIcr));
        list.insert(&ratios, addr(1), 100, None, None).unwrap();
        assert!(matches!(
            list.insert(&ratios, addr(1), 100, None, None),
            Err(Error::NodeAlreadyExists(_))
        ));
    }

    #[test]
    fn test_equal_ratios_keep_insertion_stable() {
        let mut list = SortedTroves::new(10);
        let mut ratios = Ratios::default();
        insert(&mut list, &mut ratios, 1, 100);
        insert(&mut list, &mut ratios, 2, 100);
        insert(&mut list, &mut ratios, 3, 100);
        assert_eq!(list.size(), 3);
        assert_sorted(&list, &ratios);
    }

    proptest! {
        #[test]
        fn prop_random_operations_preserve_order(
            ops in prop::collection::vec((1u64..40, 1u128..1_000, any::<bool>(), 0u64..40, 0u64..40), 1..120)
        ) {
            let mut list = SortedTroves::new(usize::MAX);
            let mut ratios = Ratios::default();

            for (id, nicr, remove, prev_hint, next_hint) in ops {
                let id = addr(id);
                let hint = |n: u64| if n == 0 { None } else { Some(addr(n)) };
                if list.contains(&id) {
                    if remove {
                        list.remove(&id).unwrap();
                        ratios.0.remove(&id);
                    } else {
                        ratios.0.insert(id, nicr);
                        list.re_insert(&ratios, id, nicr, hint(prev_hint), hint(next_hint)).unwrap();
                    }
                } else {
                    ratios.0.insert(id, nicr);
                    list.insert(&ratios, id, nicr, hint(prev_hint), hint(next_hint)).unwrap();
                }

                let values: Vec<u128> = list.iter().map(|a| ratios.nominal_icr(&a)).collect();
                prop_assert!(values.windows(2).all(|w| w[0] >= w[1]));
                prop_assert_eq!(values.len(), list.size());
            }
        }
    }
}
