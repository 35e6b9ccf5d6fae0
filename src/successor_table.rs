use std::collections::VecDeque;

use crate::{
    error::{ChordError, Result},
    pointer::Pointer,
    ChordAddress,
};

/// Ordered fallback list of successors. The head is the current successor.
///
/// Entries run clockwise from base and the table holds at most `bit_count`
/// of them. Base only appears when it is the sole entry, meaning no other
/// node is known.
#[derive(Clone, Debug)]
pub struct SuccessorTable<A: ChordAddress>{
    base: Pointer<A>,
    capacity: usize,
    table: VecDeque<Pointer<A>>,
}

impl<A: ChordAddress> SuccessorTable<A> {
    pub fn new(base: Pointer<A>) -> Self {
        let capacity = base.id().bit_count();
        let mut table = VecDeque::with_capacity(capacity);
        table.push_back(base.clone());
        SuccessorTable{ base, capacity, table }
    }

    pub fn base(&self) -> &Pointer<A> {
        &self.base
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn head(&self) -> Option<&Pointer<A>> {
        self.table.front()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pointer<A>> {
        self.table.iter()
    }

    pub fn to_vec(&self) -> Vec<Pointer<A>> {
        self.table.iter().cloned().collect()
    }

    fn is_base(&self, pointer: &Pointer<A>) -> bool {
        pointer.id() == self.base.id()
    }

    /// Replaces the table with `successor` followed by `rest`.
    ///
    /// `rest` is cut to fit, and cut again at the first base entry. Every
    /// remaining entry must sit at or after `successor`.
    pub fn update(&mut self, successor: Pointer<A>, mut rest: Vec<Pointer<A>>) -> Result<()>{
        let base_id = self.base.id();
        base_id.ensure_same_ring(successor.id())?;
        for pointer in rest.iter() {
            base_id.ensure_same_ring(pointer.id())?;
        }

        if self.is_base(&successor) {
            rest.clear();
        }
        rest.truncate(self.capacity.saturating_sub(1));
        if let Some(index) = rest.iter().position(|p| self.is_base(p)) {
            rest.truncate(index);
        }

        let successor_pos = successor.id().position(base_id);
        for pointer in rest.iter() {
            if pointer.id().position(base_id) < successor_pos {
                return Err(ChordError::InvalidArgument(format!(
                    "successor list entry {} precedes successor {}",
                    pointer.id(), successor.id()
                )));
            }
        }

        self.table.clear();
        self.table.push_back(successor);
        self.table.extend(rest);
        Ok(())
    }

    /// Puts `successor` at the head, dropping the old leading entries it
    /// supersedes. Overflow is cut from the tail.
    pub fn update_trim(&mut self, successor: Pointer<A>) -> Result<()>{
        let base_id = self.base.id();
        base_id.ensure_same_ring(successor.id())?;
        if self.is_base(&successor) {
            return Err(ChordError::SelfPointerConflict);
        }

        let pos = successor.id().position(base_id);
        while let Some(front) = self.table.front() {
            if front.id().position(base_id) <= pos {
                self.table.pop_front();
            } else {
                break;
            }
        }
        self.table.push_front(successor);
        self.table.truncate(self.capacity);
        Ok(())
    }

    /// Drops the head. Fails with [ChordError::EmptyTable] when nothing is
    /// left to fall back to.
    pub fn move_to_next_successor(&mut self) -> Result<()>{
        self.table.pop_front();
        if self.table.is_empty() {
            return Err(ChordError::EmptyTable);
        }
        Ok(())
    }

    /// Forgets every entry matching `pointer` exactly. Returns whether
    /// anything was removed.
    pub fn remove(&mut self, pointer: &Pointer<A>) -> bool {
        let before = self.table.len();
        self.table.retain(|p| !p.is_exactly(pointer));
        before != self.table.len()
    }

    /// Back to the single base entry.
    pub fn reset(&mut self){
        self.table.clear();
        self.table.push_back(self.base.clone());
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::circular_id::Id;

    fn ptr(v: u64) -> Pointer<String> {
        Pointer::new(Id::from_u64(3, v).unwrap(), format!("node-{}", v))
    }

    fn ids(table: &SuccessorTable<String>) -> Vec<u64> {
        table.iter()
            .map(|p| p.id().to_bytes()[0] as u64)
            .collect()
    }

    #[test]
    fn test_new_holds_base() {
        let table = SuccessorTable::new(ptr(0));
        assert_eq!(ids(&table), vec![0]);
        assert_eq!(table.head(), Some(&ptr(0)));
        assert_eq!(table.capacity(), 3);
    }

    #[test]
    fn test_update() {
        let mut table = SuccessorTable::new(ptr(0));
        table.update(ptr(2), vec![ptr(4), ptr(6)]).unwrap();
        assert_eq!(ids(&table), vec![2, 4, 6]);

        // cut to capacity
        table.update(ptr(1), vec![ptr(2), ptr(3), ptr(4), ptr(5)]).unwrap();
        assert_eq!(ids(&table), vec![1, 2, 3]);

        // cut at base
        table.update(ptr(5), vec![ptr(0), ptr(6)]).unwrap();
        assert_eq!(ids(&table), vec![5]);
    }

    #[test]
    fn test_update_rejects_out_of_order() {
        let mut table = SuccessorTable::new(ptr(0));
        assert!(matches!(
            table.update(ptr(4), vec![ptr(2)]),
            Err(ChordError::InvalidArgument(_))
        ));
        assert_eq!(ids(&table), vec![0]);

        let wrong_ring = Pointer::new(Id::from_u64(4, 3).unwrap(), "x".to_string());
        assert_eq!(
            table.update(wrong_ring, vec![]),
            Err(ChordError::BitCountMismatch{expected: 3, found: 4})
        );
    }

    #[test]
    fn test_update_trim() {
        let mut table = SuccessorTable::new(ptr(0));
        table.update(ptr(2), vec![ptr(4), ptr(6)]).unwrap();

        table.update_trim(ptr(5)).unwrap();
        assert_eq!(ids(&table), vec![5, 6]);

        table.update_trim(ptr(1)).unwrap();
        assert_eq!(ids(&table), vec![1, 5, 6]);

        table.update_trim(ptr(0)).unwrap_err();
        assert_eq!(ids(&table), vec![1, 5, 6]);
    }

    #[test]
    fn test_update_trim_replaces_base_and_caps() {
        let mut table = SuccessorTable::new(ptr(0));
        table.update_trim(ptr(3)).unwrap();
        assert_eq!(ids(&table), vec![3]);

        table.update(ptr(2), vec![ptr(4), ptr(6)]).unwrap();
        table.update_trim(ptr(1)).unwrap();
        assert_eq!(ids(&table), vec![1, 2, 4]);
        assert!(table.len() <= table.capacity());
    }

    #[test]
    fn test_move_to_next_successor() {
        let mut table = SuccessorTable::new(ptr(0));
        table.update(ptr(1), vec![ptr(7)]).unwrap();
        table.move_to_next_successor().unwrap();
        assert_eq!(ids(&table), vec![7]);
        assert_eq!(table.move_to_next_successor(), Err(ChordError::EmptyTable));
        assert!(table.is_empty());
        assert_eq!(table.move_to_next_successor(), Err(ChordError::EmptyTable));

        table.reset();
        assert_eq!(ids(&table), vec![0]);
    }

    #[test]
    fn test_remove() {
        let mut table = SuccessorTable::new(ptr(0));
        table.update(ptr(2), vec![ptr(4), ptr(6)]).unwrap();
        assert!(table.remove(&ptr(4)));
        assert!(!table.remove(&ptr(5)));
        assert_eq!(ids(&table), vec![2, 6]);
    }
}
