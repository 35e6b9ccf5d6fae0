use serde::{Serialize, Deserialize};

use crate::{
    circular_id::Id,
    error::{ChordError, Result},
    pointer::Pointer,
    ChordAddress,
};

/// One routing slot. `expected_id` is `base + 2^i`, `pointer` is the best
/// known node at or after it, or base when nothing is known.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct FingerEntry<A: ChordAddress>{
    expected_id: Id,
    pointer: Pointer<A>,
}

impl<A: ChordAddress> FingerEntry<A> {
    pub fn expected_id(&self) -> &Id {
        &self.expected_id
    }

    pub fn pointer(&self) -> &Pointer<A> {
        &self.pointer
    }
}

/// Outcome of routing an id through a finger table.
#[derive(Clone, Debug, PartialEq)]
pub enum RouteResult<A: ChordAddress>{
    /// The id lies between base and the successor, which owns it.
    Found(Pointer<A>),
    /// The furthest finger strictly before the id. Ask it next.
    ClosestPredecessor(Pointer<A>),
    /// No finger precedes the id, base is responsible.
    Base(Pointer<A>),
}

impl<A: ChordAddress> RouteResult<A> {
    pub fn pointer(&self) -> &Pointer<A> {
        match self {
            RouteResult::Found(p) => p,
            RouteResult::ClosestPredecessor(p) => p,
            RouteResult::Base(p) => p,
        }
    }
}

/// The Chord routing table of a single node.
///
/// Read left to right, the table never moves backwards around the ring,
/// and once an entry points at base every later entry does too.
#[derive(Clone, Debug)]
pub struct FingerTable<A: ChordAddress>{
    base: Pointer<A>,
    entries: Vec<FingerEntry<A>>,
}

impl<A: ChordAddress> FingerTable<A> {
    /// A table with every entry pointing at `base`.
    pub fn new(base: Pointer<A>) -> Self {
        let bit_count = base.id().bit_count();
        let entries = (0..bit_count)
            .map(|i| FingerEntry{
                expected_id: base.id().add_power_of_two(i),
                pointer: base.clone(),
            })
            .collect();
        FingerTable{ base, entries }
    }

    /// Builds a table for `base` by putting each pointer in order. Pointers
    /// equal to base are skipped.
    pub fn rebuild<I>(base: Pointer<A>, pointers: I) -> Result<Self>
    where
        I: IntoIterator<Item = Pointer<A>>,
    {
        let mut table = FingerTable::new(base);
        for pointer in pointers {
            table.base.id().ensure_same_ring(pointer.id())?;
            if table.is_base(&pointer) {
                continue;
            }
            table.put(&pointer)?;
        }
        Ok(table)
    }

    pub fn base(&self) -> &Pointer<A> {
        &self.base
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[FingerEntry<A>] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Result<&Pointer<A>> {
        match self.entries.get(index) {
            Some(entry) => Ok(&entry.pointer),
            None => Err(ChordError::IndexOutOfRange{index, len: self.entries.len()}),
        }
    }

    pub fn expected_id(&self, index: usize) -> Result<&Id> {
        match self.entries.get(index) {
            Some(entry) => Ok(&entry.expected_id),
            None => Err(ChordError::IndexOutOfRange{index, len: self.entries.len()}),
        }
    }

    /// Every entry's pointer, index order.
    pub fn pointers(&self) -> Vec<Pointer<A>> {
        self.entries.iter().map(|e| e.pointer.clone()).collect()
    }

    /// Each distinct non-base pointer once, in table order.
    pub fn distinct_non_base(&self) -> Vec<Pointer<A>> {
        let mut out: Vec<Pointer<A>> = Vec::new();
        for entry in self.entries.iter() {
            if self.is_base(&entry.pointer) {
                continue;
            }
            if !out.iter().any(|p| p.id() == entry.pointer.id()) {
                out.push(entry.pointer.clone());
            }
        }
        out
    }

    pub fn is_base(&self, pointer: &Pointer<A>) -> bool {
        pointer.id() == self.base.id()
    }

    fn position(&self, id: &Id) -> num_bigint::BigUint {
        id.position(self.base.id())
    }

    /// Inserts `pointer` at the last slot whose expected id it reaches,
    /// then copies it backwards over entries that are base or further
    /// along than it.
    pub fn put(&mut self, pointer: &Pointer<A>) -> Result<()>{
        self.base.id().ensure_same_ring(pointer.id())?;
        if self.is_base(pointer) {
            return Err(ChordError::SelfPointerConflict);
        }

        let pos = self.position(pointer.id());
        let mut found = None;
        for (i, entry) in self.entries.iter().enumerate() {
            let expected = self.position(&entry.expected_id);
            if expected < pos {
                found = Some(i);
            } else if expected == pos {
                found = Some(i);
                break;
            } else {
                break;
            }
        }
        let index = match found {
            Some(index) => index,
            None => return Ok(()),
        };

        self.entries[index].pointer = pointer.clone();
        for i in (0..index).rev() {
            let current = &self.entries[i].pointer;
            if self.is_base(current) || self.position(current.id()) > pos {
                self.entries[i].pointer = pointer.clone();
            } else {
                break;
            }
        }
        Ok(())
    }

    /// Removes the rightmost entry matching `pointer` exactly, filling it
    /// and any earlier copies with whatever follows it.
    pub fn remove(&mut self, pointer: &Pointer<A>){
        if self.is_base(pointer) {
            return;
        }
        let index = match self.entries.iter().rposition(|e| e.pointer.is_exactly(pointer)) {
            Some(index) => index,
            None => return,
        };

        let next = match self.entries.get(index + 1) {
            Some(entry) => entry.pointer.clone(),
            None => self.base.clone(),
        };
        self.entries[index].pointer = next.clone();
        for i in (0..index).rev() {
            if self.entries[i].pointer.id() == pointer.id() {
                self.entries[i].pointer = next.clone();
            } else {
                break;
            }
        }
    }

    /// Drops every leading finger that sits before `id`. The cleared slots
    /// take the first surviving entry. Returns how many were cleared.
    pub fn clear_before(&mut self, id: &Id) -> Result<usize>{
        self.base.id().ensure_same_ring(id)?;
        if id == self.base.id() {
            return Err(ChordError::InvalidArgument(
                "cannot clear fingers before the base id".to_string()
            ));
        }

        let pos = self.position(id);
        let mut count = 0;
        for entry in self.entries.iter() {
            if self.is_base(&entry.pointer) || self.position(entry.pointer.id()) >= pos {
                break;
            }
            count += 1;
        }

        let replacement = match self.entries.get(count) {
            Some(entry) => entry.pointer.clone(),
            None => self.base.clone(),
        };
        for entry in self.entries[..count].iter_mut() {
            entry.pointer = replacement.clone();
        }
        Ok(count)
    }

    /// Points every finger beyond `id` back at base. Returns how many
    /// non-base fingers were cleared.
    pub fn clear_after(&mut self, id: &Id) -> Result<usize>{
        self.base.id().ensure_same_ring(id)?;

        let pos = self.position(id);
        let start = self.entries.iter().position(|e| {
            !self.is_base(&e.pointer) && self.position(e.pointer.id()) > pos
        });
        let start = match start {
            Some(start) => start,
            None => return Ok(0),
        };

        let mut count = 0;
        for i in start..self.entries.len() {
            if !self.is_base(&self.entries[i].pointer) {
                count += 1;
            }
            self.entries[i].pointer = self.base.clone();
        }
        Ok(count)
    }

    /// Chord's find-successor step against this table.
    ///
    /// # Panics
    /// If `id` is from a different ring.
    pub fn route(&self, id: &Id) -> RouteResult<A>{
        let successor = &self.entries[0].pointer;
        if self.is_base(successor) {
            return RouteResult::Base(self.base.clone());
        }
        if id.is_within(self.base.id(), false, successor.id(), true) {
            return RouteResult::Found(successor.clone());
        }

        for entry in self.entries.iter().rev() {
            if entry.pointer.id().is_within(self.base.id(), false, id, false) {
                return RouteResult::ClosestPredecessor(entry.pointer.clone());
            }
        }
        RouteResult::Base(self.base.clone())
    }

    pub fn maximum_non_base(&self) -> Option<&Pointer<A>>{
        self.entries.iter().rev()
            .map(|e| &e.pointer)
            .find(|p| !self.is_base(p))
    }

    pub fn minimum_non_base(&self) -> Option<&Pointer<A>>{
        self.entries.iter()
            .map(|e| &e.pointer)
            .find(|p| !self.is_base(p))
    }
}
