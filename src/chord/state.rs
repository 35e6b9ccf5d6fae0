use std::fmt;

use tracing::debug;

use crate::{
	circular_id::Id,
	error::{ChordError, Result},
	finger_table::{FingerTable, RouteResult},
	pointer::Pointer,
	successor_table::SuccessorTable,
	ChordAddress,
};



/// Changes to a node's set of links, for tooling that draws or measures the
/// ring.
#[derive(Debug, Clone, PartialEq)]
pub enum ChordEvent<A: ChordAddress>{
	NodeActive{base: Pointer<A>},
	LinkEstablished{pointer: Pointer<A>},
	LinkRemoved{pointer: Pointer<A>},
}

pub type Listener<A> = Box<dyn FnMut(ChordEvent<A>) + Send>;



/// Routing state of one node: fingers, successors and predecessor, kept
/// consistent with one another.
///
/// After every mutator returns, `finger[0]` is the successor table's head.
/// The predecessor is never closer to base than the furthest finger.
pub struct ChordState<A: ChordAddress>{
	base: Pointer<A>,
	finger_table: FingerTable<A>,
	successor_table: SuccessorTable<A>,
	predecessor: Option<Pointer<A>>,
	listener: Option<Listener<A>>,
}

impl<A: ChordAddress> fmt::Debug for ChordState<A> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ChordState")
			.field("base", &self.base)
			.field("finger_table", &self.finger_table)
			.field("successor_table", &self.successor_table)
			.field("predecessor", &self.predecessor)
			.field("listener", &self.listener.is_some())
			.finish()
	}
}

impl<A: ChordAddress> ChordState<A> {
	pub fn new(base: Pointer<A>) -> Self {
		ChordState{
			finger_table: FingerTable::new(base.clone()),
			successor_table: SuccessorTable::new(base.clone()),
			base,
			predecessor: None,
			listener: None,
		}
	}

	pub fn set_listener(&mut self, listener: Listener<A>){
		self.listener = Some(listener);
	}

	pub fn announce_active(&mut self){
		let base = self.base.clone();
		self.emit(ChordEvent::NodeActive{base});
	}

	pub fn base(&self) -> &Pointer<A> {
		&self.base
	}

	pub fn bit_count(&self) -> usize {
		self.base.id().bit_count()
	}

	pub fn finger_table(&self) -> &FingerTable<A> {
		&self.finger_table
	}

	pub fn successor_table(&self) -> &SuccessorTable<A> {
		&self.successor_table
	}

	pub fn predecessor(&self) -> Option<&Pointer<A>> {
		self.predecessor.as_ref()
	}

	pub fn successor(&self) -> Option<&Pointer<A>> {
		self.successor_table.head()
	}

	/// No successor left to fall back to. The node has lost the ring.
	pub fn is_dead(&self) -> bool {
		self.successor_table.is_empty()
	}

	pub fn route(&self, id: &Id) -> RouteResult<A> {
		self.finger_table.route(id)
	}

	fn is_base(&self, pointer: &Pointer<A>) -> bool {
		pointer.id() == self.base.id()
	}

	/// Accepts `predecessor` if it lies strictly between the current
	/// predecessor and base, then reshapes the fingers around it.
	pub fn set_predecessor(&mut self, predecessor: Pointer<A>) -> Result<()>{
		self.base.id().ensure_same_ring(predecessor.id())?;
		if self.is_base(&predecessor) {
			return Err(ChordError::InvalidArgument(
				"a node cannot be its own predecessor".to_string()
			));
		}
		if let Some(current) = &self.predecessor {
			if !predecessor.id().is_within(current.id(), false, self.base.id(), false) {
				return Err(ChordError::InvalidArgument(format!(
					"predecessor {} is not between {} and {}",
					predecessor.id(), current.id(), self.base.id()
				)));
			}
		}

		self.observe(|state| {
			debug!("predecessor set to {}", predecessor.id());
			state.predecessor = Some(predecessor.clone());
			state.align_fingers_to_successor()?;
			state.finger_table.clear_after(predecessor.id())?;
			state.finger_table.put(&predecessor)?;
			state.sync_successor_from_fingers()
		})
	}

	/// Forgets the predecessor. Nothing is adopted in its place until the
	/// fingers next change.
	pub fn remove_predecessor(&mut self) -> Result<()>{
		self.observe(|state| {
			if let Some(old) = state.predecessor.take() {
				debug!("predecessor {} removed", old.id());
			}
			state.align_fingers_to_successor()?;
			state.sync_successor_from_fingers()
		})
	}

	pub fn set_successor(&mut self, successor: Pointer<A>, successors: Vec<Pointer<A>>) -> Result<()>{
		self.observe(|state| {
			state.successor_table.update(successor, successors)?;
			state.sync_from_successor()
		})
	}

	/// Falls back to the next successor. [ChordError::EmptyTable]
	/// means none is left and the node is dead.
	pub fn shift_successor(&mut self) -> Result<()>{
		self.observe(|state| {
			state.successor_table.move_to_next_successor()?;
			state.sync_from_successor()
		})
	}

	pub fn put_finger(&mut self, pointer: &Pointer<A>) -> Result<()>{
		self.observe(|state| -> Result<()> {
			state.finger_table.put(pointer)?;
			state.sync_successor_from_fingers()?;
			state.adjust_predecessor();
			Ok(())
		})
	}

	/// Drops every trace of `pointer`: fingers, successors and predecessor.
	pub fn remove_finger(&mut self, pointer: &Pointer<A>) -> Result<()>{
		if self.is_base(pointer) {
			return Ok(());
		}
		self.observe(|state| -> Result<()> {
			state.finger_table.remove(pointer);
			state.successor_table.remove(pointer);
			if state.predecessor.as_ref().map_or(false, |p| p.is_exactly(pointer)) {
				state.predecessor = None;
			}
			if let Some(head) = state.successor_table.head().cloned() {
				if !state.is_base(&head) {
					state.finger_table.put(&head)?;
				}
			}
			state.sync_successor_from_fingers()?;
			state.adjust_predecessor();
			Ok(())
		})
	}

	/// Back to the state of a freshly created node.
	pub fn reset(&mut self){
		self.observe(|state| {
			state.finger_table = FingerTable::new(state.base.clone());
			state.successor_table.reset();
			state.predecessor = None;
		})
	}

	fn align_fingers_to_successor(&mut self) -> Result<()>{
		if let Some(successor) = self.successor_table.head().cloned() {
			if !self.is_base(&successor) {
				self.finger_table.clear_before(successor.id())?;
				self.finger_table.put(&successor)?;
			}
		}
		Ok(())
	}

	/// The successor table changed, bring the fingers in line.
	fn sync_from_successor(&mut self) -> Result<()>{
		match self.successor_table.head().cloned() {
			Some(successor) if !self.is_base(&successor) => {
				self.finger_table.clear_before(successor.id())?;
				self.finger_table.put(&successor)?;
			},
			Some(_) => {
				let base_id = self.base.id().clone();
				self.finger_table.clear_after(&base_id)?;
			},
			None => {},
		}
		self.adjust_predecessor();
		Ok(())
	}

	/// The fingers changed, bring the successor table in line.
	fn sync_successor_from_fingers(&mut self) -> Result<()>{
		let first = self.finger_table.get(0)?.clone();
		if self.is_base(&first) {
			self.successor_table.reset();
			return Ok(());
		}
		let head_matches = self.successor_table.head()
			.map_or(false, |head| head.id() == first.id());
		if !head_matches {
			self.successor_table.update_trim(first)?;
		}
		Ok(())
	}

	fn adjust_predecessor(&mut self){
		let furthest = self.finger_table.maximum_non_base().cloned();
		let base_id = self.base.id();
		match (furthest, &self.predecessor) {
			(None, _) => self.predecessor = None,
			(Some(furthest), None) => self.predecessor = Some(furthest),
			(Some(furthest), Some(current)) => {
				if furthest.id().position(base_id) > current.id().position(base_id) {
					self.predecessor = Some(furthest);
				}
			},
		}
	}

	/// Distinct non-base fingers plus the predecessor.
	fn links(&self) -> Vec<Pointer<A>> {
		if self.listener.is_none() {
			return Vec::new();
		}
		let mut links = self.finger_table.distinct_non_base();
		if let Some(predecessor) = &self.predecessor {
			if !links.iter().any(|p| p.id() == predecessor.id()) {
				links.push(predecessor.clone());
			}
		}
		links
	}

	fn emit(&mut self, event: ChordEvent<A>){
		if let Some(listener) = self.listener.as_mut() {
			listener(event);
		}
	}

	/// Runs `op` and reports every link it added or removed.
	fn observe<T, F>(&mut self, op: F) -> T
	where
		F: FnOnce(&mut Self) -> T,
	{
		let before = self.links();
		let result = op(self);
		if self.listener.is_some() {
			let after = self.links();
			for pointer in before.iter() {
				if !after.iter().any(|p| p.is_exactly(pointer)) {
					self.emit(ChordEvent::LinkRemoved{pointer: pointer.clone()});
				}
			}
			for pointer in after.iter() {
				if !before.iter().any(|p| p.is_exactly(pointer)) {
					self.emit(ChordEvent::LinkEstablished{pointer: pointer.clone()});
				}
			}
		}
		result
	}
}


#[cfg(test)]
mod tests {
	use std::sync::{Arc, Mutex};

	use super::*;

	fn ptr(v: u64) -> Pointer<String> {
		Pointer::new(Id::from_u64(3, v).unwrap(), format!("node-{}", v))
	}

	fn fingers(state: &ChordState<String>) -> Vec<u64> {
		state.finger_table().pointers().iter()
			.map(|p| p.id().to_bytes()[0] as u64)
			.collect()
	}

	fn assert_synced(state: &ChordState<String>) {
		if state.is_dead() {
			return;
		}
		assert_eq!(state.finger_table().get(0).unwrap().id(), state.successor().unwrap().id());
	}

	#[test]
	fn test_put_finger_scenario() {
		let mut state = ChordState::new(ptr(0));
		state.put_finger(&ptr(1)).unwrap();
		assert_eq!(fingers(&state), vec![1, 0, 0]);
		assert_eq!(state.successor(), Some(&ptr(1)));
		assert_eq!(state.predecessor(), Some(&ptr(1)));

		state.put_finger(&ptr(2)).unwrap();
		state.put_finger(&ptr(4)).unwrap();
		assert_eq!(fingers(&state), vec![1, 2, 4]);
		assert_eq!(state.successor(), Some(&ptr(1)));
		assert_eq!(state.predecessor(), Some(&ptr(4)));
		assert_synced(&state);
	}

	#[test]
	fn test_shift_successor_scenario() {
		let mut state = ChordState::new(ptr(0));
		state.set_successor(ptr(1), vec![ptr(7)]).unwrap();
		assert_synced(&state);

		state.shift_successor().unwrap();
		assert_eq!(fingers(&state), vec![7, 7, 7]);
		assert_eq!(state.successor(), Some(&ptr(7)));
		assert_eq!(state.predecessor(), Some(&ptr(7)));

		assert_eq!(state.shift_successor(), Err(ChordError::EmptyTable));
		assert!(state.is_dead());
	}

	#[test]
	fn test_set_predecessor_bounds() {
		let mut state = ChordState::new(ptr(0));
		assert!(matches!(state.set_predecessor(ptr(0)), Err(ChordError::InvalidArgument(_))));

		state.set_predecessor(ptr(5)).unwrap();
		assert_eq!(state.predecessor(), Some(&ptr(5)));
		// alone until now, so the predecessor is also the successor
		assert_eq!(state.successor(), Some(&ptr(5)));
		assert_synced(&state);

		assert!(state.set_predecessor(ptr(3)).is_err());
		assert!(state.set_predecessor(ptr(5)).is_err());
		state.set_predecessor(ptr(6)).unwrap();
		assert_eq!(state.predecessor(), Some(&ptr(6)));
		assert_eq!(state.successor(), Some(&ptr(5)));
		assert_synced(&state);
	}

	#[test]
	fn test_set_predecessor_clears_fingers_past_it() {
		let mut state = ChordState::new(ptr(0));
		state.set_successor(ptr(1), vec![ptr(2)]).unwrap();
		state.put_finger(&ptr(6)).unwrap();
		assert_eq!(fingers(&state), vec![1, 6, 6]);
		assert_eq!(state.predecessor(), Some(&ptr(6)));

		state.remove_predecessor().unwrap();
		assert_eq!(state.predecessor(), None);
		assert_eq!(fingers(&state), vec![1, 6, 6]);

		state.set_predecessor(ptr(5)).unwrap();
		assert_eq!(fingers(&state), vec![1, 5, 5]);
		assert_eq!(state.predecessor(), Some(&ptr(5)));
		assert_eq!(state.successor(), Some(&ptr(1)));
	}

	#[test]
	fn test_remove_finger() {
		let mut state = ChordState::new(ptr(0));
		state.set_successor(ptr(1), vec![ptr(3), ptr(5)]).unwrap();
		state.put_finger(&ptr(5)).unwrap();
		assert_eq!(fingers(&state), vec![1, 5, 5]);

		state.remove_finger(&ptr(1)).unwrap();
		assert_eq!(state.successor(), Some(&ptr(3)));
		assert_eq!(fingers(&state), vec![3, 3, 5]);
		assert_synced(&state);

		state.remove_finger(&ptr(5)).unwrap();
		assert_eq!(fingers(&state), vec![3, 3, 0]);
		assert_eq!(state.predecessor(), Some(&ptr(3)));

		state.remove_finger(&ptr(3)).unwrap();
		assert_eq!(fingers(&state), vec![0, 0, 0]);
		assert_eq!(state.successor(), Some(&ptr(0)));
		assert_eq!(state.predecessor(), None);
		assert!(!state.is_dead());
	}

	#[test]
	fn test_listener_sees_link_changes() {
		let events = Arc::new(Mutex::new(Vec::new()));
		let sink = events.clone();

		let mut state = ChordState::new(ptr(0));
		state.set_listener(Box::new(move |e: ChordEvent<String>| sink.lock().unwrap().push(e)));
		state.announce_active();
		state.put_finger(&ptr(2)).unwrap();
		state.put_finger(&ptr(2)).unwrap();
		state.remove_finger(&ptr(2)).unwrap();

		let events = events.lock().unwrap();
		assert_eq!(*events, vec![
			ChordEvent::NodeActive{base: ptr(0)},
			ChordEvent::LinkEstablished{pointer: ptr(2)},
			ChordEvent::LinkRemoved{pointer: ptr(2)},
		]);
	}

	#[test]
	fn test_reset() {
		let mut state = ChordState::new(ptr(0));
		state.put_finger(&ptr(3)).unwrap();
		state.reset();
		assert_eq!(fingers(&state), vec![0, 0, 0]);
		assert_eq!(state.successor(), Some(&ptr(0)));
		assert_eq!(state.predecessor(), None);
	}
}
