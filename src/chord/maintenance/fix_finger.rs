use tracing::debug;

use crate::{circular_id::Id, pointer::Pointer, ChordAddress};

use super::{
	ChordState, Event, FindSuccessor, Machine, MaintenanceError, Outcome, RequestFailure,
};

#[derive(Debug, Clone, PartialEq)]
pub enum FixFingerResult<A: ChordAddress>{
	/// The finger already pointed at this node.
	Unchanged(Pointer<A>),
	Updated(Pointer<A>),
}

impl<A: ChordAddress> FixFingerResult<A> {
	pub fn pointer(&self) -> &Pointer<A> {
		match self {
			FixFingerResult::Unchanged(p) => p,
			FixFingerResult::Updated(p) => p,
		}
	}
}

/// Refreshes a single finger by looking up the owner of its expected id.
#[derive(Debug)]
pub struct FixFinger<A: ChordAddress>{
	index: usize,
	lookup: Option<FindSuccessor<A>>,
}

impl<A: ChordAddress> FixFinger<A> {
	pub fn new(index: usize) -> Self {
		FixFinger{ index, lookup: None }
	}

	pub fn index(&self) -> usize {
		self.index
	}

	fn start(&mut self, state: &mut ChordState<A>) -> Outcome<FixFingerResult<A>, A> {
		let expected = match state.finger_table().expected_id(self.index) {
			Ok(expected) => expected.clone(),
			Err(e) => return Outcome::Failed(e.into()),
		};
		let successor = match state.finger_table().get(0) {
			Ok(successor) => successor.clone(),
			Err(e) => return Outcome::Failed(e.into()),
		};
		if expected.is_within(state.base().id(), false, successor.id(), true) {
			return Outcome::Finished(FixFingerResult::Unchanged(successor));
		}

		// ask the current holder of the slot first
		let hop_limit = 2 * state.bit_count();
		let current = match state.finger_table().get(self.index) {
			Ok(current) => current.clone(),
			Err(e) => return Outcome::Failed(e.into()),
		};
		self.lookup = Some(if current.id() == state.base().id() {
			FindSuccessor::new(expected, hop_limit)
		} else {
			FindSuccessor::starting_at(expected, hop_limit, current)
		});
		self.resume(state, Event::Start)
	}

	fn resume(&mut self, state: &mut ChordState<A>, event: Event<A>) -> Outcome<FixFingerResult<A>, A> {
		let lookup = match self.lookup.as_mut() {
			Some(lookup) => lookup,
			None => return Outcome::Failed(MaintenanceError::FixFingerFailed{
				index: self.index,
				id: state.base().id().clone(),
				cause: RequestFailure::UnexpectedResponse,
			}),
		};
		match lookup.process(state, event) {
			Outcome::Ongoing(outbound) => Outcome::Ongoing(outbound),
			Outcome::Finished(owner) => {
				self.lookup = None;
				if owner.id() == state.base().id() {
					return Outcome::Finished(FixFingerResult::Unchanged(state.base().clone()));
				}
				match state.put_finger(&owner) {
					Ok(()) => Outcome::Finished(FixFingerResult::Updated(owner)),
					Err(e) => Outcome::Failed(e.into()),
				}
			},
			Outcome::Failed(e) => {
				let expected = lookup.target().clone();
				if let Some(bad) = lookup.failed_hop().cloned() {
					debug!("dropping unresponsive finger {}", bad.id());
					if let Err(e) = state.remove_finger(&bad) {
						return Outcome::Failed(e.into());
					}
				}
				self.lookup = None;
				match e {
					MaintenanceError::LookupFailed{cause, ..} => Outcome::Failed(MaintenanceError::FixFingerFailed{
						index: self.index,
						id: expected,
						cause,
					}),
					other => Outcome::Failed(other),
				}
			},
		}
	}
}

impl<A: ChordAddress> Machine<A> for FixFinger<A> {
	type Output = FixFingerResult<A>;

	fn process(&mut self, state: &mut ChordState<A>, event: Event<A>) -> Outcome<Self::Output, A> {
		match event {
			Event::Start => self.start(state),
			event => self.resume(state, event),
		}
	}
}



/// Fixes fingers `1..bit_count` one after another. Finger 0 belongs to
/// stabilize. Finishes with how many fingers changed.
#[derive(Debug)]
pub struct FixFingerTable<A: ChordAddress>{
	index: usize,
	previous: Option<(Id, Pointer<A>)>,
	current: Option<FixFinger<A>>,
	updated: usize,
}

impl<A: ChordAddress> Default for FixFingerTable<A> {
	fn default() -> Self {
		Self::new()
	}
}

impl<A: ChordAddress> FixFingerTable<A> {
	pub fn new() -> Self {
		FixFingerTable{ index: 1, previous: None, current: None, updated: 0 }
	}

	fn record(&mut self, state: &ChordState<A>, result: FixFingerResult<A>){
		if let Ok(expected) = state.finger_table().expected_id(self.index) {
			self.previous = Some((expected.clone(), result.pointer().clone()));
		}
		if let FixFingerResult::Updated(_) = result {
			self.updated += 1;
		}
		self.index += 1;
	}

	/// Starts fingers until one needs a remote answer or all are done.
	fn advance(&mut self, state: &mut ChordState<A>) -> Outcome<usize, A> {
		while self.index < state.bit_count() {
			let expected = match state.finger_table().expected_id(self.index) {
				Ok(expected) => expected.clone(),
				Err(e) => return Outcome::Failed(e.into()),
			};
			// same owner as the previous finger
			if let Some((previous, owner)) = &self.previous {
				if expected.is_within(previous, false, owner.id(), true) {
					self.index += 1;
					continue;
				}
			}

			let mut finger = FixFinger::new(self.index);
			match finger.process(state, Event::Start) {
				Outcome::Ongoing(outbound) => {
					self.current = Some(finger);
					return Outcome::Ongoing(outbound);
				},
				Outcome::Finished(result) => self.record(state, result),
				Outcome::Failed(e) => return Outcome::Failed(e),
			}
		}
		Outcome::Finished(self.updated)
	}
}

impl<A: ChordAddress> Machine<A> for FixFingerTable<A> {
	type Output = usize;

	fn process(&mut self, state: &mut ChordState<A>, event: Event<A>) -> Outcome<usize, A> {
		if let Event::Start = event {
			return self.advance(state);
		}
		let mut finger = match self.current.take() {
			Some(finger) => finger,
			None => return Outcome::Failed(MaintenanceError::FixFingerFailed{
				index: self.index,
				id: state.base().id().clone(),
				cause: RequestFailure::UnexpectedResponse,
			}),
		};
		match finger.process(state, event) {
			Outcome::Ongoing(outbound) => {
				self.current = Some(finger);
				Outcome::Ongoing(outbound)
			},
			Outcome::Finished(result) => {
				self.record(state, result);
				self.advance(state)
			},
			Outcome::Failed(e) => Outcome::Failed(e),
		}
	}
}


#[cfg(test)]
mod tests {
	use super::*;
	use crate::chord::maintenance::testing::{converged, ptr, Ring};

	fn finger_ids(state: &ChordState<String>) -> Vec<u64> {
		state.finger_table().pointers().iter()
			.map(|p| p.id().to_bytes()[0] as u64)
			.collect()
	}

	#[test]
	fn test_fix_finger_within_successor() {
		let mut ring = Ring::new(converged(5, &[2, 7, 11, 18, 23, 30]));
		let at = ring.index_of("node-2").unwrap();
		assert_eq!(ring.run(at, &mut FixFinger::new(1)), Ok(FixFingerResult::Unchanged(ptr(5, 7))));
		assert_eq!(ring.requests, 0);
	}

	#[test]
	fn test_fix_finger_learns_remote_node() {
		let nodes = [2u64, 7, 11, 18, 23, 30];
		let mut ring = Ring::new(converged(5, &nodes));
		// node 2 only knows its successor
		let mut fresh = ChordState::new(ptr(5, 2));
		fresh.set_successor(ptr(5, 7), vec![ptr(5, 11)]).unwrap();
		let at = ring.index_of("node-2").unwrap();
		ring.states[at] = fresh;

		assert_eq!(ring.run(at, &mut FixFinger::new(4)), Ok(FixFingerResult::Updated(ptr(5, 18))));
		assert_eq!(finger_ids(&ring.states[at]), vec![7, 7, 7, 18, 18]);
	}

	#[test]
	fn test_fix_finger_table_fills_every_finger() {
		let nodes = [2u64, 7, 11, 18, 23, 30];
		let expected = converged(5, &nodes);
		let mut ring = Ring::new(converged(5, &nodes));
		let at = ring.index_of("node-2").unwrap();
		let mut fresh = ChordState::new(ptr(5, 2));
		fresh.set_successor(ptr(5, 7), vec![]).unwrap();
		ring.states[at] = fresh;

		let updated = ring.run(at, &mut FixFingerTable::new()).unwrap();
		assert_eq!(updated, 2);
		assert_eq!(finger_ids(&ring.states[at]), finger_ids(&expected[at]));
	}

	#[test]
	fn test_fix_finger_asks_current_finger_first() {
		let nodes = [2u64, 7, 11, 18, 23, 30];
		let mut ring = Ring::new(converged(5, &nodes));
		let at = ring.index_of("node-2").unwrap();
		assert_eq!(finger_ids(&ring.states[at]), vec![7, 7, 7, 11, 18]);

		match FixFinger::new(4).process(&mut ring.states[at], Event::Start) {
			Outcome::Ongoing(outbound) => assert_eq!(outbound.to, "node-18"),
			other => panic!("unexpected {:?}", other),
		}
		assert_eq!(ring.run(at, &mut FixFinger::new(4)), Ok(FixFingerResult::Updated(ptr(5, 18))));
		assert_eq!(ring.requests, 1);
	}

	#[test]
	fn test_fix_finger_dead_current_finger_removed() {
		let nodes = [2u64, 7, 11, 18, 23, 30];
		let mut ring = Ring::new(converged(5, &nodes));
		ring.down.push("node-18".to_string());
		let at = ring.index_of("node-2").unwrap();

		assert!(matches!(
			ring.run(at, &mut FixFinger::new(4)),
			Err(MaintenanceError::FixFingerFailed{index: 4, cause: RequestFailure::Timeout, ..})
		));
		assert_eq!(finger_ids(&ring.states[at]), vec![7, 7, 7, 11, 2]);
	}

	#[test]
	fn test_fix_finger_drops_dead_hop() {
		let nodes = [2u64, 7, 11, 18, 23, 30];
		let mut ring = Ring::new(converged(5, &nodes));
		ring.down.push("node-11".to_string());
		let at = ring.index_of("node-2").unwrap();
		// finger 4 expects 18, which 2 reaches through 11
		let mut state = ChordState::new(ptr(5, 2));
		state.set_successor(ptr(5, 7), vec![]).unwrap();
		state.put_finger(&ptr(5, 11)).unwrap();
		ring.states[at] = state;

		let result = ring.run(at, &mut FixFinger::new(4));
		assert!(matches!(
			result,
			Err(MaintenanceError::FixFingerFailed{index: 4, cause: RequestFailure::Timeout, ..})
		));
		assert_eq!(finger_ids(&ring.states[at]), vec![7, 7, 7, 2, 2]);
	}
}
