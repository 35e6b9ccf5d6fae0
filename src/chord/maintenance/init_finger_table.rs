use std::cmp::Reverse;

use tracing::{debug, info};

use crate::ChordAddress;

use super::{
	expect_response, ChordState, Event, Machine, MaintenanceError, Outbound, Outcome,
	Request, RequestFailure, Response,
};

#[derive(Debug)]
enum Stage{
	Init,
	AwaitTable,
	Done,
}

/// Seeds an empty node from the routing view of a node already in the ring.
/// Finishes with the number of pointers learned.
#[derive(Debug)]
pub struct InitFingerTable<A: ChordAddress>{
	bootstrap: A,
	stage: Stage,
}

impl<A: ChordAddress> InitFingerTable<A> {
	pub fn new(bootstrap: A) -> Self {
		InitFingerTable{ bootstrap, stage: Stage::Init }
	}

	pub fn bootstrap(&self) -> &A {
		&self.bootstrap
	}

	fn fail(cause: RequestFailure) -> Outcome<usize, A> {
		Outcome::Failed(MaintenanceError::InitFingerTableFailed{ cause })
	}
}

impl<A: ChordAddress> Machine<A> for InitFingerTable<A> {
	type Output = usize;

	fn process(&mut self, state: &mut ChordState<A>, event: Event<A>) -> Outcome<usize, A> {
		match std::mem::replace(&mut self.stage, Stage::Done) {
			Stage::Init => {
				debug!("joining through {:?}", self.bootstrap);
				self.stage = Stage::AwaitTable;
				Outcome::Ongoing(Outbound{ to: self.bootstrap.clone(), request: Request::GetFingerTable })
			},
			Stage::AwaitTable => {
				let snapshot = match expect_response(event) {
					Ok(Response::FingerTable(snapshot)) => snapshot,
					Ok(_) => return Self::fail(RequestFailure::UnexpectedResponse),
					Err(cause) => return Self::fail(cause),
				};
				let base = state.base().id().clone();
				if snapshot.base.id() == &base {
					return Self::fail(RequestFailure::Rejected(format!("id {} is already taken", base)));
				}

				let mut known: Vec<_> = snapshot.known_pointers().into_iter()
					.filter(|p| p.id() != &base)
					.collect();
				// furthest first, so every put lands on its own finger
				known.sort_by_key(|p| Reverse(p.id().position(&base)));

				for pointer in known.iter() {
					if let Err(e) = state.put_finger(pointer) {
						return Outcome::Failed(e.into());
					}
				}
				info!("learned {} pointers from {}", known.len(), snapshot.base.id());
				Outcome::Finished(known.len())
			},
			Stage::Done => Self::fail(RequestFailure::UnexpectedResponse),
		}
	}
}


#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		chord::maintenance::testing::{converged, ptr, Ring},
		circular_id::Id,
		pointer::Pointer,
	};

	fn ids(pointers: &[Pointer<String>]) -> Vec<u64> {
		pointers.iter().map(|p| p.id().to_bytes()[0] as u64).collect()
	}

	#[test]
	fn test_join_learns_ring() {
		let mut ring = Ring::new(converged(4, &[1, 5, 9, 13]));
		ring.states.push(ChordState::new(ptr(4, 7)));
		let seven = ring.index_of("node-7").unwrap();

		let learned = ring.run(seven, &mut InitFingerTable::new("node-1".to_string())).unwrap();
		assert_eq!(learned, 4);

		let state = &ring.states[seven];
		assert_eq!(ids(&state.finger_table().pointers()), vec![9, 9, 13, 1]);
		assert_eq!(ids(&state.successor_table().to_vec()), vec![9, 13, 1, 5]);
		assert_eq!(state.predecessor(), Some(&ptr(4, 5)));
		assert_eq!(ring.requests, 1);
	}

	#[test]
	fn test_unreachable_bootstrap() {
		let mut ring = Ring::new(converged(4, &[1, 5]));
		ring.states.push(ChordState::new(ptr(4, 7)));
		ring.down.push("node-1".to_string());
		let seven = ring.index_of("node-7").unwrap();

		assert_eq!(
			ring.run(seven, &mut InitFingerTable::new("node-1".to_string())),
			Err(MaintenanceError::InitFingerTableFailed{ cause: RequestFailure::Timeout })
		);
		assert!(ring.states[seven].finger_table().distinct_non_base().is_empty());
	}

	#[test]
	fn test_taken_id_is_refused() {
		let mut ring = Ring::new(converged(4, &[1, 5]));
		ring.states.push(ChordState::new(Pointer::new(Id::from_u64(4, 1).unwrap(), "late".to_string())));
		let late = ring.index_of("late").unwrap();

		assert!(matches!(
			ring.run(late, &mut InitFingerTable::new("node-1".to_string())),
			Err(MaintenanceError::InitFingerTableFailed{ cause: RequestFailure::Rejected(_) })
		));
	}
}
