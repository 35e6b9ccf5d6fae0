use tracing::info;

use crate::{pointer::Pointer, ChordAddress};

use super::{request, ChordState, Event, Machine, MaintenanceError, Outcome, Request};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckPredecessorResult{
	NoPredecessor,
	Alive,
	/// The predecessor did not answer and was removed.
	Cleared,
	/// The predecessor did not answer, but had already been replaced.
	Changed,
}

#[derive(Debug)]
enum Stage<A: ChordAddress>{
	Init,
	AwaitPong{predecessor: Pointer<A>},
	Done,
}

/// Pings the predecessor and forgets it if it stays silent.
#[derive(Debug)]
pub struct CheckPredecessor<A: ChordAddress>{
	stage: Stage<A>,
}

impl<A: ChordAddress> Default for CheckPredecessor<A> {
	fn default() -> Self {
		Self::new()
	}
}

impl<A: ChordAddress> CheckPredecessor<A> {
	pub fn new() -> Self {
		CheckPredecessor{ stage: Stage::Init }
	}
}

impl<A: ChordAddress> Machine<A> for CheckPredecessor<A> {
	type Output = CheckPredecessorResult;

	fn process(&mut self, state: &mut ChordState<A>, event: Event<A>) -> Outcome<Self::Output, A> {
		match std::mem::replace(&mut self.stage, Stage::Done) {
			Stage::Init => {
				let predecessor = match state.predecessor() {
					Some(predecessor) => predecessor.clone(),
					None => return Outcome::Finished(CheckPredecessorResult::NoPredecessor),
				};
				let outcome = request(&predecessor, Request::Ping);
				self.stage = Stage::AwaitPong{ predecessor };
				outcome
			},
			Stage::AwaitPong{predecessor} => {
				match event {
					// any answer at all means it is alive
					Event::Response(_) => Outcome::Finished(CheckPredecessorResult::Alive),
					Event::Failure(cause) => {
						let unchanged = state.predecessor().map_or(false, |p| p.is_exactly(&predecessor));
						if !unchanged {
							return Outcome::Finished(CheckPredecessorResult::Changed);
						}
						info!("predecessor {} is unresponsive ({}), removing", predecessor.id(), cause);
						if let Err(e) = state.remove_predecessor() {
							return Outcome::Failed(e.into());
						}
						match state.remove_finger(&predecessor) {
							Ok(()) => Outcome::Finished(CheckPredecessorResult::Cleared),
							Err(e) => Outcome::Failed(e.into()),
						}
					},
					Event::Start => Outcome::Failed(MaintenanceError::State(
						crate::ChordError::InvalidArgument("check predecessor restarted".to_string())
					)),
				}
			},
			Stage::Done => Outcome::Failed(MaintenanceError::State(
				crate::ChordError::InvalidArgument("check predecessor already finished".to_string())
			)),
		}
	}
}


#[cfg(test)]
mod tests {
	use super::*;
	use crate::chord::maintenance::testing::{converged, ptr, Ring};

	#[test]
	fn test_no_predecessor() {
		let mut ring = Ring::new(vec![ChordState::new(ptr(4, 3))]);
		assert_eq!(ring.run(0, &mut CheckPredecessor::new()), Ok(CheckPredecessorResult::NoPredecessor));
	}

	#[test]
	fn test_alive_predecessor() {
		let mut ring = Ring::new(converged(4, &[1, 5, 9, 13]));
		assert_eq!(ring.run(1, &mut CheckPredecessor::new()), Ok(CheckPredecessorResult::Alive));
		assert_eq!(ring.states[1].predecessor(), Some(&ptr(4, 1)));
	}

	#[test]
	fn test_dead_predecessor_is_cleared() {
		let mut ring = Ring::new(converged(4, &[1, 5, 9, 13]));
		ring.down.push("node-1".to_string());
		let five = ring.index_of("node-5").unwrap();
		assert_eq!(ring.run(five, &mut CheckPredecessor::new()), Ok(CheckPredecessorResult::Cleared));

		let state = &ring.states[five];
		assert!(state.predecessor().map_or(true, |p| p.id() != ptr(4, 1).id()));
		assert!(state.finger_table().pointers().iter().all(|p| p.id() != ptr(4, 1).id()));
		assert!(state.successor_table().iter().all(|p| p.id() != ptr(4, 1).id()));
	}

	#[test]
	fn test_replaced_predecessor_is_kept() {
		let mut state = ChordState::new(ptr(4, 5));
		state.set_predecessor(ptr(4, 1)).unwrap();

		let mut machine = CheckPredecessor::new();
		assert!(matches!(machine.process(&mut state, Event::Start), Outcome::Ongoing(_)));
		state.set_predecessor(ptr(4, 3)).unwrap();
		assert!(matches!(
			machine.process(&mut state, Event::Failure(crate::chord::message::RequestFailure::Timeout)),
			Outcome::Finished(CheckPredecessorResult::Changed)
		));
		assert_eq!(state.predecessor(), Some(&ptr(4, 3)));
	}
}
