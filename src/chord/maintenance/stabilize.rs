use std::mem;

use tracing::debug;

use crate::{circular_id::Id, pointer::Pointer, ChordAddress};

use super::{
	expect_response, request, ChordState, Event, Machine, MaintenanceError, Notify, Outcome,
	Request, RequestFailure, Response,
};

/// What a stabilize round learned. The driver installs it with
/// [ChordState::set_successor].
#[derive(Debug, Clone, PartialEq)]
pub struct StabilizeResult<A: ChordAddress>{
	pub successor: Pointer<A>,
	pub successors: Vec<Pointer<A>>,
	/// The successor accepted this node as its predecessor.
	pub acknowledged: bool,
}

#[derive(Debug)]
enum Stage<A: ChordAddress>{
	Init,
	QueryPredecessorOfSuccessor{successor: Pointer<A>},
	Notifying{
		old: Pointer<A>,
		candidate: Pointer<A>,
		successors: Vec<Pointer<A>>,
		fallback: Vec<Pointer<A>>,
		notify: Notify<A>,
	},
	Done,
}

/// Asks the successor for its view of the ring, adopts its predecessor if
/// that one sits between us, and notifies whoever ends up as successor.
///
/// Finishes with `None` when there is no successor to stabilize against.
#[derive(Debug)]
pub struct Stabilize<A: ChordAddress>{
	stage: Stage<A>,
}

impl<A: ChordAddress> Default for Stabilize<A> {
	fn default() -> Self {
		Self::new()
	}
}

impl<A: ChordAddress> Stabilize<A> {
	pub fn new() -> Self {
		Stabilize{ stage: Stage::Init }
	}
}

/// Keeps entries that run strictly clockwise after `after`, stopping at
/// base, capped at `limit` entries.
fn successor_list<A: ChordAddress>(base: &Id, after: &Id, list: &[Pointer<A>], limit: usize) -> Vec<Pointer<A>> {
	let mut out: Vec<Pointer<A>> = Vec::new();
	let mut last = after.position(base);
	for pointer in list {
		if pointer.id() == base {
			break;
		}
		let pos = pointer.id().position(base);
		if pos <= last {
			continue;
		}
		last = pos;
		out.push(pointer.clone());
		if out.len() >= limit {
			break;
		}
	}
	out
}

impl<A: ChordAddress> Machine<A> for Stabilize<A> {
	type Output = Option<StabilizeResult<A>>;

	fn process(&mut self, state: &mut ChordState<A>, event: Event<A>) -> Outcome<Self::Output, A> {
		match mem::replace(&mut self.stage, Stage::Done) {
			Stage::Init => {
				let successor = match state.successor() {
					Some(successor) if successor.id() != state.base().id() => successor.clone(),
					_ => return Outcome::Finished(None),
				};
				debug!("stabilizing against {}", successor.id());
				let outcome = request(&successor, Request::GetFingerTable);
				self.stage = Stage::QueryPredecessorOfSuccessor{ successor };
				outcome
			},

			Stage::QueryPredecessorOfSuccessor{successor} => {
				let fail = |cause| Outcome::Failed(MaintenanceError::StabilizeFailed{ id: successor.id().clone(), cause });
				let snapshot = match expect_response(event) {
					Ok(Response::FingerTable(snapshot)) => snapshot,
					Ok(_) => return fail(RequestFailure::UnexpectedResponse),
					Err(cause) => return fail(cause),
				};
				if snapshot.base.id() != successor.id() {
					return fail(RequestFailure::UnexpectedResponse);
				}

				let base = state.base().id().clone();
				let candidate = match snapshot.predecessor {
					Some(p) if p.id().is_within(&base, false, successor.id(), false) => p,
					_ => successor.clone(),
				};

				let limit = state.successor_table().capacity().saturating_sub(1);
				let fallback = successor_list(&base, successor.id(), &snapshot.successors, limit);
				let successors = if candidate.id() == successor.id() {
					fallback.clone()
				} else {
					debug!("successor {} has closer predecessor {}", successor.id(), candidate.id());
					let mut list = vec![successor.clone()];
					list.extend(snapshot.successors.iter().cloned());
					successor_list(&base, candidate.id(), &list, limit)
				};

				let mut notify = Notify::new(candidate.clone());
				let outcome = notify.process(state, Event::Start);
				match outcome {
					Outcome::Ongoing(outbound) => {
						self.stage = Stage::Notifying{ old: successor, candidate, successors, fallback, notify };
						Outcome::Ongoing(outbound)
					},
					Outcome::Finished(_) | Outcome::Failed(_) => fail(RequestFailure::UnexpectedResponse),
				}
			},

			Stage::Notifying{old, candidate, successors, fallback, mut notify} => {
				match notify.process(state, event) {
					Outcome::Ongoing(outbound) => {
						self.stage = Stage::Notifying{ old, candidate, successors, fallback, notify };
						Outcome::Ongoing(outbound)
					},
					Outcome::Finished(acknowledged) => {
						Outcome::Finished(Some(StabilizeResult{ successor: candidate, successors, acknowledged }))
					},
					Outcome::Failed(e) => {
						let cause = e.cause().cloned().unwrap_or(RequestFailure::UnexpectedResponse);
						if candidate.id() == old.id() {
							return Outcome::Failed(MaintenanceError::StabilizeFailed{ id: old.id().clone(), cause });
						}
						// the new candidate is unreachable, stay with the old successor
						debug!("candidate {} unreachable ({}), keeping {}", candidate.id(), cause, old.id());
						Outcome::Finished(Some(StabilizeResult{ successor: old, successors: fallback, acknowledged: false }))
					},
				}
			},

			Stage::Done => Outcome::Failed(MaintenanceError::StabilizeFailed{
				id: state.base().id().clone(),
				cause: RequestFailure::UnexpectedResponse,
			}),
		}
	}
}
