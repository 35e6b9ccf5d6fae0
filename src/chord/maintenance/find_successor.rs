use crate::{
	circular_id::Id,
	finger_table::RouteResult,
	pointer::Pointer,
	ChordAddress,
};

use super::{
	expect_response, request, ChordState, Event, Machine, MaintenanceError, Outcome,
	Request, RequestFailure, Response,
};

#[derive(Debug)]
enum Stage<A: ChordAddress>{
	Init{first_hop: Option<Pointer<A>>},
	AwaitHop{hop: Pointer<A>},
	Done,
}

/// Walks the ring towards the node responsible for `target`, asking each
/// hop for its finger table and routing on it locally.
#[derive(Debug)]
pub struct FindSuccessor<A: ChordAddress>{
	target: Id,
	hop_limit: usize,
	hops: usize,
	failed_hop: Option<Pointer<A>>,
	stage: Stage<A>,
}

impl<A: ChordAddress> FindSuccessor<A> {
	pub fn new(target: Id, hop_limit: usize) -> Self {
		FindSuccessor{ target, hop_limit, hops: 0, failed_hop: None, stage: Stage::Init{ first_hop: None } }
	}

	/// Same walk, but the first question goes to `hop` instead of the
	/// local closest preceding finger.
	pub fn starting_at(target: Id, hop_limit: usize, hop: Pointer<A>) -> Self {
		FindSuccessor{ target, hop_limit, hops: 0, failed_hop: None, stage: Stage::Init{ first_hop: Some(hop) } }
	}

	pub fn target(&self) -> &Id {
		&self.target
	}

	pub fn hops(&self) -> usize {
		self.hops
	}

	/// The hop that stopped answering, once the walk has failed.
	pub fn failed_hop(&self) -> Option<&Pointer<A>> {
		self.failed_hop.as_ref()
	}

	fn fail(&self, at: &Pointer<A>, cause: RequestFailure) -> Outcome<Pointer<A>, A> {
		Outcome::Failed(MaintenanceError::LookupFailed{
			target: self.target.clone(),
			id: at.id().clone(),
			cause,
		})
	}

	fn ask(&mut self, hop: Pointer<A>) -> Outcome<Pointer<A>, A> {
		self.hops += 1;
		if self.hops > self.hop_limit {
			self.stage = Stage::Done;
			return self.fail(&hop, RequestFailure::HopLimit(self.hop_limit));
		}
		let outcome = request(&hop, Request::GetFingerTable);
		self.stage = Stage::AwaitHop{ hop };
		outcome
	}

	fn follow(&mut self, route: RouteResult<A>) -> Outcome<Pointer<A>, A> {
		match route {
			RouteResult::Found(pointer) | RouteResult::Base(pointer) => {
				self.stage = Stage::Done;
				Outcome::Finished(pointer)
			},
			RouteResult::ClosestPredecessor(pointer) => self.ask(pointer),
		}
	}
}

impl<A: ChordAddress> Machine<A> for FindSuccessor<A> {
	type Output = Pointer<A>;

	fn process(&mut self, state: &mut ChordState<A>, event: Event<A>) -> Outcome<Pointer<A>, A> {
		match std::mem::replace(&mut self.stage, Stage::Done) {
			Stage::Init{first_hop: Some(hop)} if hop.id() != state.base().id() => self.ask(hop),
			Stage::Init{..} => {
				let route = state.route(&self.target);
				self.follow(route)
			},
			Stage::AwaitHop{hop} => {
				let snapshot = match expect_response(event) {
					Ok(Response::FingerTable(snapshot)) => snapshot,
					Ok(_) => return self.fail(&hop, RequestFailure::UnexpectedResponse),
					Err(cause) => {
						let outcome = self.fail(&hop, cause);
						self.failed_hop = Some(hop);
						return outcome;
					},
				};
				if snapshot.base.id() != hop.id() {
					return self.fail(&hop, RequestFailure::UnexpectedResponse);
				}
				let table = match snapshot.to_finger_table() {
					Ok(table) => table,
					Err(e) => return self.fail(&hop, RequestFailure::Rejected(e.to_string())),
				};

				match table.route(&self.target) {
					// the walk came back around, carry on from here
					RouteResult::ClosestPredecessor(next) if next.id() == state.base().id() => {
						self.hops += 1;
						let route = state.route(&self.target);
						self.follow(route)
					},
					route => self.follow(route),
				}
			},
			Stage::Done => Outcome::Failed(MaintenanceError::LookupFailed{
				target: self.target.clone(),
				id: state.base().id().clone(),
				cause: RequestFailure::UnexpectedResponse,
			}),
		}
	}
}
