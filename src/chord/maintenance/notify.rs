use crate::{pointer::Pointer, ChordAddress};

use super::{
	expect_response, request, ChordState, Event, Machine, MaintenanceError, Outcome,
	Request, RequestFailure, Response,
};

#[derive(Debug)]
enum Stage{
	Init,
	AwaitAck,
	Done,
}

/// Tells `destination` that this node believes it is its predecessor.
/// Finishes with whether the destination now records this node as its
/// predecessor.
#[derive(Debug)]
pub struct Notify<A: ChordAddress>{
	destination: Pointer<A>,
	stage: Stage,
}

impl<A: ChordAddress> Notify<A> {
	pub fn new(destination: Pointer<A>) -> Self {
		Notify{ destination, stage: Stage::Init }
	}

	pub fn destination(&self) -> &Pointer<A> {
		&self.destination
	}

	fn fail(&mut self, cause: RequestFailure) -> Outcome<bool, A> {
		self.stage = Stage::Done;
		Outcome::Failed(MaintenanceError::NotifyFailed{ id: self.destination.id().clone(), cause })
	}
}

impl<A: ChordAddress> Machine<A> for Notify<A> {
	type Output = bool;

	fn process(&mut self, state: &mut ChordState<A>, event: Event<A>) -> Outcome<bool, A> {
		match self.stage {
			Stage::Init => {
				self.stage = Stage::AwaitAck;
				request(&self.destination, Request::Notify{ candidate: state.base().clone() })
			},
			Stage::AwaitAck => {
				match expect_response(event) {
					Ok(Response::NotifyAck{predecessor}) => {
						self.stage = Stage::Done;
						let acknowledged = predecessor
							.map_or(false, |p| p.id() == state.base().id());
						Outcome::Finished(acknowledged)
					},
					Ok(_) => self.fail(RequestFailure::UnexpectedResponse),
					Err(cause) => self.fail(cause),
				}
			},
			Stage::Done => self.fail(RequestFailure::UnexpectedResponse),
		}
	}
}
