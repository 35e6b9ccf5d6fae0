//! Resumable maintenance protocols.
//!
//! Every machine does no I/O. The driver calls [Machine::process] with
//! [Event::Start], sends whatever [Outbound] request comes back, and feeds
//! the answer (or the failure) in as the next event. A machine waits on at
//! most one request at a time and mutates the [ChordState] it is given only
//! between events.

use crate::{
	circular_id::Id,
	error::ChordError,
	pointer::Pointer,
	ChordAddress,
};

use super::{
	message::{Request, RequestFailure, Response},
	state::ChordState,
};

mod check_predecessor;
mod find_successor;
mod fix_finger;
mod init_finger_table;
mod notify;
mod stabilize;

pub use check_predecessor::{CheckPredecessor, CheckPredecessorResult};
pub use find_successor::FindSuccessor;
pub use fix_finger::{FixFinger, FixFingerResult, FixFingerTable};
pub use init_finger_table::InitFingerTable;
pub use notify::Notify;
pub use stabilize::{Stabilize, StabilizeResult};



#[derive(Debug, Clone)]
pub enum Event<A: ChordAddress>{
	Start,
	Response(Response<A>),
	Failure(RequestFailure),
}

#[derive(Debug, Clone)]
pub struct Outbound<A: ChordAddress>{
	pub to: A,
	pub request: Request<A>,
}

#[derive(Debug)]
pub enum Outcome<T, A: ChordAddress>{
	/// Waiting on the answer to this request.
	Ongoing(Outbound<A>),
	Finished(T),
	Failed(MaintenanceError),
}

pub trait Machine<A: ChordAddress> {
	type Output;

	fn process(&mut self, state: &mut ChordState<A>, event: Event<A>) -> Outcome<Self::Output, A>;
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MaintenanceError{
	#[error("stabilize against {id} failed: {cause}")]
	StabilizeFailed{id: Id, cause: RequestFailure},

	#[error("fixing finger {index} ({id}) failed: {cause}")]
	FixFingerFailed{index: usize, id: Id, cause: RequestFailure},

	#[error("notify to {id} failed: {cause}")]
	NotifyFailed{id: Id, cause: RequestFailure},

	#[error("finger table initialization failed: {cause}")]
	InitFingerTableFailed{cause: RequestFailure},

	#[error("lookup of {target} failed at {id}: {cause}")]
	LookupFailed{target: Id, id: Id, cause: RequestFailure},

	#[error("node has stopped")]
	NodeStopped,

	#[error(transparent)]
	State(#[from] ChordError),
}

impl MaintenanceError {
	/// The remote failure behind this error, if there was one.
	pub fn cause(&self) -> Option<&RequestFailure> {
		match self {
			MaintenanceError::StabilizeFailed{cause, ..} => Some(cause),
			MaintenanceError::FixFingerFailed{cause, ..} => Some(cause),
			MaintenanceError::NotifyFailed{cause, ..} => Some(cause),
			MaintenanceError::InitFingerTableFailed{cause} => Some(cause),
			MaintenanceError::LookupFailed{cause, ..} => Some(cause),
			MaintenanceError::NodeStopped | MaintenanceError::State(_) => None,
		}
	}
}

/// Unwraps the answer to a request. Error responses count as rejections.
fn expect_response<A: ChordAddress>(event: Event<A>) -> Result<Response<A>, RequestFailure> {
	match event {
		Event::Response(Response::Error{msg}) => Err(RequestFailure::Rejected(msg)),
		Event::Response(response) => Ok(response),
		Event::Failure(failure) => Err(failure),
		Event::Start => Err(RequestFailure::UnexpectedResponse),
	}
}

fn request<T, A: ChordAddress>(to: &Pointer<A>, request: Request<A>) -> Outcome<T, A> {
	Outcome::Ongoing(Outbound{ to: to.address().clone(), request })
}
