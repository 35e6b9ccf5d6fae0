use serde::{Serialize, Deserialize};
use tokio::sync::oneshot;

use crate::{
	circular_id::Id,
	error::ChordError,
	finger_table::FingerTable,
	pointer::Pointer,
	ChordAddress,
};

use super::{maintenance::MaintenanceError, state::ChordState, NodeSnapshot};



#[derive(Debug)]
pub(crate) enum Message<A: ChordAddress>{
	Private(PrivateMessage<A>),
	Public(Packet<A>),
}

#[derive(Debug)]
pub(crate) enum PrivateMessage<A: ChordAddress>{
	// Timed Operation Triggers
	Stabilize,
	FixFingers,
	CheckPredecessor,

	// Request tracking
	Timeout{request_id: u64},

	// Handle queries
	Snapshot{reply: oneshot::Sender<NodeSnapshot<A>>},
	Lookup{target: Id, reply: oneshot::Sender<Result<Pointer<A>, MaintenanceError>>},
}

impl<A: ChordAddress> From<PrivateMessage<A>> for Message<A> {
	fn from(msg: PrivateMessage<A>) -> Self {
		Message::Private(msg)
	}
}

impl<A: ChordAddress> From<Packet<A>> for Message<A> {
	fn from(packet: Packet<A>) -> Self {
		Message::Public(packet)
	}
}



/// The logical RPCs one node sends another.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub enum Request<A: ChordAddress>{
	GetId,
	GetSuccessor,
	GetPredecessor,
	GetClosestPrecedingFinger{id: Id},
	GetFingerTable,
	/// "I believe I am your predecessor."
	Notify{candidate: Pointer<A>},
	Ping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub enum Response<A: ChordAddress>{
	Id{id: Id},
	Successor{successor: Pointer<A>},
	Predecessor{predecessor: Option<Pointer<A>>},
	ClosestPrecedingFinger{pointer: Pointer<A>},
	FingerTable(FingerTableSnapshot<A>),
	NotifyAck{predecessor: Option<Pointer<A>>},
	Pong,
	Error{msg: String},
}

/// A node's full routing view, as sent over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct FingerTableSnapshot<A: ChordAddress>{
	pub base: Pointer<A>,
	pub predecessor: Option<Pointer<A>>,
	pub fingers: Vec<Pointer<A>>,
	pub successors: Vec<Pointer<A>>,
}

impl<A: ChordAddress> FingerTableSnapshot<A> {
	/// Rebuilds the sender's finger table so it can be routed on locally.
	pub fn to_finger_table(&self) -> Result<FingerTable<A>, ChordError> {
		FingerTable::rebuild(self.base.clone(), self.fingers.iter().cloned())
	}

	/// Every pointer mentioned, base first, without repeats.
	pub fn known_pointers(&self) -> Vec<Pointer<A>> {
		let mut out: Vec<Pointer<A>> = vec![self.base.clone()];
		let all = self.predecessor.iter()
			.chain(self.fingers.iter())
			.chain(self.successors.iter());
		for pointer in all {
			if !out.iter().any(|p| p.id() == pointer.id()) {
				out.push(pointer.clone());
			}
		}
		out
	}
}

impl<A: ChordAddress> From<&ChordState<A>> for FingerTableSnapshot<A> {
	fn from(state: &ChordState<A>) -> Self {
		FingerTableSnapshot{
			base: state.base().clone(),
			predecessor: state.predecessor().cloned(),
			fingers: state.finger_table().pointers(),
			successors: state.successor_table().to_vec(),
		}
	}
}



#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Packet<A: ChordAddress>{
	pub from: A,
	pub request_id: u64,
	pub body: PacketBody<A>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub enum PacketBody<A: ChordAddress>{
	Request(Request<A>),
	Response(Response<A>),
}

impl<A: ChordAddress> Packet<A> {
	pub fn request(from: A, request_id: u64, request: Request<A>) -> Self {
		Packet{ from, request_id, body: PacketBody::Request(request) }
	}

	pub fn reply_with(&self, from: A, response: Response<A>) -> Self {
		Packet{ from, request_id: self.request_id, body: PacketBody::Response(response) }
	}
}



/// Why a remote call produced no usable answer.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestFailure{
	#[error("request timed out")]
	Timeout,
	#[error("destination unreachable")]
	Unreachable,
	#[error("request rejected: {0}")]
	Rejected(String),
	#[error("unexpected response")]
	UnexpectedResponse,
	#[error("gave up after {0} hops")]
	HopLimit(usize),
}



fn check_id(id: &Id, bit_count: usize) -> Result<(), ChordError> {
	if id.bit_count() != bit_count {
		return Err(ChordError::BitCountMismatch{expected: bit_count, found: id.bit_count()});
	}
	Ok(())
}

fn check_pointers<'a, A: ChordAddress + 'a, I>(pointers: I, bit_count: usize) -> Result<(), ChordError>
where
	I: IntoIterator<Item = &'a Pointer<A>>,
{
	for pointer in pointers {
		check_id(pointer.id(), bit_count)?;
	}
	Ok(())
}

impl<A: ChordAddress> Request<A> {
	/// Rejects identifiers from a ring of another width.
	pub fn validate(&self, bit_count: usize) -> Result<(), ChordError> {
		match self {
			Request::GetClosestPrecedingFinger{id} => check_id(id, bit_count),
			Request::Notify{candidate} => check_id(candidate.id(), bit_count),
			_ => Ok(()),
		}
	}
}

impl<A: ChordAddress> Response<A> {
	pub fn validate(&self, bit_count: usize) -> Result<(), ChordError> {
		match self {
			Response::Id{id} => check_id(id, bit_count),
			Response::Successor{successor} => check_id(successor.id(), bit_count),
			Response::Predecessor{predecessor} => check_pointers(predecessor, bit_count),
			Response::ClosestPrecedingFinger{pointer} => check_id(pointer.id(), bit_count),
			Response::NotifyAck{predecessor} => check_pointers(predecessor, bit_count),
			Response::FingerTable(snapshot) => {
				check_id(snapshot.base.id(), bit_count)?;
				check_pointers(&snapshot.predecessor, bit_count)?;
				check_pointers(&snapshot.fingers, bit_count)?;
				check_pointers(&snapshot.successors, bit_count)?;
				if snapshot.fingers.len() != bit_count {
					return Err(ChordError::InvalidArgument(format!(
						"finger table has {} entries, expected {}", snapshot.fingers.len(), bit_count
					)));
				}
				Ok(())
			},
			Response::Pong | Response::Error{..} => Ok(()),
		}
	}
}
