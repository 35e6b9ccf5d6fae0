use tracing::{debug, instrument, trace, warn};

use crate::{adaptor::ChordAdaptor, finger_table::RouteResult, pointer::Pointer, Chord, ChordAddress};

use super::{
	maintenance::Event,
	message::{FingerTableSnapshot, Packet, PacketBody, Request, RequestFailure, Response},
	state::ChordState,
};



/// Serves one peer request from this node's routing state.
pub(crate) fn answer<A: ChordAddress>(state: &mut ChordState<A>, request: Request<A>) -> Response<A> {
	match request{
		Request::GetId => Response::Id{ id: state.base().id().clone() },
		Request::GetSuccessor => {
			let successor = state.successor().unwrap_or(state.base()).clone();
			Response::Successor{ successor }
		},
		Request::GetPredecessor => Response::Predecessor{ predecessor: state.predecessor().cloned() },
		Request::GetClosestPrecedingFinger{id} => {
			let pointer = match state.route(&id) {
				RouteResult::ClosestPredecessor(pointer) => pointer,
				RouteResult::Found(_) | RouteResult::Base(_) => state.base().clone(),
			};
			Response::ClosestPrecedingFinger{ pointer }
		},
		Request::GetFingerTable => Response::FingerTable(FingerTableSnapshot::from(&*state)),
		Request::Notify{candidate} => {
			notify(state, candidate);
			Response::NotifyAck{ predecessor: state.predecessor().cloned() }
		},
		Request::Ping => Response::Pong,
	}
}

// "I believe I am your predecessor."
fn notify<A: ChordAddress>(state: &mut ChordState<A>, candidate: Pointer<A>){
	let base = state.base().id().clone();
	let closer = match state.predecessor() {
		Some(current) => candidate.id().is_within(current.id(), false, &base, false),
		None => candidate.id() != &base,
	};
	if !closer {
		return;
	}
	let id = candidate.id().clone();
	if let Err(e) = state.set_predecessor(candidate) {
		debug!("notify from {} refused: {}", id, e);
	}
}



impl<A: ChordAddress, ADAPTOR: ChordAdaptor<A>> Chord<A, ADAPTOR>{

	#[instrument(skip_all, fields(node = %self.state.base().id()))]
	pub(crate) fn process_public(&mut self, packet: Packet<A>){
		match packet.body{
			PacketBody::Request(ref request) => {
				if let Err(e) = request.validate(self.state.bit_count()) {
					warn!("dropping request {} from {:?}: {}", packet.request_id, packet.from, e);
					return;
				}
				trace!("request {} from {:?}: {:?}", packet.request_id, packet.from, request);
				let response = answer(&mut self.state, request.clone());
				let reply = packet.reply_with(self.self_addr.clone(), response);
				if let Err(e) = self.adaptor.send(&packet.from, reply) {
					debug!("reply {} to {:?} not sent: {}", packet.request_id, packet.from, e);
				}
			},
			PacketBody::Response(response) => {
				self.accept_response(packet.from, packet.request_id, response);
			},
		}
	}

	fn accept_response(&mut self, from: A, request_id: u64, response: Response<A>){
		let pending = match self.pending.remove(&request_id) {
			Some(pending) => pending,
			None => {
				debug!("dropping response {} from {:?}, nothing is waiting for it", request_id, from);
				return;
			},
		};
		if pending.to != from {
			debug!("dropping response {} from {:?}, it was sent to {:?}", request_id, from, pending.to);
			self.pending.insert(request_id, pending);
			return;
		}
		pending.cancel_timer();

		let event = match response.validate(self.state.bit_count()) {
			Ok(()) => Event::Response(response),
			Err(e) => {
				warn!("invalid response {} from {:?}: {}", request_id, from, e);
				Event::Failure(RequestFailure::Rejected(e.to_string()))
			},
		};
		self.drive(pending.slot, event);
	}
}
