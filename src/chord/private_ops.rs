use tokio::{task::JoinHandle, time::sleep};
use tracing::{debug, error, info, instrument, warn};

use crate::{adaptor::ChordAdaptor, error::ChordError, Chord, ChordAddress};

use super::{
	maintenance::{
		CheckPredecessor, Event, FindSuccessor, FixFingerTable, InitFingerTable, Machine,
		MaintenanceError, Outbound, Outcome, Stabilize, StabilizeResult,
	},
	message::{Packet, PrivateMessage, Request, RequestFailure},
};



/// Which machine is waiting on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Slot{
	Join,
	Stabilize,
	FixFingers,
	CheckPredecessor,
	Lookup(u64),
}

#[derive(Debug)]
pub(crate) struct PendingRequest<A: ChordAddress>{
	pub(crate) slot: Slot,
	pub(crate) to: A,
	request: Request<A>,
	retries_left: u32,
	timer: JoinHandle<()>,
}

impl<A: ChordAddress> PendingRequest<A> {
	pub(crate) fn cancel_timer(&self){
		self.timer.abort();
	}
}



impl<A: ChordAddress, ADAPTOR: ChordAdaptor<A>> Chord<A, ADAPTOR>{

	#[instrument(skip_all, fields(node = %self.state.base().id()))]
	pub(crate) fn process_private(&mut self, operation: PrivateMessage<A>){
		match operation{
			PrivateMessage::Stabilize => {
				if self.is_maintaining() && self.stabilize.is_none() {
					self.stabilize = Some(Stabilize::new());
					self.drive(Slot::Stabilize, Event::Start);
				}
			},
			PrivateMessage::FixFingers => {
				if self.is_maintaining() && self.fix_fingers.is_none() {
					self.fix_fingers = Some(FixFingerTable::new());
					self.drive(Slot::FixFingers, Event::Start);
				}
			},
			PrivateMessage::CheckPredecessor => {
				if self.is_maintaining() && self.check_predecessor.is_none() {
					self.check_predecessor = Some(CheckPredecessor::new());
					self.drive(Slot::CheckPredecessor, Event::Start);
				}
			},
			PrivateMessage::Timeout{request_id} => {
				self.timeout(request_id);
			},
			PrivateMessage::Snapshot{reply} => {
				let _ = reply.send(self.snapshot());
			},
			PrivateMessage::Lookup{target, reply} => {
				if let Err(e) = self.state.base().id().ensure_same_ring(&target) {
					let _ = reply.send(Err(e.into()));
					return;
				}
				if self.dead {
					let _ = reply.send(Err(ChordError::EmptyTable.into()));
					return;
				}
				let lookup_id = self.next_lookup_id;
				self.next_lookup_id += 1;
				let hop_limit = 2 * self.state.bit_count();
				self.lookups.insert(lookup_id, (FindSuccessor::new(target, hop_limit), reply));
				self.drive(Slot::Lookup(lookup_id), Event::Start);
			},
		}
	}

	/// Joined (or given up joining) and still has a successor.
	fn is_maintaining(&self) -> bool {
		self.joining.is_none() && !self.dead
	}



	// Request tracking

	fn send_request(&mut self, slot: Slot, outbound: Outbound<A>){
		let request_id = self.next_request_id;
		self.next_request_id += 1;
		let timer = self.transmit(request_id, &outbound.to, outbound.request.clone());
		self.pending.insert(request_id, PendingRequest{
			slot,
			to: outbound.to,
			request: outbound.request,
			retries_left: self.config.request_retries,
			timer,
		});
	}

	/// Sends one attempt and arms its timeout.
	fn transmit(&self, request_id: u64, to: &A, request: Request<A>) -> JoinHandle<()> {
		let packet = Packet::request(self.self_addr.clone(), request_id, request);
		// a packet that cannot be sent is treated like one lost on the way
		if let Err(e) = self.adaptor.send(to, packet) {
			debug!("request {} to {:?} not sent: {}", request_id, to, e);
		}
		let channel = self.channel_tx.clone();
		let timeout = self.config.request_timeout();
		tokio::spawn(async move{
			sleep(timeout).await;
			let _ = channel.send(PrivateMessage::Timeout{ request_id }).await;
		})
	}

	fn timeout(&mut self, request_id: u64){
		let mut pending = match self.pending.remove(&request_id) {
			Some(pending) => pending,
			None => return, // already answered
		};
		if pending.retries_left > 0 {
			pending.retries_left -= 1;
			debug!("request {} to {:?} timed out, retrying", request_id, pending.to);
			pending.timer = self.transmit(request_id, &pending.to, pending.request.clone());
			self.pending.insert(request_id, pending);
			return;
		}
		debug!("request {} to {:?} timed out, giving up", request_id, pending.to);
		self.drive(pending.slot, Event::Failure(RequestFailure::Timeout));
	}



	// Driving machines

	/// Feeds `event` to the machine in `slot` and acts on the outcome.
	pub(crate) fn drive(&mut self, slot: Slot, event: Event<A>){
		match slot {
			Slot::Join => {
				let mut machine = match self.joining.take() {
					Some(machine) => machine,
					None => return,
				};
				match self.step(slot, &mut machine, event) {
					None => self.joining = Some(machine),
					Some(Ok(learned)) => self.join_succeeded(machine.bootstrap(), learned),
					Some(Err(e)) => self.join_failed(machine.bootstrap(), e),
				}
			},
			Slot::Stabilize => {
				let mut machine = match self.stabilize.take() {
					Some(machine) => machine,
					None => return,
				};
				match self.step(slot, &mut machine, event) {
					None => self.stabilize = Some(machine),
					Some(result) => self.stabilize_finished(result),
				}
			},
			Slot::FixFingers => {
				let mut machine = match self.fix_fingers.take() {
					Some(machine) => machine,
					None => return,
				};
				match self.step(slot, &mut machine, event) {
					None => self.fix_fingers = Some(machine),
					Some(Ok(updated)) => debug!("fix fingers done, {} updated", updated),
					Some(Err(e)) => debug!("fix fingers stopped: {}", e),
				}
			},
			Slot::CheckPredecessor => {
				let mut machine = match self.check_predecessor.take() {
					Some(machine) => machine,
					None => return,
				};
				match self.step(slot, &mut machine, event) {
					None => self.check_predecessor = Some(machine),
					Some(Ok(result)) => debug!("check predecessor: {:?}", result),
					Some(Err(e)) => warn!("check predecessor failed: {}", e),
				}
			},
			Slot::Lookup(lookup_id) => {
				let (mut machine, reply) = match self.lookups.remove(&lookup_id) {
					Some(lookup) => lookup,
					None => return,
				};
				match self.step(slot, &mut machine, event) {
					None => {
						self.lookups.insert(lookup_id, (machine, reply));
					},
					Some(result) => {
						if let Err(e) = &result {
							debug!("lookup of {} failed: {}", machine.target(), e);
						}
						let _ = reply.send(result);
					},
				}
			},
		}
	}

	fn step<M: Machine<A>>(&mut self, slot: Slot, machine: &mut M, event: Event<A>) -> Option<Result<M::Output, MaintenanceError>> {
		match machine.process(&mut self.state, event) {
			Outcome::Ongoing(outbound) => {
				self.send_request(slot, outbound);
				None
			},
			Outcome::Finished(output) => Some(Ok(output)),
			Outcome::Failed(e) => Some(Err(e)),
		}
	}



	// Joining

	/// Tries every address on the join list in turn.
	pub(crate) fn begin_join(&mut self){
		self.join_queue = self.join_list.iter().cloned().collect();
		if self.join_queue.is_empty() {
			info!("Node {} starting a new ring", self.state.base().id());
			self.state.announce_active();
			return;
		}
		self.try_next_join();
	}

	fn try_next_join(&mut self){
		match self.join_queue.pop_front() {
			Some(addr) => {
				self.joining = Some(InitFingerTable::new(addr));
				self.drive(Slot::Join, Event::Start);
			},
			None => {
				warn!("Node {} could not reach any join address, running alone", self.state.base().id());
				self.state.announce_active();
			},
		}
	}

	fn join_succeeded(&mut self, bootstrap: &A, learned: usize){
		info!("Node {} joined through {:?}, {} pointers learned", self.state.base().id(), bootstrap, learned);
		self.join_queue.clear();
		self.state.announce_active();
		// stabilize right away rather than on the next tick
		self.stabilize = Some(Stabilize::new());
		self.drive(Slot::Stabilize, Event::Start);
	}

	fn join_failed(&mut self, bootstrap: &A, e: MaintenanceError){
		warn!("joining through {:?} failed: {}", bootstrap, e);
		self.state.reset();
		self.try_next_join();
	}



	// Applying results

	fn stabilize_finished(&mut self, result: Result<Option<StabilizeResult<A>>, MaintenanceError>){
		match result {
			Ok(None) => {},
			Ok(Some(result)) => {
				debug!("stabilized on {} (acknowledged: {})", result.successor.id(), result.acknowledged);
				if let Err(e) = self.state.set_successor(result.successor, result.successors) {
					warn!("could not install successor: {}", e);
				}
			},
			Err(MaintenanceError::StabilizeFailed{id, cause}) => {
				let current = self.state.successor().map_or(false, |s| s.id() == &id);
				if !current {
					debug!("stabilize against former successor {} failed: {}", id, cause);
					return;
				}
				warn!("successor {} failed ({}), moving to the next one", id, cause);
				match self.state.shift_successor() {
					Ok(()) => {},
					Err(ChordError::EmptyTable) => self.lost_ring(),
					Err(e) => warn!("could not shift successor: {}", e),
				}
			},
			Err(e) => warn!("stabilize failed: {}", e),
		}
	}

	/// Every successor is gone. Rejoin if there is anywhere to rejoin,
	/// otherwise stop maintaining.
	fn lost_ring(&mut self){
		error!("Node {} has no successor left", self.state.base().id());
		self.stabilize = None;
		self.fix_fingers = None;
		self.check_predecessor = None;
		self.pending.retain(|_, pending| {
			if let Slot::Lookup(_) = pending.slot {
				return true;
			}
			pending.cancel_timer();
			false
		});

		if self.join_list.is_empty() {
			self.dead = true;
			return;
		}
		info!("Node {} rejoining", self.state.base().id());
		self.state.reset();
		self.begin_join();
	}
}
