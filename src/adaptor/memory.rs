use std::{
	collections::{HashMap, HashSet},
	hash::Hash,
	sync::{Arc, Mutex, MutexGuard},
};

use tokio::sync::mpsc::{error::TrySendError, Sender};
use tracing::trace;

use crate::{chord::message::{Packet, RequestFailure}, ChordAddress};

use super::ChordAdaptor;

#[derive(Debug)]
struct Switchboard<A: ChordAddress>{
	inboxes: HashMap<A, Sender<Packet<A>>>,
	disconnected: HashSet<A>,
}

/// An in-process network. Every [MemoryAdaptor] made from the same network
/// can reach every node listening on it.
#[derive(Debug, Clone)]
pub struct MemoryNetwork<A: ChordAddress>{
	switchboard: Arc<Mutex<Switchboard<A>>>,
}

impl<A: ChordAddress + Hash + Eq> MemoryNetwork<A> {
	pub fn new() -> Self {
		MemoryNetwork{
			switchboard: Arc::new(Mutex::new(Switchboard{
				inboxes: HashMap::new(),
				disconnected: HashSet::new(),
			})),
		}
	}

	fn lock(&self) -> MutexGuard<'_, Switchboard<A>> {
		self.switchboard.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	pub fn adaptor(&self) -> MemoryAdaptor<A> {
		MemoryAdaptor{ network: self.clone() }
	}

	/// Cuts `addr` off: nothing reaches it and nothing it sends arrives.
	pub fn disconnect(&self, addr: &A){
		self.lock().disconnected.insert(addr.clone());
	}

	pub fn reconnect(&self, addr: &A){
		self.lock().disconnected.remove(addr);
	}

	pub fn is_listening(&self, addr: &A) -> bool {
		self.lock().inboxes.contains_key(addr)
	}
}

impl<A: ChordAddress + Hash + Eq> Default for MemoryNetwork<A> {
	fn default() -> Self {
		Self::new()
	}
}

#[derive(Debug, Clone)]
pub struct MemoryAdaptor<A: ChordAddress>{
	network: MemoryNetwork<A>,
}

impl<A: ChordAddress + Hash + Eq> ChordAdaptor<A> for MemoryAdaptor<A> {

	fn listen(&self, addr: A, inbox: Sender<Packet<A>>){
		self.network.lock().inboxes.insert(addr, inbox);
	}

	fn unlisten(&self, addr: &A){
		self.network.lock().inboxes.remove(addr);
	}

	fn send(&self, to: &A, packet: Packet<A>) -> Result<(), RequestFailure> {
		let inbox = {
			let board = self.network.lock();
			if board.disconnected.contains(to) || board.disconnected.contains(&packet.from) {
				return Err(RequestFailure::Unreachable);
			}
			match board.inboxes.get(to) {
				Some(inbox) => inbox.clone(),
				None => return Err(RequestFailure::Unreachable),
			}
		};
		match inbox.try_send(packet) {
			Ok(()) => Ok(()),
			Err(TrySendError::Full(_)) => {
				trace!("inbox of {:?} is full, dropping packet", to);
				Err(RequestFailure::Unreachable)
			},
			Err(TrySendError::Closed(_)) => Err(RequestFailure::Unreachable),
		}
	}
}


#[cfg(test)]
mod tests {
	use tokio::sync::mpsc::channel;

	use super::*;
	use crate::chord::message::Request;

	#[tokio::test]
	async fn test_delivery_and_disconnect() {
		let network = MemoryNetwork::<String>::new();
		let a = network.adaptor();
		let b = network.adaptor();

		let (tx, mut rx) = channel(4);
		b.listen("b".to_string(), tx);
		assert!(network.is_listening(&"b".to_string()));

		a.send(&"b".to_string(), Packet::request("a".to_string(), 1, Request::Ping)).unwrap();
		let packet = rx.recv().await.unwrap();
		assert_eq!(packet.request_id, 1);
		assert_eq!(packet.from, "a");

		assert_eq!(
			a.send(&"c".to_string(), Packet::request("a".to_string(), 2, Request::Ping)),
			Err(RequestFailure::Unreachable)
		);

		network.disconnect(&"b".to_string());
		assert_eq!(
			a.send(&"b".to_string(), Packet::request("a".to_string(), 3, Request::Ping)),
			Err(RequestFailure::Unreachable)
		);
		network.reconnect(&"b".to_string());
		a.send(&"b".to_string(), Packet::request("a".to_string(), 4, Request::Ping)).unwrap();
		assert_eq!(rx.recv().await.unwrap().request_id, 4);

		b.unlisten(&"b".to_string());
		assert!(!network.is_listening(&"b".to_string()));
	}
}
