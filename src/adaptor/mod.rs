use tokio::sync::mpsc::Sender;

use crate::{chord::message::{Packet, RequestFailure}, ChordAddress};

pub mod memory;

/// The transport seam. A node hands its inbox to [ChordAdaptor::listen] and
/// pushes packets out with [ChordAdaptor::send]. Delivery is best effort:
/// the node's own request tracking covers lost packets.
pub trait ChordAdaptor<A: ChordAddress>: Send + Sync + 'static {

	// incoming packets
	fn listen(&self, addr: A, inbox: Sender<Packet<A>>);

	// stop delivering to addr
	fn unlisten(&self, addr: &A);

	// outgoing packets, must not block
	fn send(&self, to: &A, packet: Packet<A>) -> Result<(), RequestFailure>;
}
