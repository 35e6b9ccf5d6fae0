use crate::{
	adaptor::ChordAdaptor,
	circular_id::Id,
	config::ChordConfig,
	error::ChordError,
	pointer::Pointer,
	ChordAddress,
};

use std::{
	collections::{HashMap, VecDeque},
	sync::Arc,
	fmt,
};

use tokio::sync::{mpsc::{channel, Sender, Receiver}, oneshot};
use tokio::task::JoinHandle;
use tokio::time::interval;

use serde::{Serialize, Deserialize};


pub mod message;

pub mod state;
use state::{ChordState, Listener};

pub mod maintenance;
use maintenance::{CheckPredecessor, FindSuccessor, FixFingerTable, InitFingerTable, MaintenanceError, Stabilize};

use message::{Message, PrivateMessage};
use tracing::info;

mod private_ops;
mod public_ops;

use self::private_ops::PendingRequest;

/// What a node currently believes about its place in the ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct NodeSnapshot<A: ChordAddress>{
	pub base: Pointer<A>,
	pub predecessor: Option<Pointer<A>>,
	pub successors: Vec<Pointer<A>>,
	pub fingers: Vec<Pointer<A>>,
	/// Lost every successor and stopped maintaining itself.
	pub dead: bool,
}

/// The Chord itself. This struct acts like a builder in that it is created
/// and modified before being consumed by the start method which then
/// returns another type, ChordHandle.
pub struct Chord<A: ChordAddress, ADAPTOR: ChordAdaptor<A>>{
	// Core data
	self_addr: A,
	state: ChordState<A>,
	config: ChordConfig,
	dead: bool,

	// Connections
	join_list: Vec<A>,
	join_queue: VecDeque<A>,
	adaptor: Arc<ADAPTOR>,

	// Maintenance, at most one of each kind in flight
	joining: Option<InitFingerTable<A>>,
	stabilize: Option<Stabilize<A>>,
	fix_fingers: Option<FixFingerTable<A>>,
	check_predecessor: Option<CheckPredecessor<A>>,
	lookups: HashMap<u64, (FindSuccessor<A>, oneshot::Sender<Result<Pointer<A>, MaintenanceError>>)>,
	next_lookup_id: u64,

	// Request tracking
	pending: HashMap<u64, PendingRequest<A>>,
	next_request_id: u64,

	// Operations channel
	channel_rx: Receiver<PrivateMessage<A>>,
	channel_tx: Sender<PrivateMessage<A>>,
}

impl<A: ChordAddress, ADAPTOR: ChordAdaptor<A>> fmt::Debug for Chord<A, ADAPTOR> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Chord")
			.field("self_addr", &self.self_addr)
			.field("state", &self.state)
			.field("dead", &self.dead)
			.field("join_list", &self.join_list)
			.field("pending", &self.pending.len())
			.finish()
	}
}

impl<A: ChordAddress, ADAPTOR: ChordAdaptor<A>> Chord<A, ADAPTOR>{

	/// Creates a new node with the provided id and address. The address is
	/// handed to the adaptor as the listen address once the node starts.
	pub fn new(addr: A, self_id: Id, config: ChordConfig, adaptor: ADAPTOR) -> Result<Self, ChordError>{
		config.validate()?;
		if self_id.bit_count() != config.bit_count {
			return Err(ChordError::BitCountMismatch{ expected: config.bit_count, found: self_id.bit_count() });
		}
		let (channel_tx, channel_rx) = channel(config.channel_capacity);

		Ok(Chord{
			// Core data
			state: ChordState::new(Pointer::new(self_id, addr.clone())),
			self_addr: addr,
			config,
			dead: false,

			// Connections
			join_list: Vec::new(),
			join_queue: VecDeque::new(),
			adaptor: Arc::new(adaptor),

			// Maintenance
			joining: None,
			stabilize: None,
			fix_fingers: None,
			check_predecessor: None,
			lookups: HashMap::new(),
			next_lookup_id: 0,

			// Request tracking
			pending: HashMap::new(),
			next_request_id: 0,

			// Operations channel
			channel_rx,
			channel_tx,
		})
	}

	/// Observe link changes of this node.
	pub fn set_listener(&mut self, listener: Listener<A>){
		self.state.set_listener(listener);
	}

	/// Give the node a list of addresses to try to join when it starts,
	/// and again if it ever loses all of its successors.
	pub fn set_join_list(&mut self, list: Vec<A>){
		self.join_list = list;
	}

	pub fn id(&self) -> &Id {
		self.state.base().id()
	}

	/// Starts the node. This will take ownership of the Chord and return a ChordHandle.
	///
	/// If passed Some(Address) that address will be prepended to the join list.
	/// The node tries each join address in turn and runs alone if none
	/// answers. With an empty join list it starts a new ring.
	pub async fn start(mut self, join_addr: Option<A>) -> ChordHandle<A> {
		if let Some(addr) = join_addr {
			self.join_list.insert(0, addr);
		}

		// Start listening
		let (inbox_tx, mut inbox_rx) = channel(self.config.channel_capacity);
		info!("Node {} listening on {:?}", self.id(), self.self_addr);
		self.adaptor.listen(self.self_addr.clone(), inbox_tx);

		// Start maintenance task
		let ticker = self.channel_tx.clone();
		let config = self.config.clone();
		let maintenance_handle = tokio::spawn(async move{
			let mut stabilize = interval(config.stabilize_interval());
			let mut fix_fingers = interval(config.fix_finger_interval());
			let mut check_predecessor = interval(config.check_predecessor_interval());
			loop{
				let tick = tokio::select!{
					_ = stabilize.tick() => PrivateMessage::Stabilize,
					_ = fix_fingers.tick() => PrivateMessage::FixFingers,
					_ = check_predecessor.tick() => PrivateMessage::CheckPredecessor,
				};
				if ticker.send(tick).await.is_err() {
					break;
				}
			}
		});

		let handle_addr = self.self_addr.clone();
		let handle_id = self.id().clone();
		let channel_tx = self.channel_tx.clone();
		let adaptor: Arc<dyn ChordAdaptor<A>> = self.adaptor.clone();

		// Spawn operation task
		let processor_handle = tokio::spawn(async move{
			self.begin_join();
			loop{
				let message: Message<A> = tokio::select!{
					Some(operation) = self.channel_rx.recv() => operation.into(),
					Some(packet) = inbox_rx.recv() => packet.into(),
					else => break,
				};
				match message{
					Message::Private(operation) => self.process_private(operation),
					Message::Public(packet) => self.process_public(packet),
				}
			}
			info!("processor task terminating");
		});

		ChordHandle{
			addr: handle_addr,
			id: handle_id,
			channel_tx,
			adaptor,
			maintenance_handle,
			processor_handle,
		}
	}

	fn snapshot(&self) -> NodeSnapshot<A> {
		NodeSnapshot{
			base: self.state.base().clone(),
			predecessor: self.state.predecessor().cloned(),
			successors: self.state.successor_table().to_vec(),
			fingers: self.state.finger_table().pointers(),
			dead: self.dead || self.state.is_dead(),
		}
	}
}



/// A ChordHandle represents a connection to a started Chord.
pub struct ChordHandle<A: ChordAddress>{
	addr: A,
	id: Id,
	channel_tx: Sender<PrivateMessage<A>>,
	adaptor: Arc<dyn ChordAdaptor<A>>,

	maintenance_handle: JoinHandle<()>,
	processor_handle: JoinHandle<()>,
}

impl<A: ChordAddress> fmt::Debug for ChordHandle<A> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ChordHandle")
			.field("addr", &self.addr)
			.field("id", &self.id)
			.finish()
	}
}

impl<A: ChordAddress> ChordHandle<A> {
	pub fn addr(&self) -> &A {
		&self.addr
	}

	pub fn id(&self) -> &Id {
		&self.id
	}

	/// The node's current routing state.
	pub async fn snapshot(&self) -> Result<NodeSnapshot<A>, MaintenanceError>{
		let (reply, response) = oneshot::channel();
		self.channel_tx.send(PrivateMessage::Snapshot{ reply }).await
			.map_err(|_| MaintenanceError::NodeStopped)?;
		response.await.map_err(|_| MaintenanceError::NodeStopped)
	}

	/// Finds the node responsible for `target`.
	pub async fn lookup(&self, target: Id) -> Result<Pointer<A>, MaintenanceError>{
		let (reply, response) = oneshot::channel();
		self.channel_tx.send(PrivateMessage::Lookup{ target, reply }).await
			.map_err(|_| MaintenanceError::NodeStopped)?;
		response.await.map_err(|_| MaintenanceError::NodeStopped)?
	}

	/// Force the node to stop. Peers see it as crashed.
	pub async fn stop(self){
		self.adaptor.unlisten(&self.addr);
		self.maintenance_handle.abort();
		let _ = self.maintenance_handle.await;
		self.processor_handle.abort();
		let _ = self.processor_handle.await;
		info!("Node {} stopped", self.id);
	}
}
