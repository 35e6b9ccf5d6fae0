//! A Chord distributed hash table node.
//!
//! The ring bookkeeping ([FingerTable], [SuccessorTable], [ChordState]) is
//! plain synchronous data. The maintenance protocols live in
//! [chord::maintenance] as resumable state machines, and [Chord] drives them
//! from a single tokio task over any [ChordAdaptor] transport.

use std::fmt::Debug;
use serde::{Serialize, Deserialize};


pub mod error;
pub use error::ChordError;

pub mod circular_id;
pub use circular_id::Id;

pub mod pointer;
pub use pointer::Pointer;

pub mod finger_table;
pub use finger_table::{FingerTable, RouteResult};

pub mod successor_table;
pub use successor_table::SuccessorTable;

pub mod id_generator;
pub use id_generator::{IdGenerator, RandomIdGenerator};

pub mod config;
pub use config::{ChordConfig, ConfigError};

pub mod adaptor;
pub use adaptor::{ChordAdaptor, memory::{MemoryAdaptor, MemoryNetwork}};

pub mod chord;
pub use chord::{
	Chord, ChordHandle, NodeSnapshot,
	state::{ChordState, ChordEvent, Listener},
	message::{Packet, PacketBody, Request, Response, RequestFailure},
	maintenance::MaintenanceError,
};



pub type MemoryChord<A> = Chord<A, MemoryAdaptor<A>>;



pub trait ChordAddress: Clone + Send + Sync + 'static + Debug + PartialEq + Serialize + for<'de> Deserialize<'de>{}
impl<T: Clone + Send + Sync + 'static + Debug + PartialEq + Serialize + for<'de> Deserialize<'de>> ChordAddress for T{}
