use serde::{Serialize, Deserialize};

use crate::{circular_id::Id, ChordAddress};

/// A ring member: its id and where to reach it.
///
/// Two pointers are the same member when their ids match. Seeing the same
/// id with two different addresses means something upstream changed an
/// address without changing the id, so comparing such pointers panics.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Pointer<A: ChordAddress>{
	id: Id,
	address: A,
}

impl<A: ChordAddress> Pointer<A> {
	pub fn new(id: Id, address: A) -> Self {
		Pointer { id, address }
	}

	pub fn id(&self) -> &Id {
		&self.id
	}

	pub fn address(&self) -> &A {
		&self.address
	}

	/// Id and address both match. Never panics.
	pub fn is_exactly(&self, other: &Pointer<A>) -> bool {
		self.id == other.id && self.address == other.address
	}
}

impl<A: ChordAddress> PartialEq for Pointer<A> {
	fn eq(&self, other: &Self) -> bool {
		if self.id != other.id {
			return false;
		}
		assert!(
			self.address == other.address,
			"id {} is claimed by two addresses: {:?} and {:?}",
			self.id, self.address, other.address
		);
		true
	}
}

impl<A: ChordAddress> Eq for Pointer<A> {}
