#![allow(dead_code)]

use chord_ring::{ChordConfig, ChordHandle, Id, MemoryChord, MemoryNetwork, Pointer};
use tokio::time::{sleep, Duration};

pub const BITS: usize = 8;

pub fn config() -> ChordConfig {
	ChordConfig{
		bit_count: BITS,
		stabilize_interval_ms: 100,
		fix_finger_interval_ms: 100,
		check_predecessor_interval_ms: 100,
		request_timeout_ms: 50,
		request_retries: 1,
		channel_capacity: 64,
	}
}

pub fn addr(id: u64) -> String {
	format!("node-{}", id)
}

pub fn pointer(id: u64) -> Pointer<String> {
	Pointer::new(Id::from_u64(BITS, id).unwrap(), addr(id))
}

pub fn value(id: &Id) -> u64 {
	id.to_bytes().iter().fold(0u64, |acc, b| (acc << 8) | *b as u64)
}

/// The live node responsible for `target`.
pub fn owner(nodes: &[u64], target: u64) -> u64 {
	let mut sorted = nodes.to_vec();
	sorted.sort();
	*sorted.iter().find(|n| **n >= target).unwrap_or(&sorted[0])
}

pub async fn make_node(network: &MemoryNetwork<String>, id: u64, join: Option<u64>) -> ChordHandle<String> {
	let chord = MemoryChord::new(addr(id), Id::from_u64(BITS, id).unwrap(), config(), network.adaptor())
		.expect("valid node");
	chord.start(join.map(addr)).await
}

/// Starts the first node alone, then joins the rest through it.
pub async fn make_nodes(network: &MemoryNetwork<String>, ids: &[u64], delay: u64) -> Vec<ChordHandle<String>> {
	let mut v = Vec::new();
	for (i, id) in ids.iter().enumerate() {
		let join = if i == 0 { None } else { Some(ids[0]) };
		v.push(make_node(network, *id, join).await);
		sleep(Duration::from_millis(delay)).await;
	}
	v
}

/// Every node points at its live neighbours.
pub async fn is_ring(handles: &[&ChordHandle<String>]) -> bool {
	let mut ids: Vec<u64> = handles.iter().map(|h| value(h.id())).collect();
	ids.sort();
	for handle in handles {
		let snapshot = match handle.snapshot().await {
			Ok(snapshot) => snapshot,
			Err(_) => return false,
		};
		let me = value(handle.id());
		let position = ids.iter().position(|n| *n == me).unwrap();
		let next = ids[(position + 1) % ids.len()];
		let previous = ids[(position + ids.len() - 1) % ids.len()];

		let successor = snapshot.successors.first().map(|p| value(p.id()));
		let predecessor = snapshot.predecessor.as_ref().map(|p| value(p.id()));
		if snapshot.dead || successor != Some(next) || predecessor != Some(previous) {
			return false;
		}
	}
	true
}

/// Polls until the handles form a ring or `secs` simulated seconds pass.
pub async fn wait_for_ring(handles: &[&ChordHandle<String>], secs: u64) -> bool {
	for _ in 0..secs {
		if is_ring(handles).await {
			return true;
		}
		sleep(Duration::from_secs(1)).await;
	}
	is_ring(handles).await
}
