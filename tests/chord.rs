mod common;

use std::sync::{Arc, Mutex};

use chord_ring::{
	chord::maintenance::MaintenanceError,
	ChordError, ChordEvent, Id, MemoryChord, MemoryNetwork,
};
use tokio::time::{sleep, Duration};

use common::{addr, config, make_node, make_nodes, owner, pointer, value, wait_for_ring, BITS};



#[tokio::test(start_paused = true)]
async fn lone_node_owns_everything() {
	let network = MemoryNetwork::new();
	let handle = make_node(&network, 42, None).await;
	sleep(Duration::from_secs(1)).await;

	let snapshot = handle.snapshot().await.unwrap();
	assert!(!snapshot.dead);
	assert_eq!(snapshot.predecessor, None);
	assert!(snapshot.fingers.iter().all(|p| *p == pointer(42)));

	for target in [0u64, 41, 42, 43, 255] {
		let found = handle.lookup(Id::from_u64(BITS, target).unwrap()).await.unwrap();
		assert_eq!(found, pointer(42));
	}
	handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn ten_nodes_consistency() {
	let network = MemoryNetwork::new();
	let ids = [3u64, 30, 57, 81, 110, 142, 170, 199, 222, 250];
	let v = make_nodes(&network, &ids, 500).await;

	let handles: Vec<_> = v.iter().collect();
	assert!(wait_for_ring(&handles, 120).await, "ring never stabilized");

	for handle in v.iter() {
		for target in (0..256u64).step_by(7) {
			let found = handle.lookup(Id::from_u64(BITS, target).unwrap()).await.unwrap();
			assert_eq!(
				value(found.id()), owner(&ids, target),
				"lookup of {} from {}", target, handle.id()
			);
		}
	}

	for handle in v {
		handle.stop().await;
	}
}

#[tokio::test(start_paused = true)]
async fn ring_heals_after_crash() {
	let network = MemoryNetwork::new();
	let ids = [10u64, 60, 100, 150, 200, 250];
	let mut v = make_nodes(&network, &ids, 500).await;
	{
		let handles: Vec<_> = v.iter().collect();
		assert!(wait_for_ring(&handles, 120).await, "ring never stabilized");
	}

	// 100 crashes without a word
	let crashed = v.remove(2);
	crashed.stop().await;

	let survivors: Vec<_> = v.iter().collect();
	assert!(wait_for_ring(&survivors, 120).await, "ring did not heal");

	let sixty = v[1].snapshot().await.unwrap();
	assert_eq!(sixty.successors.first(), Some(&pointer(150)));
	assert!(sixty.successors.iter().all(|p| value(p.id()) != 100));

	for handle in v {
		handle.stop().await;
	}
}

#[tokio::test(start_paused = true)]
async fn join_through_unreachable_address_runs_alone() {
	let network = MemoryNetwork::new();
	let handle = MemoryChord::new(addr(7), Id::from_u64(BITS, 7).unwrap(), config(), network.adaptor())
		.unwrap()
		.start(Some("nowhere".to_string()))
		.await;
	sleep(Duration::from_secs(2)).await;

	let snapshot = handle.snapshot().await.unwrap();
	assert!(!snapshot.dead);
	assert_eq!(snapshot.successors, vec![pointer(7)]);
	assert_eq!(handle.lookup(Id::from_u64(BITS, 100).unwrap()).await, Ok(pointer(7)));

	// a later node can still join it
	let other = make_node(&network, 90, Some(7)).await;
	assert!(wait_for_ring(&[&handle, &other], 60).await);

	handle.stop().await;
	other.stop().await;
}

#[tokio::test(start_paused = true)]
async fn listener_reports_links() {
	let network = MemoryNetwork::new();
	let first = make_node(&network, 20, None).await;

	let events = Arc::new(Mutex::new(Vec::new()));
	let sink = events.clone();
	let mut chord = MemoryChord::new(addr(140), Id::from_u64(BITS, 140).unwrap(), config(), network.adaptor()).unwrap();
	chord.set_listener(Box::new(move |e: ChordEvent<String>| sink.lock().unwrap().push(e)));
	let second = chord.start(Some(addr(20))).await;

	assert!(wait_for_ring(&[&first, &second], 60).await);
	let events = events.lock().unwrap().clone();
	assert!(events.contains(&ChordEvent::NodeActive{base: pointer(140)}));
	assert!(events.contains(&ChordEvent::LinkEstablished{pointer: pointer(20)}));
	assert!(!events.iter().any(|e| matches!(e, ChordEvent::LinkRemoved{..})));

	first.stop().await;
	second.stop().await;
}

#[tokio::test(start_paused = true)]
async fn rejects_foreign_ids() {
	let network = MemoryNetwork::new();
	assert_eq!(
		MemoryChord::new(addr(1), Id::from_u64(BITS + 1, 1).unwrap(), config(), network.adaptor()).unwrap_err(),
		ChordError::BitCountMismatch{ expected: BITS, found: BITS + 1 }
	);

	let handle = make_node(&network, 1, None).await;
	assert_eq!(
		handle.lookup(Id::from_u64(4, 1).unwrap()).await,
		Err(MaintenanceError::State(ChordError::BitCountMismatch{ expected: BITS, found: 4 }))
	);

	let id = handle.id().clone();
	handle.stop().await;
	assert_eq!(value(&id), 1);
}
