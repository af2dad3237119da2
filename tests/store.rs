//! End-to-end tests against the public `Store` API, the way a consumer
//! of this crate (not its internals) would exercise it.

use bitkeg::{Config, Error, Store};

fn open(dir: &std::path::Path) -> Store {
	let _ = env_logger::try_init();
	Store::open(Config::new(dir)).unwrap()
}

#[test]
fn s1_basic_put_get_delete() {
	let tmp = tempfile::TempDir::new().unwrap();
	let store = open(tmp.path());

	store.put(b"a", b"1").unwrap();
	store.put(b"b", b"2").unwrap();
	assert_eq!(store.get(b"a").unwrap(), b"1");
	assert_eq!(store.get(b"b").unwrap(), b"2");

	store.delete(b"a").unwrap();
	assert!(matches!(store.get(b"a"), Err(Error::NotFound)));
	assert_eq!(store.keys(), vec![b"b".to_vec()]);
}

#[test]
fn s2_overwrite_survives_merge() {
	let tmp = tempfile::TempDir::new().unwrap();
	let store = open(tmp.path());

	store.put(b"k", b"v1").unwrap();
	store.put(b"k", b"v2").unwrap();
	assert_eq!(store.get(b"k").unwrap(), b"v2");

	store.merge().unwrap();
	assert_eq!(store.get(b"k").unwrap(), b"v2");

	// exactly one live Put for "k" on disk: a fresh store opened on the
	// same directory must replay to the same single value.
	drop(store);
	let reopened = open(tmp.path());
	assert_eq!(reopened.get(b"k").unwrap(), b"v2");
	assert_eq!(reopened.len(), 1);
}

#[test]
fn s3_rotation_at_threshold_keeps_every_key_readable() {
	let tmp = tempfile::TempDir::new().unwrap();
	let store = Store::open(Config::new(tmp.path()).max_file_size(64)).unwrap();

	store.put(b"k1", b"xxxxxxxxxxxxxxxx").unwrap();
	store.put(b"k2", b"yyyyyyyyyyyyyyyy").unwrap();
	store.put(b"k3", b"zzzzzzzzzzzzzzzz").unwrap();

	let rotated = std::fs::read_dir(tmp.path())
		.unwrap()
		.filter_map(|e| e.ok())
		.any(|e| e.file_name().to_string_lossy().starts_with("data_"));
	assert!(rotated, "expected at least one rotated segment");

	assert_eq!(store.get(b"k1").unwrap(), b"xxxxxxxxxxxxxxxx");
	assert_eq!(store.get(b"k2").unwrap(), b"yyyyyyyyyyyyyyyy");
	assert_eq!(store.get(b"k3").unwrap(), b"zzzzzzzzzzzzzzzz");
}

#[test]
fn s4_restart_replay_reflects_every_committed_op() {
	let tmp = tempfile::TempDir::new().unwrap();
	{
		let store = open(tmp.path());
		store.put(b"a", b"1").unwrap();
		store.put(b"b", b"2").unwrap();
		store.delete(b"a").unwrap();
	}

	let store = open(tmp.path());
	assert!(matches!(store.get(b"a"), Err(Error::NotFound)));
	assert_eq!(store.get(b"b").unwrap(), b"2");
	assert_eq!(store.keys(), vec![b"b".to_vec()]);
}

#[test]
fn s5_merge_then_restart_resolves_overlapping_keys_via_hint() {
	let tmp = tempfile::TempDir::new().unwrap();
	let store = Store::open(Config::new(tmp.path()).max_file_size(32)).unwrap();

	store.put(b"x", b"old").unwrap();
	store.put(b"y", b"y1").unwrap();
	store.put(b"x", b"new").unwrap(); // forces at least one rotation given max_file_size=32

	store.merge().unwrap();

	let entries: Vec<_> = std::fs::read_dir(tmp.path())
		.unwrap()
		.filter_map(|e| e.ok())
		.map(|e| e.file_name().to_string_lossy().into_owned())
		.collect();
	let merged_logs = entries.iter().filter(|n| n.starts_with("merged_") && n.ends_with(".log")).count();
	let merged_hints = entries.iter().filter(|n| n.starts_with("merged_") && n.ends_with(".hint")).count();
	let rotated_logs = entries.iter().filter(|n| n.starts_with("data_")).count();
	assert_eq!(merged_logs, 1);
	assert_eq!(merged_hints, 1);
	assert_eq!(rotated_logs, 0, "rotated segments must be retired by merge");

	drop(store);
	let reopened = open(tmp.path());
	assert_eq!(reopened.get(b"x").unwrap(), b"new");
	assert_eq!(reopened.get(b"y").unwrap(), b"y1");
}

#[test]
fn s6_range_read_is_sorted_and_bounded() {
	let tmp = tempfile::TempDir::new().unwrap();
	let store = open(tmp.path());

	store.put(b"apple", b"1").unwrap();
	store.put(b"banana", b"2").unwrap();
	store.put(b"cherry", b"3").unwrap();

	let got: Vec<_> = store
		.range(b"b".to_vec()..b"d".to_vec())
		.map(|r| r.unwrap())
		.collect();
	assert_eq!(
		got,
		vec![(b"banana".to_vec(), b"2".to_vec()), (b"cherry".to_vec(), b"3".to_vec())]
	);
}

#[test]
fn delete_of_never_written_key_is_a_quiet_no_op() {
	let tmp = tempfile::TempDir::new().unwrap();
	let store = open(tmp.path());
	store.delete(b"ghost").unwrap();
	assert!(matches!(store.get(b"ghost"), Err(Error::NotFound)));
	assert_eq!(store.len(), 0);
}

#[test]
fn batch_put_is_visible_as_one_unit_to_a_later_reader() {
	let tmp = tempfile::TempDir::new().unwrap();
	let store = open(tmp.path());

	let entries: Vec<(Vec<u8>, Vec<u8>)> =
		(0..200).map(|i| (format!("k{i:04}").into_bytes(), b"v".to_vec())).collect();
	store.batch_put(&entries).unwrap();

	assert_eq!(store.len(), 200);
	assert_eq!(store.get(b"k0199").unwrap(), b"v");
	assert_eq!(store.keys().len(), 200);
}

#[test]
fn concurrent_readers_see_a_consistent_store_while_a_writer_runs() {
	use std::sync::Arc;
	use std::thread;

	let tmp = tempfile::TempDir::new().unwrap();
	let store = Arc::new(Store::open(Config::new(tmp.path()).max_file_size(512)).unwrap());

	for i in 0..100u32 {
		store.put(format!("seed-{i}").as_bytes(), b"present-before-readers-start").unwrap();
	}

	let writer_store = store.clone();
	let writer = thread::spawn(move || {
		for i in 0..200u32 {
			writer_store.put(format!("live-{i}").as_bytes(), b"value").unwrap();
		}
	});

	let mut readers = vec![];
	for _ in 0..4 {
		let reader_store = store.clone();
		readers.push(thread::spawn(move || {
			for i in 0..100u32 {
				let key = format!("seed-{i}");
				// a key present before the writer thread started must
				// always resolve; it is never rotated or merged away
				// out from under a concurrent reader.
				assert_eq!(
					reader_store.get(key.as_bytes()).unwrap(),
					b"present-before-readers-start"
				);
			}
		}));
	}

	writer.join().unwrap();
	for r in readers {
		r.join().unwrap();
	}

	assert_eq!(store.len(), 300);
}

#[test]
fn merge_running_concurrently_with_reads_never_breaks_a_read() {
	use std::sync::Arc;
	use std::thread;

	let tmp = tempfile::TempDir::new().unwrap();
	let store = Arc::new(Store::open(Config::new(tmp.path()).max_file_size(128)).unwrap());

	for i in 0..50u32 {
		store.put(format!("k{i}").as_bytes(), b"first-value-for-this-key").unwrap();
	}
	for i in 0..50u32 {
		store.put(format!("k{i}").as_bytes(), b"second-value-for-this-key").unwrap();
	}

	let reader_store = store.clone();
	let reader = thread::spawn(move || {
		for _ in 0..500 {
			for i in 0..50u32 {
				let v = reader_store.get(format!("k{i}").as_bytes()).unwrap();
				assert_eq!(v, b"second-value-for-this-key");
			}
		}
	});

	store.merge().unwrap();
	reader.join().unwrap();
}

#[test]
fn second_process_style_open_of_a_locked_directory_fails_fast() {
	let tmp = tempfile::TempDir::new().unwrap();
	let _first = open(tmp.path());
	let second = Store::open(Config::new(tmp.path()));
	assert!(second.is_err());
}

#[test]
fn reopen_after_many_rotations_preserves_every_key_and_its_latest_value() {
	let tmp = tempfile::TempDir::new().unwrap();
	{
		let store = Store::open(Config::new(tmp.path()).max_file_size(96)).unwrap();
		for round in 0..3u32 {
			for i in 0..40u32 {
				store
					.put(format!("k{i:03}").as_bytes(), format!("round-{round}").as_bytes())
					.unwrap();
			}
		}
	}

	let store = open(tmp.path());
	assert_eq!(store.len(), 40);
	for i in 0..40u32 {
		assert_eq!(store.get(format!("k{i:03}").as_bytes()).unwrap(), b"round-2");
	}
}

/// A randomized put/delete workload, checked at every step against a
/// reference `HashMap`, and re-checked after a merge and a restart.
/// Deterministic seed so a failure is reproducible.
#[test]
fn randomized_workload_matches_a_reference_map_across_merge_and_restart() {
	use rand::rngs::SmallRng;
	use rand::{Rng, SeedableRng};
	use std::collections::HashMap;

	let tmp = tempfile::TempDir::new().unwrap();
	let store = Store::open(Config::new(tmp.path()).max_file_size(256)).unwrap();
	let mut reference: HashMap<Vec<u8>, Vec<u8>> = HashMap::new();
	let mut rng = SmallRng::seed_from_u64(2001);

	let keyspace: Vec<Vec<u8>> = (0..60).map(|i| format!("key-{i:03}").into_bytes()).collect();

	for step in 0..2000u32 {
		let key = &keyspace[rng.gen_range(0..keyspace.len())];
		if rng.gen_bool(0.2) {
			store.delete(key).unwrap();
			reference.remove(key);
		} else {
			let len = rng.gen_range(0..40);
			let value: Vec<u8> = (0..len).map(|_| rng.gen::<u8>()).collect();
			store.put(key, &value).unwrap();
			reference.insert(key.clone(), value);
		}

		if step % 500 == 499 {
			store.merge().unwrap();
		}
	}

	assert_eq!(store.len(), reference.len());
	for (key, value) in &reference {
		assert_eq!(&store.get(key).unwrap(), value);
	}
	for key in &keyspace {
		if !reference.contains_key(key) {
			assert!(matches!(store.get(key), Err(Error::NotFound)));
		}
	}

	drop(store);
	let reopened = open(tmp.path());
	assert_eq!(reopened.len(), reference.len());
	for (key, value) in &reference {
		assert_eq!(&reopened.get(key).unwrap(), value);
	}
}
