//! Handle ownership across the bridge: collections, tagged results, streams.

use std::sync::Arc;

use tether_core::status::unwrap_handle;
use tether_core::testing;
use tether_core::{Bridge, Error, HandleRegistry, NativeEngine, StatusCode};

#[test]
fn test_map_round_trip_through_fake_engine() {
    let bridge = testing::bridge();
    let mut map = bridge.map::<String, String>();

    assert!(map.is_valid());
    assert_eq!(map.size(), 0);
    assert!(map.set(&"voice".to_string(), &"alto".to_string()));
    assert!(map.set(&"tempo".to_string(), &"slow".to_string()));
    assert_eq!(map.size(), 2);
    assert_eq!(map.get(&"voice".to_string()).as_deref(), Some("alto"));
    assert_eq!(map.get(&"pitch".to_string()), None);
    assert!(map.remove(&"tempo".to_string()));
    assert!(!map.contains(&"tempo".to_string()));

    let stats = bridge.handle_stats();
    assert_eq!(stats.live(), 1);
}

#[test]
fn test_released_collection_makes_no_native_calls() {
    let bridge = testing::bridge();
    let mut set = bridge.set::<String>();
    assert!(set.insert(&"a".to_string()));
    assert!(!set.insert(&"a".to_string()));

    let raw = set.raw();
    set.release();
    let calls = testing::call_count(raw);

    assert_eq!(set.size(), -1);
    assert!(!set.insert(&"b".to_string()));
    assert!(!set.contains(&"a".to_string()));
    assert!(!set.remove(&"a".to_string()));
    assert_eq!(testing::call_count(raw), calls);
}

#[test]
fn test_release_is_idempotent() {
    let bridge = testing::bridge();
    let mut map = bridge.map::<String, String>();
    let raw = map.raw();

    map.release();
    map.release();
    drop(map);

    assert_eq!(testing::delete_count(raw), 1);
    assert_eq!(bridge.handle_stats().released, 1);
    assert_eq!(bridge.handle_stats().live(), 0);
}

#[test]
fn test_unregistered_instantiation_is_inert() {
    let bridge = testing::bridge();
    let mut map = bridge.map::<u32, Vec<u8>>();

    assert!(!map.is_valid());
    assert_eq!(map.size(), -1);
    assert!(!map.set(&1, &vec![1, 2]));
    assert_eq!(map.get(&1), None);
    assert_eq!(bridge.handle_stats().registered, 0);
}

#[test]
fn test_missing_symbol_disables_only_that_strategy() {
    let mut symbols = testing::symbols();
    symbols.remove("fake_StringSet_create");
    let bridge = Bridge::with_engine(
        Arc::new(NativeEngine::new(testing::PREFIX, symbols)),
        testing::config(),
    );

    assert!(!bridge.set::<String>().is_valid());
    assert!(bridge.map::<String, String>().is_valid());
}

#[test]
fn test_failed_status_releases_tagged_once() {
    let tagged = testing::make_failure(5, "decoder crashed");
    let registry = HandleRegistry::new();

    let result = unwrap_handle(tagged, &testing::result_fns(), &registry, testing::release_string);
    match result {
        Err(Error::Foreign { code, reason }) => {
            assert_eq!(code, StatusCode::Internal);
            assert_eq!(reason, "decoder crashed");
        }
        other => panic!("expected foreign error, got {:?}", other),
    }
    assert_eq!(testing::delete_count(tagged), 1);
    assert_eq!(registry.stats().registered, 0);
}

#[test]
fn test_stream_drains_and_releases() {
    let bridge = testing::bridge();
    let cancel = bridge.cancellation().unwrap();
    let raw = testing::make_stream(&["first", "second"], cancel.raw());

    let mut stream = bridge.stream::<String>(raw, cancel);
    assert_eq!(stream.collect_all().unwrap(), vec!["first", "second"]);
    assert!(matches!(stream.read(), Err(Error::EndOfStream)));

    drop(stream);
    assert_eq!(testing::delete_count(raw), 1);
}

#[test]
fn test_cancelled_stream_stops_reading() {
    let bridge = testing::bridge();
    let cancel = bridge.cancellation().unwrap();
    let raw = testing::make_stream(&["a", "b", "c"], cancel.raw());

    let mut stream = bridge.stream::<String>(raw, cancel.clone());
    assert_eq!(stream.read().unwrap(), "a");
    cancel.cancel();

    assert!(!stream.has_next());
    assert!(matches!(stream.read(), Err(Error::Cancelled)));
}
