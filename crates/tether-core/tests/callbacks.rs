//! Single-shot and threaded callbacks driven through the fake engine.

use std::sync::{Arc, Barrier};

use serde_json::{Value, json};
use tether_core::testing;
use tether_core::{DataKindRegistry, Error, ExecutionId, SingleShotExecutor};

#[test]
fn test_threaded_ids_are_isolated_on_native_workers() {
    let bridge = testing::bridge();
    let barrier = Arc::new(Barrier::new(2));
    let inner = barrier.clone();

    let executor = bridge.threaded_executor("tag", move |id: ExecutionId, inputs: &[String]| {
        // Both executions are in flight before either answers.
        inner.wait();
        let worker = std::thread::current().name().unwrap_or_default().to_string();
        Ok(format!("{}:{}:{}", id.as_u64(), inputs.concat(), worker))
    });

    let handles: Vec<_> = [(7u64, "A"), (8u64, "B")]
        .into_iter()
        .map(|(id, input)| {
            let executor = executor.clone();
            let dispatcher = bridge.dispatcher().clone();
            std::thread::spawn(move || {
                executor.invoke(ExecutionId::new(id), vec![input.to_string()], dispatcher.as_ref())
            })
        })
        .collect();

    let outputs: Vec<String> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap())
        .collect();

    assert!(outputs[0].starts_with("7:A:fake-engine-"), "{}", outputs[0]);
    assert!(outputs[1].starts_with("8:B:fake-engine-"), "{}", outputs[1]);
    assert!(executor.store().is_empty());
    assert_eq!(executor.invocations(), 2);
}

#[test]
fn test_threaded_error_reaches_caller() {
    let bridge = testing::bridge();
    let executor = bridge.threaded_executor("reject", |_, _: &[Value]| -> Result<Value, String> {
        Err("unsupported sample rate".to_string())
    });

    let result = executor.invoke(ExecutionId::new(1), vec![json!(44_100)], bridge.dispatcher().as_ref());
    match result {
        Err(Error::Callback(reason)) => assert!(reason.contains("unsupported sample rate")),
        other => panic!("expected callback error, got {:?}", other),
    }
    assert!(executor.store().is_empty());
}

#[test]
fn test_single_shot_through_native_entry() {
    let executor = SingleShotExecutor::new("length", |text: &String| text.len());

    assert_eq!(executor.call_native(&"hello".to_string()).unwrap(), 5);
    assert_eq!(executor.last_input().as_deref(), Some("hello"));
    assert_eq!(executor.last_output(), Some(5));
}

#[test]
fn test_data_kind_round_trip_on_native_dispatcher() {
    let bridge = testing::bridge();
    let registry = DataKindRegistry::with_dispatcher(bridge.dispatcher().clone());

    registry.register(
        "Duration",
        |text: &str| {
            text.strip_suffix("ms")
                .and_then(|n| n.parse::<u64>().ok())
                .map(|ms| json!({ "ms": ms }))
                .ok_or_else(|| format!("bad duration '{}'", text))
        },
        |value: &Value| {
            value["ms"]
                .as_u64()
                .map(|ms| format!("{}ms", ms))
                .ok_or_else(|| "missing ms".to_string())
        },
    );

    let value = registry.deserialize("Duration", "250ms").unwrap();
    assert_eq!(value, json!({ "ms": 250 }));
    assert_eq!(registry.serialize("Duration", &value).unwrap(), "250ms");
    assert!(matches!(
        registry.deserialize("Duration", "soon"),
        Err(Error::Callback(_))
    ));
    assert!(matches!(
        registry.deserialize("Pitch", "A4"),
        Err(Error::UnregisteredType(_))
    ));
}

#[test]
fn test_engine_drives_data_kind_with_its_own_ids() {
    let registry = Arc::new(DataKindRegistry::new());
    let barrier = Arc::new(Barrier::new(2));
    let inner = barrier.clone();
    registry.register(
        "Note",
        move |text: &str| {
            // Ids 7 and 8 are converting at the same time.
            inner.wait();
            Ok(json!({ "note": text }))
        },
        |value: &Value| value["note"].as_str().map(str::to_string).ok_or_else(|| "no note".to_string()),
    );
    let channels = registry.callbacks("Note").unwrap();

    let handles: Vec<_> = [(7u64, "A4"), (8u64, "C5")]
        .into_iter()
        .map(|(id, text)| {
            let channel = channels.deserializer;
            std::thread::spawn(move || testing::convert_natively(&channel, id, text))
        })
        .collect();
    let outputs: Vec<String> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap())
        .collect();

    assert_eq!(outputs, vec![r#"{"note":"A4"}"#, r#"{"note":"C5"}"#]);
    assert_eq!(testing::convert_natively(&channels.serializer, 7, &outputs[1]).unwrap(), "C5");
    assert!(registry.get("Note").unwrap().deserializer.store().is_empty());
}
