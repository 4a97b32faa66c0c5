//! Self-test command implementation for Tether CLI.
//!
//! Drives collections, streams, threaded callbacks and a small graph
//! through the in-process fake engine, then checks that every handle the
//! bridge took ownership of was released.

use std::time::Instant;

use serde_json::{Value, json};
use tether_core::testing;
use tether_core::{Bridge, DataKindRegistry, Edge, ProcessContext};

use crate::colors;

/// Execute the self-test command.
pub fn execute() -> anyhow::Result<()> {
    println!(
        "\n{}Tether Self-Test{} - in-process fake engine",
        colors::BOLD,
        colors::RESET
    );
    println!("{}", "─".repeat(50));

    let bridge = testing::bridge();
    let checks: [(&str, fn(&Bridge) -> anyhow::Result<()>); 4] = [
        ("collections", check_collections),
        ("stream", check_stream),
        ("data kinds", check_data_kinds),
        ("graph", check_graph),
    ];

    for (name, check) in checks {
        let start = Instant::now();
        check(&bridge).map_err(|e| e.context(format!("{} check failed", name)))?;
        println!(
            "  {:<12} {}ok{} {}({:.1?}){}",
            name,
            colors::GREEN,
            colors::RESET,
            colors::DIM,
            start.elapsed(),
            colors::RESET
        );
    }

    let stats = bridge.handle_stats();
    if stats.live() != 0 {
        anyhow::bail!("{} handle(s) still live after self-test: {:?}", stats.live(), stats);
    }
    println!("{} handle(s) registered, all released", stats.registered);
    Ok(())
}

fn check_collections(bridge: &Bridge) -> anyhow::Result<()> {
    let mut map = bridge.map::<String, String>();
    map.set(&"voice".to_string(), &"alto".to_string());
    anyhow::ensure!(map.get(&"voice".to_string()).as_deref() == Some("alto"), "map lookup");

    let mut set = bridge.set::<String>();
    set.insert(&"a".to_string());
    anyhow::ensure!(!set.insert(&"a".to_string()), "duplicate set insert accepted");
    anyhow::ensure!(set.size() == 1, "set size {}", set.size());
    Ok(())
}

fn check_stream(bridge: &Bridge) -> anyhow::Result<()> {
    let cancel = bridge.cancellation()?;
    let raw = testing::make_stream(&["one", "two", "three"], cancel.raw());
    let mut stream = bridge.stream::<String>(raw, cancel.clone());

    anyhow::ensure!(stream.read()? == "one", "first stream item");
    cancel.cancel();
    anyhow::ensure!(!stream.has_next(), "stream readable after cancel");
    Ok(())
}

fn check_data_kinds(bridge: &Bridge) -> anyhow::Result<()> {
    let registry = DataKindRegistry::with_dispatcher(bridge.dispatcher().clone());
    registry.register(
        "Word",
        |text: &str| Ok(json!({ "word": text })),
        |value: &Value| {
            value["word"]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| "missing word".to_string())
        },
    );

    let value = registry.deserialize("Word", "tether")?;
    anyhow::ensure!(registry.serialize("Word", &value)? == "tether", "data kind round trip");

    // The engine side, driving the same kind with its own execution id.
    let channels = registry.callbacks("Word")?;
    let json = testing::convert_natively(&channels.deserializer, 1, "bridge")?;
    anyhow::ensure!(
        testing::convert_natively(&channels.serializer, 1, &json)? == "bridge",
        "engine-driven data kind round trip"
    );
    Ok(())
}

fn check_graph(bridge: &Bridge) -> anyhow::Result<()> {
    let mut graph = bridge.graph();
    graph.add_node(bridge.native_node("shout", "uppercase", &json!({}))?)?;
    graph.add_node(bridge.custom_node("count", |inputs| {
        let text = inputs.first().and_then(Value::as_str).ok_or("expected text")?;
        Ok(json!(text.len()))
    }))?;
    graph.add_edge(Edge::new("shout", "count"))?;

    let report = graph.run(json!("hello"), &ProcessContext::default())?;
    graph.release();
    anyhow::ensure!(report.output("count") == Some(&json!(5)), "graph output {:?}", report.outputs);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_test_passes() {
        execute().unwrap();
    }
}
