//! Symbols command implementation for Tether CLI.
//!
//! Loads an engine library and probes every entry point the built-in
//! strategies, executors and nodes rely on.

use std::path::{Path, PathBuf};

use serde_json::json;
use tether_core::{BridgeConfig, NativeEngine, SymbolStatus, probe_engine};

use crate::colors;

/// Execute the symbols command.
pub fn execute(
    library: Option<PathBuf>,
    prefix: Option<String>,
    config_path: Option<&Path>,
    as_json: bool,
) -> anyhow::Result<()> {
    let config = resolve_config(library, prefix, config_path)?;
    let library = config.require_library()?;

    let engine = NativeEngine::load(config.engine_prefix.clone(), library)?;
    let statuses = probe_engine(&engine);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&to_json(&statuses))?);
    } else {
        println!(
            "\n{}Tether Symbols{} - {}",
            colors::BOLD,
            colors::RESET,
            engine.describe()
        );
        println!("{}", "─".repeat(50));
        for line in render(&statuses) {
            println!("{}", line);
        }
    }

    let missing = statuses.iter().filter(|s| !s.resolved).count();
    if missing > 0 {
        anyhow::bail!("{} of {} entry points missing", missing, statuses.len());
    }
    Ok(())
}

/// Config file (if any), then environment, then flags.
fn resolve_config(
    library: Option<PathBuf>,
    prefix: Option<String>,
    config_path: Option<&Path>,
) -> anyhow::Result<BridgeConfig> {
    let mut config = match config_path {
        Some(path) => BridgeConfig::from_json_file(path)?,
        None => BridgeConfig::default(),
    };
    config.apply_env();
    if let Some(library) = library {
        config.library_path = Some(library);
    }
    if let Some(prefix) = prefix {
        config.engine_prefix = prefix;
    }
    config.validate()?;
    Ok(config)
}

fn render(statuses: &[SymbolStatus]) -> Vec<String> {
    let mut lines = Vec::with_capacity(statuses.len() + 1);
    let mut current = "";
    for status in statuses {
        if status.native_type != current {
            current = status.native_type;
            lines.push(format!("{}{}{}", colors::CYAN, current, colors::RESET));
        }
        let mark = if status.resolved {
            format!("{}ok{}", colors::GREEN, colors::RESET)
        } else {
            format!("{}missing{}", colors::RED, colors::RESET)
        };
        lines.push(format!(
            "  {:<14} {} {}{}{}",
            status.operation,
            mark,
            colors::DIM,
            status.symbol,
            colors::RESET
        ));
    }

    let resolved = statuses.iter().filter(|s| s.resolved).count();
    lines.push(format!("{}/{} entry points resolved", resolved, statuses.len()));
    lines
}

fn to_json(statuses: &[SymbolStatus]) -> serde_json::Value {
    let entries = statuses
        .iter()
        .map(|s| {
            json!({
                "symbol": s.symbol,
                "type": s.native_type,
                "operation": s.operation,
                "resolved": s.resolved,
            })
        })
        .collect();
    serde_json::Value::Array(entries)
}
