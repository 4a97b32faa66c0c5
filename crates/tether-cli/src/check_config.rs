//! Check-config command implementation for Tether CLI.

use std::path::Path;

use tether_core::BridgeConfig;

use crate::colors;

/// Execute the check-config command.
pub fn execute(path: &Path) -> anyhow::Result<()> {
    let config = load(path)?;

    println!(
        "{}Valid{} configuration: {}",
        colors::GREEN,
        colors::RESET,
        path.display()
    );
    println!("{}", serde_json::to_string_pretty(&config)?);

    if config.library_path.is_none() {
        println!(
            "{}note:{} no library_path; the bridge will read {}",
            colors::DIM,
            colors::RESET,
            tether_core::config::ENV_LIBRARY
        );
    }
    Ok(())
}

/// The file's settings with environment overrides applied, as a bridge would see them.
fn load(path: &Path) -> anyhow::Result<BridgeConfig> {
    let mut config = BridgeConfig::from_json_file(path)?;
    config.apply_env();
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ "max_graph_steps": 64 }}"#).unwrap();

        let config = load(file.path()).unwrap();
        assert_eq!(config.max_graph_steps, 64);
        assert!(execute(file.path()).is_ok());
    }

    #[test]
    fn test_zero_steps_rejected_with_hint() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ "max_graph_steps": 0 }}"#).unwrap();

        let err = load(file.path()).unwrap_err();
        let core = err.downcast_ref::<tether_core::Error>().unwrap();
        assert!(core.with_hint().contains("hint:"));
    }
}
