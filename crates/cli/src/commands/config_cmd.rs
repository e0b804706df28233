//! `aiservices config` — Configuration management commands.

use aiservices_config::ServiceConfig;
use std::path::{Path, PathBuf};

use super::load_config;

fn resolve(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf).unwrap_or_else(ServiceConfig::config_path)
}

pub fn init(path: Option<&Path>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = resolve(path);

    if config_path.exists() && !force {
        println!("⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or re-run with --force.");
        return Ok(());
    }

    if let Some(dir) = config_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&config_path, ServiceConfig::default_toml())?;
    println!("✅ Created config.toml at: {}", config_path.display());
    Ok(())
}

pub fn show(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(path).map_err(|e| format!("Failed to load config: {e}"))?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub fn check(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    let config = match load_config(path) {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   ✅ Config parsed successfully");

    let warnings = warnings(&config);
    if warnings.is_empty() {
        println!("   ✅ All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   ⚠️  {w}");
        }
    }

    println!();
    println!("   Conversation:  {}", config.default_conversation_id);
    println!("   Tool ceiling:  {}", config.max_sequential_tool_executions);
    println!(
        "   Memory:        {}",
        match (config.memory.enabled, config.memory.max_messages) {
            (false, _) => "disabled".to_string(),
            (true, None) => "unbounded".to_string(),
            (true, Some(max)) => format!("last {max} messages"),
        }
    );
    Ok(())
}

pub fn path(path: Option<&Path>) {
    println!("{}", resolve(path).display());
}

/// Settings that are valid but probably not what was meant.
fn warnings(config: &ServiceConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if let Some(max) = config.memory.max_messages
        && max < 4
    {
        warnings.push(format!(
            "memory.max_messages = {max} leaves no room for a tool round trip"
        ));
    }

    if !config.memory.enabled && config.memory.max_messages.is_some() {
        warnings.push("memory.max_messages is ignored while memory is disabled".to_string());
    }

    if config.max_sequential_tool_executions > 1000 {
        warnings.push(format!(
            "max_sequential_tool_executions = {} makes runaway tool cycles expensive",
            config.max_sequential_tool_executions
        ));
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use aiservices_config::MemoryConfig;

    #[test]
    fn init_writes_loadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        init(Some(&path), false).unwrap();
        let config = ServiceConfig::load_from(&path).unwrap();
        assert_eq!(config, ServiceConfig::default());
    }

    #[test]
    fn init_keeps_existing_file_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_sequential_tool_executions = 9\n").unwrap();

        init(Some(&path), false).unwrap();
        assert_eq!(ServiceConfig::load_from(&path).unwrap().max_sequential_tool_executions, 9);

        init(Some(&path), true).unwrap();
        assert_eq!(ServiceConfig::load_from(&path).unwrap().max_sequential_tool_executions, 100);
    }

    #[test]
    fn defaults_have_no_warnings() {
        assert!(warnings(&ServiceConfig::default()).is_empty());
    }

    #[test]
    fn tiny_window_warns() {
        let config = ServiceConfig {
            memory: MemoryConfig {
                enabled: true,
                max_messages: Some(2),
            },
            ..ServiceConfig::default()
        };
        assert_eq!(warnings(&config).len(), 1);
    }

    #[test]
    fn explicit_path_is_used() {
        assert_eq!(resolve(Some(Path::new("/x/c.toml"))), PathBuf::from("/x/c.toml"));
        assert!(resolve(None).ends_with("config.toml"));
    }
}
