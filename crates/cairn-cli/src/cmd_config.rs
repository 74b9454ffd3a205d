use anyhow::Context;
use cairn_ledger::{CairnPaths, Config};
use clap::Subcommand;
use std::path::Path;

// ── CLI Schema ──

#[derive(Subcommand)]
pub enum ConfigCmd {
    /// Set a config value
    Set {
        /// Config key (e.g. maxCommitsPerDay)
        key: String,
        /// Config value (true/false/number/string; `null` clears it)
        value: String,
    },
    /// Get a config value
    Get {
        /// Config key
        key: String,
    },
    /// List all config values, defaults included
    List,
}

// ── Dispatch ──

pub fn run(cmd: ConfigCmd, repo_root: &Path) -> anyhow::Result<()> {
    match cmd {
        ConfigCmd::Set { key, value } => set(repo_root, &key, &value),
        ConfigCmd::Get { key } => get(repo_root, &key),
        ConfigCmd::List => list(repo_root),
    }
}

// ── Command Implementations ──

type ConfigMap = serde_json::Map<String, serde_json::Value>;

/// Read `config.json`. Returns an empty map if the file doesn't exist.
fn read_config(path: &Path) -> anyhow::Result<ConfigMap> {
    if !path.exists() {
        return Ok(ConfigMap::new());
    }
    let content = std::fs::read_to_string(path)?;
    let val: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("parsing {}", path.display()))?;
    match val {
        serde_json::Value::Object(map) => Ok(map),
        _ => Ok(ConfigMap::new()),
    }
}

/// Every key with its effective value: the file's entries over the defaults.
fn effective(map: &ConfigMap) -> anyhow::Result<ConfigMap> {
    let config: Config = serde_json::from_value(serde_json::Value::Object(map.clone()))?;
    match serde_json::to_value(config)? {
        serde_json::Value::Object(full) => Ok(full),
        _ => Ok(ConfigMap::new()),
    }
}

/// Parse a string value into an appropriate JSON value (bool/number/null/string).
fn parse_value(s: &str) -> serde_json::Value {
    match s {
        "true" => serde_json::Value::Bool(true),
        "false" => serde_json::Value::Bool(false),
        "null" => serde_json::Value::Null,
        _ => {
            if let Ok(n) = s.parse::<i64>() {
                serde_json::Value::Number(n.into())
            } else if let Ok(f) = s.parse::<f64>() {
                serde_json::json!(f)
            } else {
                serde_json::Value::String(s.to_string())
            }
        }
    }
}

/// Apply `key = value` to `map`, rejecting unknown keys and values that
/// would not load.
fn apply(map: &mut ConfigMap, key: &str, value: &str) -> anyhow::Result<()> {
    if !effective(&ConfigMap::new())?.contains_key(key) {
        anyhow::bail!("unknown config key {key:?} (see `cairn config list`)");
    }
    let mut candidate = map.clone();
    candidate.insert(key.to_string(), parse_value(value));
    let config: Config = serde_json::from_value(serde_json::Value::Object(candidate.clone()))
        .with_context(|| format!("invalid value for {key}: {value}"))?;
    config.validate()?;
    *map = candidate;
    Ok(())
}

/// `cairn config set <key> <value>`
pub fn set(repo_root: &Path, key: &str, value: &str) -> anyhow::Result<()> {
    let paths = CairnPaths::discover(repo_root);
    let mut config = read_config(&paths.config_json)?;
    apply(&mut config, key, value)?;
    let json = serde_json::to_string_pretty(&config)? + "\n";
    cairn_store::write_atomic(&paths.config_json, json.as_bytes())?;
    println!("{key} = {value}");
    Ok(())
}

/// `cairn config get <key>`
pub fn get(repo_root: &Path, key: &str) -> anyhow::Result<()> {
    let paths = CairnPaths::discover(repo_root);
    let config = effective(&read_config(&paths.config_json)?)?;
    match config.get(key) {
        Some(val) => println!("{val}"),
        None => println!("(not set)"),
    }
    Ok(())
}

/// `cairn config list`
pub fn list(repo_root: &Path) -> anyhow::Result<()> {
    let paths = CairnPaths::discover(repo_root);
    for (k, v) in &effective(&read_config(&paths.config_json)?)? {
        println!("{k} = {v}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_value_types() {
        assert_eq!(parse_value("true"), serde_json::Value::Bool(true));
        assert_eq!(parse_value("12"), serde_json::json!(12));
        assert_eq!(parse_value("0.5"), serde_json::json!(0.5));
        assert_eq!(parse_value("null"), serde_json::Value::Null);
        assert_eq!(parse_value("minds"), serde_json::json!("minds"));
    }

    #[test]
    fn apply_validates() {
        let mut map = ConfigMap::new();
        apply(&mut map, "maxCommitsPerDay", "5").unwrap();
        assert_eq!(map["maxCommitsPerDay"], 5);

        assert!(apply(&mut map, "maxCommitsPerDay", "0").is_err());
        assert!(apply(&mut map, "enableTags", "sometimes").is_err());
        assert!(apply(&mut map, "noSuchKey", "1").is_err());
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn set_then_get_through_file() {
        let tmp = tempfile::tempdir().unwrap();
        set(tmp.path(), "remoteUrl", "git@example.com:thoughts.git").unwrap();
        let map = read_config(&tmp.path().join("config.json")).unwrap();
        assert_eq!(map["remoteUrl"], "git@example.com:thoughts.git");
        let full = effective(&map).unwrap();
        assert_eq!(full["branchPrefix"], "thoughts");
    }
}
