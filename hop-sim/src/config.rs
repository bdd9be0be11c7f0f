//! Load simulator config from file and environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use hop_core::WatchdogConfig;
use serde::Deserialize;

/// Simulator configuration. File: ./hop-sim.toml, ~/.config/hop/sim.toml or /etc/hop/sim.toml.
/// Env overrides: HOP_TTL_MS, HOP_EXCHANGE_TIMEOUT_MS, HOP_MAX_ROUNDS.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Packet time-to-live in milliseconds (default 120000).
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,
    /// Upper bound on one exchange in milliseconds (default 30000).
    #[serde(default = "default_exchange_timeout_ms")]
    pub exchange_timeout_ms: u64,
    /// Pump rounds before the run is declared stuck (default 200).
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
    /// Pairs of node names that can hear each other.
    #[serde(default)]
    pub links: Vec<[String; 2]>,
    #[serde(default)]
    pub messages: Vec<MessageConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    pub name: String,
    /// Profile name; defaults to `name`.
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageConfig {
    pub from: String,
    pub to: String,
    pub text: String,
}

fn default_ttl_ms() -> u64 {
    120_000
}
fn default_exchange_timeout_ms() -> u64 {
    30_000
}
fn default_max_rounds() -> usize {
    200
}

impl Default for Config {
    /// Three devices in a line; the ends can only talk through the middle one.
    fn default() -> Self {
        let node = |name: &str| NodeConfig {
            name: name.to_owned(),
            display_name: None,
        };
        Self {
            ttl_ms: default_ttl_ms(),
            exchange_timeout_ms: default_exchange_timeout_ms(),
            max_rounds: default_max_rounds(),
            nodes: vec![node("a"), node("b"), node("c")],
            links: vec![
                ["a".to_owned(), "b".to_owned()],
                ["b".to_owned(), "c".to_owned()],
            ],
            messages: vec![MessageConfig {
                from: "a".to_owned(),
                to: "c".to_owned(),
                text: "hello from the other end".to_owned(),
            }],
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn watchdog(&self) -> WatchdogConfig {
        WatchdogConfig::default()
            .with_ttl(Duration::from_millis(self.ttl_ms))
            .with_exchange_timeout(Duration::from_millis(self.exchange_timeout_ms))
    }

    /// Apply HOP_* overrides read through `var`. Unparsable values are ignored.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("HOP_TTL_MS").and_then(|s| s.parse().ok()) {
            self.ttl_ms = v;
        }
        if let Some(v) = var("HOP_EXCHANGE_TIMEOUT_MS").and_then(|s| s.parse().ok()) {
            self.exchange_timeout_ms = v;
        }
        if let Some(v) = var("HOP_MAX_ROUNDS").and_then(|s| s.parse().ok()) {
            self.max_rounds = v;
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Load config: `explicit` if given, else the first existing default path, else built-in
/// defaults; then env vars.
pub fn load(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => config_paths().into_iter().find(|p| p.exists()),
    };
    let mut c = match path {
        Some(p) => load_file(&p)?,
        None => Config::default(),
    };
    c.apply_overrides(|key| std::env::var(key).ok());
    Ok(c)
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = vec![PathBuf::from("hop-sim.toml")];
    if let Some(h) = home {
        out.push(h.join(".config/hop/sim.toml"));
    }
    out.push(PathBuf::from("/etc/hop/sim.toml"));
    out
}

fn load_file(path: &Path) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Config::from_toml(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_file_gets_defaults() {
        let c = Config::from_toml("").unwrap();
        assert_eq!(c.ttl_ms, 120_000);
        assert_eq!(c.exchange_timeout_ms, 30_000);
        assert_eq!(c.max_rounds, 200);
        assert!(c.nodes.is_empty());
    }

    #[test]
    fn scenario_parses() {
        let c = Config::from_toml(
            r#"
            ttl_ms = 5000
            nodes = [{ name = "a", display_name = "Alice" }, { name = "b" }]
            links = [["a", "b"]]

            [[messages]]
            from = "a"
            to = "b"
            text = "hi"
            "#,
        )
        .unwrap();
        assert_eq!(c.ttl_ms, 5000);
        assert_eq!(c.nodes[0].display_name.as_deref(), Some("Alice"));
        assert_eq!(c.nodes[1].display_name, None);
        assert_eq!(c.links, vec![["a".to_owned(), "b".to_owned()]]);
        assert_eq!(c.messages[0].text, "hi");
        assert_eq!(c.watchdog().ttl, Duration::from_millis(5000));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_toml("proxy_port = 3128").is_err());
    }

    #[test]
    fn env_overrides_win() {
        let env = HashMap::from([
            ("HOP_TTL_MS", "10"),
            ("HOP_MAX_ROUNDS", "7"),
            ("HOP_EXCHANGE_TIMEOUT_MS", "not a number"),
        ]);
        let mut c = Config::default();
        c.apply_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(c.ttl_ms, 10);
        assert_eq!(c.max_rounds, 7);
        assert_eq!(c.exchange_timeout_ms, 30_000);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = load(Some(Path::new("/nonexistent/hop-sim.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
