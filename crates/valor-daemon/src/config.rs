// crates/valor-daemon/src/config.rs
//
// Runtime configuration for the Valor ledger daemon.
// Loaded from a TOML file or populated with sensible defaults. Ledger
// sections ([emission], [staking], ...) sit at the top level of the same file.

use serde::Deserialize;
use std::fs;

use valor_ledger::LedgerConfig;

/// Runtime configuration for the daemon.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// JSON-lines file of relayed envelopes to replay at startup.
    #[serde(default = "default_inbox_path")]
    pub inbox_path: String,

    /// Seconds between retries of payouts the relay refused.
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,

    #[serde(flatten)]
    pub ledger: LedgerConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_inbox_path() -> String {
    "~/.valor/inbox.jsonl".to_string()
}

fn default_flush_interval_secs() -> u64 {
    30
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            inbox_path: default_inbox_path(),
            flush_interval_secs: default_flush_interval_secs(),
            ledger: LedgerConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a TOML file at the given path.
    ///
    /// Returns an error if the file cannot be read, parsed, or describes a
    /// ledger that cannot run.
    pub fn load(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Like `load`, but a missing file yields `None` so the caller can fall
    /// back to defaults. Unreadable, malformed, or invalid files still fail.
    pub fn load_optional(path: &str) -> Result<Option<Self>, Box<dyn std::error::Error>> {
        match fs::read_to_string(path) {
            Ok(contents) => Self::from_toml_str(&contents).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let config: DaemonConfig = toml::from_str(contents)?;
        config.ledger.validate()?;
        Ok(config)
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return format!("{}/{}", home.display(), rest);
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DaemonConfig::from_toml_str("").unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.flush_interval_secs, 30);
        assert_eq!(config.ledger, LedgerConfig::default());
    }

    #[test]
    fn test_ledger_sections_at_top_level() {
        let config = DaemonConfig::from_toml_str(
            r#"
            log_level = "debug"
            inbox_path = "/var/lib/valor/inbox.jsonl"

            [emission]
            rate_per_second = "5"
            start_timestamp = 10

            [peers]
            trusted_chains = [3]
            "#,
        )
        .unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.inbox_path, "/var/lib/valor/inbox.jsonl");
        assert_eq!(config.ledger.emission.rate_per_second, 5);
        assert_eq!(config.ledger.emission.start_timestamp, 10);
        assert_eq!(config.ledger.peers.trusted_chains, vec![3]);
    }

    #[test]
    fn test_invalid_ledger_rejected() {
        assert!(DaemonConfig::from_toml_str("[redemption]\nbatch_duration_secs = 0\n").is_err());
    }

    #[test]
    fn test_load_optional_only_tolerates_missing_file() {
        assert!(DaemonConfig::load_optional("/nonexistent/valor/config.toml")
            .unwrap()
            .is_none());

        let path = std::env::temp_dir().join(format!("valor-daemon-config-{}.toml", std::process::id()));
        fs::write(&path, "[[access.grants]]\nprincipal = \"0x0000000000000000000000000000000000000000000000000000000000000000\"\npermissions = [\"admin\"]\n").unwrap();
        let result = DaemonConfig::load_optional(path.to_str().unwrap());
        fs::remove_file(&path).unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn test_expand_tilde_leaves_absolute_paths() {
        assert_eq!(expand_tilde("/tmp/inbox.jsonl"), "/tmp/inbox.jsonl");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/inbox.jsonl"), format!("{}/inbox.jsonl", home.display()));
        }
    }
}
