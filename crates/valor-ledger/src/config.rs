// crates/valor-ledger/src/config.rs
//
// Ledger configuration: emission schedule, lock and vesting periods, batch
// windows, root activation policy, initial permission grants, and trusted
// peer chains. Loaded from TOML or populated with defaults.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use valor_core::token::amount_serde;
use valor_core::{AccountId, Amount, LedgerError, Permission};
use valor_economics::{
    ActivationPolicy, DEFAULT_BATCH_DURATION_SECS, DEFAULT_UNSTAKE_LOCK_SECS,
    DEFAULT_VESTING_LINEAR_SECS, DEFAULT_VESTING_LOCK_SECS,
};

/// One Valor in base units (18 decimals).
const ONE_VALOR: Amount = 1_000_000_000_000_000_000;

/// Top-level ledger configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub emission: EmissionConfig,
    #[serde(default)]
    pub staking: StakingConfig,
    #[serde(default)]
    pub vesting: VestingConfig,
    #[serde(default)]
    pub redemption: RedemptionConfig,
    #[serde(default)]
    pub distribution: DistributionConfig,
    #[serde(default)]
    pub access: AccessConfig,
    #[serde(default)]
    pub peers: PeersConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EmissionConfig {
    /// Valor base units emitted per second. Integer or decimal string.
    #[serde(default = "default_rate_per_second", deserialize_with = "amount_serde::deserialize")]
    pub rate_per_second: Amount,

    /// Hard ceiling on total emission. Integer or decimal string.
    #[serde(default = "default_emission_cap", deserialize_with = "amount_serde::deserialize")]
    pub cap: Amount,

    /// Unix timestamp at which emission begins.
    #[serde(default)]
    pub start_timestamp: u64,
}

fn default_rate_per_second() -> Amount {
    ONE_VALOR
}

fn default_emission_cap() -> Amount {
    100_000_000 * ONE_VALOR
}

impl Default for EmissionConfig {
    fn default() -> Self {
        Self {
            rate_per_second: default_rate_per_second(),
            cap: default_emission_cap(),
            start_timestamp: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StakingConfig {
    #[serde(default = "default_unstake_lock_secs")]
    pub unstake_lock_secs: u64,

    /// Whether record-kind balances earn emission alongside primary stake.
    #[serde(default = "default_true")]
    pub record_counts_toward_emission: bool,
}

fn default_unstake_lock_secs() -> u64 {
    DEFAULT_UNSTAKE_LOCK_SECS
}

fn default_true() -> bool {
    true
}

impl Default for StakingConfig {
    fn default() -> Self {
        Self {
            unstake_lock_secs: default_unstake_lock_secs(),
            record_counts_toward_emission: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VestingConfig {
    #[serde(default = "default_vesting_lock_secs")]
    pub lock_secs: u64,

    #[serde(default = "default_vesting_linear_secs")]
    pub linear_secs: u64,
}

fn default_vesting_lock_secs() -> u64 {
    DEFAULT_VESTING_LOCK_SECS
}

fn default_vesting_linear_secs() -> u64 {
    DEFAULT_VESTING_LINEAR_SECS
}

impl Default for VestingConfig {
    fn default() -> Self {
        Self {
            lock_secs: default_vesting_lock_secs(),
            linear_secs: default_vesting_linear_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RedemptionConfig {
    /// Start of batch 0. Defaults to the emission start.
    #[serde(default)]
    pub epoch_start: Option<u64>,

    #[serde(default = "default_batch_duration_secs")]
    pub batch_duration_secs: u64,
}

fn default_batch_duration_secs() -> u64 {
    DEFAULT_BATCH_DURATION_SECS
}

impl Default for RedemptionConfig {
    fn default() -> Self {
        Self {
            epoch_start: None,
            batch_duration_secs: default_batch_duration_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DistributionConfig {
    /// `on_claim` or `explicit`.
    #[serde(default)]
    pub activation_policy: ActivationPolicy,
}

/// A principal and the permissions it starts with.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Grant {
    pub principal: AccountId,
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AccessConfig {
    #[serde(default)]
    pub grants: Vec<Grant>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PeersConfig {
    /// Chains whose relayed envelopes are accepted.
    #[serde(default)]
    pub trusted_chains: Vec<u32>,
}

impl LedgerConfig {
    /// Load configuration from a TOML file at the given path.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| LedgerError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, LedgerError> {
        let config: LedgerConfig =
            toml::from_str(contents).map_err(|e| LedgerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the ledger cannot run with.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.redemption.batch_duration_secs == 0 {
            return Err(LedgerError::Config(
                "redemption.batch_duration_secs must be greater than zero".into(),
            ));
        }
        if self.emission.rate_per_second > 0 && self.emission.cap == 0 {
            return Err(LedgerError::Config(
                "emission.cap must be greater than zero when emission is enabled".into(),
            ));
        }
        if let Some(grant) = self.access.grants.iter().find(|g| g.principal.is_zero()) {
            return Err(LedgerError::Config(format!(
                "access grant to zero principal ({} permissions)",
                grant.permissions.len()
            )));
        }
        Ok(())
    }

    /// Start of batch 0.
    pub fn epoch_start(&self) -> u64 {
        self.redemption
            .epoch_start
            .unwrap_or(self.emission.start_timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LedgerConfig::from_toml_str("").unwrap();
        assert_eq!(config, LedgerConfig::default());
        assert_eq!(config.staking.unstake_lock_secs, 7 * 24 * 60 * 60);
        assert_eq!(config.vesting.lock_secs, 15 * 60);
        assert_eq!(config.vesting.linear_secs, 75 * 60);
        assert_eq!(config.redemption.batch_duration_secs, 14 * 24 * 60 * 60);
        assert_eq!(config.distribution.activation_policy, ActivationPolicy::OnClaim);
    }

    #[test]
    fn test_full_document() {
        let admin = AccountId([1u8; 32]);
        let doc = format!(
            r#"
            [emission]
            rate_per_second = "2_000_000_000_000_000_000"
            cap = 500
            start_timestamp = 1700000000

            [staking]
            unstake_lock_secs = 60
            record_counts_toward_emission = false

            [redemption]
            epoch_start = 1700000100
            batch_duration_secs = 3600

            [distribution]
            activation_policy = "explicit"

            [[access.grants]]
            principal = "{admin}"
            permissions = ["admin", "revenue_updater"]

            [peers]
            trusted_chains = [1, 10]
            "#
        );
        let config = LedgerConfig::from_toml_str(&doc).unwrap();
        assert_eq!(config.emission.rate_per_second, 2 * ONE_VALOR);
        assert_eq!(config.emission.cap, 500);
        assert!(!config.staking.record_counts_toward_emission);
        assert_eq!(config.epoch_start(), 1_700_000_100);
        assert_eq!(config.distribution.activation_policy, ActivationPolicy::Explicit);
        assert_eq!(config.access.grants[0].principal, admin);
        assert_eq!(
            config.access.grants[0].permissions,
            vec![Permission::Admin, Permission::RevenueUpdater]
        );
        assert_eq!(config.peers.trusted_chains, vec![1, 10]);
    }

    #[test]
    fn test_epoch_start_defaults_to_emission_start() {
        let config = LedgerConfig::from_toml_str("[emission]\nstart_timestamp = 42\n").unwrap();
        assert_eq!(config.epoch_start(), 42);
    }

    #[test]
    fn test_rejects_zero_batch_duration() {
        let err = LedgerConfig::from_toml_str("[redemption]\nbatch_duration_secs = 0\n").unwrap_err();
        assert!(matches!(err, LedgerError::Config(_)));
    }

    #[test]
    fn test_rejects_unknown_permission() {
        let doc = format!(
            "[[access.grants]]\nprincipal = \"{}\"\npermissions = [\"superuser\"]\n",
            AccountId([1u8; 32])
        );
        assert!(matches!(LedgerConfig::from_toml_str(&doc), Err(LedgerError::Config(_))));
    }

    #[test]
    fn test_rejects_zero_principal() {
        let doc = format!(
            "[[access.grants]]\nprincipal = \"{}\"\npermissions = [\"admin\"]\n",
            AccountId::ZERO
        );
        assert!(matches!(LedgerConfig::from_toml_str(&doc), Err(LedgerError::Config(_))));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            LedgerConfig::load("/nonexistent/valor.toml"),
            Err(LedgerError::Config(_))
        ));
    }
}
