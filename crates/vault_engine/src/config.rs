//! Vault configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants::{FOUR_DECIMALS, MAX_LIQUIDATION_MAX_LIMIT_BPS};
use crate::error::{VaultError, VaultResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Vault id in the registry
    pub vault_id: u16,

    /// Max debt/collateral value for withdraw and borrow (basis points)
    pub collateral_factor_bps: u16,

    /// Positions above this debt/collateral value are liquidatable (basis points)
    pub liquidation_threshold_bps: u16,

    /// Positions above this debt/collateral value are bad debt and get absorbed
    pub liquidation_max_limit_bps: u16,

    /// Fee added to every borrow (basis points)
    pub borrow_fee_bps: u16,

    /// Smallest raw amount an operate delta or a liquidation may move
    pub min_operate_amount: u64,

    /// Tick leftovers below this raw debt are absorbed during liquidation
    pub min_tick_debt: u64,

    /// Cap on the vault's total borrowed tokens; unlimited when absent
    #[serde(default)]
    pub borrow_limit: Option<u64>,

    /// Share of the liquidity layer's debt liquidity this vault may borrow
    pub max_utilization_bps: u16,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            vault_id: 1,
            collateral_factor_bps: 8_000,     // 80%
            liquidation_threshold_bps: 8_100, // 81%
            liquidation_max_limit_bps: 9_000, // 90%
            borrow_fee_bps: 0,
            min_operate_amount: 1_000,
            min_tick_debt: 10_000,
            borrow_limit: None,
            max_utilization_bps: 10_000,
        }
    }
}

impl VaultConfig {
    /// Load configuration from the TOML file named by `VAULT_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("VAULT_CONFIG")
            .unwrap_or_else(|_| "vault-config.toml".to_string());
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &str) -> Result<Self> {
        let config_str = std::fs::read_to_string(&config_path)
            .context(format!("Failed to read config file: {}", config_path))?;

        Self::from_toml_str(&config_str)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: VaultConfig = toml::from_str(config_str)
            .context("Failed to parse config TOML")?;

        config.validate().context("Config failed validation")?;

        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Write default config to file
    pub fn write_default(path: &str) -> Result<()> {
        let toml_str = Self::default().to_toml_string()?;

        std::fs::write(path, toml_str)
            .context(format!("Failed to write config to {}", path))?;

        log::info!("Created default vault config at {}", path);
        Ok(())
    }

    /// collateral factor < liquidation threshold < liquidation max limit <= 99.7%
    pub fn validate(&self) -> VaultResult<()> {
        if self.collateral_factor_bps == 0 {
            return Err(VaultError::InvalidConfig(
                "collateral_factor_bps must be positive".to_string(),
            ));
        }
        if self.collateral_factor_bps >= self.liquidation_threshold_bps {
            return Err(VaultError::InvalidConfig(format!(
                "collateral_factor_bps {} must be below liquidation_threshold_bps {}",
                self.collateral_factor_bps, self.liquidation_threshold_bps
            )));
        }
        if self.liquidation_threshold_bps >= self.liquidation_max_limit_bps {
            return Err(VaultError::InvalidConfig(format!(
                "liquidation_threshold_bps {} must be below liquidation_max_limit_bps {}",
                self.liquidation_threshold_bps, self.liquidation_max_limit_bps
            )));
        }
        if self.liquidation_max_limit_bps > MAX_LIQUIDATION_MAX_LIMIT_BPS {
            return Err(VaultError::InvalidConfig(format!(
                "liquidation_max_limit_bps {} above {}",
                self.liquidation_max_limit_bps, MAX_LIQUIDATION_MAX_LIMIT_BPS
            )));
        }
        if self.borrow_fee_bps as u128 >= FOUR_DECIMALS {
            return Err(VaultError::InvalidConfig(
                "borrow_fee_bps must be below 100%".to_string(),
            ));
        }
        if self.max_utilization_bps == 0 || self.max_utilization_bps as u128 > FOUR_DECIMALS {
            return Err(VaultError::InvalidConfig(
                "max_utilization_bps must be in (0, 10000]".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_default_then_load() {
        let path = std::env::temp_dir().join(format!("vault-config-{}.toml", std::process::id()));
        let path = path.to_str().unwrap();
        VaultConfig::write_default(path).unwrap();
        assert_eq!(VaultConfig::load_from(path).unwrap(), VaultConfig::default());
        std::fs::remove_file(path).unwrap();

        assert!(VaultConfig::load_from("/nonexistent/vault-config.toml").is_err());
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = VaultConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.collateral_factor_bps, 8_000);
        assert_eq!(config.borrow_limit, None);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = VaultConfig {
            borrow_limit: Some(5_000_000),
            borrow_fee_bps: 25,
            ..VaultConfig::default()
        };
        let text = config.to_toml_string().unwrap();
        let parsed = VaultConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_borrow_limit_optional_in_toml() {
        let text = r#"
            vault_id = 3
            collateral_factor_bps = 7000
            liquidation_threshold_bps = 7500
            liquidation_max_limit_bps = 8500
            borrow_fee_bps = 0
            min_operate_amount = 10
            min_tick_debt = 100
            max_utilization_bps = 9000
        "#;
        let config = VaultConfig::from_toml_str(text).unwrap();
        assert_eq!(config.vault_id, 3);
        assert_eq!(config.borrow_limit, None);
    }

    #[test]
    fn test_validate_rejects_bad_ordering() {
        let config = VaultConfig {
            collateral_factor_bps: 8_100,
            ..VaultConfig::default()
        };
        assert!(matches!(config.validate(), Err(VaultError::InvalidConfig(_))));

        let config = VaultConfig {
            liquidation_max_limit_bps: 9_980,
            ..VaultConfig::default()
        };
        assert!(matches!(config.validate(), Err(VaultError::InvalidConfig(_))));

        let config = VaultConfig {
            liquidation_threshold_bps: 9_000,
            ..VaultConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml_str_reports_validation_failure() {
        let mut config = VaultConfig::default();
        config.max_utilization_bps = 0;
        let text = toml::to_string(&config).unwrap();
        let err = VaultConfig::from_toml_str(&text).unwrap_err();
        assert!(format!("{:#}", err).contains("max_utilization_bps"));
    }
}
