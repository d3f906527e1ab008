use anyhow::bail;
use config::{Config, Environment};
use serde::Deserialize;

use crate::{chains::ChainKind, settlement::check_seeds};

/// Process configuration, read from environment-style keys
/// (`SETTLEMENT_URL`, `DB_PATH`, ...) and validated at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// JSON-RPC endpoint of the settlement chain node.
    pub settlement_url: String,
    /// 12-word seed phrase of the relayer's settlement account.
    pub settlement_seeds: String,
    /// Path of the SQLite database holding scan cursors.
    pub db_path: String,

    #[serde(default = "default_monitor_enable")]
    pub evm_monitor_enable: bool,
    /// Required when the monitor is enabled.
    #[serde(default)]
    pub evm_endpoint_url: String,
    /// Required when the monitor is enabled.
    #[serde(default)]
    pub evm_contract_address: String,
    #[serde(default)]
    pub evm_chain: ChainKind,
}

fn default_monitor_enable() -> bool {
    true
}

impl Settings {
    pub fn load() -> anyhow::Result<Self> {
        let settings: Settings = Config::builder()
            .add_source(Environment::default().try_parsing(true))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if !check_seeds(&self.settlement_seeds) {
            bail!("config param 'SETTLEMENT_SEEDS' must be a 12 word seed phrase");
        }
        if self.evm_monitor_enable {
            if self.evm_endpoint_url.is_empty() {
                bail!("required config param 'EVM_ENDPOINT_URL' missing");
            }
            if self.evm_contract_address.is_empty() {
                bail!("required config param 'EVM_CONTRACT_ADDRESS' missing");
            }
        }
        Ok(())
    }
}
