use std::env;
use std::time::Duration;

use anonn_common::{rule_address, Address, CommonError, EpochConfig};
use anonn_oauth::OAuthConfig;
use anonn_prover::ProverConfig;
use anyhow::{Context, Result};

pub const DEFAULT_RPC_URL: &str = "https://api.devnet.solana.com";
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Client configuration for one anonn deployment.
#[derive(Clone, Debug)]
pub struct AnonnConfig {
    /// Ledger JSON-RPC endpoint.
    pub rpc_url: String,
    /// Timeout applied to each ledger RPC call.
    pub rpc_timeout: Duration,
    pub prover: ProverConfig,
    pub oauth: OAuthConfig,
    pub epoch: EpochConfig,
    /// Default rule id for proof requests.
    pub rule_id: Option<String>,
    /// Authority that registered the default rule.
    pub rule_authority: Option<Address>,
}

impl AnonnConfig {
    pub fn new(program_id: Address, app_origin: impl Into<String>) -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            prover: ProverConfig::new(program_id),
            oauth: OAuthConfig::new(app_origin),
            epoch: EpochConfig::default(),
            rule_id: None,
            rule_authority: None,
        }
    }

    /// Load configuration from the environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let prover = ProverConfig::from_env()?;
        let oauth = OAuthConfig::from_env()?;
        let epoch = EpochConfig::from_env();

        let rpc_url = env::var("ANONN_RPC_URL").unwrap_or_else(|_| DEFAULT_RPC_URL.to_string());
        let rule_id = env::var("ANONN_RULE_ID").ok().filter(|s| !s.is_empty());
        let rule_authority = match env::var("ANONN_RULE_AUTHORITY") {
            Ok(value) if !value.is_empty() => Some(
                value
                    .parse()
                    .context("ANONN_RULE_AUTHORITY must be a base58 address")?,
            ),
            _ => None,
        };

        Ok(Self {
            rpc_url,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            prover,
            oauth,
            epoch,
            rule_id,
            rule_authority,
        })
    }

    pub fn program_id(&self) -> Address {
        self.prover.program_id
    }

    /// Address of the configured default rule, if both its id and authority are set.
    pub fn default_rule_address(&self) -> Result<Option<Address>, CommonError> {
        match (&self.rule_id, &self.rule_authority) {
            (Some(rule_id), Some(authority)) => {
                rule_address(&self.prover.program_id, authority, rule_id).map(Some)
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rule_address_needs_id_and_authority() {
        let program = Address::new([7u8; 32]);
        let authority = Address::new([8u8; 32]);
        let mut config = AnonnConfig::new(program, "https://app.example");
        assert_eq!(config.default_rule_address().unwrap(), None);

        config.rule_id = Some("priority_v1".into());
        assert_eq!(config.default_rule_address().unwrap(), None);

        config.rule_authority = Some(authority);
        assert_eq!(
            config.default_rule_address().unwrap(),
            Some(rule_address(&program, &authority, "priority_v1").unwrap())
        );
    }

    #[test]
    fn test_defaults() {
        let config = AnonnConfig::new(Address::new([7u8; 32]), "https://app.example");
        assert_eq!(config.rpc_url, DEFAULT_RPC_URL);
        assert_eq!(config.epoch.period_secs, 86_400);
        assert_eq!(config.prover.cluster_offset, 0);
    }
}
