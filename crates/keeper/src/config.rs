use std::fs;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::abi;
use crate::endpoint::SUPPORTED_WIRE_DECIMALS;
use crate::error::{KeeperError, KeeperResult};
use crate::venue::SettleMode;

/// Keeper configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KeeperConfig {
    /// Ethereum JSON-RPC endpoint
    pub rpc_url: String,

    /// HTTP timeout for a single RPC request (seconds)
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,

    /// Receipt polling period while waiting for confirmation (milliseconds)
    #[serde(default = "default_receipt_poll_ms")]
    pub receipt_poll_ms: u64,

    /// Time between publishing cycles (seconds)
    pub poll_interval_secs: u64,

    /// Decimal scale keepers expect the APY integer in
    #[serde(default = "default_wire_decimals")]
    pub wire_decimals: u32,

    /// Node-managed account that signs keeper transactions
    pub sender: String,

    /// Retry configuration
    #[serde(default)]
    pub retry: RetryConfig,

    /// Venues to observe and publish for
    pub venues: Vec<VenueConfig>,
}

/// Configuration for one lending venue
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VenueConfig {
    /// Venue name for logging
    pub name: String,

    /// Whether this venue is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Read the balance in place or withdraw everything each cycle
    #[serde(default)]
    pub settle: SettleMode,

    /// Wallet holding the position
    pub wallet: String,

    /// Principal token (e.g. USDC)
    pub underlying: String,

    /// Native decimals of the principal token
    pub underlying_decimals: u32,

    /// Chainlink feed pricing the reward token
    pub price_feed: String,

    /// JSON file the snapshot history is kept in
    pub history_path: String,

    /// Protocol contracts
    pub contracts: VenueContracts,

    /// Keeper contracts to publish to, primary first
    pub keepers: Vec<KeeperTarget>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum VenueContracts {
    Compound {
        ctoken: String,
        comp: String,
        comptroller: String,
    },
    Aave {
        lending_pool: String,
        a_token: String,
        incentives_controller: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct KeeperTarget {
    pub name: String,
    pub address: String,
}

/// Retry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Explicit per-attempt timeouts in milliseconds; overrides the backoff
    pub timeouts_ms: Option<Vec<u64>>,

    /// Number of attempts when no explicit list is given
    pub max_retries: u32,

    /// Timeout of the first attempt in milliseconds
    pub base_timeout_ms: u64,

    /// Maximum timeout of any attempt in milliseconds
    pub max_timeout_ms: u64,

    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,
}

fn default_rpc_timeout_secs() -> u64 {
    30
}

fn default_receipt_poll_ms() -> u64 {
    2_000
}

fn default_wire_decimals() -> u32 {
    18
}

fn default_enabled() -> bool {
    true
}

impl KeeperConfig {
    /// Load configuration from TOML file
    pub fn load(path: &str) -> KeeperResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| KeeperError::InvalidConfig(format!("Failed to read config file {}: {}", path, e)))?;

        let config: KeeperConfig = toml::from_str(&content)
            .map_err(|e| KeeperError::InvalidConfig(format!("Failed to parse config file {}: {}", path, e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: &str) -> KeeperResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| KeeperError::SerializationError(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> KeeperResult<()> {
        if self.venues.is_empty() {
            return Err(KeeperError::invalid_parameter("venues", "empty", "at least one venue"));
        }

        if self.rpc_url.is_empty() {
            return Err(KeeperError::invalid_parameter("rpc_url", "empty", "an http(s) URL"));
        }

        if self.poll_interval_secs == 0 {
            return Err(KeeperError::invalid_parameter("poll_interval_secs", "0", "greater than 0"));
        }

        if self.receipt_poll_ms == 0 {
            return Err(KeeperError::invalid_parameter("receipt_poll_ms", "0", "greater than 0"));
        }

        if !SUPPORTED_WIRE_DECIMALS.contains(&self.wire_decimals) {
            return Err(KeeperError::invalid_parameter(
                "wire_decimals",
                &self.wire_decimals.to_string(),
                &format!("one of {:?}", SUPPORTED_WIRE_DECIMALS),
            ));
        }

        validate_address("sender", &self.sender)?;

        for venue in &self.venues {
            venue.validate()?;
        }

        self.retry.validate()?;

        Ok(())
    }

    /// Get enabled venues in configuration order
    pub fn enabled_venues(&self) -> Vec<&VenueConfig> {
        self.venues.iter().filter(|v| v.enabled).collect()
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub fn receipt_poll(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

fn validate_address(parameter: &str, address: &str) -> KeeperResult<()> {
    abi::parse_address(address)
        .map(|_| ())
        .map_err(|_| KeeperError::invalid_parameter(parameter, address, "a 0x-prefixed 20-byte address"))
}

impl VenueConfig {
    /// Validate venue configuration
    fn validate(&self) -> KeeperResult<()> {
        if self.name.is_empty() {
            return Err(KeeperError::invalid_parameter("venue name", "empty", "non-empty string"));
        }

        validate_address(&format!("{}.wallet", self.name), &self.wallet)?;
        validate_address(&format!("{}.underlying", self.name), &self.underlying)?;
        validate_address(&format!("{}.price_feed", self.name), &self.price_feed)?;

        if self.underlying_decimals > 36 {
            return Err(KeeperError::invalid_parameter(
                &format!("{}.underlying_decimals", self.name),
                &self.underlying_decimals.to_string(),
                "at most 36",
            ));
        }

        if self.history_path.is_empty() {
            return Err(KeeperError::invalid_parameter(
                &format!("{}.history_path", self.name),
                "empty",
                "a file path",
            ));
        }

        match &self.contracts {
            VenueContracts::Compound { ctoken, comp, comptroller } => {
                validate_address(&format!("{}.ctoken", self.name), ctoken)?;
                validate_address(&format!("{}.comp", self.name), comp)?;
                validate_address(&format!("{}.comptroller", self.name), comptroller)?;
            }
            VenueContracts::Aave {
                lending_pool,
                a_token,
                incentives_controller,
            } => {
                validate_address(&format!("{}.lending_pool", self.name), lending_pool)?;
                validate_address(&format!("{}.a_token", self.name), a_token)?;
                validate_address(&format!("{}.incentives_controller", self.name), incentives_controller)?;
            }
        }

        if self.keepers.is_empty() {
            return Err(KeeperError::invalid_parameter(
                &format!("{}.keepers", self.name),
                "empty",
                "at least one keeper endpoint",
            ));
        }
        for keeper in &self.keepers {
            if keeper.name.is_empty() {
                return Err(KeeperError::invalid_parameter(
                    &format!("{}.keepers.name", self.name),
                    "empty",
                    "non-empty string",
                ));
            }
            validate_address(&format!("{}.keepers.{}", self.name, keeper.name), &keeper.address)?;
        }

        Ok(())
    }

    pub fn kind(&self) -> &'static str {
        match self.contracts {
            VenueContracts::Compound { .. } => "compound",
            VenueContracts::Aave { .. } => "aave",
        }
    }
}

impl RetryConfig {
    /// Validate retry configuration
    fn validate(&self) -> KeeperResult<()> {
        if let Some(timeouts) = &self.timeouts_ms {
            if timeouts.is_empty() {
                return Err(KeeperError::invalid_parameter("timeouts_ms", "[]", "at least one timeout"));
            }
            if timeouts.contains(&0) {
                return Err(KeeperError::invalid_parameter(
                    "timeouts_ms",
                    &format!("{:?}", timeouts),
                    "every timeout greater than 0",
                ));
            }
            return Ok(());
        }

        if self.max_retries == 0 {
            return Err(KeeperError::invalid_parameter("max_retries", "0", "greater than 0"));
        }

        if self.base_timeout_ms == 0 {
            return Err(KeeperError::invalid_parameter("base_timeout_ms", "0", "greater than 0"));
        }

        if self.max_timeout_ms < self.base_timeout_ms {
            return Err(KeeperError::invalid_parameter(
                "max_timeout_ms",
                &self.max_timeout_ms.to_string(),
                &format!("greater than or equal to base_timeout_ms ({})", self.base_timeout_ms),
            ));
        }

        if self.backoff_multiplier < 1.0 {
            return Err(KeeperError::invalid_parameter(
                "backoff_multiplier",
                &self.backoff_multiplier.to_string(),
                "at least 1.0",
            ));
        }

        Ok(())
    }

    /// Calculate timeout for retry attempt
    pub fn timeout_for_attempt(&self, attempt: u32) -> u64 {
        if attempt == 0 {
            return self.base_timeout_ms;
        }

        let exponential = self.base_timeout_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        (exponential as u64).min(self.max_timeout_ms)
    }

    /// Ordered timeout budgets handed to the executor
    pub fn budgets(&self) -> Vec<Duration> {
        match &self.timeouts_ms {
            Some(timeouts) => timeouts.iter().map(|&ms| Duration::from_millis(ms)).collect(),
            None => (0..self.max_retries)
                .map(|attempt| Duration::from_millis(self.timeout_for_attempt(attempt)))
                .collect(),
        }
    }
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            rpc_timeout_secs: default_rpc_timeout_secs(),
            receipt_poll_ms: default_receipt_poll_ms(),
            poll_interval_secs: 3_600,
            wire_decimals: default_wire_decimals(),
            sender: KEEPER_SENDER.to_string(),
            retry: RetryConfig::default(),
            venues: vec![],
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeouts_ms: Some(vec![120_000; 4]),
            max_retries: 4,
            base_timeout_ms: 120_000,
            max_timeout_ms: 600_000,
            backoff_multiplier: 2.0,
        }
    }
}

const KEEPER_SENDER: &str = "0x21d0fd7c54e4c1A453906A3BcB7598aeE827b292";
const PRIMARY_KEEPER: &str = "0x3D433889a8d06E2330EedeE847612e878423eAE7";
const COMPOUND_BACKUP_KEEPER: &str = "0x80C150F2714b5bb7035f0C5428Ee06c0b5C70C88";
const USDC: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";

fn keepers(backup: Option<&str>) -> Vec<KeeperTarget> {
    let mut keepers = vec![KeeperTarget {
        name: "primary".to_string(),
        address: PRIMARY_KEEPER.to_string(),
    }];
    if let Some(address) = backup {
        keepers.push(KeeperTarget {
            name: "backup".to_string(),
            address: address.to_string(),
        });
    }
    keepers
}

/// Mainnet USDC positions on Compound and Aave
pub fn example_config() -> KeeperConfig {
    KeeperConfig {
        venues: vec![
            VenueConfig {
                name: "compound-usdc".to_string(),
                enabled: true,
                settle: SettleMode::Observe,
                wallet: "0xD7CFA9A98e0BDFDAcB5D7e07FBe9E528F057984D".to_string(),
                underlying: USDC.to_string(),
                underlying_decimals: 6,
                price_feed: "0xdbd020CAeF83eFd542f4De03e3cF0C28A4428bd5".to_string(),
                history_path: "results/compound.json".to_string(),
                contracts: VenueContracts::Compound {
                    ctoken: "0x39AA39c021dfbaE8faC545936693aC917d5E7563".to_string(),
                    comp: "0xc00e94Cb662C3520282E6f5717214004A7f26888".to_string(),
                    comptroller: "0x3d9819210A31b4961b30EF54bE2aeD79B9c9Cd3B".to_string(),
                },
                keepers: keepers(Some(COMPOUND_BACKUP_KEEPER)),
            },
            VenueConfig {
                name: "aave-usdc".to_string(),
                enabled: true,
                settle: SettleMode::Observe,
                wallet: "0x21d0fd7c54e4c1A453906A3BcB7598aeE827b292".to_string(),
                underlying: USDC.to_string(),
                underlying_decimals: 6,
                price_feed: "0x547a514d5e3769680Ce22B2361c10Ea13619e8a9".to_string(),
                history_path: "results/aave.json".to_string(),
                contracts: VenueContracts::Aave {
                    lending_pool: "0x7d2768dE32b0b80b7a3454c06BdAc94A69DDc7A9".to_string(),
                    a_token: "0xBcca60bB61934080951369a648Fb03DF4F96263C".to_string(),
                    incentives_controller: "0xd784927Ff2f95ba542BfC824c8a8a98F3495f6b5".to_string(),
                },
                keepers: keepers(None),
            },
        ],
        ..KeeperConfig::default()
    }
}

/// Create example configuration file
pub fn create_example_config(path: &str) -> KeeperResult<()> {
    example_config().save(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        let mut config = example_config();
        assert!(config.validate().is_ok());

        config.wire_decimals = 8;
        assert!(config.validate().is_err());
        config.wire_decimals = 16;
        assert!(config.validate().is_ok());

        config.venues[0].keepers.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_malformed_addresses() {
        let mut config = example_config();
        config.venues[1].wallet = "0x21d0fd7c".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("aave-usdc.wallet"));

        let mut config = example_config();
        config.sender = "not-an-address".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_setup() {
        assert!(KeeperConfig::default().validate().is_err());

        let mut config = example_config();
        config.poll_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_budgets() {
        let retry = RetryConfig::default();
        assert_eq!(retry.budgets(), vec![Duration::from_secs(120); 4]);

        let backoff = RetryConfig {
            timeouts_ms: None,
            max_retries: 4,
            base_timeout_ms: 1_000,
            max_timeout_ms: 5_000,
            backoff_multiplier: 2.0,
        };
        assert!(backoff.validate().is_ok());
        assert_eq!(backoff.timeout_for_attempt(0), 1_000);
        assert_eq!(backoff.timeout_for_attempt(1), 2_000);
        assert_eq!(backoff.timeout_for_attempt(2), 4_000);
        // Should cap at max_timeout_ms
        assert_eq!(backoff.timeout_for_attempt(3), 5_000);
        assert_eq!(backoff.budgets().len(), 4);

        let empty = RetryConfig {
            timeouts_ms: Some(vec![]),
            ..RetryConfig::default()
        };
        assert!(empty.validate().is_err());

        let zero = RetryConfig {
            timeouts_ms: Some(vec![1_000, 0]),
            ..RetryConfig::default()
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_example_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keeper.toml");
        let path = path.to_str().unwrap();

        create_example_config(path).unwrap();
        let loaded = KeeperConfig::load(path).unwrap();

        assert_eq!(loaded.venues.len(), 2);
        assert_eq!(loaded.venues[0].kind(), "compound");
        assert_eq!(loaded.venues[0].keepers.len(), 2);
        assert_eq!(loaded.venues[1].contracts, example_config().venues[1].contracts);
        assert_eq!(loaded.retry.budgets(), RetryConfig::default().budgets());
    }

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let toml = r#"
            rpc_url = "http://localhost:8545"
            poll_interval_secs = 60
            sender = "0x21d0fd7c54e4c1A453906A3BcB7598aeE827b292"

            [[venues]]
            name = "aave"
            wallet = "0x21d0fd7c54e4c1A453906A3BcB7598aeE827b292"
            underlying = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"
            underlying_decimals = 6
            price_feed = "0x547a514d5e3769680Ce22B2361c10Ea13619e8a9"
            history_path = "aave.json"
            settle = "withdraw"

            [venues.contracts]
            kind = "aave"
            lending_pool = "0x7d2768dE32b0b80b7a3454c06BdAc94A69DDc7A9"
            a_token = "0xBcca60bB61934080951369a648Fb03DF4F96263C"
            incentives_controller = "0xd784927Ff2f95ba542BfC824c8a8a98F3495f6b5"

            [[venues.keepers]]
            name = "primary"
            address = "0x3D433889a8d06E2330EedeE847612e878423eAE7"
        "#;

        let config: KeeperConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.wire_decimals, 18);
        assert_eq!(config.venues[0].settle, SettleMode::Withdraw);
        assert!(config.venues[0].enabled);
        assert_eq!(config.retry.budgets(), vec![Duration::from_secs(120); 4]);
    }
}
