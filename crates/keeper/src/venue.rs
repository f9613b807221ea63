//! Lending venue capability set.

use apy_math::{Observation, PriceE8, Wad};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::KeeperResult;

/// A lending venue the position earns yield on
#[async_trait]
pub trait Venue: Send + Sync {
    fn name(&self) -> &str;

    /// Withdrawable principal, normalized to 18 decimals
    async fn current_balance(&self) -> KeeperResult<Wad>;

    /// Accrued reward token balance, claimed or not
    async fn current_reward(&self) -> KeeperResult<Wad>;

    /// Reward token price in principal units
    async fn current_reward_price(&self) -> KeeperResult<PriceE8>;

    /// Claim rewards and withdraw everything. Returns the principal received
    /// once the transactions are confirmed.
    async fn withdraw_all(&self) -> KeeperResult<Wad>;
}

/// How a cycle determines the principal balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettleMode {
    /// Read the balance in place
    #[default]
    Observe,
    /// Withdraw everything and count what came back
    Withdraw,
}

/// Take one observation of `venue`, stamped with `timestamp` (Unix seconds).
///
/// Rewards are read after settling so that rewards claimed by the
/// withdrawal are counted.
pub async fn read_observation(venue: &dyn Venue, settle: SettleMode, timestamp: i64) -> KeeperResult<Observation> {
    let balance = match settle {
        SettleMode::Observe => venue.current_balance().await?,
        SettleMode::Withdraw => venue.withdraw_all().await?,
    };
    let reward_balance = venue.current_reward().await?;
    let reward_price = venue.current_reward_price().await?;

    debug!(
        venue = venue.name(),
        %balance,
        %reward_balance,
        %reward_price,
        timestamp,
        "observed venue"
    );
    Ok(Observation {
        balance,
        reward_balance,
        reward_price,
        timestamp,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use crate::error::KeeperError;

    /// Venue returning scripted readings
    pub(crate) struct FakeVenue {
        pub name: String,
        pub balance: Mutex<Wad>,
        pub reward: Mutex<Wad>,
        pub price: PriceE8,
        pub withdrawals: AtomicUsize,
        pub broken: bool,
    }

    impl FakeVenue {
        pub(crate) fn new(name: &str, balance: &str, reward: &str, price: &str) -> Self {
            Self {
                name: name.to_string(),
                balance: Mutex::new(Wad::parse(balance).unwrap()),
                reward: Mutex::new(Wad::parse(reward).unwrap()),
                price: PriceE8::parse(price).unwrap(),
                withdrawals: AtomicUsize::new(0),
                broken: false,
            }
        }

        pub(crate) fn set(&self, balance: &str, reward: &str) {
            *self.balance.lock().unwrap() = Wad::parse(balance).unwrap();
            *self.reward.lock().unwrap() = Wad::parse(reward).unwrap();
        }

        fn check(&self) -> KeeperResult<()> {
            if self.broken {
                return Err(KeeperError::venue(&self.name, "node unreachable"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Venue for FakeVenue {
        fn name(&self) -> &str {
            &self.name
        }

        async fn current_balance(&self) -> KeeperResult<Wad> {
            self.check()?;
            Ok(self.balance.lock().unwrap().clone())
        }

        async fn current_reward(&self) -> KeeperResult<Wad> {
            self.check()?;
            Ok(self.reward.lock().unwrap().clone())
        }

        async fn current_reward_price(&self) -> KeeperResult<PriceE8> {
            self.check()?;
            Ok(self.price.clone())
        }

        async fn withdraw_all(&self) -> KeeperResult<Wad> {
            self.check()?;
            self.withdrawals.fetch_add(1, Ordering::SeqCst);
            let mut balance = self.balance.lock().unwrap();
            Ok(std::mem::take(&mut *balance))
        }
    }

    /// Shared handle so tests can change readings between cycles
    #[async_trait]
    impl Venue for Arc<FakeVenue> {
        fn name(&self) -> &str {
            &self.name
        }

        async fn current_balance(&self) -> KeeperResult<Wad> {
            self.as_ref().current_balance().await
        }

        async fn current_reward(&self) -> KeeperResult<Wad> {
            self.as_ref().current_reward().await
        }

        async fn current_reward_price(&self) -> KeeperResult<PriceE8> {
            self.as_ref().current_reward_price().await
        }

        async fn withdraw_all(&self) -> KeeperResult<Wad> {
            self.as_ref().withdraw_all().await
        }
    }

    #[tokio::test]
    async fn test_observe_leaves_position_in_place() {
        let venue = FakeVenue::new("compound", "100.0", "0.5", "300.0");

        let obs = read_observation(&venue, SettleMode::Observe, 1_000).await.unwrap();

        assert_eq!(obs.balance, Wad::from_integer(100));
        assert_eq!(obs.reward_balance, Wad::parse("0.5").unwrap());
        assert_eq!(obs.reward_price, PriceE8::from_integer(300));
        assert_eq!(obs.timestamp, 1_000);
        assert_eq!(venue.withdrawals.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_withdraw_counts_received_principal() {
        let venue = FakeVenue::new("aave", "250.0", "1.0", "90.0");

        let obs = read_observation(&venue, SettleMode::Withdraw, 2_000).await.unwrap();

        assert_eq!(obs.balance, Wad::from_integer(250));
        assert_eq!(venue.withdrawals.load(Ordering::SeqCst), 1);
        assert!(venue.current_balance().await.unwrap().is_zero());
    }

    #[test]
    fn test_settle_mode_names() {
        assert_eq!(serde_json::to_string(&SettleMode::Withdraw).unwrap(), "\"withdraw\"");
        assert_eq!(SettleMode::default(), SettleMode::Observe);
    }
}
