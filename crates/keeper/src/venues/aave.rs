use std::sync::Arc;

use apy_math::{PriceE8, Wad};
use async_trait::async_trait;
use num_bigint::BigInt;
use tracing::info;

use super::price_feed::ChainlinkFeed;
use super::token::Erc20;
use crate::abi::{self, selectors};
use crate::error::KeeperResult;
use crate::rpc::EthRpc;
use crate::venue::Venue;

/// Aave v2 reserve: principal in an aToken, rewards from the incentives controller
pub struct AaveVenue {
    name: String,
    wallet: String,
    lending_pool: String,
    incentives_controller: String,
    a_token: Erc20,
    /// Reward token decimals (18 for stkAAVE)
    reward_decimals: u32,
    underlying: Erc20,
    feed: ChainlinkFeed,
    rpc: Arc<EthRpc>,
}

impl AaveVenue {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        wallet: impl Into<String>,
        lending_pool: impl Into<String>,
        incentives_controller: impl Into<String>,
        a_token: Erc20,
        underlying: Erc20,
        feed: ChainlinkFeed,
        rpc: Arc<EthRpc>,
    ) -> Self {
        Self {
            name: name.into(),
            wallet: wallet.into(),
            lending_pool: lending_pool.into(),
            incentives_controller: incentives_controller.into(),
            a_token,
            reward_decimals: 18,
            underlying,
            feed,
            rpc,
        }
    }
}

#[async_trait]
impl Venue for AaveVenue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn current_balance(&self) -> KeeperResult<Wad> {
        self.a_token.balance_of(&self.wallet).await
    }

    async fn current_reward(&self) -> KeeperResult<Wad> {
        let data = abi::calldata_with_array(
            selectors::GET_REWARDS_BALANCE,
            &[abi::encode_address(self.a_token.address())?],
            &[abi::encode_address(&self.wallet)?],
        );
        let ret = self.rpc.call(&self.incentives_controller, &data).await?;
        Ok(Wad::from_units(BigInt::from(abi::decode_uint(&ret, 0)?), self.reward_decimals))
    }

    async fn current_reward_price(&self) -> KeeperResult<PriceE8> {
        self.feed.latest_price().await
    }

    async fn withdraw_all(&self) -> KeeperResult<Wad> {
        let before = self.underlying.raw_balance_of(&self.wallet).await?;

        let data = abi::calldata(
            selectors::AAVE_WITHDRAW,
            &[
                abi::encode_address(self.underlying.address())?,
                abi::max_uint256(),
                abi::encode_address(&self.wallet)?,
            ],
        );
        let receipt = self.rpc.transact(&self.wallet, &self.lending_pool, &data).await?;

        let after = self.underlying.raw_balance_of(&self.wallet).await?;
        let received = BigInt::from(after) - BigInt::from(before);
        info!(venue = %self.name, tx = %receipt.transaction_hash, "withdrew aToken position");
        Ok(Wad::from_units(received, self.underlying.decimals()))
    }
}
