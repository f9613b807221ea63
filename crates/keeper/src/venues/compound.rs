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

/// Compound v2 market: principal in a cToken, rewards in COMP
pub struct CompoundVenue {
    name: String,
    wallet: String,
    ctoken: String,
    comptroller: String,
    comp: Erc20,
    underlying: Erc20,
    feed: ChainlinkFeed,
    rpc: Arc<EthRpc>,
}

impl CompoundVenue {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        wallet: impl Into<String>,
        ctoken: impl Into<String>,
        comptroller: impl Into<String>,
        comp: Erc20,
        underlying: Erc20,
        feed: ChainlinkFeed,
        rpc: Arc<EthRpc>,
    ) -> Self {
        Self {
            name: name.into(),
            wallet: wallet.into(),
            ctoken: ctoken.into(),
            comptroller: comptroller.into(),
            comp,
            underlying,
            feed,
            rpc,
        }
    }
}

#[async_trait]
impl Venue for CompoundVenue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn current_balance(&self) -> KeeperResult<Wad> {
        let data = abi::calldata(selectors::BALANCE_OF_UNDERLYING, &[abi::encode_address(&self.wallet)?]);
        let ret = self.rpc.call(&self.ctoken, &data).await?;
        Ok(self.underlying.to_wad(abi::decode_uint(&ret, 0)?))
    }

    async fn current_reward(&self) -> KeeperResult<Wad> {
        self.comp.balance_of(&self.wallet).await
    }

    async fn current_reward_price(&self) -> KeeperResult<PriceE8> {
        self.feed.latest_price().await
    }

    async fn withdraw_all(&self) -> KeeperResult<Wad> {
        let before = self.underlying.raw_balance_of(&self.wallet).await?;

        let claim = abi::calldata(selectors::CLAIM_COMP, &[abi::encode_address(&self.wallet)?]);
        self.rpc.transact(&self.wallet, &self.comptroller, &claim).await?;

        let ctoken = Erc20::new(self.ctoken.clone(), 0, self.rpc.clone());
        let shares = ctoken.raw_balance_of(&self.wallet).await?;
        let redeem = abi::calldata(selectors::REDEEM, &[abi::encode_uint(&shares)?]);
        let receipt = self.rpc.transact(&self.wallet, &self.ctoken, &redeem).await?;

        let after = self.underlying.raw_balance_of(&self.wallet).await?;
        let received = BigInt::from(after) - BigInt::from(before);
        info!(venue = %self.name, tx = %receipt.transaction_hash, %shares, "redeemed cToken position");
        Ok(Wad::from_units(received, self.underlying.decimals()))
    }
}
