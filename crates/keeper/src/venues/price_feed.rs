use std::sync::Arc;

use apy_math::PriceE8;
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive};

use crate::abi::{self, selectors};
use crate::error::{KeeperError, KeeperResult};
use crate::rpc::EthRpc;

/// Chainlink aggregator pricing a reward token in principal units
#[derive(Clone)]
pub struct ChainlinkFeed {
    address: String,
    rpc: Arc<EthRpc>,
}

impl ChainlinkFeed {
    pub fn new(address: impl Into<String>, rpc: Arc<EthRpc>) -> Self {
        Self {
            address: address.into(),
            rpc,
        }
    }

    pub async fn decimals(&self) -> KeeperResult<u32> {
        let ret = self.rpc.call(&self.address, &abi::calldata(selectors::DECIMALS, &[])).await?;
        abi::decode_uint(&ret, 0)?
            .to_u32()
            .ok_or_else(|| KeeperError::venue(&self.address, "feed decimals out of range"))
    }

    /// Latest answer on the 8-decimal price scale
    pub async fn latest_price(&self) -> KeeperResult<PriceE8> {
        let decimals = self.decimals().await?;
        // (roundId, answer, startedAt, updatedAt, answeredInRound)
        let ret = self
            .rpc
            .call(&self.address, &abi::calldata(selectors::LATEST_ROUND_DATA, &[]))
            .await?;
        let answer = abi::decode_int(&ret, 1)?;
        price_from_answer(&self.address, answer, decimals)
    }
}

fn price_from_answer(feed: &str, answer: BigInt, decimals: u32) -> KeeperResult<PriceE8> {
    if !answer.is_positive() {
        return Err(KeeperError::venue(feed, format!("non-positive feed answer {}", answer)));
    }
    Ok(PriceE8::from_units(answer, decimals))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_scaling() {
        let price = price_from_answer("feed", BigInt::from(30_012_000_000i64), 8).unwrap();
        assert_eq!(price, PriceE8::parse("300.12").unwrap());

        // 18-decimal feeds are truncated onto the 8-decimal scale
        let precise = price_from_answer("feed", BigInt::from(1_500_000_000_123_456_789i64), 18).unwrap();
        assert_eq!(precise, PriceE8::parse("1.50000000").unwrap());
    }

    #[test]
    fn test_rejects_non_positive_answers() {
        assert!(price_from_answer("feed", BigInt::from(0), 8).is_err());
        assert!(price_from_answer("feed", BigInt::from(-5), 8).is_err());
    }
}
