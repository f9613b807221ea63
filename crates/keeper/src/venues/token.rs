use std::sync::Arc;

use apy_math::Wad;
use num_bigint::{BigInt, BigUint};

use crate::abi::{self, selectors};
use crate::error::KeeperResult;
use crate::rpc::EthRpc;

/// ERC20 token with a known decimal count
#[derive(Clone)]
pub struct Erc20 {
    address: String,
    decimals: u32,
    rpc: Arc<EthRpc>,
}

impl Erc20 {
    pub fn new(address: impl Into<String>, decimals: u32, rpc: Arc<EthRpc>) -> Self {
        Self {
            address: address.into(),
            decimals,
            rpc,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    /// Balance in the token's native units
    pub async fn raw_balance_of(&self, holder: &str) -> KeeperResult<BigUint> {
        let data = abi::calldata(selectors::BALANCE_OF, &[abi::encode_address(holder)?]);
        let ret = self.rpc.call(&self.address, &data).await?;
        Ok(abi::decode_uint(&ret, 0)?)
    }

    /// Balance normalized to 18 decimals
    pub async fn balance_of(&self, holder: &str) -> KeeperResult<Wad> {
        let raw = self.raw_balance_of(holder).await?;
        Ok(self.to_wad(raw))
    }

    pub fn to_wad(&self, raw: BigUint) -> Wad {
        Wad::from_units(BigInt::from(raw), self.decimals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_usdc_units_normalize_to_wad() {
        let rpc = Arc::new(EthRpc::new("http://127.0.0.1:8545", Duration::from_secs(1), Duration::from_millis(10)).unwrap());
        let usdc = Erc20::new("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48", 6, rpc);

        assert_eq!(usdc.to_wad(BigUint::from(105_250_000u64)), Wad::parse("105.25").unwrap());
        assert_eq!(usdc.to_wad(BigUint::from(1u8)), Wad::parse("0.000001").unwrap());
    }
}
