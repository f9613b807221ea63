//! Minimal ABI word encoding for the handful of calls the keeper makes.

use num_bigint::{BigInt, BigUint};
use num_traits::{One, Signed};

use crate::error::AbiError;

/// One 32-byte ABI word
pub type Word = [u8; 32];

/// Function selectors of the contract calls used by venues and keepers
pub mod selectors {
    /// ERC20 `balanceOf(address)`
    pub const BALANCE_OF: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];
    /// ERC20 / aggregator `decimals()`
    pub const DECIMALS: [u8; 4] = [0x31, 0x3c, 0xe5, 0x67];
    /// Chainlink aggregator `latestRoundData()`
    pub const LATEST_ROUND_DATA: [u8; 4] = [0xfe, 0xaf, 0x96, 0x8c];
    /// Compound cToken `balanceOfUnderlying(address)`
    pub const BALANCE_OF_UNDERLYING: [u8; 4] = [0x3a, 0xf9, 0xe6, 0x69];
    /// Compound cToken `redeem(uint256)`
    pub const REDEEM: [u8; 4] = [0xdb, 0x00, 0x6a, 0x75];
    /// Compound comptroller `claimComp(address)`
    pub const CLAIM_COMP: [u8; 4] = [0xe9, 0xaf, 0x02, 0x92];
    /// Aave lending pool `withdraw(address,uint256,address)`
    pub const AAVE_WITHDRAW: [u8; 4] = [0x69, 0x32, 0x8d, 0xec];
    /// Aave incentives controller `getRewardsBalance(address[],address)`
    pub const GET_REWARDS_BALANCE: [u8; 4] = [0x8b, 0x59, 0x9f, 0x26];
    /// Keeper-compatible `performUpkeep(bytes)`
    pub const PERFORM_UPKEEP: [u8; 4] = [0x45, 0x85, 0xe3, 0x3b];
}

/// Parse a `0x`-prefixed 20-byte hex address
pub fn parse_address(address: &str) -> Result<[u8; 20], AbiError> {
    let digits = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .ok_or_else(|| AbiError::InvalidAddress(address.to_string()))?;
    let bytes = hex::decode(digits).map_err(|_| AbiError::InvalidAddress(address.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| AbiError::InvalidAddress(address.to_string()))
}

pub fn encode_address(address: &str) -> Result<Word, AbiError> {
    let bytes = parse_address(address)?;
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(&bytes);
    Ok(word)
}

pub fn encode_uint(value: &BigUint) -> Result<Word, AbiError> {
    let bytes = value.to_bytes_be();
    if bytes.len() > 32 {
        return Err(AbiError::OutOfRange {
            value: value.to_string(),
            kind: "uint256",
        });
    }
    let mut word = [0u8; 32];
    word[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(word)
}

pub fn encode_u64(value: u64) -> Word {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

/// `type(uint256).max`, the "everything" amount for withdrawals
pub fn max_uint256() -> Word {
    [0xff; 32]
}

/// Two's complement `int256` word; values outside [-2^255, 2^255) are rejected
pub fn encode_int256(value: &BigInt) -> Result<Word, AbiError> {
    let bound = BigInt::one() << 255usize;
    let min = -bound.clone();
    if value >= &bound || value < &min {
        return Err(AbiError::OutOfRange {
            value: value.to_string(),
            kind: "int256",
        });
    }

    let unsigned = if value.is_negative() {
        value + (BigInt::one() << 256usize)
    } else {
        value.clone()
    };
    let (_, bytes) = unsigned.to_bytes_be();

    let mut word = [0u8; 32];
    word[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(word)
}

fn word_at(data: &[u8], index: usize) -> Result<&[u8], AbiError> {
    let end = (index + 1) * 32;
    if data.len() < end {
        return Err(AbiError::ShortReturn {
            expected: end,
            actual: data.len(),
        });
    }
    Ok(&data[index * 32..end])
}

pub fn decode_uint(data: &[u8], index: usize) -> Result<BigUint, AbiError> {
    Ok(BigUint::from_bytes_be(word_at(data, index)?))
}

pub fn decode_int(data: &[u8], index: usize) -> Result<BigInt, AbiError> {
    Ok(BigInt::from_signed_bytes_be(word_at(data, index)?))
}

/// Selector followed by static arguments
pub fn calldata(selector: [u8; 4], words: &[Word]) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + 32 * words.len());
    data.extend_from_slice(&selector);
    for word in words {
        data.extend_from_slice(word);
    }
    data
}

/// Selector with a single dynamic `bytes` argument
pub fn calldata_with_bytes(selector: [u8; 4], payload: &[u8]) -> Vec<u8> {
    let padded_len = payload.len().div_ceil(32) * 32;
    let mut data = calldata(selector, &[encode_u64(32), encode_u64(payload.len() as u64)]);
    data.extend_from_slice(payload);
    data.resize(4 + 64 + padded_len, 0);
    data
}

/// Selector with a leading dynamic array argument followed by static ones,
/// e.g. `getRewardsBalance(address[],address)`
pub fn calldata_with_array(selector: [u8; 4], array: &[Word], trailing: &[Word]) -> Vec<u8> {
    let offset = 32 * (1 + trailing.len()) as u64;
    let mut words = Vec::with_capacity(2 + trailing.len() + array.len());
    words.push(encode_u64(offset));
    words.extend_from_slice(trailing);
    words.push(encode_u64(array.len() as u64));
    words.extend_from_slice(array);
    calldata(selector, &words)
}

/// `0x`-prefixed lowercase hex, the JSON-RPC data format
pub fn to_hex(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_encoding() {
        let word = encode_address("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48").unwrap();
        assert_eq!(&word[..12], &[0u8; 12]);
        assert_eq!(word[12], 0xa0);
        assert_eq!(word[31], 0x48);

        assert!(encode_address("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48").is_err());
        assert!(encode_address("0x1234").is_err());
        assert!(encode_address("0xzzb86991c6218b36c1d19d4a2e9eb0ce3606eb48").is_err());
    }

    #[test]
    fn test_int256_twos_complement() {
        let one = encode_int256(&BigInt::from(1)).unwrap();
        assert_eq!(one[31], 1);
        assert_eq!(&one[..31], &[0u8; 31]);

        let minus_one = encode_int256(&BigInt::from(-1)).unwrap();
        assert_eq!(minus_one, [0xff; 32]);
        assert_eq!(decode_int(&minus_one, 0).unwrap(), BigInt::from(-1));

        let min = -(BigInt::one() << 255usize);
        let encoded = encode_int256(&min).unwrap();
        assert_eq!(encoded[0], 0x80);
        assert_eq!(decode_int(&encoded, 0).unwrap(), min);

        assert!(encode_int256(&(BigInt::one() << 255usize)).is_err());
        assert!(encode_int256(&(min - 1)).is_err());
    }

    #[test]
    fn test_decode_short_return() {
        let data = vec![0u8; 40];
        assert!(decode_uint(&data, 0).is_ok());
        assert_eq!(
            decode_uint(&data, 1),
            Err(AbiError::ShortReturn { expected: 64, actual: 40 })
        );
    }

    #[test]
    fn test_bytes_argument_layout() {
        let payload = encode_int256(&BigInt::from(7)).unwrap();
        let data = calldata_with_bytes(selectors::PERFORM_UPKEEP, &payload);

        assert_eq!(data.len(), 4 + 32 * 3);
        assert_eq!(&data[..4], &selectors::PERFORM_UPKEEP);
        assert_eq!(decode_uint(&data[4..], 0).unwrap(), BigUint::from(32u32));
        assert_eq!(decode_uint(&data[4..], 1).unwrap(), BigUint::from(32u32));
        assert_eq!(decode_int(&data[4..], 2).unwrap(), BigInt::from(7));

        // Odd-length payloads are right padded
        let short = calldata_with_bytes(selectors::PERFORM_UPKEEP, &[1, 2, 3]);
        assert_eq!(short.len(), 4 + 32 * 3);
        assert_eq!(&short[68..71], &[1, 2, 3]);
    }

    #[test]
    fn test_array_argument_layout() {
        let asset = encode_address("0xbcca60bb61934080951369a648fb03df4f96263c").unwrap();
        let user = encode_address("0x21d0fd7c54e4c1a453906a3bcb7598aee827b292").unwrap();
        let data = calldata_with_array(selectors::GET_REWARDS_BALANCE, &[asset], &[user]);
        let args = &data[4..];

        assert_eq!(decode_uint(args, 0).unwrap(), BigUint::from(64u32));
        assert_eq!(word_at(args, 1).unwrap(), &user);
        assert_eq!(decode_uint(args, 2).unwrap(), BigUint::from(1u32));
        assert_eq!(word_at(args, 3).unwrap(), &asset);
    }

    #[test]
    fn test_uint_bounds() {
        let max = BigUint::from_bytes_be(&max_uint256());
        assert_eq!(encode_uint(&max).unwrap(), max_uint256());
        assert!(encode_uint(&(max + 1u32)).is_err());
        assert_eq!(to_hex(&[0xde, 0xad]), "0xdead");
    }
}
