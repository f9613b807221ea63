//! Snapshot-delta yield estimation.
//!
//! Two consecutive observations of one venue give a profit figure (principal
//! delta plus the valued reward delta) and a rate extrapolated to a year.
//! Everything here is deterministic and free of I/O.

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use crate::fixed_point::{PriceE8, Wad};

/// 365 days, in the same unit as snapshot timestamps (seconds)
pub const SECONDS_PER_YEAR: i64 = 365 * 24 * 3600;

/// Freshly read venue state, before it is combined with history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// Withdrawable principal, normalized to 18 decimals
    pub balance: Wad,
    /// Accrued reward token balance, not yet valued
    pub reward_balance: Wad,
    /// Reward token price in principal units
    pub reward_price: PriceE8,
    /// Unix seconds
    pub timestamp: i64,
}

/// One immutable entry of a venue's history.
///
/// `profit` and `apy` are kept for audit only; they are never read back as
/// inputs, every estimate is recomputed from the raw fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub balance: Wad,
    pub reward_balance: Wad,
    pub reward_price: PriceE8,
    pub timestamp: i64,
    pub interval: i64,
    pub profit: Wad,
    pub apy: Wad,
}

impl Snapshot {
    /// Raw observed fields of this snapshot
    pub fn observation(&self) -> Observation {
        Observation {
            balance: self.balance.clone(),
            reward_balance: self.reward_balance.clone(),
            reward_price: self.reward_price.clone(),
            timestamp: self.timestamp,
        }
    }

    /// APY expressed in percent, for logs
    pub fn apy_percent(&self) -> Wad {
        Wad::from_raw(self.apy.raw() * BigInt::from(100))
    }
}

/// Combine the previous snapshot (if any) with a new observation.
///
/// Undefined rates (no previous snapshot, non-positive interval, or no
/// capital at risk) resolve to an APY of exactly zero.
pub fn estimate(previous: Option<&Snapshot>, observation: Observation) -> Snapshot {
    let zero = Wad::zero();
    let (prev_balance, prev_reward) = match previous {
        Some(prev) => (&prev.balance, &prev.reward_balance),
        None => (&zero, &zero),
    };
    let interval = previous
        .map(|prev| observation.timestamp.saturating_sub(prev.timestamp))
        .unwrap_or(0);

    let reward_value = value_reward(&(&observation.reward_balance - prev_reward), &observation.reward_price);
    let profit = &(&observation.balance - prev_balance) + &reward_value;
    let apy = annualize(&profit, interval, previous.map(|prev| &prev.balance));

    Snapshot {
        balance: observation.balance,
        reward_balance: observation.reward_balance,
        reward_price: observation.reward_price,
        timestamp: observation.timestamp,
        interval,
        profit,
        apy,
    }
}

/// Convert a reward token amount into principal units: `amount * price / 10^8`
pub fn value_reward(amount: &Wad, price: &PriceE8) -> Wad {
    Wad::from_raw(amount.raw() * price.raw() / PriceE8::scale())
}

/// `profit * SECONDS_PER_YEAR * 10^18 / interval / base`, or zero when the
/// rate is undefined
pub fn annualize(profit: &Wad, interval: i64, base: Option<&Wad>) -> Wad {
    match base {
        Some(base) if interval > 0 && base.is_positive() => {
            let numerator = profit.raw() * BigInt::from(SECONDS_PER_YEAR) * Wad::scale();
            Wad::from_raw(numerator / BigInt::from(interval) / base.raw())
        }
        _ => Wad::zero(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(balance: &str, reward: &str, price: &str, timestamp: i64) -> Observation {
        Observation {
            balance: balance.parse().unwrap(),
            reward_balance: reward.parse().unwrap(),
            reward_price: price.parse().unwrap(),
            timestamp,
        }
    }

    #[test]
    fn test_first_snapshot_has_zero_apy() {
        let snapshot = estimate(None, observation("100.0", "0.0", "1.0", 1_000));

        assert_eq!(snapshot.interval, 0);
        assert_eq!(snapshot.profit, Wad::from_integer(100));
        assert_eq!(snapshot.apy, Wad::zero());
    }

    #[test]
    fn test_one_day_jump() {
        let previous = estimate(None, observation("100.0", "0.0", "1.0", 0));
        let current = estimate(Some(&previous), observation("105.0", "2.0", "1.0", 86_400));

        assert_eq!(current.interval, 86_400);
        assert_eq!(current.profit, Wad::from_integer(7));
        assert_eq!(current.apy, Wad::parse("25.55").unwrap());
        assert_eq!(current.apy_percent(), Wad::parse("2555").unwrap());
    }

    #[test]
    fn test_reward_valued_at_price_scale() {
        // 3 reward tokens at 2.5 principal each
        let value = value_reward(&Wad::from_integer(3), &PriceE8::parse("2.5").unwrap());
        assert_eq!(value, Wad::parse("7.5").unwrap());
    }

    #[test]
    fn test_zero_interval_and_zero_base() {
        let previous = estimate(None, observation("100.0", "0.0", "1.0", 500));
        let same_instant = estimate(Some(&previous), observation("101.0", "0.0", "1.0", 500));
        assert_eq!(same_instant.apy, Wad::zero());

        let empty = estimate(None, observation("0.0", "0.0", "1.0", 0));
        let after_deposit = estimate(Some(&empty), observation("100.0", "0.0", "1.0", 3_600));
        assert_eq!(after_deposit.profit, Wad::from_integer(100));
        assert_eq!(after_deposit.apy, Wad::zero());
    }

    #[test]
    fn test_negative_profit_gives_negative_apy() {
        let previous = estimate(None, observation("100.0", "10.0", "1.0", 0));
        // Rewards were claimed and sold elsewhere: reward balance dropped
        let current = estimate(Some(&previous), observation("100.0", "0.0", "1.0", SECONDS_PER_YEAR));
        assert_eq!(current.profit, Wad::from_integer(-10));
        assert_eq!(current.apy, Wad::parse("-0.1").unwrap());
    }

    #[test]
    fn test_snapshot_field_names() {
        let snapshot = estimate(None, observation("100.0", "0.5", "300.12", 1_650_000_000));
        let json = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(json["rewardBalance"], "0.5");
        assert_eq!(json["rewardPrice"], "300.12");
        assert_eq!(json["timestamp"], 1_650_000_000);
        assert_eq!(serde_json::from_value::<Snapshot>(json).unwrap(), snapshot);
    }
}
