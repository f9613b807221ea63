//! Venue adapters for the supported lending protocols.

mod aave;
mod compound;
mod price_feed;
mod token;

use std::sync::Arc;

pub use aave::AaveVenue;
pub use compound::CompoundVenue;
pub use price_feed::ChainlinkFeed;
pub use token::Erc20;

use crate::config::{VenueConfig, VenueContracts};
use crate::rpc::EthRpc;
use crate::venue::Venue;

/// COMP has 18 decimals
const COMP_DECIMALS: u32 = 18;

/// Build the adapter a venue's configuration describes
pub fn build_venue(config: &VenueConfig, rpc: Arc<EthRpc>) -> Box<dyn Venue> {
    let underlying = Erc20::new(config.underlying.clone(), config.underlying_decimals, rpc.clone());
    let feed = ChainlinkFeed::new(config.price_feed.clone(), rpc.clone());

    match &config.contracts {
        VenueContracts::Compound { ctoken, comp, comptroller } => Box::new(CompoundVenue::new(
            config.name.clone(),
            config.wallet.clone(),
            ctoken.clone(),
            comptroller.clone(),
            Erc20::new(comp.clone(), COMP_DECIMALS, rpc.clone()),
            underlying,
            feed,
            rpc,
        )),
        VenueContracts::Aave {
            lending_pool,
            a_token,
            incentives_controller,
        } => Box::new(AaveVenue::new(
            config.name.clone(),
            config.wallet.clone(),
            lending_pool.clone(),
            incentives_controller.clone(),
            // aTokens mirror the underlying's decimals
            Erc20::new(a_token.clone(), config.underlying_decimals, rpc.clone()),
            underlying,
            feed,
            rpc,
        )),
    }
}
