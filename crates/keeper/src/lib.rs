pub mod abi;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod executor;
pub mod keeper;
pub mod publisher;
pub mod rpc;
pub mod store;
pub mod venue;
pub mod venues;

pub use config::{create_example_config, KeeperConfig, RetryConfig, VenueConfig, VenueContracts};
pub use endpoint::{EndpointRole, KeeperEndpoint, RpcKeeper, UpkeepPayload, UpkeepReceipt, UpkeepRequest, UpkeepTransport};
pub use error::{KeeperError, KeeperResult};
pub use executor::{execute_with_retries, AttemptStatus, Execution, Outcome};
pub use keeper::{CycleReport, Keeper};
pub use publisher::{PublishReport, PublishStatus, RedundantPublisher};
pub use store::{JsonFileStore, MemoryStore, SnapshotStore};
pub use venue::{SettleMode, Venue};
