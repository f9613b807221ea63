//! Publishes one APY value to a primary and backup keepers.

use std::sync::Arc;
use std::time::Duration;

use apy_math::Wad;
use futures::future::join_all;
use num_bigint::BigInt;
use tracing::{info, warn};

use crate::endpoint::{EndpointRole, KeeperEndpoint, UpkeepPayload, UpkeepReceipt, UpkeepRequest};
use crate::error::KeeperResult;
use crate::executor::{execute_with_retries, AbandonedAttempt, Outcome};

#[derive(Clone)]
pub struct PublisherEndpoint {
    pub role: EndpointRole,
    pub endpoint: Arc<dyn KeeperEndpoint>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishStatus {
    Published { attempt: usize, receipt: UpkeepReceipt },
    Failed { attempts: usize },
    Skipped,
}

#[derive(Debug)]
pub struct EndpointOutcome {
    pub endpoint: String,
    pub role: EndpointRole,
    pub status: PublishStatus,
    /// Submissions still in flight after their budget elapsed
    pub pending: Vec<AbandonedAttempt<UpkeepReceipt>>,
}

#[derive(Debug)]
pub struct PublishReport {
    pub wire_value: BigInt,
    pub outcomes: Vec<EndpointOutcome>,
}

impl PublishReport {
    /// At least one endpoint confirmed the update
    pub fn is_success(&self) -> bool {
        self.published().next().is_some()
    }

    pub fn published(&self) -> impl Iterator<Item = &EndpointOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, PublishStatus::Published { .. }))
    }

    pub fn failed(&self) -> impl Iterator<Item = &EndpointOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, PublishStatus::Failed { .. }))
    }
}

pub struct RedundantPublisher {
    endpoints: Vec<PublisherEndpoint>,
    budgets: Vec<Duration>,
    wire_decimals: u32,
}

impl RedundantPublisher {
    pub fn new(endpoints: Vec<PublisherEndpoint>, budgets: Vec<Duration>, wire_decimals: u32) -> Self {
        Self {
            endpoints,
            budgets,
            wire_decimals,
        }
    }

    /// First endpoint is the primary, the rest are backups
    pub fn from_endpoints(endpoints: Vec<Arc<dyn KeeperEndpoint>>, budgets: Vec<Duration>, wire_decimals: u32) -> Self {
        let endpoints = endpoints
            .into_iter()
            .enumerate()
            .map(|(i, endpoint)| PublisherEndpoint {
                role: if i == 0 { EndpointRole::Primary } else { EndpointRole::Backup },
                endpoint,
            })
            .collect();
        Self::new(endpoints, budgets, wire_decimals)
    }

    pub fn endpoints(&self) -> &[PublisherEndpoint] {
        &self.endpoints
    }

    /// Encode once, then push to every endpoint concurrently. One endpoint
    /// failing never holds up or aborts the others.
    pub async fn publish(&self, apy: &Wad, cycle_id: i64) -> KeeperResult<PublishReport> {
        let payload = UpkeepPayload::encode(apy, self.wire_decimals)?;
        let request = Arc::new(UpkeepRequest {
            cycle_id,
            payload: payload.clone(),
        });

        let runs = self
            .endpoints
            .iter()
            .map(|target| self.publish_to(target, request.clone()));
        let outcomes = join_all(runs).await;

        let report = PublishReport {
            wire_value: payload.wire_value().clone(),
            outcomes,
        };
        if report.is_success() {
            info!(
                cycle_id,
                apy = %apy,
                published = report.published().count(),
                failed = report.failed().count(),
                "apy published"
            );
        } else {
            warn!(cycle_id, apy = %apy, "no keeper accepted the update");
        }
        Ok(report)
    }

    async fn publish_to(&self, target: &PublisherEndpoint, request: Arc<UpkeepRequest>) -> EndpointOutcome {
        let name = target.endpoint.name().to_string();
        let endpoint = target.endpoint.clone();

        let execution = execute_with_retries(
            || {
                let endpoint = endpoint.clone();
                let request = request.clone();
                async move {
                    match endpoint.perform_upkeep(&request).await {
                        Ok(receipt) => Some(receipt),
                        Err(e) => {
                            warn!(keeper = endpoint.name(), error = %e, "upkeep attempt failed");
                            None
                        }
                    }
                }
            },
            &self.budgets,
        )
        .await;

        let attempts = execution.attempts.len();
        let status = match execution.outcome {
            Outcome::Completed { value, attempt } => PublishStatus::Published { attempt, receipt: value },
            Outcome::Exhausted => {
                warn!(keeper = %name, role = %target.role, attempts, "retries exhausted");
                PublishStatus::Failed { attempts }
            }
        };

        EndpointOutcome {
            endpoint: name,
            role: target.role,
            status,
            pending: execution.abandoned,
        }
    }

    /// Encode without contacting any endpoint
    pub fn dry_run(&self, apy: &Wad) -> KeeperResult<PublishReport> {
        let payload = UpkeepPayload::encode(apy, self.wire_decimals)?;
        info!(apy = %apy, wire_value = %payload.wire_value(), "dry run, not publishing");

        let outcomes = self
            .endpoints
            .iter()
            .map(|target| EndpointOutcome {
                endpoint: target.endpoint.name().to_string(),
                role: target.role,
                status: PublishStatus::Skipped,
                pending: Vec::new(),
            })
            .collect();
        Ok(PublishReport {
            wire_value: payload.wire_value().clone(),
            outcomes,
        })
    }
}
