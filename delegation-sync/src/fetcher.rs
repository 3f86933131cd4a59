//! Upstream delegation fetcher with bounded retries
//!
//! One GET per account against
//! `{base_url}/cosmos/staking/v1beta1/validators/{account}/delegations`.
//! Transport failures and 5xx responses are retried; every other failure is
//! returned as-is on the first occurrence.

use crate::{
    config::FetcherConfig,
    context::SyncContext,
    error::{Error, Result},
    metrics::FETCH_ATTEMPTS_TOTAL,
    types::{AccountId, Balance, DelegationRecord, DelegationSnapshot, Pagination},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Delegation fetcher trait
#[async_trait]
pub trait DelegationFetcher: Send + Sync {
    /// Fetch the current delegation snapshot for one account
    async fn fetch(&self, ctx: &SyncContext, account_id: &AccountId)
        -> Result<DelegationSnapshot>;
}

#[derive(Debug, Deserialize)]
struct DelegationsResponse {
    #[serde(default)]
    delegation_responses: Vec<DelegationEntry>,
    #[serde(default)]
    pagination: Option<PaginationPayload>,
}

#[derive(Debug, Deserialize)]
struct DelegationEntry {
    delegation: DelegationPayload,
    balance: BalancePayload,
}

#[derive(Debug, Deserialize)]
struct DelegationPayload {
    delegator_address: String,
    shares: String,
}

#[derive(Debug, Deserialize)]
struct BalancePayload {
    denom: String,
    amount: String,
}

#[derive(Debug, Deserialize)]
struct PaginationPayload {
    #[serde(default)]
    next_key: Option<String>,
    #[serde(default)]
    total: Option<String>,
}

impl DelegationsResponse {
    fn into_snapshot(
        self,
        account_id: AccountId,
        captured_at: DateTime<Utc>,
    ) -> DelegationSnapshot {
        let records = self
            .delegation_responses
            .into_iter()
            .map(|entry| DelegationRecord {
                counterparty: entry.delegation.delegator_address,
                shares: entry.delegation.shares,
                balance: Balance {
                    denom: entry.balance.denom,
                    amount: entry.balance.amount,
                },
            })
            .collect();

        let pagination = self
            .pagination
            .map(|p| Pagination {
                next_key: p.next_key,
                total: p.total.unwrap_or_default(),
            })
            .unwrap_or_default();

        DelegationSnapshot {
            account_id,
            records,
            pagination,
            captured_at,
        }
    }
}

/// Delay before retry `n` (0 = first retry): `base * (n + 1)`
///
/// Linear, not exponential.
pub fn backoff_delay(base: Duration, retry: u32) -> Duration {
    base.saturating_mul(retry.saturating_add(1))
}

/// HTTP fetcher against the upstream staking API
#[derive(Debug, Clone)]
pub struct RemoteFetcher {
    config: FetcherConfig,
    client: Client,
}

impl RemoteFetcher {
    /// Create new fetcher
    pub fn new(config: FetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Create a fetcher around an existing client
    pub fn with_client(config: FetcherConfig, client: Client) -> Self {
        Self { config, client }
    }

    /// Fetcher configuration
    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    fn delegations_url(&self, account_id: &AccountId) -> String {
        format!(
            "{}/cosmos/staking/v1beta1/validators/{}/delegations",
            self.config.base_url.trim_end_matches('/'),
            account_id
        )
    }

    fn validate(account_id: &AccountId) -> Result<()> {
        if account_id.is_blank() {
            return Err(Error::InvalidInput("account id must not be empty".to_string()));
        }
        // Must stay a single path segment after URL normalization
        let id = account_id.as_str();
        if id == "."
            || id == ".."
            || id
                .chars()
                .any(|c| matches!(c, '/' | '\\' | '?' | '#' | '%') || c.is_whitespace())
        {
            return Err(Error::InvalidInput(format!(
                "malformed account id: {:?}",
                account_id.as_str()
            )));
        }
        Ok(())
    }

    /// Single request/response exchange
    async fn attempt(&self, url: &str, account_id: &AccountId) -> Result<DelegationSnapshot> {
        let response = self.client.get(url).send().await.map_err(|source| {
            FETCH_ATTEMPTS_TOTAL.with_label_values(&["transport_error"]).inc();
            Error::Transport {
                account: account_id.to_string(),
                source,
            }
        })?;

        let status = response.status();
        if status == StatusCode::OK {
            let body = response.bytes().await.map_err(|source| {
                FETCH_ATTEMPTS_TOTAL.with_label_values(&["transport_error"]).inc();
                Error::Transport {
                    account: account_id.to_string(),
                    source,
                }
            })?;

            let payload: DelegationsResponse =
                serde_json::from_slice(&body).map_err(|source| {
                    FETCH_ATTEMPTS_TOTAL.with_label_values(&["decode_error"]).inc();
                    Error::Decode {
                        account: account_id.to_string(),
                        source,
                    }
                })?;

            FETCH_ATTEMPTS_TOTAL.with_label_values(&["success"]).inc();
            return Ok(payload.into_snapshot(account_id.clone(), Utc::now()));
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());

        if status == StatusCode::NOT_FOUND {
            FETCH_ATTEMPTS_TOTAL.with_label_values(&["not_found"]).inc();
            return Err(Error::NotFound(format!(
                "upstream has no delegations for {}: {}",
                account_id, body
            )));
        }

        let label = if status.is_server_error() {
            "server_error"
        } else {
            "client_error"
        };
        FETCH_ATTEMPTS_TOTAL.with_label_values(&[label]).inc();

        Err(Error::UpstreamStatus {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl DelegationFetcher for RemoteFetcher {
    async fn fetch(
        &self,
        ctx: &SyncContext,
        account_id: &AccountId,
    ) -> Result<DelegationSnapshot> {
        Self::validate(account_id)?;

        let url = self.delegations_url(account_id);
        let max_attempts = self.config.max_attempts();
        let mut last_error = None;

        debug!(account = %account_id, url = %url, "Fetching delegations");

        for attempt in 0..max_attempts {
            if attempt > 0 {
                let delay = backoff_delay(self.config.retry_delay(), attempt - 1);
                warn!(
                    account = %account_id,
                    "Retry attempt {}/{} after {:?}",
                    attempt,
                    self.config.max_retries,
                    delay
                );

                tokio::select! {
                    biased;
                    reason = ctx.done() => return Err(Error::Cancelled(reason)),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            match ctx.run(self.attempt(&url, account_id)).await? {
                Ok(snapshot) => {
                    if attempt > 0 {
                        info!(
                            account = %account_id,
                            "Fetch succeeded on attempt {}/{}",
                            attempt + 1,
                            max_attempts
                        );
                    }
                    debug!(
                        account = %account_id,
                        records = snapshot.records.len(),
                        "Decoded delegations"
                    );
                    return Ok(snapshot);
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        account = %account_id,
                        "Attempt {}/{} failed: {}",
                        attempt + 1,
                        max_attempts,
                        e
                    );
                    last_error = Some(e);
                }
                Err(e) => {
                    warn!(account = %account_id, "Non-retryable fetch error: {}", e);
                    return Err(e);
                }
            }
        }

        let cause = last_error
            .unwrap_or_else(|| Error::Other("retry loop ended without an attempt".to_string()));

        Err(Error::Transient {
            attempts: max_attempts,
            cause: Box::new(cause),
        })
    }
}
