//! Drives explorer verification of a deployed contract to completion.
//!
//! Verification is not safety critical and routinely lags chain indexing, so
//! every failure is treated as transient and retried at a fixed interval. The
//! [`RetryPolicy`] optionally bounds the loop, and a [`CancellationToken`] is
//! honored at every suspension point.

use std::time::Duration;

use anyhow::Result;
use backon::{ConstantBuilder, Retryable};
use tokio_util::sync::CancellationToken;

use crate::{
    backend::{DeployBackend, VerificationRequest, VerifyOutcome},
    error::VerificationError,
};

/// Default interval between verification attempts.
pub const DEFAULT_VERIFY_INTERVAL: Duration = Duration::from_secs(15);

/// How verification attempts are repeated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Fixed delay between attempts.
    pub interval: Duration,
    /// Maximum number of submissions. `None` retries until success.
    pub max_attempts: Option<usize>,
    /// Overall time budget for the loop. `None` means no deadline.
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_VERIFY_INTERVAL,
            max_attempts: None,
            deadline: None,
        }
    }
}

impl RetryPolicy {
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn max_attempts(mut self, max_attempts: Option<usize>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    fn backoff(&self) -> ConstantBuilder {
        let builder = ConstantBuilder::default().with_delay(self.interval);
        match self.max_attempts {
            // backon counts retries, the first attempt is not one of them.
            Some(attempts) => builder.with_max_times(attempts.saturating_sub(1)),
            None => builder.without_max_times(),
        }
    }
}

/// How a verification loop ended successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verified {
    /// The explorer already had the source before anything was submitted.
    Previously,
    /// A submission in this run succeeded.
    Now,
}

/// Repeats verification until the explorer confirms it.
#[derive(Debug, Clone)]
pub struct VerificationPoller {
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl VerificationPoller {
    pub fn new(policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self { policy, cancel }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Verify `request`, retrying until success or until a bound trips.
    pub async fn run<B: DeployBackend>(
        &self,
        backend: &B,
        name: &str,
        request: &VerificationRequest,
    ) -> Result<Verified, VerificationError> {
        let address = request.address;

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::warn!(contract = %name, address = %address, "Verification cancelled");
                Err(VerificationError::Cancelled(address))
            }
            result = self.run_bounded(backend, name, request) => result,
        }
    }

    async fn run_bounded<B: DeployBackend>(
        &self,
        backend: &B,
        name: &str,
        request: &VerificationRequest,
    ) -> Result<Verified, VerificationError> {
        match self.policy.deadline {
            Some(deadline) => tokio::time::timeout(deadline, self.poll(backend, name, request))
                .await
                .map_err(|_| VerificationError::DeadlineElapsed {
                    address: request.address,
                    deadline,
                })?,
            None => self.poll(backend, name, request).await,
        }
    }

    async fn poll<B: DeployBackend>(
        &self,
        backend: &B,
        name: &str,
        request: &VerificationRequest,
    ) -> Result<Verified, VerificationError> {
        let address = request.address;

        match backend.check_verified(request).await {
            Ok(true) => {
                tracing::info!(contract = %name, address = %address, "Already verified");
                return Ok(Verified::Previously);
            }
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(
                    contract = %name,
                    address = %address,
                    error = %err,
                    "Verification status check failed, submitting anyway"
                );
            }
        }

        tracing::info!(contract = %name, address = %address, "Verifying...");

        let mut attempts = 0usize;
        let result = (|| {
            attempts += 1;
            self.attempt(backend, request)
        })
        .retry(self.policy.backoff())
        .sleep(tokio::time::sleep)
        .notify(|err: &anyhow::Error, delay: Duration| {
            tracing::warn!(
                contract = %name,
                address = %address,
                error = %err,
                retry_in = ?delay,
                "Verification not confirmed yet, retrying"
            );
        })
        .await;

        match result {
            Ok(()) => {
                tracing::info!(contract = %name, address = %address, attempts, "Verified");
                Ok(Verified::Now)
            }
            Err(err) => Err(VerificationError::AttemptsExhausted {
                address,
                attempts,
                last_error: format!("{err:#}"),
            }),
        }
    }

    /// One submission. Errors and inconclusive results are all transient.
    async fn attempt<B: DeployBackend>(
        &self,
        backend: &B,
        request: &VerificationRequest,
    ) -> Result<()> {
        match backend.verify(request).await? {
            VerifyOutcome::Verified | VerifyOutcome::AlreadyVerified => Ok(()),
            VerifyOutcome::Inconclusive(detail) => {
                // The explorer may have indexed the submission even though the
                // tool gave up waiting for it.
                if backend.check_verified(request).await.unwrap_or(false) {
                    return Ok(());
                }
                anyhow::bail!("verification inconclusive: {detail}")
            }
        }
    }
}
