//! Mock publisher for testing
//!
//! A scriptable publisher that returns a queued sequence of outcomes and
//! records every job it receives. Dispatch and integration tests use it to
//! exercise retry, abandonment, and aggregation logic without network
//! access or platform credentials.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use crate::error::PublishError;
use crate::types::PlatformId;

use super::{PublishJob, Publisher};

/// One scripted publish outcome
pub type MockOutcome = Result<String, PublishError>;

pub struct MockPublisher {
    platform: PlatformId,
    /// Outcomes returned in order; when exhausted, publishing succeeds
    script: Mutex<VecDeque<MockOutcome>>,
    /// Simulated latency per call
    delay: Duration,
    calls: Arc<Mutex<u32>>,
    jobs: Arc<Mutex<Vec<PublishJob>>>,
}

impl MockPublisher {
    pub fn new(platform: PlatformId) -> Self {
        Self {
            platform,
            script: Mutex::new(VecDeque::new()),
            delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(0)),
            jobs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A publisher that always succeeds
    pub fn succeeding(platform: PlatformId) -> Arc<Self> {
        Arc::new(Self::new(platform))
    }

    /// A publisher that replays the given outcomes, then succeeds
    pub fn scripted(platform: PlatformId, outcomes: Vec<MockOutcome>) -> Arc<Self> {
        let publisher = Self::new(platform);
        *publisher.script.lock().unwrap() = outcomes.into();
        Arc::new(publisher)
    }

    /// A publisher that always fails with clones of `error`
    pub fn failing(platform: PlatformId, error: PublishError) -> Arc<Self> {
        let publisher = Self::new(platform);
        let script: VecDeque<MockOutcome> =
            std::iter::repeat_with(|| Err(error.clone())).take(64).collect();
        *publisher.script.lock().unwrap() = script;
        Arc::new(publisher)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock().unwrap()
    }

    pub fn published_jobs(&self) -> Vec<PublishJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    fn platform(&self) -> PlatformId {
        self.platform
    }

    async fn publish(&self, job: &PublishJob) -> Result<String, PublishError> {
        *self.calls.lock().unwrap() += 1;

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        let outcome = self.script.lock().unwrap().pop_front();
        match outcome {
            Some(Err(e)) => Err(e),
            Some(Ok(id)) => {
                self.jobs.lock().unwrap().push(job.clone());
                Ok(id)
            }
            None => {
                self.jobs.lock().unwrap().push(job.clone());
                Ok(format!("{}-mock-{}", self.platform, self.call_count()))
            }
        }
    }
}
