//! Queue dispatch
//!
//! A periodic tick claims due entries and runs one worker per claimed
//! entry, all concurrently. The claim is a compare-and-swap in the
//! database, so concurrent ticks (or a second daemon) never double-publish
//! an entry. Worker failures are isolated per entry: a storage or publish
//! failure on one never aborts the others.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use crate::config::{Config, DispatchConfig};
use crate::db::Database;
use crate::error::{PublishError, Result};
use crate::oauth::ConnectionManager;
use crate::platforms::{create_publishers, PublishJob, Publisher};
use crate::types::{PlatformId, QueueEntry};

/// Upper bound on entries claimed per tick
const DISPATCH_BATCH: usize = 50;

pub struct Dispatcher {
    db: Database,
    connections: Arc<ConnectionManager>,
    publishers: HashMap<PlatformId, Arc<dyn Publisher>>,
    settings: DispatchConfig,
}

impl Dispatcher {
    /// Build a dispatcher with the real platform publishers
    pub fn new(db: Database, connections: Arc<ConnectionManager>, config: &Config) -> Self {
        Self {
            db,
            connections,
            publishers: create_publishers(config),
            settings: config.dispatch.clone(),
        }
    }

    /// Build a dispatcher with injected publishers (tests)
    pub fn with_publishers(
        db: Database,
        connections: Arc<ConnectionManager>,
        settings: DispatchConfig,
        publishers: HashMap<PlatformId, Arc<dyn Publisher>>,
    ) -> Self {
        Self {
            db,
            connections,
            publishers,
            settings,
        }
    }

    /// One dispatch tick: claim everything due, publish concurrently.
    ///
    /// Returns the number of entries claimed. Selection order is
    /// process_after then entry id; completion order across workers is
    /// whatever the network gives us.
    pub async fn tick(&self) -> Result<usize> {
        let now = chrono::Utc::now().timestamp();
        let due = self.db.due_entries(now, DISPATCH_BATCH).await?;

        let mut claimed = Vec::new();
        for entry in due {
            // lost claims just mean another tick got there first
            if self.db.claim_entry(entry.id).await? {
                claimed.push(entry);
            }
        }

        if claimed.is_empty() {
            return Ok(0);
        }

        info!(count = claimed.len(), "dispatching due queue entries");
        let workers = claimed.iter().map(|entry| self.process_entry(entry));
        join_all(workers).await;

        Ok(claimed.len())
    }

    /// Drive one claimed entry to its next state.
    ///
    /// Never returns an error: every failure path records itself on the
    /// entry and the processing of sibling entries continues regardless.
    async fn process_entry(&self, entry: &QueueEntry) {
        if let Err(e) = self.try_process_entry(entry).await {
            // storage failure while recording an outcome; the entry stays
            // in_flight and startup recovery will return it to pending
            warn!(entry_id = entry.id, error = %e, "entry processing aborted");
        }
        if let Err(e) = self.db.recompute_post_status(&entry.post_id).await {
            warn!(post_id = %entry.post_id, error = %e, "post status recompute failed");
        }
    }

    async fn try_process_entry(&self, entry: &QueueEntry) -> Result<()> {
        let Some(post) = self.db.get_post(&entry.post_id).await? else {
            self.db
                .fail_entry(entry.id, "parent post no longer exists")
                .await?;
            return Ok(());
        };

        let Some(publisher) = self.publishers.get(&entry.platform) else {
            self.db
                .fail_entry(entry.id, &format!("no publisher for {}", entry.platform))
                .await?;
            return Ok(());
        };

        let Some(connection) = self
            .db
            .get_connection(&post.account_id, entry.platform)
            .await?
        else {
            self.db
                .fail_entry(
                    entry.id,
                    &format!("no {} connection for {}", entry.platform, post.account_id),
                )
                .await?;
            return Ok(());
        };

        // refresh before touching the platform; a connection that cannot be
        // made fresh fails the entry without a publish attempt
        let connection = match self.connections.ensure_fresh(&connection).await {
            Ok(connection) => connection,
            Err(e) => {
                warn!(entry_id = entry.id, platform = %entry.platform, error = %e,
                      "connection unavailable");
                self.db.fail_entry(entry.id, &e.to_string()).await?;
                return Ok(());
            }
        };

        let job = PublishJob {
            platform: entry.platform,
            content: post.content.clone(),
            media: post.media.clone(),
            hashtags: post.hashtags.clone(),
            kind: post.content_kind,
            access_token: connection.access_token.clone(),
            author_external_id: connection.external_id.clone(),
        };

        match publisher.publish(&job).await {
            Ok(platform_post_id) => {
                info!(entry_id = entry.id, platform = %entry.platform,
                      platform_post_id = %platform_post_id, "published");
                self.db.complete_entry(entry.id, &platform_post_id).await?;
            }
            Err(e) => self.record_publish_failure(entry, e).await?,
        }

        Ok(())
    }

    async fn record_publish_failure(&self, entry: &QueueEntry, error: PublishError) -> Result<()> {
        // the claim already counted this attempt; the snapshot predates it
        let attempts = entry.attempts + 1;

        if error.is_retryable() && attempts < self.settings.max_attempts {
            let delay = self.backoff_delay(attempts);
            let next = chrono::Utc::now().timestamp() + delay;
            warn!(entry_id = entry.id, platform = %entry.platform, attempts,
                  retry_in = delay, error = %error, "publish failed, will retry");
            self.db
                .retry_entry(entry.id, next, &error.to_string())
                .await?;
        } else {
            warn!(entry_id = entry.id, platform = %entry.platform, attempts,
                  error = %error, "publish abandoned");
            self.db.abandon_entry(entry.id, &error.to_string()).await?;
        }

        Ok(())
    }

    /// Exponential backoff: base * 2^(attempts-1), capped
    fn backoff_delay(&self, attempts: u32) -> i64 {
        let base = self.settings.retry_base_delay.max(0) as i64;
        let shift = attempts.saturating_sub(1).min(20);
        let delay = base.saturating_mul(1_i64 << shift);
        delay.min(self.settings.retry_max_delay as i64)
    }
}
