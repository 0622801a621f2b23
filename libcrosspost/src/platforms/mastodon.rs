//! Mastodon publish client
//!
//! Posts a status through the instance's REST API. The default endpoint
//! targets mastodon.social; self-hosted instances set `publish_url` on
//! their app config.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::PublishError;
use crate::types::PlatformId;

use super::{compose_text, http_client, read_json_response, PublishJob, Publisher};

const PUBLISH_URL: &str = "https://mastodon.social/api/v1/statuses";

pub struct MastodonPublisher {
    http: reqwest::Client,
    url: String,
}

impl MastodonPublisher {
    pub fn new(timeout: Duration, url_override: Option<String>) -> Self {
        Self {
            http: http_client(timeout),
            url: url_override.unwrap_or_else(|| PUBLISH_URL.to_string()),
        }
    }
}

/// Render the status text, media URLs trailing
fn status_text(job: &PublishJob) -> String {
    let mut text = compose_text(&job.content, &job.hashtags);
    for media in &job.media {
        text.push('\n');
        text.push_str(&media.url);
    }
    text
}

#[async_trait]
impl Publisher for MastodonPublisher {
    fn platform(&self) -> PlatformId {
        PlatformId::Mastodon
    }

    async fn publish(&self, job: &PublishJob) -> Result<String, PublishError> {
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&job.access_token)
            .form(&[("status", status_text(job))])
            .send()
            .await;

        let body = read_json_response(self.platform(), response).await?;
        body["id"].as_str().map(str::to_string).ok_or_else(|| {
            PublishError::Rejected("mastodon response missing status id".to_string())
        })
    }
}
