//! LinkedIn publish client
//!
//! Creates a UGC share authored by the connected member. The author urn is
//! derived from the connection's external account id.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::PublishError;
use crate::types::{ContentKind, PlatformId};

use super::{compose_text, http_client, read_json_response, PublishJob, Publisher};

const PUBLISH_URL: &str = "https://api.linkedin.com/v2/ugcPosts";

pub struct LinkedinPublisher {
    http: reqwest::Client,
    url: String,
}

impl LinkedinPublisher {
    pub fn new(timeout: Duration, url_override: Option<String>) -> Self {
        Self {
            http: http_client(timeout),
            url: url_override.unwrap_or_else(|| PUBLISH_URL.to_string()),
        }
    }
}

/// Build the UGC share body
fn share_body(job: &PublishJob) -> serde_json::Value {
    let media_category = if job.kind == ContentKind::Article || !job.media.is_empty() {
        "ARTICLE"
    } else {
        "NONE"
    };

    let media: Vec<serde_json::Value> = job
        .media
        .iter()
        .map(|m| {
            serde_json::json!({
                "status": "READY",
                "originalUrl": m.url,
            })
        })
        .collect();

    serde_json::json!({
        "author": format!("urn:li:person:{}", job.author_external_id),
        "lifecycleState": "PUBLISHED",
        "specificContent": {
            "com.linkedin.ugc.ShareContent": {
                "shareCommentary": { "text": compose_text(&job.content, &job.hashtags) },
                "shareMediaCategory": media_category,
                "media": media,
            }
        },
        "visibility": {
            "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC"
        }
    })
}

#[async_trait]
impl Publisher for LinkedinPublisher {
    fn platform(&self) -> PlatformId {
        PlatformId::Linkedin
    }

    async fn publish(&self, job: &PublishJob) -> Result<String, PublishError> {
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&job.access_token)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(&share_body(job))
            .send()
            .await;

        let body = read_json_response(self.platform(), response).await?;
        body["id"].as_str().map(str::to_string).ok_or_else(|| {
            PublishError::Rejected("linkedin response missing share id".to_string())
        })
    }
}
