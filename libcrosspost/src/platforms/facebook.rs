//! Facebook publish client
//!
//! Posts to the connected page's feed through the Graph API. The page id
//! comes from the connection's external account id; the page access token
//! travels as a query parameter, which is how the Graph API wants it.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::PublishError;
use crate::types::PlatformId;

use super::{compose_text, http_client, read_json_response, PublishJob, Publisher};

const GRAPH_URL: &str = "https://graph.facebook.com/v19.0";

pub struct FacebookPublisher {
    http: reqwest::Client,
    base_url: String,
}

impl FacebookPublisher {
    pub fn new(timeout: Duration, url_override: Option<String>) -> Self {
        Self {
            http: http_client(timeout),
            base_url: url_override.unwrap_or_else(|| GRAPH_URL.to_string()),
        }
    }

    fn feed_url(&self, page_id: &str) -> String {
        format!("{}/{}/feed", self.base_url.trim_end_matches('/'), page_id)
    }
}

/// Query parameters for the feed post
fn feed_params(job: &PublishJob) -> Vec<(&'static str, String)> {
    let mut params = vec![("message", compose_text(&job.content, &job.hashtags))];
    // the first media reference rides along as the link attachment
    if let Some(media) = job.media.first() {
        params.push(("link", media.url.clone()));
    }
    params.push(("access_token", job.access_token.clone()));
    params
}

#[async_trait]
impl Publisher for FacebookPublisher {
    fn platform(&self) -> PlatformId {
        PlatformId::Facebook
    }

    async fn publish(&self, job: &PublishJob) -> Result<String, PublishError> {
        let response = self
            .http
            .post(self.feed_url(&job.author_external_id))
            .query(&feed_params(job))
            .send()
            .await;

        let body = read_json_response(self.platform(), response).await?;
        body["id"].as_str().map(str::to_string).ok_or_else(|| {
            PublishError::Rejected("facebook response missing post id".to_string())
        })
    }
}
