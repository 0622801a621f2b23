//! Twitter / X publish client
//!
//! Posts through the v2 tweets endpoint. Media is referenced by URL and
//! appended to the tweet body; the platform renders it as a card.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::PublishError;
use crate::types::PlatformId;

use super::{compose_text, http_client, read_json_response, PublishJob, Publisher};

const PUBLISH_URL: &str = "https://api.x.com/2/tweets";

pub struct TwitterPublisher {
    http: reqwest::Client,
    url: String,
}

impl TwitterPublisher {
    pub fn new(timeout: Duration, url_override: Option<String>) -> Self {
        Self {
            http: http_client(timeout),
            url: url_override.unwrap_or_else(|| PUBLISH_URL.to_string()),
        }
    }
}

/// Build the tweet creation body
fn tweet_body(job: &PublishJob) -> serde_json::Value {
    let mut text = compose_text(&job.content, &job.hashtags);
    for media in &job.media {
        text.push('\n');
        text.push_str(&media.url);
    }
    serde_json::json!({ "text": text })
}

#[async_trait]
impl Publisher for TwitterPublisher {
    fn platform(&self) -> PlatformId {
        PlatformId::Twitter
    }

    async fn publish(&self, job: &PublishJob) -> Result<String, PublishError> {
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&job.access_token)
            .json(&tweet_body(job))
            .send()
            .await;

        let body = read_json_response(self.platform(), response).await?;
        body["data"]["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                PublishError::Rejected("twitter response missing tweet id".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentKind, MediaRef};

    fn job() -> PublishJob {
        PublishJob {
            platform: PlatformId::Twitter,
            content: "release day".to_string(),
            media: vec![],
            hashtags: vec!["rustlang".to_string()],
            kind: ContentKind::Text,
            access_token: "tok".to_string(),
            author_external_id: "4242".to_string(),
        }
    }

    #[test]
    fn test_tweet_body_text_and_tags() {
        let body = tweet_body(&job());
        assert_eq!(body["text"], "release day\n\n#rustlang");
    }

    #[test]
    fn test_tweet_body_appends_media_urls() {
        let mut job = job();
        job.media = vec![MediaRef::from_url("https://cdn.example.com/a.jpg").unwrap()];
        let body = tweet_body(&job);
        let text = body["text"].as_str().unwrap();
        assert!(text.ends_with("https://cdn.example.com/a.jpg"));
    }
}
