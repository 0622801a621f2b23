//! Platform publish clients
//!
//! One module per platform, each speaking its REST publish endpoint over
//! a per-request reqwest client with bearer auth. All clients implement
//! the `Publisher` trait the dispatcher drives; `mock` provides the
//! scriptable test double used by dispatch and integration tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::PublishError;
use crate::types::{ContentKind, MediaRef, PlatformId};

pub mod facebook;
pub mod instagram;
pub mod linkedin;
pub mod mastodon;
pub mod twitter;

// Available for all builds so integration tests can inject it
pub mod mock;

/// Everything a publish call needs, resolved by the dispatcher:
/// validated content plus the live credential for the target account.
#[derive(Debug, Clone)]
pub struct PublishJob {
    pub platform: PlatformId,
    pub content: String,
    pub media: Vec<MediaRef>,
    pub hashtags: Vec<String>,
    pub kind: ContentKind,
    pub access_token: String,
    /// The connection's external account id (author urn, page id, ...)
    pub author_external_id: String,
}

/// A client able to publish one job to one platform
#[async_trait]
pub trait Publisher: Send + Sync {
    /// The platform this client publishes to
    fn platform(&self) -> PlatformId;

    /// Publish the job, returning the platform-assigned post id.
    ///
    /// Errors carry their retry classification: `Network` and `RateLimited`
    /// are worth another attempt, `Unauthorized` and `Rejected` are not.
    async fn publish(&self, job: &PublishJob) -> Result<String, PublishError>;
}

/// Build the real publisher for every registered platform.
///
/// Config may override a platform's publish URL (self-hosted instances,
/// tests); the HTTP timeout comes from the dispatch settings.
pub fn create_publishers(config: &Config) -> HashMap<PlatformId, Arc<dyn Publisher>> {
    let timeout = Duration::from_secs(config.dispatch.http_timeout);
    let override_for = |platform: PlatformId| {
        config
            .apps
            .get(platform.as_str())
            .and_then(|app| app.publish_url.clone())
    };

    let mut publishers: HashMap<PlatformId, Arc<dyn Publisher>> = HashMap::new();
    publishers.insert(
        PlatformId::Twitter,
        Arc::new(twitter::TwitterPublisher::new(
            timeout,
            override_for(PlatformId::Twitter),
        )),
    );
    publishers.insert(
        PlatformId::Mastodon,
        Arc::new(mastodon::MastodonPublisher::new(
            timeout,
            override_for(PlatformId::Mastodon),
        )),
    );
    publishers.insert(
        PlatformId::Linkedin,
        Arc::new(linkedin::LinkedinPublisher::new(
            timeout,
            override_for(PlatformId::Linkedin),
        )),
    );
    publishers.insert(
        PlatformId::Facebook,
        Arc::new(facebook::FacebookPublisher::new(
            timeout,
            override_for(PlatformId::Facebook),
        )),
    );
    publishers.insert(
        PlatformId::Instagram,
        Arc::new(instagram::InstagramPublisher::new(
            timeout,
            override_for(PlatformId::Instagram),
        )),
    );
    publishers
}

/// Append hashtags to the post body.
///
/// Tags are normalized to a single leading '#'; tags already written into
/// the content are not repeated.
pub(crate) fn compose_text(content: &str, hashtags: &[String]) -> String {
    let mut tags: Vec<String> = Vec::new();
    for tag in hashtags {
        let bare = tag.trim_start_matches('#');
        if bare.is_empty() {
            continue;
        }
        let rendered = format!("#{}", bare);
        if !content.contains(&rendered) && !tags.contains(&rendered) {
            tags.push(rendered);
        }
    }

    if tags.is_empty() {
        content.to_string()
    } else {
        format!("{}\n\n{}", content, tags.join(" "))
    }
}

/// Map an HTTP status to the retry classification the dispatcher acts on
pub(crate) fn classify_status(
    platform: PlatformId,
    status: reqwest::StatusCode,
    body: &str,
) -> PublishError {
    let detail = format!("{} returned {}: {}", platform, status, body);
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        PublishError::RateLimited(detail)
    } else if status == reqwest::StatusCode::UNAUTHORIZED
        || status == reqwest::StatusCode::FORBIDDEN
    {
        PublishError::Unauthorized(detail)
    } else if status.is_server_error() || status == reqwest::StatusCode::REQUEST_TIMEOUT {
        PublishError::Network(detail)
    } else {
        PublishError::Rejected(detail)
    }
}

/// Check the response status and parse the JSON body.
///
/// Transport errors (including timeouts) classify as `Network`.
pub(crate) async fn read_json_response(
    platform: PlatformId,
    response: Result<reqwest::Response, reqwest::Error>,
) -> Result<serde_json::Value, PublishError> {
    let response = response
        .map_err(|e| PublishError::Network(format!("{} request failed: {}", platform, e)))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_status(platform, status, &body));
    }

    response
        .json()
        .await
        .map_err(|e| PublishError::Rejected(format!("{} response parse failed: {}", platform, e)))
}

pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}
