//! Instagram publish client
//!
//! Two-step Graph API flow: create a media container for the first asset,
//! then publish the container. Instagram has no text-only posts, which the
//! registry enforces before a job ever reaches this client.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::PublishError;
use crate::types::{MediaKind, PlatformId};

use super::{compose_text, http_client, read_json_response, PublishJob, Publisher};

const GRAPH_URL: &str = "https://graph.facebook.com/v19.0";

pub struct InstagramPublisher {
    http: reqwest::Client,
    base_url: String,
}

impl InstagramPublisher {
    pub fn new(timeout: Duration, url_override: Option<String>) -> Self {
        Self {
            http: http_client(timeout),
            base_url: url_override.unwrap_or_else(|| GRAPH_URL.to_string()),
        }
    }

    fn endpoint(&self, user_id: &str, op: &str) -> String {
        format!("{}/{}/{}", self.base_url.trim_end_matches('/'), user_id, op)
    }
}

/// Container creation parameters for the job's first media asset
fn container_params(job: &PublishJob) -> Result<Vec<(&'static str, String)>, PublishError> {
    let media = job.media.first().ok_or_else(|| {
        PublishError::Rejected("instagram requires at least one media asset".to_string())
    })?;

    let url_param = match media.kind {
        MediaKind::Image => "image_url",
        MediaKind::Video => "video_url",
    };

    Ok(vec![
        (url_param, media.url.clone()),
        ("caption", compose_text(&job.content, &job.hashtags)),
        ("access_token", job.access_token.clone()),
    ])
}

#[async_trait]
impl Publisher for InstagramPublisher {
    fn platform(&self) -> PlatformId {
        PlatformId::Instagram
    }

    async fn publish(&self, job: &PublishJob) -> Result<String, PublishError> {
        let user_id = &job.author_external_id;

        let response = self
            .http
            .post(self.endpoint(user_id, "media"))
            .query(&container_params(job)?)
            .send()
            .await;
        let container = read_json_response(self.platform(), response).await?;
        let creation_id = container["id"].as_str().ok_or_else(|| {
            PublishError::Rejected("instagram container response missing id".to_string())
        })?;

        let response = self
            .http
            .post(self.endpoint(user_id, "media_publish"))
            .query(&[
                ("creation_id", creation_id),
                ("access_token", job.access_token.as_str()),
            ])
            .send()
            .await;
        let published = read_json_response(self.platform(), response).await?;
        published["id"].as_str().map(str::to_string).ok_or_else(|| {
            PublishError::Rejected("instagram publish response missing id".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentKind, MediaRef};

    fn job(media: Vec<MediaRef>) -> PublishJob {
        PublishJob {
            platform: PlatformId::Instagram,
            content: "behind the scenes".to_string(),
            media,
            hashtags: vec!["studio".to_string()],
            kind: ContentKind::Image,
            access_token: "ig-tok".to_string(),
            author_external_id: "17890".to_string(),
        }
    }

    #[test]
    fn test_container_params_image() {
        let media = vec![MediaRef::from_url("https://cdn.example.com/shot.jpg").unwrap()];
        let params = container_params(&job(media)).unwrap();
        assert_eq!(params[0], ("image_url", "https://cdn.example.com/shot.jpg".to_string()));
        assert_eq!(params[1].1, "behind the scenes\n\n#studio");
    }

    #[test]
    fn test_container_params_video() {
        let media = vec![MediaRef::from_url("https://cdn.example.com/clip.mp4").unwrap()];
        let params = container_params(&job(media)).unwrap();
        assert_eq!(params[0].0, "video_url");
    }

    #[test]
    fn test_container_params_requires_media() {
        let err = container_params(&job(vec![])).unwrap_err();
        assert!(matches!(err, PublishError::Rejected(_)));
    }

    #[test]
    fn test_endpoint() {
        let publisher = InstagramPublisher::new(Duration::from_secs(5), None);
        assert_eq!(
            publisher.endpoint("17890", "media_publish"),
            "https://graph.facebook.com/v19.0/17890/media_publish"
        );
    }
}
