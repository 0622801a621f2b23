//! Per-platform OAuth endpoint table and protocol client
//!
//! Platform variance (PKCE vs. plain authorization-code vs. direct-scope
//! redirect, differing endpoints and scope separators) is captured in one
//! static dispatch table keyed by `PlatformId`. The `OauthClient` is built
//! per request from the app config passed down to it; nothing is cached
//! process-wide.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::config::AppConfig;
use crate::error::ConnectError;
use crate::types::PlatformId;

/// How a platform's authorization flow binds the code exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OauthFlavor {
    /// Authorization code with a PKCE S256 challenge
    Pkce,
    /// Plain authorization code, client secret in the exchange form
    AuthorizationCode,
    /// Scope-carrying redirect; code exchanged via query parameters
    ScopeRedirect,
}

/// Well-known endpoints for one platform
#[derive(Debug, Clone, Copy)]
pub struct ProviderEndpoints {
    pub flavor: OauthFlavor,
    pub auth_url: &'static str,
    pub token_url: &'static str,
    pub profile_url: &'static str,
    pub scopes: &'static [&'static str],
    pub scope_sep: &'static str,
}

static TWITTER: ProviderEndpoints = ProviderEndpoints {
    flavor: OauthFlavor::Pkce,
    auth_url: "https://x.com/i/oauth2/authorize",
    token_url: "https://api.x.com/2/oauth2/token",
    profile_url: "https://api.x.com/2/users/me",
    scopes: &["tweet.read", "tweet.write", "users.read", "offline.access"],
    scope_sep: " ",
};

static MASTODON: ProviderEndpoints = ProviderEndpoints {
    flavor: OauthFlavor::AuthorizationCode,
    auth_url: "https://mastodon.social/oauth/authorize",
    token_url: "https://mastodon.social/oauth/token",
    profile_url: "https://mastodon.social/api/v1/accounts/verify_credentials",
    scopes: &["read:accounts", "write:statuses"],
    scope_sep: " ",
};

static LINKEDIN: ProviderEndpoints = ProviderEndpoints {
    flavor: OauthFlavor::AuthorizationCode,
    auth_url: "https://www.linkedin.com/oauth/v2/authorization",
    token_url: "https://www.linkedin.com/oauth/v2/accessToken",
    profile_url: "https://api.linkedin.com/v2/userinfo",
    scopes: &["openid", "profile", "w_member_social"],
    scope_sep: " ",
};

static FACEBOOK: ProviderEndpoints = ProviderEndpoints {
    flavor: OauthFlavor::ScopeRedirect,
    auth_url: "https://www.facebook.com/v19.0/dialog/oauth",
    token_url: "https://graph.facebook.com/v19.0/oauth/access_token",
    profile_url: "https://graph.facebook.com/v19.0/me",
    scopes: &["pages_manage_posts", "pages_read_engagement"],
    scope_sep: ",",
};

static INSTAGRAM: ProviderEndpoints = ProviderEndpoints {
    flavor: OauthFlavor::ScopeRedirect,
    auth_url: "https://www.facebook.com/v19.0/dialog/oauth",
    token_url: "https://graph.facebook.com/v19.0/oauth/access_token",
    profile_url: "https://graph.facebook.com/v19.0/me",
    scopes: &["instagram_basic", "instagram_content_publish"],
    scope_sep: ",",
};

impl PlatformId {
    /// The platform's default OAuth endpoints; config may override URLs
    pub fn oauth_defaults(self) -> &'static ProviderEndpoints {
        match self {
            PlatformId::Twitter => &TWITTER,
            PlatformId::Mastodon => &MASTODON,
            PlatformId::Linkedin => &LINKEDIN,
            PlatformId::Facebook => &FACEBOOK,
            PlatformId::Instagram => &INSTAGRAM,
        }
    }
}

/// Token endpoint response, normalized across platforms
#[derive(Debug, Clone, Deserialize)]
pub struct TokenBundle {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Minimal profile fields used to populate a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub external_id: String,
    pub handle: String,
}

/// One authorization attempt's view of a platform's OAuth protocol.
///
/// Built per request from the app config; drops with the request.
pub struct OauthClient {
    platform: PlatformId,
    flavor: OauthFlavor,
    auth_url: String,
    token_url: String,
    profile_url: String,
    scope: String,
    client_id: String,
    client_secret: SecretString,
    redirect_uri: String,
    http: reqwest::Client,
}

impl OauthClient {
    pub fn new(
        platform: PlatformId,
        app: &AppConfig,
        redirect_uri: String,
        timeout: Duration,
    ) -> Result<Self, ConnectError> {
        let defaults = platform.oauth_defaults();
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConnectError::TokenExchangeFailed(format!("http client: {}", e)))?;

        Ok(Self {
            platform,
            flavor: defaults.flavor,
            auth_url: app
                .auth_url
                .clone()
                .unwrap_or_else(|| defaults.auth_url.to_string()),
            token_url: app
                .token_url
                .clone()
                .unwrap_or_else(|| defaults.token_url.to_string()),
            profile_url: app
                .profile_url
                .clone()
                .unwrap_or_else(|| defaults.profile_url.to_string()),
            scope: defaults.scopes.join(defaults.scope_sep),
            client_id: app.client_id.clone(),
            client_secret: SecretString::from(app.client_secret.clone()),
            redirect_uri,
            http,
        })
    }

    pub fn flavor(&self) -> OauthFlavor {
        self.flavor
    }

    /// Build the authorization URL the operator's browser is sent to.
    ///
    /// `challenge` must be present exactly for PKCE platforms.
    pub fn build_auth_url(&self, state: &str, challenge: Option<&str>) -> String {
        let mut url = format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}",
            self.auth_url,
            urlencoded(&self.client_id),
            urlencoded(&self.redirect_uri),
            urlencoded(&self.scope),
            urlencoded(state),
        );

        if let Some(challenge) = challenge {
            url.push_str(&format!(
                "&code_challenge={}&code_challenge_method=S256",
                urlencoded(challenge)
            ));
        }

        url
    }

    /// Exchange an authorization code for a token bundle.
    ///
    /// `verifier` is required for PKCE platforms and ignored elsewhere.
    /// Platform error bodies are surfaced for diagnostics; the verifier and
    /// client secret never are.
    pub async fn exchange_code(
        &self,
        code: &str,
        verifier: Option<&SecretString>,
    ) -> Result<TokenBundle, ConnectError> {
        let response = match self.flavor {
            OauthFlavor::Pkce => {
                let verifier = verifier.ok_or_else(|| {
                    ConnectError::TokenExchangeFailed(format!(
                        "{} requires a PKCE verifier",
                        self.platform
                    ))
                })?;
                self.http
                    .post(&self.token_url)
                    .basic_auth(&self.client_id, Some(self.client_secret.expose_secret()))
                    .form(&[
                        ("grant_type", "authorization_code"),
                        ("code", code),
                        ("client_id", &self.client_id),
                        ("redirect_uri", &self.redirect_uri),
                        ("code_verifier", verifier.expose_secret()),
                    ])
                    .send()
                    .await
            }
            OauthFlavor::AuthorizationCode => {
                self.http
                    .post(&self.token_url)
                    .form(&[
                        ("grant_type", "authorization_code"),
                        ("code", code),
                        ("client_id", &self.client_id),
                        ("client_secret", self.client_secret.expose_secret()),
                        ("redirect_uri", &self.redirect_uri),
                    ])
                    .send()
                    .await
            }
            OauthFlavor::ScopeRedirect => {
                // Graph-style exchange: parameters travel in the query string
                self.http
                    .get(&self.token_url)
                    .query(&[
                        ("client_id", self.client_id.as_str()),
                        ("client_secret", self.client_secret.expose_secret()),
                        ("redirect_uri", self.redirect_uri.as_str()),
                        ("code", code),
                    ])
                    .send()
                    .await
            }
        };

        self.read_token_response(response, "code exchange").await
    }

    /// Exchange a refresh token for a fresh token bundle
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenBundle, ConnectError> {
        let response = match self.flavor {
            OauthFlavor::Pkce => {
                self.http
                    .post(&self.token_url)
                    .basic_auth(&self.client_id, Some(self.client_secret.expose_secret()))
                    .form(&[
                        ("grant_type", "refresh_token"),
                        ("refresh_token", refresh_token),
                        ("client_id", &self.client_id),
                    ])
                    .send()
                    .await
            }
            OauthFlavor::AuthorizationCode => {
                self.http
                    .post(&self.token_url)
                    .form(&[
                        ("grant_type", "refresh_token"),
                        ("refresh_token", refresh_token),
                        ("client_id", &self.client_id),
                        ("client_secret", self.client_secret.expose_secret()),
                    ])
                    .send()
                    .await
            }
            OauthFlavor::ScopeRedirect => {
                // Graph-style long-lived token exchange; the "refresh token"
                // here is the current access token
                self.http
                    .get(&self.token_url)
                    .query(&[
                        ("grant_type", "fb_exchange_token"),
                        ("client_id", self.client_id.as_str()),
                        ("client_secret", self.client_secret.expose_secret()),
                        ("fb_exchange_token", refresh_token),
                    ])
                    .send()
                    .await
            }
        };

        self.read_token_response(response, "token refresh").await
    }

    /// Fetch the external account id and display handle
    pub async fn fetch_profile(
        &self,
        access_token: &str,
    ) -> Result<ProviderProfile, ConnectError> {
        let response = self
            .http
            .get(&self.profile_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ConnectError::ProfileFetchFailed(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectError::ProfileFetchFailed(format!(
                "{} returned {}: {}",
                self.platform, status, body
            )));
        }

        let profile: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ConnectError::ProfileFetchFailed(format!("parse failed: {}", e)))?;

        extract_profile(&profile, self.platform)
    }

    async fn read_token_response(
        &self,
        response: std::result::Result<reqwest::Response, reqwest::Error>,
        what: &str,
    ) -> Result<TokenBundle, ConnectError> {
        let response = response
            .map_err(|e| ConnectError::TokenExchangeFailed(format!("{} failed: {}", what, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectError::TokenExchangeFailed(format!(
                "{} {} returned {}: {}",
                self.platform, what, status, body
            )));
        }

        response.json::<TokenBundle>().await.map_err(|e| {
            ConnectError::TokenExchangeFailed(format!("{} parse failed: {}", what, e))
        })
    }
}

/// Pull the provider-specific id and handle out of a profile response.
/// Field names differ per platform.
fn extract_profile(
    profile: &serde_json::Value,
    platform: PlatformId,
) -> Result<ProviderProfile, ConnectError> {
    let (id, handle) = match platform {
        PlatformId::Twitter => (
            profile["data"]["id"].as_str().map(str::to_string),
            profile["data"]["username"]
                .as_str()
                .map(|u| format!("@{}", u)),
        ),
        PlatformId::Mastodon => (
            profile["id"].as_str().map(str::to_string),
            profile["acct"]
                .as_str()
                .or_else(|| profile["username"].as_str())
                .map(|u| format!("@{}", u)),
        ),
        PlatformId::Linkedin => (
            profile["sub"].as_str().map(str::to_string),
            profile["name"]
                .as_str()
                .or_else(|| profile["given_name"].as_str())
                .map(str::to_string),
        ),
        PlatformId::Facebook | PlatformId::Instagram => (
            profile["id"]
                .as_str()
                .map(str::to_string)
                .or_else(|| profile["id"].as_i64().map(|n| n.to_string())),
            profile["name"].as_str().map(str::to_string),
        ),
    };

    let external_id = id.ok_or_else(|| {
        ConnectError::ProfileFetchFailed(format!("{} profile missing account id", platform))
    })?;
    let handle = handle.unwrap_or_else(|| external_id.clone());

    Ok(ProviderProfile {
        external_id,
        handle,
    })
}

/// Percent-encode a query parameter value
fn urlencoded(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' | '~' => result.push(ch),
            _ => {
                let mut buf = [0u8; 4];
                let encoded = ch.encode_utf8(&mut buf);
                for byte in encoded.bytes() {
                    result.push('%');
                    result.push_str(&format!("{:02X}", byte));
                }
            }
        }
    }
    result
}
