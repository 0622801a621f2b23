//! OAuth connection manager
//!
//! Owns the per-platform authorization handshake, the ephemeral pending-
//! authorization store, and the stored `Connection` records. The dispatcher
//! only ever reads connections through `ensure_fresh`; every mutation goes
//! through here.

pub mod pkce;
pub mod providers;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::{Database, NewConnection};
use crate::error::{ConnectError, Result};
use crate::types::{Connection, ConnectionStatus, PlatformId};
use providers::{OauthClient, OauthFlavor};

/// Pending authorizations older than this are unredeemable
pub const STATE_TTL_SECS: i64 = 600;

/// Refresh when the access token expires within this margin
pub const REFRESH_MARGIN_SECS: i64 = 300;

/// One in-flight OAuth attempt, keyed by its state token.
///
/// Removed from the store on first lookup, success or failure, so a
/// code/verifier pair can never be replayed.
struct PendingAuthorization {
    verifier: Option<SecretString>,
    account_id: String,
    caller_id: String,
    issued_at: i64,
}

pub struct ConnectionManager {
    db: Database,
    config: Arc<Config>,
    pending: Mutex<HashMap<String, PendingAuthorization>>,
    refresh_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl ConnectionManager {
    pub fn new(db: Database, config: Arc<Config>) -> Self {
        Self {
            db,
            config,
            pending: Mutex::new(HashMap::new()),
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    fn oauth_client(&self, platform: PlatformId) -> std::result::Result<OauthClient, ConnectError> {
        let app = self.config.app_for(platform)?;
        OauthClient::new(
            platform,
            app,
            self.config.redirect_uri(platform),
            Duration::from_secs(self.config.dispatch.http_timeout),
        )
    }

    /// Start an authorization attempt and return the URL to send the
    /// operator's browser to.
    ///
    /// Stores one pending authorization under a fresh state token; for PKCE
    /// platforms the verifier stays here and only its S256 challenge goes
    /// into the URL.
    pub async fn initiate(
        &self,
        platform: PlatformId,
        account_id: &str,
        caller_id: &str,
    ) -> Result<String> {
        let client = self.oauth_client(platform)?;
        let now = chrono::Utc::now().timestamp();
        let state = pkce::generate_state(account_id, caller_id, now);

        let (verifier, challenge) = match client.flavor() {
            OauthFlavor::Pkce => {
                let verifier = pkce::generate_verifier();
                let challenge = pkce::challenge_s256(&verifier);
                (Some(verifier), Some(challenge))
            }
            _ => (None, None),
        };

        let url = client.build_auth_url(&state, challenge.as_deref());

        let mut pending = self.pending.lock().await;
        // drop attempts nobody can redeem anymore
        pending.retain(|_, p| now - p.issued_at <= STATE_TTL_SECS);
        pending.insert(
            state,
            PendingAuthorization {
                verifier,
                account_id: account_id.to_string(),
                caller_id: caller_id.to_string(),
                issued_at: now,
            },
        );

        info!(%platform, account_id, "authorization initiated");
        Ok(url)
    }

    /// Complete an authorization attempt from the provider callback.
    ///
    /// The pending authorization is consumed on lookup, before anything
    /// else can fail, so each state token is redeemable exactly once.
    pub async fn complete(
        &self,
        platform: PlatformId,
        code: &str,
        state: &str,
        caller_id: &str,
    ) -> Result<Connection> {
        let claims = pkce::decode_state(state)?;

        let pending = {
            let mut pending = self.pending.lock().await;
            pending.remove(state).ok_or_else(|| {
                ConnectError::InvalidState("unknown or already redeemed".to_string())
            })?
        };

        let now = chrono::Utc::now().timestamp();
        if now - pending.issued_at > STATE_TTL_SECS {
            return Err(ConnectError::InvalidState("expired".to_string()).into());
        }
        if pending.account_id != claims.account_id {
            return Err(ConnectError::InvalidState("account mismatch".to_string()).into());
        }
        if pending.caller_id != caller_id {
            return Err(ConnectError::Unauthenticated(format!(
                "state was issued to a different operator for {}",
                platform
            ))
            .into());
        }

        let client = self.oauth_client(platform)?;
        let bundle = client.exchange_code(code, pending.verifier.as_ref()).await?;
        let profile = client.fetch_profile(&bundle.access_token).await?;

        let connection = self
            .db
            .upsert_connection(&NewConnection {
                account_id: pending.account_id,
                platform,
                external_id: profile.external_id,
                handle: profile.handle,
                access_token: bundle.access_token,
                refresh_token: bundle.refresh_token,
                expires_at: bundle.expires_in.map(|secs| now + secs),
                scope: bundle.scope.unwrap_or_default(),
            })
            .await?;

        info!(%platform, account_id = %connection.account_id, handle = %connection.handle,
              "connection established");
        Ok(connection)
    }

    /// Return a connection whose access token is good for at least the
    /// refresh margin, refreshing it in place when necessary.
    ///
    /// Refreshing runs under a per-connection lock: concurrent publishers
    /// for the same connection share one refresh instead of racing their
    /// own. A connection that cannot be refreshed is marked expired and
    /// needs a fresh `initiate`/`complete` from the operator.
    pub async fn ensure_fresh(&self, connection: &Connection) -> Result<Connection> {
        match connection.status {
            ConnectionStatus::Inactive => {
                return Err(ConnectError::ReauthorizationRequired(format!(
                    "{} connection for {} is disconnected",
                    connection.platform, connection.account_id
                ))
                .into());
            }
            ConnectionStatus::Expired => {
                return Err(ConnectError::ReauthorizationRequired(format!(
                    "{} connection for {} has expired",
                    connection.platform, connection.account_id
                ))
                .into());
            }
            ConnectionStatus::Active => {}
        }

        let now = chrono::Utc::now().timestamp();
        if !connection.expires_within(now, REFRESH_MARGIN_SECS) {
            return Ok(connection.clone());
        }

        let lock = {
            let mut locks = self.refresh_locks.lock().await;
            locks
                .entry(connection.id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = lock.lock().await;

        // another worker may have refreshed while we waited on the lock
        let current = self
            .db
            .get_connection(&connection.account_id, connection.platform)
            .await?
            .ok_or_else(|| {
                ConnectError::ReauthorizationRequired(format!(
                    "{} connection for {} no longer exists",
                    connection.platform, connection.account_id
                ))
            })?;

        let now = chrono::Utc::now().timestamp();
        if current.status == ConnectionStatus::Active
            && !current.expires_within(now, REFRESH_MARGIN_SECS)
        {
            debug!(platform = %current.platform, "token already refreshed by another worker");
            return Ok(current);
        }

        let Some(refresh_token) = current.refresh_token.clone() else {
            self.mark_expired(&current).await;
            return Err(ConnectError::ReauthorizationRequired(format!(
                "{} connection for {} has no refresh token",
                current.platform, current.account_id
            ))
            .into());
        };

        let client = self.oauth_client(current.platform)?;
        let bundle = match client.refresh(&refresh_token).await {
            Ok(bundle) => bundle,
            Err(e) => {
                warn!(platform = %current.platform, error = %e, "token refresh rejected");
                self.mark_expired(&current).await;
                return Err(ConnectError::ReauthorizationRequired(format!(
                    "{} refresh rejected: {}",
                    current.platform, e
                ))
                .into());
            }
        };

        self.db
            .update_connection_tokens(
                current.id,
                &bundle.access_token,
                bundle.refresh_token.as_deref(),
                bundle.expires_in.map(|secs| now + secs),
            )
            .await?;

        let refreshed = self
            .db
            .get_connection(&current.account_id, current.platform)
            .await?
            .ok_or_else(|| {
                crate::error::DbError::CorruptRecord("connection vanished after refresh".into())
            })?;

        info!(platform = %refreshed.platform, account_id = %refreshed.account_id,
              "access token refreshed");
        Ok(refreshed)
    }

    /// Operator-initiated disconnect: active -> inactive.
    ///
    /// The row stays; a later `complete` for the same pair reactivates it.
    pub async fn disconnect(&self, account_id: &str, platform: PlatformId) -> Result<bool> {
        let changed = self
            .db
            .set_connection_status(account_id, platform, ConnectionStatus::Inactive)
            .await?;
        if changed {
            info!(%platform, account_id, "connection deactivated");
        }
        Ok(changed)
    }

    async fn mark_expired(&self, connection: &Connection) {
        if let Err(e) = self
            .db
            .set_connection_status(
                &connection.account_id,
                connection.platform,
                ConnectionStatus::Expired,
            )
            .await
        {
            warn!(error = %e, "failed to mark connection expired");
        }
    }
}
