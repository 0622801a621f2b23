//! PKCE verifier/challenge generation and CSRF state tokens
//!
//! The verifier carries 256 bits of OS-seeded entropy and only ever leaves
//! this process inside the token-exchange form body. The state token binds
//! an OAuth callback to the account and caller that initiated it; the nonce
//! makes it unguessable and the issued-at timestamp bounds its life.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

use crate::error::ConnectError;

/// Claims embedded in a state token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateClaims {
    pub account_id: String,
    pub caller_id: String,
    pub issued_at: i64,
}

/// Generate a PKCE code verifier: 32 random bytes, base64url encoded
/// (43 characters, no padding).
pub fn generate_verifier() -> SecretString {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    SecretString::from(URL_SAFE_NO_PAD.encode(bytes))
}

/// Derive the S256 code challenge for a verifier
pub fn challenge_s256(verifier: &SecretString) -> String {
    let digest = Sha256::digest(verifier.expose_secret().as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Build a state token embedding the target account, the initiating
/// caller, and the issue time, plus a 128-bit nonce.
pub fn generate_state(account_id: &str, caller_id: &str, issued_at: i64) -> String {
    let mut nonce = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut nonce);
    let payload = format!(
        "{}\n{}\n{}\n{}",
        account_id,
        caller_id,
        issued_at,
        hex(&nonce)
    );
    URL_SAFE_NO_PAD.encode(payload)
}

/// Decode a state token back into its claims.
///
/// Any structural problem is an `InvalidState`; the caller still has to
/// look the token up in the pending-authorization store, which is what
/// actually enforces single use.
pub fn decode_state(state: &str) -> Result<StateClaims, ConnectError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(state)
        .map_err(|_| ConnectError::InvalidState("not base64url".to_string()))?;
    let payload = String::from_utf8(bytes)
        .map_err(|_| ConnectError::InvalidState("not utf-8".to_string()))?;

    let mut fields = payload.split('\n');
    let account_id = fields.next().unwrap_or_default();
    let caller_id = fields.next();
    let issued_at = fields.next();
    let nonce = fields.next();

    match (caller_id, issued_at, nonce, fields.next()) {
        (Some(caller_id), Some(issued_at), Some(_nonce), None) if !account_id.is_empty() => {
            let issued_at = issued_at
                .parse::<i64>()
                .map_err(|_| ConnectError::InvalidState("bad timestamp".to_string()))?;
            Ok(StateClaims {
                account_id: account_id.to_string(),
                caller_id: caller_id.to_string(),
                issued_at,
            })
        }
        _ => Err(ConnectError::InvalidState("wrong field count".to_string())),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
