//! Short-lived HMAC-signed admission tokens.
//!
//! A join token ties one player to one instance for a small time window. The
//! wire format is `base64url(payload) "." base64url(hmac_sha256(secret,
//! base64url(payload)))` with no padding; the payload is a compact JSON
//! document. The game server validates the token on connect with the same
//! shared secret.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::{LudocoreResult, TokenError};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

type HmacSha256 = Hmac<Sha256>;

/// The claims embedded in a join token.
#[derive(Debug, Serialize, Deserialize)]
struct JoinTokenPayload {
    /// Instance (container) name the token admits to.
    #[serde(rename = "c")]
    container_name: String,

    /// External port of the instance.
    #[serde(rename = "p")]
    port: u16,

    /// Expiry as unix seconds.
    #[serde(rename = "exp")]
    expires_at: i64,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Mints a join token for `container_name`/`port` that expires `ttl_secs`
/// seconds from now.
pub fn generate_join_token(
    secret: &str,
    container_name: &str,
    port: u16,
    ttl_secs: i64,
) -> LudocoreResult<String> {
    let payload = JoinTokenPayload {
        container_name: container_name.to_string(),
        port,
        expires_at: (Utc::now() + Duration::seconds(ttl_secs)).timestamp(),
    };

    let payload_json = serde_json::to_vec(&payload).map_err(crate::LudocoreError::custom)?;
    let encoded_payload = URL_SAFE_NO_PAD.encode(payload_json);
    let signature = sign(secret, &encoded_payload);

    Ok(format!("{}.{}", encoded_payload, signature))
}

/// Verifies a join token's signature and expiry, returning the instance name
/// and port it admits to.
pub fn validate_join_token(secret: &str, token: &str) -> Result<(String, u16), TokenError> {
    validate_join_token_at(secret, token, Utc::now().timestamp())
}

/// Verification against an explicit clock, used by [`validate_join_token`]
/// and by tests that need to step past the expiry.
fn validate_join_token_at(
    secret: &str,
    token: &str,
    now_unix: i64,
) -> Result<(String, u16), TokenError> {
    let (encoded_payload, provided_sig) = token.split_once('.').ok_or(TokenError::Malformed)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key size");
    mac.update(encoded_payload.as_bytes());

    let sig_bytes = URL_SAFE_NO_PAD
        .decode(provided_sig)
        .map_err(|_| TokenError::Malformed)?;

    // verify_slice is a constant-time comparison.
    mac.verify_slice(&sig_bytes)
        .map_err(|_| TokenError::InvalidSignature)?;

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(encoded_payload)
        .map_err(|_| TokenError::Malformed)?;
    let payload: JoinTokenPayload =
        serde_json::from_slice(&payload_bytes).map_err(|_| TokenError::Malformed)?;

    if now_unix > payload.expires_at {
        return Err(TokenError::Expired);
    }

    Ok((payload.container_name, payload.port))
}

fn sign(secret: &str, data: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key size");
    mac.update(data.as_bytes());
    URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0f3a61c2d4e5b6a798081726354493a2";

    #[test]
    fn test_join_token_round_trip() {
        let token = generate_join_token(SECRET, "shadow-dragon", 7777, 60).unwrap();
        let (name, port) = validate_join_token(SECRET, &token).unwrap();
        assert_eq!(name, "shadow-dragon");
        assert_eq!(port, 7777);
    }

    #[test]
    fn test_join_token_rejects_wrong_secret() {
        let token = generate_join_token(SECRET, "shadow-dragon", 7777, 60).unwrap();
        assert_eq!(
            validate_join_token("another-secret", &token),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn test_join_token_rejects_tampered_payload() {
        let token = generate_join_token(SECRET, "shadow-dragon", 7777, 60).unwrap();
        let (_, sig) = token.split_once('.').unwrap();

        let forged = JoinTokenPayload {
            container_name: "iron-golem".to_string(),
            port: 7777,
            expires_at: i64::MAX,
        };
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());
        let tampered = format!("{}.{}", forged_payload, sig);

        assert_eq!(
            validate_join_token(SECRET, &tampered),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn test_join_token_expiry_boundary() {
        let token = generate_join_token(SECRET, "shadow-dragon", 7777, 60).unwrap();
        let now = Utc::now().timestamp();

        // Valid right up to the embedded expiry, invalid one second after.
        assert!(validate_join_token_at(SECRET, &token, now + 59).is_ok());
        assert_eq!(
            validate_join_token_at(SECRET, &token, now + 61),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_join_token_malformed_inputs() {
        for bad in ["", "no-dot-here", "a.b", "!!!.???"] {
            let err = validate_join_token(SECRET, bad).unwrap_err();
            assert!(
                matches!(err, TokenError::Malformed | TokenError::InvalidSignature),
                "unexpected error for {bad:?}: {err:?}"
            );
        }
    }
}
