//! The process-wide admission secret.

use std::{os::unix::fs::PermissionsExt, path::PathBuf};

use rand::{rngs::OsRng, RngCore};
use tokio::fs;

use crate::{utils, LudocoreResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Length of the generated API key in bytes (32 bytes = 64 hex characters).
pub const API_KEY_LENGTH: usize = 32;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Generates a cryptographically secure random API key, hex encoded.
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; API_KEY_LENGTH];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Persists the API key under the ludocore home with `0600` permissions.
pub async fn save_api_key(api_key: &str) -> LudocoreResult<()> {
    let key_path = api_key_path();
    if let Some(parent) = key_path.parent() {
        fs::create_dir_all(parent).await?;
    }

    fs::write(&key_path, api_key).await?;
    fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600)).await?;
    Ok(())
}

/// Loads the persisted API key.
pub async fn load_api_key() -> LudocoreResult<String> {
    let key_path = api_key_path();
    let data = fs::read_to_string(&key_path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            crate::LudocoreError::NotFound(format!(
                "API key file not found at {} (has the daemon been started?)",
                key_path.display()
            ))
        } else {
            e.into()
        }
    })?;

    Ok(data.trim().to_string())
}

/// Ensures an API key exists, generating and persisting one if necessary.
/// Returns the key and whether it was newly generated.
pub async fn ensure_api_key() -> LudocoreResult<(String, bool)> {
    let key_path = api_key_path();
    if fs::try_exists(&key_path).await? {
        return Ok((load_api_key().await?, false));
    }

    let api_key = generate_api_key();
    save_api_key(&api_key).await?;
    Ok((api_key, true))
}

/// Length-independent equality for secrets. Both the comparison against the
/// stored API key and CSRF lookups go through this so response timing does
/// not leak prefix matches.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

fn api_key_path() -> PathBuf {
    utils::ludocore_home_path().join(utils::API_KEY_FILENAME)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_api_key_shape() {
        let key = generate_api_key();
        assert_eq!(key.len(), API_KEY_LENGTH * 2);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(key, generate_api_key());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("abc123", "abc123"));
        assert!(constant_time_eq("", ""));

        assert!(!constant_time_eq("abc123", "abc124"));
        assert!(!constant_time_eq("abc123", "abc12"));
        assert!(!constant_time_eq("abc123", ""));
        assert!(!constant_time_eq("", "abc123"));
    }
}
