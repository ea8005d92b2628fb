//! Self-signed TLS material for the dashboard.
//!
//! The certificate is generated once (ECDSA P-256, 10-year validity, SANs for
//! localhost, 127.0.0.1, and the configured external IP) and persisted so
//! browsers only show the trust warning on first contact.

use std::{
    net::IpAddr,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use rcgen::{CertificateParams, DnType, KeyPair, SanType};
use tokio::fs;

use crate::{utils, LudocoreError, LudocoreResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Certificate validity in days (10 years).
const CERT_VALIDITY_DAYS: i64 = 10 * 365;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Paths of the persisted certificate and private key.
#[derive(Debug, Clone)]
pub struct TlsPaths {
    /// PEM-encoded certificate.
    pub cert: PathBuf,

    /// PEM-encoded private key.
    pub key: PathBuf,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Loads the persisted TLS cert/key paths, generating and saving a fresh pair
/// if either file is missing. `extra_ips` are added as SANs on first
/// generation only.
pub async fn ensure_tls_cert(extra_ips: &[String]) -> LudocoreResult<TlsPaths> {
    let home = utils::ludocore_home_path();
    let paths = TlsPaths {
        cert: home.join(utils::TLS_CERT_FILENAME),
        key: home.join(utils::TLS_KEY_FILENAME),
    };

    if fs::try_exists(&paths.cert).await? && fs::try_exists(&paths.key).await? {
        return Ok(paths);
    }

    let (cert_pem, key_pem) = generate_self_signed_cert(extra_ips)?;

    fs::create_dir_all(&home).await?;
    write_private(&paths.cert, cert_pem.as_bytes()).await?;
    write_private(&paths.key, key_pem.as_bytes()).await?;

    tracing::info!("generated self-signed TLS certificate at {}", paths.cert.display());
    Ok(paths)
}

/// Generates a self-signed ECDSA P-256 certificate and returns the PEM pair.
/// `localhost` and `127.0.0.1` are always included as SANs; any parseable
/// extra IPs are appended.
pub fn generate_self_signed_cert(extra_ips: &[String]) -> LudocoreResult<(String, String)> {
    let mut params = CertificateParams::new(vec!["localhost".to_string()])
        .map_err(LudocoreError::custom)?;

    params
        .subject_alt_names
        .push(SanType::IpAddress(IpAddr::from([127, 0, 0, 1])));
    for ip in extra_ips {
        if let Ok(parsed) = ip.parse::<IpAddr>() {
            params.subject_alt_names.push(SanType::IpAddress(parsed));
        }
    }

    params
        .distinguished_name
        .push(DnType::CommonName, "ludocore");
    params
        .distinguished_name
        .push(DnType::OrganizationName, "ludocore");

    params.not_before = time::OffsetDateTime::now_utc() - time::Duration::minutes(1);
    params.not_after = time::OffsetDateTime::now_utc() + time::Duration::days(CERT_VALIDITY_DAYS);

    // KeyPair::generate defaults to ECDSA P-256 with SHA-256.
    let key_pair = KeyPair::generate().map_err(LudocoreError::custom)?;
    let cert = params.self_signed(&key_pair).map_err(LudocoreError::custom)?;

    Ok((cert.pem(), key_pair.serialize_pem()))
}

async fn write_private(path: &Path, contents: &[u8]) -> LudocoreResult<()> {
    fs::write(path, contents).await?;
    fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_self_signed_cert_pem_shape() {
        let (cert_pem, key_pem) = generate_self_signed_cert(&["203.0.113.7".to_string()]).unwrap();
        assert!(cert_pem.starts_with("-----BEGIN CERTIFICATE-----"));
        assert!(key_pem.contains("PRIVATE KEY"));
    }

    #[test]
    fn test_generate_self_signed_cert_ignores_unparseable_ips() {
        // A bad extra IP must not fail generation; it is simply skipped.
        generate_self_signed_cert(&["not-an-ip".to_string()]).unwrap();
    }
}
