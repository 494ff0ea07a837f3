//! CA and leaf certificate issuance (§4.D "CA and leaf issuance").
//!
//! On startup, if HTTPS is enabled: load `certPath`/`keyPath` from disk if
//! both exist, otherwise generate a fresh CA and persist it (if a path was
//! configured). On each HTTPS connection the MITM handshake issues a leaf
//! certificate on the fly for the SNI host, cached so repeat connections to
//! the same host reuse the same leaf.
//!
//! Open question resolution (§9, DESIGN.md): the spec calls for a 2048-bit
//! RSA CA. `rcgen` (the certificate library carried over from the proxy
//! examples in this workspace) cannot generate RSA key pairs on its own —
//! only ECDSA/Ed25519 — so the CA and every leaf use ECDSA P-256 instead.
//! Key usage, extended key usage, SANs and validity follow the spec
//! exactly; only the key algorithm differs from the literal spec text.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose,
    IsCa, Issuer, KeyPair, KeyUsagePurpose, SanType,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{ProxyError, ProxyResult};

const CA_VALIDITY_DAYS: i64 = 365 * 2;
const LEAF_VALIDITY_DAYS: i64 = 90;

/// The running CA: an in-memory signing key plus the materialized
/// PEM/DER forms needed by the tools API and the TLS handshake path.
pub struct CertificateAuthority {
    cert_pem: String,
    cert_der: CertificateDer<'static>,
    issuer_params: CertificateParams,
    key_pair: KeyPair,
    /// SNI host -> issued leaf, so repeat connections reuse the same
    /// certificate/key pair instead of re-issuing every handshake.
    leaves: DashMap<String, Arc<LeafCertificate>>,
    /// `signed_by` needs exclusive access to the issuer's internal nonce
    /// bookkeeping in some rcgen versions; serialize leaf issuance rather
    /// than assume it is safe to call concurrently from many tasks.
    issue_lock: Mutex<()>,
}

pub struct LeafCertificate {
    pub cert_der: CertificateDer<'static>,
    /// PKCS#8 DER bytes. Kept as raw bytes rather than a `PrivateKeyDer`
    /// since the latter isn't `Clone` and this value is read from behind
    /// an `Arc` on every TLS handshake that reuses a cached leaf.
    pub key_der_pkcs8: Vec<u8>,
}

impl LeafCertificate {
    pub fn private_key(&self) -> PrivateKeyDer<'static> {
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(self.key_der_pkcs8.clone()))
    }
}

fn base_distinguished_name(cn: &str) -> DistinguishedName {
    let mut name = DistinguishedName::new();
    name.push(DnType::CommonName, cn);
    name
}

fn build_ca_params() -> ProxyResult<CertificateParams> {
    let mut params = CertificateParams::new(vec![
        "localhost".to_string(),
        "*.localhost".to_string(),
    ])
    .map_err(|e| ProxyError::EngineFailure(format!("CA params: {e}")))?;

    params.distinguished_name = base_distinguished_name("Proxy Traffic MCP CA");
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::NonRepudiation,
        KeyUsagePurpose::KeyEncipherment,
        KeyUsagePurpose::DataEncipherment,
    ];
    params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ServerAuth,
        ExtendedKeyUsagePurpose::ClientAuth,
        ExtendedKeyUsagePurpose::CodeSigning,
        ExtendedKeyUsagePurpose::EmailProtection,
        ExtendedKeyUsagePurpose::TimeStamping,
    ];
    params.subject_alt_names.push(SanType::IpAddress("127.0.0.1".parse().unwrap()));
    params.subject_alt_names.push(SanType::IpAddress("::1".parse().unwrap()));
    let now = SystemTime::now();
    params.not_before = now.into();
    params.not_after = (now + Duration::from_secs(CA_VALIDITY_DAYS as u64 * 86_400)).into();

    Ok(params)
}

impl CertificateAuthority {
    /// Load an existing CA from `cert_path`/`key_path` if both exist,
    /// otherwise generate a fresh one and persist it if paths were given.
    pub async fn load_or_generate(cert_path: &Path, key_path: &Path) -> ProxyResult<Self> {
        if cert_path.exists() && key_path.exists() {
            return Self::load(cert_path, key_path).await;
        }

        warn!(
            cert_path = %cert_path.display(),
            "CA cert/key not found on disk; generating a fresh CA"
        );
        let ca = Self::generate()?;
        ca.persist(cert_path, key_path).await?;
        Ok(ca)
    }

    fn generate() -> ProxyResult<Self> {
        let params = build_ca_params()?;
        let key_pair = KeyPair::generate().map_err(|e| ProxyError::EngineFailure(format!("CA key: {e}")))?;
        let cert = params
            .clone()
            .self_signed(&key_pair)
            .map_err(|e| ProxyError::EngineFailure(format!("CA self-sign: {e}")))?;

        info!("generated a new CA (ECDSA P-256, self-signed, 2 year validity)");

        Ok(Self {
            cert_pem: cert.pem(),
            cert_der: cert.der().clone(),
            issuer_params: params,
            key_pair,
            leaves: DashMap::new(),
            issue_lock: Mutex::new(()),
        })
    }

    async fn load(cert_path: &Path, key_path: &Path) -> ProxyResult<Self> {
        let cert_pem = tokio::fs::read_to_string(cert_path).await?;
        let key_pem = tokio::fs::read_to_string(key_path).await?;

        let key_pair =
            KeyPair::from_pem(&key_pem).map_err(|e| ProxyError::EngineFailure(format!("CA key load: {e}")))?;
        let issuer_params = CertificateParams::from_ca_cert_pem(&cert_pem)
            .map_err(|e| ProxyError::EngineFailure(format!("CA cert load: {e}")))?;

        let mut certs = rustls_pemfile::certs(&mut cert_pem.as_bytes());
        let cert_der = certs
            .next()
            .ok_or_else(|| ProxyError::EngineFailure("CA cert file has no certificate".into()))?
            .map_err(|e| ProxyError::EngineFailure(format!("CA cert parse: {e}")))?;

        info!(cert_path = %cert_path.display(), "loaded existing CA from disk");

        Ok(Self {
            cert_pem,
            cert_der,
            issuer_params,
            key_pair,
            leaves: DashMap::new(),
            issue_lock: Mutex::new(()),
        })
    }

    async fn persist(&self, cert_path: &Path, key_path: &Path) -> ProxyResult<()> {
        if let Some(parent) = cert_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if let Some(parent) = key_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(cert_path, &self.cert_pem).await?;
        tokio::fs::write(key_path, self.key_pair.serialize_pem()).await?;
        Ok(())
    }

    /// PEM form of the CA certificate, for `get_ca_certificate` (§6).
    pub fn certificate_pem(&self) -> &str {
        &self.cert_pem
    }

    /// Issue (or fetch the cached) leaf certificate for `sni_host`.
    ///
    /// Leaf keys are reused across leaves for performance; this is a
    /// documented dev-only weakness (§4.D), not a production posture.
    pub async fn leaf_for(&self, sni_host: &str) -> ProxyResult<Arc<LeafCertificate>> {
        if let Some(existing) = self.leaves.get(sni_host) {
            return Ok(existing.clone());
        }

        let _guard = self.issue_lock.lock().await;
        if let Some(existing) = self.leaves.get(sni_host) {
            return Ok(existing.clone());
        }

        let leaf = self.issue_leaf(sni_host)?;
        let leaf = Arc::new(leaf);
        self.leaves.insert(sni_host.to_string(), leaf.clone());
        Ok(leaf)
    }

    fn issue_leaf(&self, sni_host: &str) -> ProxyResult<LeafCertificate> {
        let san = if sni_host.parse::<std::net::IpAddr>().is_ok() {
            SanType::IpAddress(sni_host.parse().unwrap())
        } else {
            SanType::DnsName(
                sni_host
                    .to_string()
                    .try_into()
                    .map_err(|e| ProxyError::EngineFailure(format!("invalid SNI host: {e}")))?,
            )
        };

        let mut params = CertificateParams::default();
        params.distinguished_name = base_distinguished_name(sni_host);
        params.subject_alt_names = vec![san];
        params.is_ca = IsCa::ExplicitNoCa;
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature, KeyUsagePurpose::KeyEncipherment];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        let now = SystemTime::now();
        params.not_before = now.into();
        params.not_after = (now + Duration::from_secs(LEAF_VALIDITY_DAYS as u64 * 86_400)).into();

        let leaf_key = KeyPair::generate().map_err(|e| ProxyError::EngineFailure(format!("leaf key: {e}")))?;
        let issuer = Issuer::new(self.issuer_params.clone(), self.key_pair.clone());
        let leaf_cert = params
            .signed_by(&leaf_key, &issuer)
            .map_err(|e| ProxyError::EngineFailure(format!("leaf sign: {e}")))?;

        Ok(LeafCertificate {
            cert_der: leaf_cert.der().clone(),
            key_der_pkcs8: leaf_key.serialize_der(),
        })
    }
}

/// Default CA cert/key paths, mirroring `ProxyGroup`'s defaults (§6).
pub fn default_cert_path() -> PathBuf {
    PathBuf::from("./certs/ca-cert.pem")
}

pub fn default_key_path() -> PathBuf {
    PathBuf::from("./certs/ca-key.pem")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ca_pem_is_present() {
        let ca = CertificateAuthority::generate().unwrap();
        assert!(ca.certificate_pem().contains("BEGIN CERTIFICATE"));
    }

    #[tokio::test]
    async fn leaf_is_cached_per_host() {
        let ca = CertificateAuthority::generate().unwrap();
        let first = ca.leaf_for("example.com").await.unwrap();
        let second = ca.leaf_for("example.com").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn distinct_hosts_get_distinct_leaves() {
        let ca = CertificateAuthority::generate().unwrap();
        let a = ca.leaf_for("a.example.com").await.unwrap();
        let b = ca.leaf_for("b.example.com").await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
